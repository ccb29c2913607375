mod fixture;
mod ssh;

pub use fixture::FixtureSession;
pub use ssh::{SshSession, SshSettings};

use tracing::warn;

use crate::error::DeviceError;
use crate::testbed::{Device, Endpoint, Testbed};

/// A live CLI session to one device.
pub trait DeviceSession {
    fn name(&self) -> &str;
    fn connect(&mut self) -> Result<(), DeviceError>;
    fn execute(&mut self, command: &str) -> Result<String, DeviceError>;
    fn disconnect(&mut self) -> Result<(), DeviceError>;
    fn is_connected(&self) -> bool;
}

/// Builds an unconnected session for a testbed device.
pub trait Connector {
    fn open(
        &self,
        testbed: &Testbed,
        device: &Device,
    ) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// Picks the session implementation from the device's `cli` connection.
#[derive(Debug, Clone, Default)]
pub struct TestbedConnector {
    ssh: SshSettings,
}

impl TestbedConnector {
    pub fn new(ssh: SshSettings) -> Self {
        Self { ssh }
    }
}

impl Connector for TestbedConnector {
    fn open(
        &self,
        testbed: &Testbed,
        device: &Device,
    ) -> Result<Box<dyn DeviceSession>, DeviceError> {
        match testbed.endpoint(device)? {
            Endpoint::Ssh(target) => {
                if target.has_password {
                    warn!(
                        device = %device.name,
                        "password credentials are ignored; ssh runs in batch mode with key auth"
                    );
                }
                Ok(Box::new(SshSession::new(&device.name, target, &self.ssh)?))
            }
            Endpoint::Fixture(target) => Ok(Box::new(FixtureSession::new(&device.name, target))),
        }
    }
}

/// Owns a session and guarantees it is disconnected on every exit path.
pub struct SessionGuard {
    name: String,
    session: Option<Box<dyn DeviceSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn DeviceSession>) -> Self {
        Self {
            name: session.name().to_string(),
            session: Some(session),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected())
    }

    pub fn connect(&mut self) -> Result<(), DeviceError> {
        self.session_mut()?.connect()
    }

    pub fn execute(&mut self, command: &str) -> Result<String, DeviceError> {
        self.session_mut()?.execute(command)
    }

    /// Disconnect now and surface the error, instead of the silent attempt on drop.
    pub fn release(mut self) -> Result<(), DeviceError> {
        match self.session.take() {
            Some(mut session) if session.is_connected() => session.disconnect(),
            _ => Ok(()),
        }
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn DeviceSession>, DeviceError> {
        self.session
            .as_mut()
            .ok_or_else(|| DeviceError::NotConnected {
                device: self.name.clone(),
            })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take()
            && session.is_connected()
            && let Err(err) = session.disconnect()
        {
            warn!(device = %self.name, error = %err, "disconnect on drop failed");
        }
    }
}
