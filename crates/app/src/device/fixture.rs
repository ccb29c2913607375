use std::fs;

use super::DeviceSession;
use crate::error::DeviceError;
use crate::testbed::{FixtureTarget, normalize_command};

/// Offline session answering commands from canned output files.
#[derive(Debug)]
pub struct FixtureSession {
    name: String,
    target: FixtureTarget,
    connected: bool,
}

impl FixtureSession {
    pub fn new(name: &str, target: FixtureTarget) -> Self {
        Self {
            name: name.to_string(),
            target,
            connected: false,
        }
    }
}

impl DeviceSession for FixtureSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        if let Some(path) = self.target.commands.values().find(|path| !path.exists()) {
            return Err(DeviceError::Connect {
                device: self.name.clone(),
                reason: format!("fixture {path} does not exist"),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn execute(&mut self, command: &str) -> Result<String, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected {
                device: self.name.clone(),
            });
        }
        let path = self
            .target
            .commands
            .get(&normalize_command(command))
            .ok_or_else(|| DeviceError::UnsupportedCommand {
                device: self.name.clone(),
                command: command.to_string(),
            })?;
        fs::read_to_string(path).map_err(|err| DeviceError::Command {
            device: self.name.clone(),
            command: command.to_string(),
            reason: format!("failed to read {path}: {err}"),
        })
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
