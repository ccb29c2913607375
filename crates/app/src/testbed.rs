use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_yaml_bw as serde_yaml;

use crate::error::TestbedError;

const DEFAULT_SSH_PORT: u16 = 22;

/// Device inventory describing how each switch is reached.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Testbed {
    #[serde(default)]
    pub testbed: TestbedInfo,
    #[serde(default)]
    pub devices: BTreeMap<String, Device>,
    /// Directory fixture paths are resolved against.
    #[serde(skip)]
    base_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TestbedInfo {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Device {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub credentials: BTreeMap<String, Credential>,
    #[serde(default)]
    pub connections: BTreeMap<String, Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credential {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub protocol: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub identity_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub ssh_options: Vec<String>,
    /// Fixture protocol only: command -> file with its canned output.
    #[serde(default)]
    pub commands: BTreeMap<String, Utf8PathBuf>,
}

/// A resolved `cli` connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Ssh(SshTarget),
    Fixture(FixtureTarget),
}

impl Endpoint {
    pub fn protocol(&self) -> &'static str {
        match self {
            Endpoint::Ssh(_) => "ssh",
            Endpoint::Fixture(_) => "fixture",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub identity_file: Option<Utf8PathBuf>,
    pub options: Vec<String>,
    pub has_password: bool,
}

impl SshTarget {
    pub fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureTarget {
    pub commands: BTreeMap<String, Utf8PathBuf>,
}

impl Testbed {
    pub fn load(path: &Utf8Path) -> Result<Self, TestbedError> {
        let data = fs::read_to_string(path).map_err(|source| TestbedError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        let base_dir = path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        Self::from_yaml(&data, base_dir).map_err(|source| TestbedError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    pub fn from_yaml(
        yaml: &str,
        base_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, serde_yaml::Error> {
        let mut testbed: Testbed = serde_yaml::from_str(yaml)?;
        testbed.base_dir = base_dir.into();
        for (name, device) in testbed.devices.iter_mut() {
            device.name = name.clone();
        }
        Ok(testbed)
    }

    pub fn name(&self) -> &str {
        self.testbed.name.as_deref().unwrap_or("testbed")
    }

    pub fn device(&self, name: &str) -> Result<&Device, TestbedError> {
        self.devices
            .get(name)
            .ok_or_else(|| TestbedError::DeviceNotFound(name.to_string()))
    }

    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn endpoint(&self, device: &Device) -> Result<Endpoint, TestbedError> {
        device.endpoint(&self.base_dir)
    }
}

impl Device {
    /// The `cli` connection, or the only connection when a device declares one.
    pub fn cli_connection(&self) -> Option<&Connection> {
        self.connections.get("cli").or_else(|| {
            if self.connections.len() == 1 {
                self.connections.values().next()
            } else {
                None
            }
        })
    }

    pub fn endpoint(&self, base_dir: &Utf8Path) -> Result<Endpoint, TestbedError> {
        let connection = self.cli_connection().ok_or_else(|| TestbedError::Connection {
            device: self.name.clone(),
            reason: "no 'cli' connection defined".into(),
        })?;

        match connection.protocol.to_ascii_lowercase().as_str() {
            "ssh" => {
                let host = connection.ip.clone().ok_or_else(|| TestbedError::Connection {
                    device: self.name.clone(),
                    reason: "ssh connection is missing 'ip'".into(),
                })?;
                let credential = self.credentials.get("default");
                Ok(Endpoint::Ssh(SshTarget {
                    host,
                    port: connection.port.unwrap_or(DEFAULT_SSH_PORT),
                    username: credential.and_then(|c| c.username.clone()),
                    identity_file: connection.identity_file.clone(),
                    options: connection.ssh_options.clone(),
                    has_password: credential.is_some_and(|c| c.password.is_some()),
                }))
            }
            "fixture" => {
                if connection.commands.is_empty() {
                    return Err(TestbedError::Connection {
                        device: self.name.clone(),
                        reason: "fixture connection maps no commands".into(),
                    });
                }
                let commands = connection
                    .commands
                    .iter()
                    .map(|(command, path)| {
                        let resolved = if path.is_absolute() {
                            path.clone()
                        } else {
                            base_dir.join(path)
                        };
                        (normalize_command(command), resolved)
                    })
                    .collect();
                Ok(Endpoint::Fixture(FixtureTarget { commands }))
            }
            other => Err(TestbedError::Connection {
                device: self.name.clone(),
                reason: format!("unsupported protocol '{other}'"),
            }),
        }
    }
}

/// Collapse runs of whitespace so `show  vlan` and `show vlan` address the same fixture.
pub fn normalize_command(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}
