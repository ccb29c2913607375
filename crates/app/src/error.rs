use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VlanError {
    #[error("malformed VLAN table entry {key:?}: vlan_id {value:?} is not a VLAN number")]
    MalformedTableEntry { key: String, value: String },
    #[error("invalid VLAN id {0:?}: expected an integer between 0 and 4095")]
    InvalidId(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid JSON in show vlan output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no VLAN table found in show vlan output: {0}")]
    UnrecognizedOutput(String),
}

#[derive(Debug, Error)]
pub enum TestbedError {
    #[error("failed to read testbed {path}: {source}")]
    Io {
        source: std::io::Error,
        path: Utf8PathBuf,
    },
    #[error("failed to parse testbed {path}: {source}")]
    Parse {
        source: serde_yaml_bw::Error,
        path: Utf8PathBuf,
    },
    #[error("device '{0}' not found in the testbed")]
    DeviceNotFound(String),
    #[error("device '{device}' has no usable cli connection: {reason}")]
    Connection { device: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to connect to device {device}: {reason}")]
    Connect { device: String, reason: String },
    #[error("device {device} is not connected")]
    NotConnected { device: String },
    #[error("command {command:?} failed on {device}: {reason}")]
    Command {
        device: String,
        command: String,
        reason: String,
    },
    #[error("device {device} does not support command {command:?}")]
    UnsupportedCommand { device: String, command: String },
    #[error("failed to disconnect device {device}: {reason}")]
    Disconnect { device: String, reason: String },
    #[error(transparent)]
    Testbed(#[from] TestbedError),
}

/// Everything that can abort the setup phase of a testcase.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Testbed(#[from] TestbedError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("failed to parse VLAN information: {0}")]
    Adapter(#[from] AdapterError),
    #[error("failed to parse VLAN information: {0}")]
    Vlan(#[from] VlanError),
}
