use std::{
    fs::{self, File},
    path::PathBuf,
    process::{Command, Stdio},
};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DeviceSession;
use crate::error::DeviceError;
use crate::testbed::SshTarget;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Explicit path to the ssh client; looked up on `PATH` when unset.
    #[serde(default)]
    pub binary: Option<Utf8PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Where ControlMaster sockets and ssh logs live. Defaults to the temp dir.
    #[serde(default)]
    pub control_dir: Option<Utf8PathBuf>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: None,
            connect_timeout_secs: default_connect_timeout(),
            control_dir: None,
        }
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Session over the system OpenSSH client. `connect` starts a ControlMaster in the
/// background; every command then rides the master's control socket.
#[derive(Debug)]
pub struct SshSession {
    name: String,
    binary: PathBuf,
    target: SshTarget,
    control_path: PathBuf,
    log_path: PathBuf,
    connect_timeout_secs: u64,
    connected: bool,
}

impl SshSession {
    pub fn new(name: &str, target: SshTarget, settings: &SshSettings) -> Result<Self, DeviceError> {
        let binary = match &settings.binary {
            Some(path) => path.clone().into_std_path_buf(),
            None => which::which("ssh").map_err(|err| DeviceError::Connect {
                device: name.to_string(),
                reason: format!("ssh client not found on PATH: {err}"),
            })?,
        };
        let control_dir = settings
            .control_dir
            .as_deref()
            .map(Utf8Path::as_std_path)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let stem = format!("vlan-verify-{}-{name}", std::process::id());
        Ok(Self {
            name: name.to_string(),
            binary,
            target,
            control_path: control_dir.join(format!("{stem}.sock")),
            log_path: control_dir.join(format!("{stem}.log")),
            connect_timeout_secs: settings.connect_timeout_secs,
            connected: false,
        })
    }

    pub fn control_path(&self) -> &std::path::Path {
        &self.control_path
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-S")
            .arg(&self.control_path)
            .arg("-p")
            .arg(self.target.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        if let Some(identity) = &self.target.identity_file {
            cmd.arg("-i").arg(identity.as_std_path());
        }
        for option in &self.target.options {
            cmd.arg("-o").arg(option);
        }
        cmd
    }

    /// Run ssh with stderr captured to the session log; the backgrounded master
    /// keeps inherited pipes open, so a file is used instead of a pipe.
    fn run_logged(&self, mut cmd: Command) -> Result<(bool, String), String> {
        let log_file = File::create(&self.log_path)
            .map_err(|err| format!("failed to create {}: {err}", self.log_path.display()))?;
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log_file))
            .status()
            .map_err(|err| format!("failed to run {}: {err}", self.binary.display()))?;
        let stderr = fs::read_to_string(&self.log_path).unwrap_or_default();
        Ok((status.success(), stderr.trim().to_string()))
    }
}

impl DeviceSession for SshSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        let mut cmd = self.base_command();
        cmd.args(["-M", "-f", "-N"]).arg(self.target.destination());
        debug!(device = %self.name, control = %self.control_path.display(), "starting ssh master");
        let result = self.run_logged(cmd);
        if !matches!(result, Ok((true, _))) {
            let _ = fs::remove_file(&self.log_path);
        }
        match result {
            Ok((true, _)) => {
                self.connected = true;
                Ok(())
            }
            Ok((false, stderr)) => Err(DeviceError::Connect {
                device: self.name.clone(),
                reason: if stderr.is_empty() {
                    "ssh exited with an error".into()
                } else {
                    stderr
                },
            }),
            Err(reason) => Err(DeviceError::Connect {
                device: self.name.clone(),
                reason,
            }),
        }
    }

    fn execute(&mut self, command: &str) -> Result<String, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected {
                device: self.name.clone(),
            });
        }
        let output = self
            .base_command()
            .arg(self.target.destination())
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| DeviceError::Command {
                device: self.name.clone(),
                command: command.to_string(),
                reason: format!("failed to run {}: {err}", self.binary.display()),
            })?;
        if !output.status.success() {
            return Err(DeviceError::Command {
                device: self.name.clone(),
                command: command.to_string(),
                reason: format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let mut cmd = self.base_command();
        cmd.args(["-O", "exit"]).arg(self.target.destination());
        let result = self.run_logged(cmd);
        let _ = fs::remove_file(&self.log_path);
        match result {
            Ok((true, _)) => Ok(()),
            Ok((false, stderr)) => Err(DeviceError::Disconnect {
                device: self.name.clone(),
                reason: stderr,
            }),
            Err(reason) => Err(DeviceError::Disconnect {
                device: self.name.clone(),
                reason,
            }),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
