use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml_bw as serde_yaml;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to read {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("failed to walk {path}: {source}")]
    Walk {
        source: walkdir::Error,
        path: PathBuf,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

/// Simulated switch: a hostname and the VLANs it would report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwitchState {
    pub hostname: String,
    #[serde(default)]
    pub vlans: Vec<SimVlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimVlan {
    /// Kept as text so fixtures can carry ids a real parser would choke on.
    pub id: String,
    pub name: String,
    #[serde(default = "default_vlan_state")]
    pub state: String,
    #[serde(default)]
    pub ports: Vec<String>,
}

fn default_vlan_state() -> String {
    "active".into()
}

impl SwitchState {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            vlans: Vec::new(),
        }
    }

    /// Builder helper used by tests: add an active VLAN without ports.
    pub fn with_vlan(mut self, id: impl ToString, name: &str) -> Self {
        self.vlans.push(SimVlan {
            id: id.to_string(),
            name: name.into(),
            state: default_vlan_state(),
            ports: Vec::new(),
        });
        self
    }

    fn validate(&self, path: &Path) -> Result<(), SimError> {
        if self.hostname.trim().is_empty() {
            return Err(SimError::Validation(format!(
                "{} has an empty hostname",
                path.display()
            )));
        }
        for vlan in &self.vlans {
            if vlan.id.trim().is_empty() || vlan.id.contains(char::is_whitespace) {
                return Err(SimError::Validation(format!(
                    "{}: vlan id {:?} must be a single token",
                    path.display(),
                    vlan.id
                )));
            }
        }
        Ok(())
    }
}

pub fn load_state(path: &Path) -> Result<SwitchState, SimError> {
    let data = fs::read_to_string(path).map_err(|source| SimError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let state: SwitchState = serde_yaml::from_str(&data).map_err(|source| SimError::Parse {
        source,
        path: path.to_path_buf(),
    })?;
    state.validate(path)?;
    Ok(state)
}

/// Load every `*.yaml` state under `dir`, sorted by hostname.
pub fn load_states(dir: &Path) -> Result<Vec<SwitchState>, SimError> {
    let mut states = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(2) {
        let entry = entry.map_err(|source| SimError::Walk {
            source,
            path: dir.to_path_buf(),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("yaml")
        {
            states.push(load_state(entry.path())?);
        }
    }
    states.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    Ok(states)
}

pub fn states_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("states")
}
