use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::device::SshSettings;
use crate::lifecycle::{DEFAULT_TARGET, RunPlan, SHOW_VLAN};
use crate::vlan::{ExpectedVlans, MalformedPolicy};

static APP_NAME: &str = "vlan-verify";
static ENV_PREFIX: &str = "VLAN_VERIFY_";
static DEFAULT_CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::default);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_testbed")]
    pub testbed: Utf8PathBuf,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub ssh: SshSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            testbed: default_testbed(),
            run: RunConfig::default(),
            ssh: SshSettings::default(),
        }
    }
}

fn default_testbed() -> Utf8PathBuf {
    Utf8PathBuf::from("testbed.yaml")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub expected_vlans: ExpectedVlans,
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub malformed: MalformedPolicy,
    #[serde(default = "default_connect_all")]
    pub connect_all: bool,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub report: Option<Utf8PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            expected_vlans: ExpectedVlans::default(),
            targets: default_targets(),
            malformed: MalformedPolicy::default(),
            connect_all: default_connect_all(),
            command: default_command(),
            report: None,
        }
    }
}

fn default_targets() -> Vec<String> {
    vec![DEFAULT_TARGET.to_string()]
}

fn default_connect_all() -> bool {
    true
}

fn default_command() -> String {
    SHOW_VLAN.to_string()
}

/// Values given on the command line; `None`/empty leaves the configured value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub testbed: Option<Utf8PathBuf>,
    pub expected_vlans: Option<ExpectedVlans>,
    pub targets: Vec<String>,
    pub malformed: Option<MalformedPolicy>,
    pub targets_only: bool,
    pub report: Option<Utf8PathBuf>,
}

impl AppConfig {
    pub fn apply(mut self, overrides: CliOverrides) -> Self {
        if let Some(testbed) = overrides.testbed {
            self.testbed = testbed;
        }
        if let Some(expected) = overrides.expected_vlans {
            self.run.expected_vlans = expected;
        }
        if !overrides.targets.is_empty() {
            self.run.targets = overrides.targets;
        }
        if let Some(policy) = overrides.malformed {
            self.run.malformed = policy;
        }
        if overrides.targets_only {
            self.run.connect_all = false;
        }
        if overrides.report.is_some() {
            self.run.report = overrides.report;
        }
        self
    }

    pub fn run_plan(&self) -> RunPlan {
        RunPlan {
            targets: self.run.targets.clone(),
            expected: self.run.expected_vlans.clone(),
            policy: self.run.malformed,
            connect_all: self.run.connect_all,
            command: self.run.command.clone(),
        }
    }
}

/// Layer defaults < config file < `VLAN_VERIFY_*` env. CLI overrides are applied
/// afterwards via [`AppConfig::apply`].
pub fn figment(explicit_path: Option<&Utf8Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(DEFAULT_CONFIG.clone()));

    if let Some(path) = explicit_path {
        figment = figment.merge(Toml::file_exact(path));
    } else if let Some(path) = resolve_default_config_path() {
        figment = figment.merge(Toml::file(path));
    } else {
        warn!("no config file found; relying on defaults + env overrides");
    }

    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

pub fn load_config(explicit_path: Option<&Utf8Path>) -> Result<AppConfig> {
    figment(explicit_path)
        .extract()
        .context("failed to load vlan-verify configuration")
}

fn resolve_default_config_path() -> Option<Utf8PathBuf> {
    let local = Utf8PathBuf::from("config").join(format!("{APP_NAME}.toml"));
    if local.exists() {
        return Some(local);
    }

    if let Some(dirs) = ProjectDirs::from("net", "vlan-verify", APP_NAME)
        && let Ok(path) = Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.toml"))
        && path.exists()
    {
        return Some(path);
    }

    None
}
