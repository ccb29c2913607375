use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde_json::{Map, Value};

pub struct Fixture;

impl Fixture {
    /// Absolute path of a fixture relative to `fixtures/`.
    pub fn path(path: impl AsRef<Path>) -> Result<Utf8PathBuf> {
        let full = fixtures_root().join(path.as_ref());
        Utf8PathBuf::from_path_buf(full)
            .map_err(|p| anyhow::anyhow!("fixture path is not UTF-8: {}", p.display()))
    }

    /// Load a text fixture relative to `fixtures/`.
    pub fn load_text(path: impl AsRef<Path>) -> Result<String> {
        let full = fixtures_root().join(path.as_ref());
        fs::read_to_string(&full)
            .with_context(|| format!("failed to read fixture {}", full.display()))
    }

    /// Load a JSON fixture relative to `fixtures/`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Value> {
        let data = Self::load_text(path)?;
        serde_json::from_str(&data).context("invalid JSON in fixture")
    }
}

/// Normalize a serialized run report by dropping fields that change every run.
pub fn normalize_report(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_map(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_report).collect()),
        other => other,
    }
}

fn normalize_map(map: Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();
    for (key, val) in map.into_iter() {
        if is_unstable_field(&key) {
            continue;
        }
        cleaned.insert(key, normalize_report(val));
    }
    cleaned
}

fn is_unstable_field(key: &str) -> bool {
    matches!(key, "started_at" | "finished_at")
}

fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .map(|root| root.join("fixtures"))
        .unwrap_or_else(|| PathBuf::from("fixtures"))
}
