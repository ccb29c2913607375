use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::VlanError;

pub const MAX_VLAN_ID: u16 = 4095;
pub const DEFAULT_EXPECTED_VLANS: [u16; 3] = [11, 12, 13];

/// Canonical 802.1Q VLAN identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub fn new(id: u16) -> Result<Self, VlanError> {
        if id > MAX_VLAN_ID {
            return Err(VlanError::InvalidId(id.to_string()));
        }
        Ok(Self(id))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for VlanId {
    type Error = VlanError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        VlanId::new(value)
    }
}

impl From<VlanId> for u16 {
    fn from(id: VlanId) -> Self {
        id.0
    }
}

impl FromStr for VlanId {
    type Err = VlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u16>()
            .map_err(|_| VlanError::InvalidId(trimmed.to_string()))
            .and_then(VlanId::new)
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A VLAN identifier as a device parser reported it: some emit numbers, most emit text.
/// Anything else (null, floats, booleans, a missing field) is kept as `Other` so the
/// malformed-entry policy decides what happens to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawVlanId {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl Default for RawVlanId {
    fn default() -> Self {
        RawVlanId::Other(serde_json::Value::Null)
    }
}

impl RawVlanId {
    pub fn canonical(&self) -> Option<VlanId> {
        match self {
            RawVlanId::Number(n) => u16::try_from(*n).ok().and_then(|n| VlanId::new(n).ok()),
            RawVlanId::Text(s) => s.parse().ok(),
            RawVlanId::Other(_) => None,
        }
    }
}

impl fmt::Display for RawVlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawVlanId::Number(n) => write!(f, "{n}"),
            RawVlanId::Text(s) => f.write_str(s),
            RawVlanId::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for RawVlanId {
    fn from(value: &str) -> Self {
        RawVlanId::Text(value.to_string())
    }
}

impl From<i64> for RawVlanId {
    fn from(value: i64) -> Self {
        RawVlanId::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVlanEntry {
    #[serde(default)]
    pub vlan_id: RawVlanId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl RawVlanEntry {
    pub fn new(vlan_id: impl Into<RawVlanId>) -> Self {
        Self {
            vlan_id: vlan_id.into(),
            name: None,
            state: None,
            interfaces: Vec::new(),
        }
    }
}

/// Loose `show vlan` structure, keyed by the VLAN id as the device printed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVlanTable {
    #[serde(default)]
    pub vlans: BTreeMap<String, RawVlanEntry>,
}

impl RawVlanTable {
    pub fn insert(&mut self, key: impl Into<String>, entry: RawVlanEntry) {
        self.vlans.insert(key.into(), entry);
    }
}

impl<K: Into<String>> FromIterator<(K, RawVlanEntry)> for RawVlanTable {
    fn from_iter<T: IntoIterator<Item = (K, RawVlanEntry)>>(iter: T) -> Self {
        Self {
            vlans: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// What to do with a table entry whose id cannot be canonicalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the whole check with `MalformedTableEntry`.
    #[default]
    Fail,
    /// Drop the entry with a warning and verify the rest.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanRecord {
    pub id: VlanId,
    pub name: Option<String>,
    pub state: Option<String>,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VlanTable {
    records: BTreeMap<VlanId, VlanRecord>,
}

impl VlanTable {
    /// The one place loose device output becomes typed. Every key's `vlan_id`
    /// is canonicalized; string `"12"` and integer `12` land on the same record.
    pub fn from_raw(
        raw: &RawVlanTable,
        policy: MalformedPolicy,
    ) -> Result<(Self, Vec<SkippedEntry>), VlanError> {
        let mut records = BTreeMap::new();
        let mut skipped = Vec::new();
        for (key, entry) in &raw.vlans {
            let Some(id) = entry.vlan_id.canonical() else {
                let value = entry.vlan_id.to_string();
                match policy {
                    MalformedPolicy::Fail => {
                        return Err(VlanError::MalformedTableEntry {
                            key: key.clone(),
                            value,
                        });
                    }
                    MalformedPolicy::Skip => {
                        warn!(key = %key, vlan_id = %value, "skipping malformed VLAN entry");
                        skipped.push(SkippedEntry {
                            key: key.clone(),
                            value,
                        });
                        continue;
                    }
                }
            };
            records.insert(
                id,
                VlanRecord {
                    id,
                    name: entry.name.clone(),
                    state: entry.state.clone(),
                    interfaces: entry.interfaces.clone(),
                },
            );
        }
        Ok((Self { records }, skipped))
    }

    pub fn contains(&self, id: VlanId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: VlanId) -> Option<&VlanRecord> {
        self.records.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = VlanId> + '_ {
        self.records.keys().copied()
    }

    pub fn records(&self) -> impl Iterator<Item = &VlanRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<VlanRecord> for VlanTable {
    fn from_iter<T: IntoIterator<Item = VlanRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

/// Ordered list of VLANs the operator expects on the device. Duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedVlans(Vec<VlanId>);

impl ExpectedVlans {
    pub fn new(ids: Vec<VlanId>) -> Self {
        Self(ids)
    }

    /// Parse invocation arguments, one integer per argument.
    pub fn from_args<I, S>(args: I) -> Result<Self, VlanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter()
            .map(|arg| arg.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn iter(&self) -> impl Iterator<Item = VlanId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ExpectedVlans {
    fn default() -> Self {
        Self(DEFAULT_EXPECTED_VLANS.into_iter().map(VlanId).collect())
    }
}

impl fmt::Display for ExpectedVlans {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_id_list(f, self.0.iter())
    }
}

/// Expected VLANs absent from a device's table. Iterates in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissingVlans(BTreeSet<VlanId>);

impl MissingVlans {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: VlanId) -> bool {
        self.0.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = VlanId> + '_ {
        self.0.iter().copied()
    }

    pub fn into_assertion(self) -> Result<(), VerificationFailure> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(VerificationFailure { missing: self })
        }
    }
}

impl FromIterator<VlanId> for MissingVlans {
    fn from_iter<T: IntoIterator<Item = VlanId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for MissingVlans {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_id_list(f, self.0.iter())
    }
}

fn write_id_list<'a>(
    f: &mut fmt::Formatter<'_>,
    ids: impl Iterator<Item = &'a VlanId>,
) -> fmt::Result {
    f.write_str("[")?;
    for (idx, id) in ids.enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{id}")?;
    }
    f.write_str("]")
}

/// The device answered but is not configured as expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing VLANs: {missing}")]
pub struct VerificationFailure {
    pub missing: MissingVlans,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub missing: MissingVlans,
    pub skipped: Vec<SkippedEntry>,
}

pub fn verify(expected: &ExpectedVlans, table: &VlanTable) -> MissingVlans {
    expected.iter().filter(|id| !table.contains(*id)).collect()
}

/// Canonicalize `raw` under `policy`, then verify. Malformed entries fail before
/// any comparison happens.
pub fn verify_raw(
    expected: &ExpectedVlans,
    raw: &RawVlanTable,
    policy: MalformedPolicy,
) -> Result<Verification, VlanError> {
    let (table, skipped) = VlanTable::from_raw(raw, policy)?;
    Ok(Verification {
        missing: verify(expected, &table),
        skipped,
    })
}
