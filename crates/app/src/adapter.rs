use serde::Deserialize;
use serde_json::Value;

use crate::error::AdapterError;
use crate::vlan::{RawVlanEntry, RawVlanId, RawVlanTable};

/// Adapt raw `show vlan` output into the loose table the verifier canonicalizes.
/// JSON output (parser-shaped or NX-OS `| json`) and IOS-style CLI text are accepted.
pub fn parse_show_vlan(output: &str) -> Result<RawVlanTable, AdapterError> {
    let trimmed = output.trim_start();
    if trimmed.starts_with('{') {
        return parse_json(trimmed);
    }
    parse_cli_text(output)
}

fn parse_json(output: &str) -> Result<RawVlanTable, AdapterError> {
    let value: Value = serde_json::from_str(output)?;
    if value.get("vlans").is_some() {
        return Ok(serde_json::from_value(value)?);
    }

    let table = ["TABLE_vlanbrief", "TABLE_vlanbriefxbrief"]
        .iter()
        .find_map(|key| value.get(*key))
        .ok_or_else(|| {
            AdapterError::UnrecognizedOutput("JSON has neither vlans nor TABLE_vlanbrief".into())
        })?;
    let rows = ["ROW_vlanbrief", "ROW_vlanbriefxbrief"]
        .iter()
        .find_map(|key| table.get(*key))
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));
    // NX-OS collapses a single row into an object instead of a one-element array.
    let rows: Vec<NxosRow> = match rows {
        Value::Array(_) => serde_json::from_value(rows)?,
        single => vec![serde_json::from_value(single)?],
    };

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(idx, row)| {
            let key = match &row.vlan_id {
                RawVlanId::Other(_) => format!("row{idx}"),
                id => id.to_string(),
            };
            let entry = RawVlanEntry {
                vlan_id: row.vlan_id,
                name: row.name,
                state: row.state,
                interfaces: split_ports(row.ports.as_deref().unwrap_or("")),
            };
            (key, entry)
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct NxosRow {
    #[serde(rename = "vlanshowbr-vlanid", default)]
    vlan_id: RawVlanId,
    #[serde(rename = "vlanshowbr-vlanname", default)]
    name: Option<String>,
    #[serde(rename = "vlanshowbr-vlanstate", default)]
    state: Option<String>,
    #[serde(rename = "vlanshowplist-ifidx", default)]
    ports: Option<String>,
}

fn parse_cli_text(output: &str) -> Result<RawVlanTable, AdapterError> {
    let mut lines = output.lines();
    let mut found_header = false;
    for line in lines.by_ref() {
        if is_header(line) {
            found_header = true;
            break;
        }
    }
    if !found_header {
        let first = output
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("<empty output>");
        return Err(AdapterError::UnrecognizedOutput(first.to_string()));
    }

    let mut table = RawVlanTable::default();
    let mut current: Option<(String, RawVlanEntry)> = None;
    for line in lines {
        if line.starts_with("----") {
            continue;
        }
        if line.trim().is_empty() || is_header(line) {
            break;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some((_, entry)) = current.as_mut() {
                entry.interfaces.extend(split_ports(line));
            }
            continue;
        }

        if let Some((key, entry)) = current.take() {
            table.insert(key, entry);
        }
        let mut columns = line.split_whitespace();
        let Some(id) = columns.next() else {
            continue;
        };
        let name = columns.next().map(str::to_string);
        let state = columns.next().map(str::to_string);
        let ports = columns.collect::<Vec<_>>().join(" ");
        current = Some((
            id.to_string(),
            RawVlanEntry {
                vlan_id: RawVlanId::from(id),
                name,
                state,
                interfaces: split_ports(&ports),
            },
        ));
    }
    if let Some((key, entry)) = current {
        table.insert(key, entry);
    }
    Ok(table)
}

fn is_header(line: &str) -> bool {
    line.starts_with("VLAN") && line.contains("Name") && line.contains("Status")
}

fn split_ports(ports: &str) -> Vec<String> {
    ports
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
