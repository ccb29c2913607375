use serde::{Deserialize, Serialize};

use crate::state::{SimVlan, SwitchState};

const PORTS_PER_LINE: usize = 3;
const PORTS_COLUMN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliFlavor {
    Ios,
    Nxos,
}

impl CliFlavor {
    pub fn file_suffix(self) -> &'static str {
        match self {
            CliFlavor::Ios => "ios.txt",
            CliFlavor::Nxos => "nxos.json",
        }
    }
}

pub fn render(state: &SwitchState, flavor: CliFlavor) -> String {
    match flavor {
        CliFlavor::Ios => render_ios(state),
        CliFlavor::Nxos => render_nxos_json(state),
    }
}

/// Render the first table of IOS `show vlan`, followed by the VLAN type table
/// that a real device prints after it.
pub fn render_ios(state: &SwitchState) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str("VLAN Name                             Status    Ports\n");
    out.push_str(
        "---- -------------------------------- --------- -------------------------------\n",
    );
    for vlan in &state.vlans {
        render_ios_row(&mut out, vlan);
    }
    out.push('\n');
    out.push_str("VLAN Type  SAID       MTU   Parent RingNo BridgeNo Stp  BrdgMode Trans1 Trans2\n");
    out.push_str("---- ----- ---------- ----- ------ ------ -------- ---- -------- ------ ------\n");
    for vlan in &state.vlans {
        let said = vlan.id.parse::<u32>().map(|id| 100_000 + id).unwrap_or(0);
        out.push_str(&format!(
            "{:<4} enet  {:<10} 1500  -      -      -        -    -        0      0\n",
            vlan.id, said
        ));
    }
    out
}

fn render_ios_row(out: &mut String, vlan: &SimVlan) {
    let chunks: Vec<String> = vlan
        .ports
        .chunks(PORTS_PER_LINE)
        .map(|chunk| chunk.join(", "))
        .collect();
    let first = chunks.first().map(String::as_str).unwrap_or("");
    let separator = if chunks.len() > 1 { "," } else { "" };
    let line = format!(
        "{:<4} {:<32} {:<9} {first}{separator}",
        vlan.id, vlan.name, vlan.state
    );
    out.push_str(line.trim_end());
    out.push('\n');

    let rest = chunks.len().saturating_sub(1);
    for (idx, chunk) in chunks.iter().skip(1).enumerate() {
        let separator = if idx + 1 < rest { "," } else { "" };
        out.push_str(&format!("{:PORTS_COLUMN$}{chunk}{separator}\n", ""));
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NxosVlanOutput {
    #[serde(rename = "TABLE_vlanbrief")]
    table: NxosVlanTable,
}

#[derive(Debug, Serialize, Deserialize)]
struct NxosVlanTable {
    #[serde(rename = "ROW_vlanbrief")]
    rows: Vec<NxosVlanRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NxosVlanRow {
    #[serde(rename = "vlanshowbr-vlanid")]
    id: String,
    #[serde(rename = "vlanshowbr-vlanname")]
    name: String,
    #[serde(rename = "vlanshowbr-vlanstate")]
    state: String,
    #[serde(rename = "vlanshowplist-ifidx", skip_serializing_if = "Option::is_none")]
    ports: Option<String>,
}

/// Render NX-OS `show vlan | json`. Ports are comma-joined into `ifidx` the way
/// the device reports them.
pub fn render_nxos_json(state: &SwitchState) -> String {
    let rows = state
        .vlans
        .iter()
        .map(|vlan| NxosVlanRow {
            id: vlan.id.clone(),
            name: vlan.name.clone(),
            state: vlan.state.clone(),
            ports: (!vlan.ports.is_empty()).then(|| vlan.ports.join(",")),
        })
        .collect();
    let output = NxosVlanOutput {
        table: NxosVlanTable { rows },
    };
    // Plain derived structs never fail to serialize.
    let mut json = serde_json::to_string_pretty(&output).unwrap_or_default();
    json.push('\n');
    json
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> SwitchState {
        let mut state = SwitchState::new("leaf").with_vlan(1, "default");
        state.vlans[0].ports = ["Gi0/1", "Gi0/2", "Gi0/3", "Gi0/4"]
            .into_iter()
            .map(String::from)
            .collect();
        state.with_vlan(11, "users")
    }

    #[test]
    fn ios_wraps_ports_onto_continuation_lines() {
        let out = render_ios(&leaf());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[3],
            "1    default                          active    Gi0/1, Gi0/2, Gi0/3,"
        );
        assert_eq!(lines[4], format!("{:48}Gi0/4", ""));
        assert_eq!(
            lines[5],
            "11   users                            active"
        );
        assert_eq!(lines[6], "");
    }

    #[test]
    fn nxos_json_omits_empty_port_lists() {
        let out = render_nxos_json(&leaf());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let rows = value["TABLE_vlanbrief"]["ROW_vlanbrief"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["vlanshowplist-ifidx"], "Gi0/1,Gi0/2,Gi0/3,Gi0/4");
        assert!(rows[1].get("vlanshowplist-ifidx").is_none());
        assert_eq!(rows[1]["vlanshowbr-vlanid"], "11");
    }
}
