use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use vlan_verify::fixtures::Fixture;

fn lab_testbed() -> PathBuf {
    Fixture::path("lab/testbed.yaml")
        .expect("fixture path")
        .into_std_path_buf()
}

fn vlan_verify_with_env(args: &[&str], env: &[(&str, &str)]) -> Output {
    let workdir = tempfile::tempdir().expect("tempdir");
    Command::new(PathBuf::from(env!("CARGO_BIN_EXE_vlan-verify")))
        .args(args)
        .current_dir(workdir.path())
        .env("RUST_LOG", "warn")
        .envs(env.iter().copied())
        .output()
        .expect("run vlan-verify")
}

fn vlan_verify(args: &[&str]) -> Output {
    vlan_verify_with_env(args, &[])
}

fn run_lab(args: &[&str]) -> Output {
    let testbed = lab_testbed();
    let mut full = vec!["run", "--testbed", testbed.to_str().expect("utf-8 path")];
    full.extend_from_slice(args);
    vlan_verify(&full)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn passing_run_exits_zero_and_prints_summary() {
    let output = run_lab(&["--device", "sic_leaf1", "--targets-only", "11", "12", "13"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout(&output);
    assert!(stdout.contains("sic_leaf1  PASSED"), "{stdout}");
    assert!(stdout.contains("overall: PASSED"));
}

#[test]
fn unreachable_device_in_common_setup_exits_three() {
    let output = run_lab(&["--device", "sic_leaf1"]);
    assert_eq!(output.status.code(), Some(3));
    let stdout = stdout(&output);
    assert!(stdout.contains("sic_leaf1  PASSED"), "{stdout}");
    assert!(
        stdout.contains("common setup: Failed to connect to device sic_leaf4"),
        "{stdout}"
    );
    assert!(stdout.contains("overall: ERRORED"));
}

#[test]
fn missing_vlans_exit_one() {
    let output = run_lab(&["--device", "sic_leaf2", "--targets-only"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Missing VLANs: [12]"));
}

#[test]
fn unknown_device_exits_three() {
    let output = run_lab(&["--device", "sic_leaf9", "--targets-only"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stdout(&output).contains("Device 'sic_leaf9' not found in the testbed."));
}

#[test]
fn non_numeric_vlan_argument_is_a_usage_error() {
    let output = run_lab(&["--device", "sic_leaf1", "eleven"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn report_flag_writes_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = dir.path().join("report.json");
    let output = run_lab(&[
        "--device",
        "sic_leaf1",
        "--targets-only",
        "--report",
        report.to_str().expect("utf-8 path"),
    ]);
    assert_eq!(output.status.code(), Some(0));
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("report written"))
            .expect("report json");
    assert_eq!(value["result"], "passed");
}

#[test]
fn malformed_policy_can_come_from_the_environment() {
    let testbed = lab_testbed();
    let args = [
        "run",
        "--testbed",
        testbed.to_str().expect("utf-8 path"),
        "--device",
        "sic_leaf3",
        "--targets-only",
    ];
    assert_eq!(vlan_verify(&args).status.code(), Some(3));

    let output = vlan_verify_with_env(&args, &[("VLAN_VERIFY_RUN__MALFORMED", "skip")]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));

    // The command line still wins over the environment.
    let mut strict = args.to_vec();
    strict.extend(["--malformed", "fail"]);
    let output = vlan_verify_with_env(&strict, &[("VLAN_VERIFY_RUN__MALFORMED", "skip")]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn testbed_list_prints_each_device() {
    let testbed = lab_testbed();
    let output = vlan_verify(&["testbed", "list", "--testbed", testbed.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "sic_leaf1\tios\tfixture",
            "sic_leaf2\tnxos\tfixture",
            "sic_leaf3\tios\tfixture",
            "sic_leaf4\tios\tfixture",
        ]
    );
}

#[test]
fn testbed_validate_accepts_the_lab() {
    let testbed = lab_testbed();
    let output = vlan_verify(&[
        "testbed",
        "validate",
        "--testbed",
        testbed.to_str().expect("utf-8 path"),
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("4 device(s) valid"));
}

fn write_testbed(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("testbed.yaml");
    std::fs::write(&path, body).expect("write testbed");
    path
}

#[test]
fn testbed_validate_rejects_devices_without_cli_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_testbed(
        dir.path(),
        r#"
devices:
  good:
    connections:
      cli: { protocol: ssh, ip: 192.0.2.1 }
  bad:
    connections:
      cli: { protocol: ssh }
"#,
    );
    let output = vlan_verify(&["testbed", "validate", "--testbed", path.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(3));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("1 device(s)"),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn parse_prints_the_canonical_table() {
    let file = Fixture::path("lab/show_vlan/sic_leaf3_malformed.txt").expect("fixture path");
    let file = file.as_str();

    let strict = vlan_verify(&["parse", file]);
    assert_eq!(strict.status.code(), Some(3));

    let output = vlan_verify(&["parse", file, "--malformed", "skip"]);
    assert_eq!(output.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("parse json");
    let ids: Vec<u64> = value["vlans"]
        .as_array()
        .expect("vlans array")
        .iter()
        .filter_map(|record| record["id"].as_u64())
        .collect();
    assert_eq!(ids, vec![1, 11, 12, 13]);
    assert_eq!(value["skipped"][0]["value"], "VLAN0014");
}
