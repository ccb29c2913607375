use vlan_verify::{
    ExpectedVlans, MalformedPolicy,
    config::{AppConfig, CliOverrides, load_config},
    fixtures::Fixture,
};

#[test]
fn config_file_then_cli_precedence() -> anyhow::Result<()> {
    let path = Fixture::path("config/precedence.toml")?;

    // Phase 1: the file replaces defaults it names and keeps the rest.
    let config = load_config(Some(&path))?;
    let defaults = AppConfig::default();
    assert_eq!(config.testbed, "labs/precedence.yaml");
    assert_eq!(config.run.expected_vlans, ExpectedVlans::from_args(["21", "22"])?);
    assert_eq!(config.run.targets, vec!["sic_leaf2".to_string()]);
    assert_eq!(config.run.malformed, MalformedPolicy::Skip);
    assert_eq!(config.run.command, defaults.run.command);
    assert_eq!(config.ssh.connect_timeout_secs, defaults.ssh.connect_timeout_secs);

    // Phase 2: CLI values win; absent CLI values leave the file's alone.
    let config = config.apply(CliOverrides {
        expected_vlans: Some(ExpectedVlans::from_args(["11"])?),
        malformed: Some(MalformedPolicy::Fail),
        ..CliOverrides::default()
    });
    let plan = config.run_plan();
    assert_eq!(plan.expected, ExpectedVlans::from_args(["11"])?);
    assert_eq!(plan.policy, MalformedPolicy::Fail);
    assert_eq!(plan.targets, vec!["sic_leaf2".to_string()]);
    assert!(plan.connect_all);
    Ok(())
}
