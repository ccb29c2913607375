use std::{fs, process::ExitCode};

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};

use vlan_verify::{
    config::{AppConfig, CliOverrides, load_config},
    device::TestbedConnector,
    lifecycle,
    parse_show_vlan,
    report::EXIT_SETUP_DEFECT,
    testbed::Testbed,
    vlan::{ExpectedVlans, MalformedPolicy, VlanId, VlanTable},
};

#[derive(Parser, Debug)]
#[command(
    name = "vlan-verify",
    version,
    about = "Verify that expected VLANs exist on testbed switches"
)]
struct Cli {
    /// Path to the configuration file (defaults to config/vlan-verify.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, run `show vlan`, and check the expected VLANs on each target device
    Run(RunArgs),
    /// Inspect the testbed inventory
    Testbed {
        #[command(subcommand)]
        command: TestbedCommand,
    },
    /// Adapt a saved `show vlan` output and print the canonical VLAN table
    Parse(ParseArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Expected VLAN ids (defaults to the configured list, 11 12 13 out of the box)
    #[arg(value_name = "VLAN_ID")]
    vlans: Vec<VlanId>,
    /// Testbed YAML file
    #[arg(long, value_name = "PATH")]
    testbed: Option<Utf8PathBuf>,
    /// Device to verify; repeat for several (defaults to sic_leaf1)
    #[arg(long = "device", value_name = "NAME")]
    devices: Vec<String>,
    /// What to do with VLAN entries whose id is not a number
    #[arg(long, value_enum)]
    malformed: Option<MalformedPolicy>,
    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    report: Option<Utf8PathBuf>,
    /// Only connect to the target devices during common setup
    #[arg(long)]
    targets_only: bool,
}

#[derive(Subcommand, Debug)]
enum TestbedCommand {
    /// List devices with their os and cli protocol
    List(TestbedArgs),
    /// Check every device has a usable cli connection
    Validate(TestbedArgs),
}

#[derive(Args, Debug)]
struct TestbedArgs {
    #[arg(long, value_name = "PATH")]
    testbed: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// File holding raw `show vlan` output (CLI text or JSON)
    file: Utf8PathBuf,
    #[arg(long, value_enum, default_value_t = MalformedPolicy::Fail)]
    malformed: MalformedPolicy,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_SETUP_DEFECT)
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => run(config, args),
        Command::Testbed { command } => handle_testbed(config, command),
        Command::Parse(args) => parse(args),
    }
}

fn run(config: AppConfig, args: RunArgs) -> Result<ExitCode> {
    let overrides = CliOverrides {
        testbed: args.testbed,
        expected_vlans: (!args.vlans.is_empty()).then(|| ExpectedVlans::new(args.vlans)),
        targets: args.devices,
        malformed: args.malformed,
        targets_only: args.targets_only,
        report: args.report,
    };
    let config = config.apply(overrides);
    let testbed = Testbed::load(&config.testbed)
        .with_context(|| format!("failed to load testbed {}", config.testbed))?;
    info!(
        testbed = %config.testbed,
        devices = testbed.devices.len(),
        "testbed loaded"
    );

    let connector = TestbedConnector::new(config.ssh.clone());
    let report = lifecycle::run(&testbed, &connector, &config.run_plan());

    print!("{}", report.summary());
    if let Some(path) = &config.run.report {
        report.write_json(path)?;
        info!(path = %path, "run report written");
    }
    Ok(report.exit_code())
}

fn handle_testbed(config: AppConfig, command: TestbedCommand) -> Result<ExitCode> {
    match command {
        TestbedCommand::List(args) => {
            let path = args.testbed.unwrap_or(config.testbed);
            let testbed = Testbed::load(&path)?;
            for device in testbed.devices() {
                let protocol = testbed
                    .endpoint(device)
                    .map(|endpoint| endpoint.protocol().to_string())
                    .unwrap_or_else(|_| "-".into());
                println!(
                    "{}\t{}\t{}",
                    device.name,
                    device.os.as_deref().unwrap_or("-"),
                    protocol
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        TestbedCommand::Validate(args) => {
            let path = args.testbed.unwrap_or(config.testbed);
            let testbed = Testbed::load(&path)?;
            if testbed.devices.is_empty() {
                bail!("testbed {path} defines no devices");
            }
            let mut invalid = 0;
            for device in testbed.devices() {
                match testbed.endpoint(device) {
                    Ok(endpoint) => {
                        info!(device = %device.name, protocol = endpoint.protocol(), "ok")
                    }
                    Err(err) => {
                        warn!(device = %device.name, "{err}");
                        invalid += 1;
                    }
                }
            }
            if invalid > 0 {
                bail!("{invalid} device(s) in {path} have no usable cli connection");
            }
            println!("{path}: {} device(s) valid", testbed.devices.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse(args: ParseArgs) -> Result<ExitCode> {
    let output = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file))?;
    let raw = parse_show_vlan(&output)?;
    let (table, skipped) = VlanTable::from_raw(&raw, args.malformed)?;
    let records: Vec<_> = table.records().collect();
    let rendered = json!({
        "vlans": records,
        "skipped": skipped,
    });
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
