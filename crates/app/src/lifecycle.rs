use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, warn};

use crate::adapter::parse_show_vlan;
use crate::device::{Connector, SessionGuard};
use crate::error::{DeviceError, SetupError, TestbedError};
use crate::report::{PhaseStatus, RunReport, SubsectionReport, TestcaseReport, banner};
use crate::testbed::Testbed;
use crate::vlan::{ExpectedVlans, MalformedPolicy, SkippedEntry, VlanTable, verify};

pub const DEFAULT_TARGET: &str = "sic_leaf1";
pub const SHOW_VLAN: &str = "show vlan";

/// Everything one run needs, passed in rather than read from the environment.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub targets: Vec<String>,
    pub expected: ExpectedVlans,
    pub policy: MalformedPolicy,
    /// Connect every testbed device during common setup, not just the targets.
    pub connect_all: bool,
    pub command: String,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            targets: vec![DEFAULT_TARGET.to_string()],
            expected: ExpectedVlans::default(),
            policy: MalformedPolicy::default(),
            connect_all: true,
            command: SHOW_VLAN.to_string(),
        }
    }
}

struct Sessions {
    connected: BTreeMap<String, SessionGuard>,
    failures: BTreeMap<String, DeviceError>,
}

/// Run common setup, one testcase per target, and common cleanup. Each phase reports
/// its own status; a failed phase never prevents the later ones from running.
pub fn run(testbed: &Testbed, connector: &dyn Connector, plan: &RunPlan) -> RunReport {
    let mut report = RunReport::new(testbed.name(), plan.expected.clone());
    info!(
        testbed = testbed.name(),
        expected = %plan.expected,
        targets = ?plan.targets,
        "starting VLAN verification"
    );

    let mut seen = BTreeSet::new();
    let targets: Vec<&str> = plan
        .targets
        .iter()
        .map(String::as_str)
        .filter(|target| seen.insert(*target))
        .collect();

    let mut sessions = common_setup(testbed, connector, plan, &targets, &mut report);
    for target in &targets {
        let testcase = run_testcase(testbed, connector, plan, target, &mut sessions);
        report.testcases.push(testcase);
    }

    common_cleanup(sessions, &mut report);
    report.finish();
    info!(result = report.result.label(), "VLAN verification finished");
    report
}

fn common_setup(
    testbed: &Testbed,
    connector: &dyn Connector,
    plan: &RunPlan,
    targets: &[&str],
    report: &mut RunReport,
) -> Sessions {
    let mut sessions = Sessions {
        connected: BTreeMap::new(),
        failures: BTreeMap::new(),
    };
    let devices: Vec<_> = if plan.connect_all {
        testbed.devices().collect()
    } else {
        targets
            .iter()
            .filter_map(|name| testbed.device(name).ok())
            .collect()
    };

    for device in devices {
        let connected = connector.open(testbed, device).and_then(|session| {
            let mut guard = SessionGuard::new(session);
            guard.connect().map(|()| guard)
        });
        let status = match connected {
            Ok(guard) => {
                info!("\n{}", banner(&format!("Connected to {}", device.name)));
                sessions.connected.insert(device.name.clone(), guard);
                PhaseStatus::passed()
            }
            Err(err) => {
                let message = format!("Failed to connect to device {}: {err}", device.name);
                error!(device = %device.name, "{message}");
                sessions.failures.insert(device.name.clone(), err);
                PhaseStatus::failed(message)
            }
        };
        report.common_setup.push(SubsectionReport {
            device: device.name.clone(),
            status,
        });
    }
    sessions
}

fn run_testcase(
    testbed: &Testbed,
    connector: &dyn Connector,
    plan: &RunPlan,
    target: &str,
    sessions: &mut Sessions,
) -> TestcaseReport {
    let mut testcase = TestcaseReport::new(target);
    let mut session = sessions.connected.remove(target);

    match setup(testbed, connector, plan, target, sessions, &mut session) {
        Ok((table, skipped)) => {
            info!(device = target, vlans = table.len(), "VLAN table loaded");
            testcase.setup = PhaseStatus::passed();
            testcase.vlan_count = Some(table.len());
            testcase.skipped_entries = skipped;

            let missing = verify(&plan.expected, &table);
            testcase.test = match missing.clone().into_assertion() {
                Ok(()) => {
                    info!(device = target, "all expected VLANs present");
                    PhaseStatus::passed()
                }
                Err(failure) => {
                    error!(device = target, missing = %failure.missing, "VLAN verification failed");
                    PhaseStatus::failed(failure.to_string())
                }
            };
            testcase.missing = Some(missing);
        }
        Err(err) => {
            let message = setup_message(target, &err);
            error!(device = target, "{message}");
            testcase.setup = PhaseStatus::failed(message);
            testcase.test = PhaseStatus::skipped("setup failed");
        }
    }

    testcase.cleanup = match session {
        Some(guard) => release(guard, "Failed to disconnect device"),
        None => PhaseStatus::skipped("no session to disconnect"),
    };
    testcase
}

fn setup(
    testbed: &Testbed,
    connector: &dyn Connector,
    plan: &RunPlan,
    target: &str,
    sessions: &mut Sessions,
    session: &mut Option<SessionGuard>,
) -> Result<(VlanTable, Vec<SkippedEntry>), SetupError> {
    let device = testbed.device(target)?;
    if let Some(err) = sessions.failures.remove(target) {
        return Err(err.into());
    }
    if session.is_none() {
        // Not part of common setup (e.g. `connect_all` off and added late); connect now.
        let mut guard = SessionGuard::new(connector.open(testbed, device)?);
        let connected = guard.connect();
        *session = Some(guard);
        connected?;
    }
    let guard = session.as_mut().ok_or_else(|| DeviceError::NotConnected {
        device: target.to_string(),
    })?;

    let output = guard.execute(&plan.command)?;
    let raw = parse_show_vlan(&output)?;
    Ok(VlanTable::from_raw(&raw, plan.policy)?)
}

fn setup_message(target: &str, err: &SetupError) -> String {
    match err {
        SetupError::Testbed(TestbedError::DeviceNotFound(_)) => {
            format!("Device '{target}' not found in the testbed.")
        }
        other => other.to_string(),
    }
}

fn common_cleanup(sessions: Sessions, report: &mut RunReport) {
    for (name, guard) in sessions.connected {
        let status = release(guard, &format!("Failed to disconnect device {name}"));
        report.common_cleanup.push(SubsectionReport {
            device: name,
            status,
        });
    }
}

fn release(guard: SessionGuard, context: &str) -> PhaseStatus {
    if !guard.is_connected() {
        return PhaseStatus::skipped("not connected");
    }
    let name = guard.name().to_string();
    match guard.release() {
        Ok(()) => {
            info!("\n{}", banner(&format!("Disconnected from {name}")));
            PhaseStatus::passed()
        }
        Err(err) => {
            let message = format!("{context}: {err}");
            warn!(device = %name, "{message}");
            PhaseStatus::warned(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::device::DeviceSession;
    use crate::report::{Outcome, TestResult};
    use crate::testbed::Device;

    const TESTBED: &str = r#"
devices:
  sic_leaf1:
    connections:
      cli: { protocol: fixture, commands: { "show vlan": a.txt } }
  sic_leaf2:
    connections:
      cli: { protocol: fixture, commands: { "show vlan": b.txt } }
"#;

    #[derive(Clone, Default)]
    struct Behavior {
        output: String,
        fail_connect: bool,
        fail_disconnect: bool,
    }

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
    }

    struct FakeSession {
        name: String,
        behavior: Behavior,
        connected: bool,
        log: Rc<RefCell<Log>>,
    }

    impl DeviceSession for FakeSession {
        fn name(&self) -> &str {
            &self.name
        }

        fn connect(&mut self) -> Result<(), DeviceError> {
            self.log.borrow_mut().events.push(format!("connect {}", self.name));
            if self.behavior.fail_connect {
                return Err(DeviceError::Connect {
                    device: self.name.clone(),
                    reason: "connection refused".into(),
                });
            }
            self.connected = true;
            Ok(())
        }

        fn execute(&mut self, command: &str) -> Result<String, DeviceError> {
            self.log
                .borrow_mut()
                .events
                .push(format!("execute {} {command}", self.name));
            Ok(self.behavior.output.clone())
        }

        fn disconnect(&mut self) -> Result<(), DeviceError> {
            self.log
                .borrow_mut()
                .events
                .push(format!("disconnect {}", self.name));
            self.connected = false;
            if self.behavior.fail_disconnect {
                return Err(DeviceError::Disconnect {
                    device: self.name.clone(),
                    reason: "timed out".into(),
                });
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        behaviors: HashMap<String, Behavior>,
        log: Rc<RefCell<Log>>,
    }

    impl FakeConnector {
        fn with(mut self, device: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(device.to_string(), behavior);
            self
        }

        fn events(&self) -> Vec<String> {
            self.log.borrow().events.clone()
        }
    }

    impl Connector for FakeConnector {
        fn open(
            &self,
            _testbed: &Testbed,
            device: &Device,
        ) -> Result<Box<dyn DeviceSession>, DeviceError> {
            Ok(Box::new(FakeSession {
                name: device.name.clone(),
                behavior: self.behaviors.get(&device.name).cloned().unwrap_or_default(),
                connected: false,
                log: self.log.clone(),
            }))
        }
    }

    fn output(ids: &[&str]) -> Behavior {
        let rows: Vec<String> = ids
            .iter()
            .map(|id| format!(r#""{id}": {{"vlan_id": "{id}"}}"#))
            .collect();
        Behavior {
            output: format!(r#"{{"vlans": {{{}}}}}"#, rows.join(", ")),
            ..Behavior::default()
        }
    }

    fn testbed() -> Testbed {
        Testbed::from_yaml(TESTBED, "/lab").unwrap()
    }

    #[test]
    fn passing_device_runs_all_three_phases() {
        let connector = FakeConnector::default()
            .with("sic_leaf1", output(&["10", "11", "12", "13", "14"]));
        let report = run(&testbed(), &connector, &RunPlan::default());

        let tc = report.testcase("sic_leaf1").unwrap();
        assert_eq!(tc.setup.outcome, Outcome::Passed);
        assert_eq!(tc.test.outcome, Outcome::Passed);
        assert_eq!(tc.cleanup.outcome, Outcome::Passed);
        assert_eq!(tc.vlan_count, Some(5));
        assert_eq!(report.result, TestResult::Passed);
        // Both devices connected up front; the non-target is released in common cleanup.
        assert_eq!(report.common_setup.len(), 2);
        assert_eq!(report.common_cleanup.len(), 1);
        assert_eq!(report.common_cleanup[0].device, "sic_leaf2");
    }

    #[test]
    fn missing_vlan_is_a_test_failure_not_a_defect() {
        let connector = FakeConnector::default().with("sic_leaf1", output(&["11", "13"]));
        let report = run(&testbed(), &connector, &RunPlan::default());

        let tc = report.testcase("sic_leaf1").unwrap();
        assert_eq!(tc.setup.outcome, Outcome::Passed);
        assert_eq!(tc.test.message.as_deref(), Some("Missing VLANs: [12]"));
        assert_eq!(tc.result(), TestResult::Failed);
        assert_eq!(report.result, TestResult::Failed);
    }

    #[test]
    fn unknown_device_is_a_setup_defect_and_skips_verification() {
        let connector = FakeConnector::default();
        let plan = RunPlan {
            targets: vec!["sic_leaf9".into()],
            ..RunPlan::default()
        };
        let report = run(&testbed(), &connector, &plan);

        let tc = report.testcase("sic_leaf9").unwrap();
        assert_eq!(
            tc.setup.message.as_deref(),
            Some("Device 'sic_leaf9' not found in the testbed.")
        );
        assert_eq!(tc.test.outcome, Outcome::Skipped);
        assert_eq!(tc.cleanup.outcome, Outcome::Skipped);
        assert_eq!(report.result, TestResult::Errored);
        assert!(
            !connector
                .events()
                .iter()
                .any(|e| e.starts_with("execute"))
        );
    }

    #[test]
    fn connect_failure_is_reported_and_cleanup_still_attempted_elsewhere() {
        let connector = FakeConnector::default()
            .with(
                "sic_leaf1",
                Behavior {
                    fail_connect: true,
                    ..Behavior::default()
                },
            )
            .with("sic_leaf2", output(&["11", "12", "13"]));
        let plan = RunPlan {
            targets: vec!["sic_leaf1".into(), "sic_leaf2".into()],
            ..RunPlan::default()
        };
        let report = run(&testbed(), &connector, &plan);

        let leaf1 = report.testcase("sic_leaf1").unwrap();
        assert!(leaf1.setup.is_failed());
        assert!(
            leaf1
                .setup
                .message
                .as_deref()
                .unwrap()
                .contains("connection refused")
        );
        assert_eq!(report.common_setup[0].status.outcome, Outcome::Failed);

        let leaf2 = report.testcase("sic_leaf2").unwrap();
        assert_eq!(leaf2.result(), TestResult::Passed);
        assert!(connector.events().contains(&"disconnect sic_leaf2".to_string()));
        assert_eq!(report.result, TestResult::Errored);
    }

    #[test]
    fn unreachable_non_target_still_errors_the_run() {
        let connector = FakeConnector::default()
            .with("sic_leaf1", output(&["11", "12", "13"]))
            .with(
                "sic_leaf2",
                Behavior {
                    fail_connect: true,
                    ..Behavior::default()
                },
            );
        let report = run(&testbed(), &connector, &RunPlan::default());

        assert_eq!(
            report.testcase("sic_leaf1").unwrap().result(),
            TestResult::Passed
        );
        assert_eq!(report.common_setup[1].device, "sic_leaf2");
        assert!(report.common_setup[1].status.is_failed());
        assert_eq!(report.result, TestResult::Errored);

        let plan = RunPlan {
            connect_all: false,
            ..RunPlan::default()
        };
        assert_eq!(run(&testbed(), &connector, &plan).result, TestResult::Passed);
    }

    #[test]
    fn malformed_entry_fails_setup_under_default_policy() {
        let connector = FakeConnector::default().with("sic_leaf1", output(&["11", "trunk"]));
        let report = run(&testbed(), &connector, &RunPlan::default());

        let tc = report.testcase("sic_leaf1").unwrap();
        assert!(tc.setup.is_failed());
        assert!(
            tc.setup
                .message
                .as_deref()
                .unwrap()
                .starts_with("failed to parse VLAN information")
        );
        assert_eq!(tc.test.outcome, Outcome::Skipped);
        assert_eq!(tc.cleanup.outcome, Outcome::Passed);
    }

    #[test]
    fn skip_policy_reports_dropped_entries() {
        let connector = FakeConnector::default()
            .with("sic_leaf1", output(&["11", "12", "13", "trunk"]));
        let plan = RunPlan {
            policy: MalformedPolicy::Skip,
            ..RunPlan::default()
        };
        let report = run(&testbed(), &connector, &plan);

        let tc = report.testcase("sic_leaf1").unwrap();
        assert_eq!(tc.result(), TestResult::Passed);
        assert_eq!(tc.skipped_entries.len(), 1);
        assert_eq!(tc.skipped_entries[0].key, "trunk");
    }

    #[test]
    fn cleanup_failure_is_a_warning() {
        let mut behavior = output(&["11", "12", "13"]);
        behavior.fail_disconnect = true;
        let connector = FakeConnector::default().with("sic_leaf1", behavior);
        let report = run(&testbed(), &connector, &RunPlan::default());

        let tc = report.testcase("sic_leaf1").unwrap();
        assert_eq!(tc.cleanup.outcome, Outcome::Warned);
        assert_eq!(report.result, TestResult::Passed);
    }

    #[test]
    fn targets_only_connects_just_the_targets_and_dedupes() {
        let connector = FakeConnector::default().with("sic_leaf1", output(&["11", "12", "13"]));
        let plan = RunPlan {
            targets: vec!["sic_leaf1".into(), "sic_leaf1".into()],
            connect_all: false,
            ..RunPlan::default()
        };
        let report = run(&testbed(), &connector, &plan);

        assert_eq!(report.testcases.len(), 1);
        assert_eq!(report.common_setup.len(), 1);
        assert_eq!(
            connector.events(),
            vec![
                "connect sic_leaf1",
                "execute sic_leaf1 show vlan",
                "disconnect sic_leaf1"
            ]
        );
    }
}
