use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::vlan::{ExpectedVlans, MissingVlans, SkippedEntry};

const BANNER_WIDTH: usize = 78;

pub const EXIT_PASSED: u8 = 0;
pub const EXIT_VERIFICATION_FAILED: u8 = 1;
pub const EXIT_SETUP_DEFECT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Warned,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStatus {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PhaseStatus {
    pub fn passed() -> Self {
        Self {
            outcome: Outcome::Passed,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            message: Some(message.into()),
        }
    }

    pub fn warned(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Warned,
            message: Some(message.into()),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Skipped,
            message: Some(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Final verdict for one testcase or the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Passed,
    /// VLANs are missing on a reachable device.
    Failed,
    /// Setup could not obtain a VLAN table.
    Errored,
}

impl TestResult {
    pub fn label(self) -> &'static str {
        match self {
            TestResult::Passed => "PASSED",
            TestResult::Failed => "FAILED",
            TestResult::Errored => "ERRORED",
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            TestResult::Passed => EXIT_PASSED,
            TestResult::Failed => EXIT_VERIFICATION_FAILED,
            TestResult::Errored => EXIT_SETUP_DEFECT,
        }
    }
}

/// One common setup/cleanup subsection, per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsectionReport {
    pub device: String,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestcaseReport {
    pub device: String,
    pub setup: PhaseStatus,
    pub test: PhaseStatus,
    pub cleanup: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<MissingVlans>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_entries: Vec<SkippedEntry>,
}

impl TestcaseReport {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            setup: PhaseStatus::skipped("not run"),
            test: PhaseStatus::skipped("not run"),
            cleanup: PhaseStatus::skipped("not run"),
            vlan_count: None,
            missing: None,
            skipped_entries: Vec::new(),
        }
    }

    /// Cleanup never changes the verdict.
    pub fn result(&self) -> TestResult {
        if self.setup.is_failed() {
            TestResult::Errored
        } else if self.test.is_failed() {
            TestResult::Failed
        } else {
            TestResult::Passed
        }
    }

    fn detail(&self) -> &str {
        let status = match self.result() {
            TestResult::Errored => &self.setup,
            TestResult::Failed => &self.test,
            TestResult::Passed => return "all expected VLANs present",
        };
        status.message.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub testbed: String,
    pub expected: ExpectedVlans,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub common_setup: Vec<SubsectionReport>,
    pub testcases: Vec<TestcaseReport>,
    pub common_cleanup: Vec<SubsectionReport>,
    pub result: TestResult,
}

impl RunReport {
    pub fn new(testbed: impl Into<String>, expected: ExpectedVlans) -> Self {
        let now = Utc::now();
        Self {
            testbed: testbed.into(),
            expected,
            started_at: now,
            finished_at: now,
            common_setup: Vec::new(),
            testcases: Vec::new(),
            common_cleanup: Vec::new(),
            result: TestResult::Passed,
        }
    }

    /// Stamp the finish time and roll verdicts up: any setup defect wins, then any
    /// verification failure. A device that could not be connected during common
    /// setup is a setup defect even when it is not a target.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        let common = if self.common_setup_failures().next().is_some() {
            TestResult::Errored
        } else {
            TestResult::Passed
        };
        self.result = self
            .testcases
            .iter()
            .map(TestcaseReport::result)
            .fold(common, Ord::max);
    }

    pub fn common_setup_failures(&self) -> impl Iterator<Item = &SubsectionReport> {
        self.common_setup.iter().filter(|s| s.status.is_failed())
    }

    pub fn testcase(&self, device: &str) -> Option<&TestcaseReport> {
        self.testcases.iter().find(|tc| tc.device == device)
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.result.exit_code())
    }

    pub fn summary(&self) -> String {
        let width = self
            .testcases
            .iter()
            .map(|tc| tc.device.len())
            .max()
            .unwrap_or(0);
        let mut out = banner("Summary");
        out.push('\n');
        for tc in &self.testcases {
            out.push_str(&format!(
                "{:<width$}  {:<7}  {}\n",
                tc.device,
                tc.result().label(),
                tc.detail()
            ));
        }
        for subsection in self.common_setup_failures() {
            out.push_str(&format!(
                "common setup: {}\n",
                subsection.status.message.as_deref().unwrap_or(&subsection.device)
            ));
        }
        out.push_str(&format!("overall: {}\n", self.result.label()));
        out
    }

    pub fn write_json(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create report dir {parent}"))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, format!("{json}\n"))
            .with_context(|| format!("failed to write report {path}"))
    }
}

/// Boxed, centered heading for log output.
pub fn banner(text: &str) -> String {
    let border = format!("+{}+", "-".repeat(BANNER_WIDTH));
    let len = text.chars().count();
    let line = if len >= BANNER_WIDTH {
        format!("|{text}|")
    } else {
        let left = (BANNER_WIDTH - len) / 2;
        let right = BANNER_WIDTH - len - left;
        format!("|{}{text}{}|", " ".repeat(left), " ".repeat(right))
    };
    format!("{border}\n{line}\n{border}")
}
