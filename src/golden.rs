//! Purpose: Compare documents loaded through the C ABI against expected JSON fixtures.
//! Exports: `Fixture`, `FixtureOutcome`, `FixtureReport`, `SuiteReport`, `discover`,
//! `check_fixture`, `run_suite`.
//! Role: Shared by the conformance runner binary and the integration tests.
//! Invariants: `check_fixture` is a pure function of the two files on disk.
//! Invariants: Equality is `serde_json::Value` equality; key order and whitespace never matter.
//! Notes: Layout is `<suite>/inputs/<stem>.tyco` paired with `<suite>/expected/<stem>.json`.
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{BoundaryError, Document};
use crate::core::error::{Error, ErrorKind, Result};

pub const INPUT_DIR: &str = "inputs";
pub const EXPECTED_DIR: &str = "expected";
pub const INPUT_EXTENSION: &str = "tyco";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fixture {
    pub name: String,
    pub input: PathBuf,
    pub expected: PathBuf,
}

impl Fixture {
    pub fn new(name: impl Into<String>, input: PathBuf, expected: PathBuf) -> Self {
        Self {
            name: name.into(),
            input,
            expected,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum FixtureOutcome {
    Pass,
    LoadFailed(BoundaryError),
    SerializeFailed(BoundaryError),
    InvalidOutput(String),
    MissingExpected,
    UnreadableExpected(String),
    InvalidExpected(String),
    Mismatch { expected: Value, actual: Value },
}

impl FixtureOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, FixtureOutcome::Pass)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FixtureOutcome::Pass => "pass",
            FixtureOutcome::LoadFailed(_) => "load_failed",
            FixtureOutcome::SerializeFailed(_) => "serialize_failed",
            FixtureOutcome::InvalidOutput(_) => "invalid_output",
            FixtureOutcome::MissingExpected => "missing_expected",
            FixtureOutcome::UnreadableExpected(_) => "unreadable_expected",
            FixtureOutcome::InvalidExpected(_) => "invalid_expected",
            FixtureOutcome::Mismatch { .. } => "mismatch",
        }
    }

    /// Human-readable explanation; `None` for a pass.
    pub fn detail(&self) -> Option<String> {
        match self {
            FixtureOutcome::Pass => None,
            FixtureOutcome::LoadFailed(err) | FixtureOutcome::SerializeFailed(err) => {
                Some(err.to_string())
            }
            FixtureOutcome::InvalidOutput(message)
            | FixtureOutcome::UnreadableExpected(message)
            | FixtureOutcome::InvalidExpected(message) => Some(message.clone()),
            FixtureOutcome::MissingExpected => Some("expected file does not exist".to_string()),
            FixtureOutcome::Mismatch { expected, actual } => Some(format!(
                "expected:\n{}\nactual:\n{}",
                pretty(expected),
                pretty(actual)
            )),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FixtureReport {
    pub name: String,
    pub input: String,
    pub passed: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub fixtures: Vec<FixtureReport>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Fixtures under `suite_root`, sorted by file name.
pub fn discover(suite_root: &Path) -> Result<Vec<Fixture>> {
    let inputs = suite_root.join(INPUT_DIR);
    let entries = fs::read_dir(&inputs).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to list fixture inputs")
            .with_path(&inputs)
            .with_source(err)
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read fixture entry")
                .with_path(&inputs)
                .with_source(err)
        })?;
        let path = entry.path();
        let is_input = path.is_file()
            && path.extension().and_then(|ext| ext.to_str()) == Some(INPUT_EXTENSION);
        if is_input {
            paths.push(path);
        }
    }
    paths.sort();

    // Non-UTF-8 stems stay in the suite under a lossy name; loading them then fails.
    let expected_dir = suite_root.join(EXPECTED_DIR);
    let mut fixtures = Vec::with_capacity(paths.len());
    for input in paths {
        let Some(stem) = input.file_stem().map(OsStr::to_os_string) else {
            return Err(Error::new(ErrorKind::Io)
                .with_message("fixture input has no file stem")
                .with_path(&input));
        };
        let mut expected_name = stem.clone();
        expected_name.push(".json");
        let expected = expected_dir.join(expected_name);
        fixtures.push(Fixture::new(stem.to_string_lossy(), input, expected));
    }
    Ok(fixtures)
}

pub fn check_fixture(fixture: &Fixture) -> FixtureOutcome {
    let document = match Document::load_file(&fixture.input) {
        Ok(document) => document,
        Err(err) => return FixtureOutcome::LoadFailed(err),
    };
    let produced = match document.to_json() {
        Ok(json) => json,
        Err(err) => return FixtureOutcome::SerializeFailed(err),
    };
    drop(document);

    let actual: Value = match serde_json::from_str(&produced) {
        Ok(value) => value,
        Err(err) => return FixtureOutcome::InvalidOutput(err.to_string()),
    };
    let expected_text = match fs::read_to_string(&fixture.expected) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return FixtureOutcome::MissingExpected;
        }
        Err(err) => return FixtureOutcome::UnreadableExpected(err.to_string()),
    };
    let expected: Value = match serde_json::from_str(&expected_text) {
        Ok(value) => value,
        Err(err) => return FixtureOutcome::InvalidExpected(err.to_string()),
    };

    if expected == actual {
        FixtureOutcome::Pass
    } else {
        FixtureOutcome::Mismatch { expected, actual }
    }
}

pub fn run_suite(suite_root: &Path) -> Result<SuiteReport> {
    let fixtures = discover(suite_root)?;
    let mut reports = Vec::with_capacity(fixtures.len());
    for fixture in &fixtures {
        let outcome = check_fixture(fixture);
        debug!(fixture = %fixture.name, outcome = outcome.label(), "checked fixture");
        reports.push(FixtureReport {
            name: fixture.name.clone(),
            input: fixture.input.display().to_string(),
            passed: outcome.is_pass(),
            outcome: outcome.label(),
            detail: outcome.detail(),
        });
    }
    let passed = reports.iter().filter(|report| report.passed).count();
    Ok(SuiteReport {
        suite: suite_root.display().to_string(),
        total: reports.len(),
        passed,
        failed: reports.len() - passed,
        fixtures: reports,
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
