//! Purpose: Run the golden fixture suite against the C ABI and report failures.
//! Exports: None (binary entry point).
//! Role: Reference runner for `<suite>/inputs/*.tyco` vs `<suite>/expected/*.json`.
//! Invariants: Every fixture is checked; any failure makes the process exit 1.
//! Notes: Suite root comes from the argument, then `TYCO_TEST_SUITE_DIR`, then the in-repo suite.

use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tyco::golden::{self, SuiteReport};

const SUITE_DIR_ENV: &str = "TYCO_TEST_SUITE_DIR";
const DEFAULT_SUITE_DIR: &str = "tests/fixtures/suite";

fn main() {
    init_tracing();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool, String> {
    let mut json = false;
    let mut suite = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                println!("usage: tyco-conformance [--json] [SUITE_DIR]");
                return Ok(true);
            }
            _ if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            _ if suite.is_none() => suite = Some(PathBuf::from(arg)),
            _ => return Err("unexpected extra arguments".to_string()),
        }
    }

    let suite = suite
        .or_else(|| env::var_os(SUITE_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SUITE_DIR));
    let report = golden::run_suite(&suite).map_err(|err| err.to_string())?;

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|err| format!("failed to encode report: {err}"))?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(report.is_success())
}

fn print_report(report: &SuiteReport) {
    for fixture in &report.fixtures {
        if fixture.passed {
            continue;
        }
        println!("FAIL {} ({})", fixture.name, fixture.outcome);
        if let Some(detail) = &fixture.detail {
            for line in detail.lines() {
                println!("    {line}");
            }
        }
    }
    println!(
        "{}/{} fixtures passed in {}",
        report.passed, report.total, report.suite
    );
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
