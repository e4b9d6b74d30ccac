//! Rendering of audit and probe outcomes. Nothing here affects the verdict.

use crate::audit::{AuditReport, CheckStatus};
use crate::probe::{ProbeReport, StepStatus};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeReport>,
    /// Why the probe did not run, when it was requested but impossible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
    pub passed: bool,
}

impl VerificationReport {
    /// Builds the report and decides the verdict.
    ///
    /// Audit failures, a probe that could not run, and probe step failures
    /// all count as hard failures.
    pub fn new(
        audit: Option<AuditReport>,
        probe: Option<ProbeReport>,
        probe_error: Option<String>,
    ) -> Self {
        let audit_ok = audit.as_ref().is_none_or(AuditReport::passed);
        let probe_ok = probe.as_ref().is_none_or(ProbeReport::all_passed);
        let passed = audit_ok && probe_ok && probe_error.is_none();
        Self {
            audit,
            probe,
            probe_error,
            passed,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed { 0 } else { 1 }
    }
}

fn check_tag(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::SoftPass => "WARN",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Skipped => "SKIP",
    }
}

fn step_tag(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Passed => "PASS",
        StepStatus::Failed => "FAIL",
        StepStatus::Skipped => "SKIP",
    }
}

pub fn render_audit(report: &AuditReport, out: &mut String) {
    let location = report
        .config_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<no home directory>".to_string());
    let _ = writeln!(out, "Configuration audit ({location}, server '{}')", report.server_key);
    for check in &report.checks {
        let _ = writeln!(
            out,
            "  [{}] {}: {}",
            check_tag(check.status),
            check.name,
            check.message
        );
    }
}

pub fn render_probe(report: &ProbeReport, out: &mut String) {
    let _ = writeln!(out, "Protocol probe ({})", report.server);
    for (index, result) in report.results.iter().enumerate() {
        let _ = write!(
            out,
            "  {}. [{}] {}: {}",
            index + 1,
            step_tag(result.status),
            result.label,
            result.detail
        );
        if result.status != StepStatus::Skipped {
            let _ = write!(out, " ({}ms)", result.elapsed_ms);
        }
        out.push('\n');
    }
}

pub fn render(report: &VerificationReport) -> String {
    let mut out = String::new();
    if let Some(audit) = &report.audit {
        render_audit(audit, &mut out);
        out.push('\n');
    }
    if let Some(probe) = &report.probe {
        render_probe(probe, &mut out);
        out.push('\n');
    }
    if let Some(reason) = &report.probe_error {
        let _ = writeln!(out, "Protocol probe not run: {reason}\n");
    }
    if report.passed {
        out.push_str("All checks passed.\n");
    } else {
        out.push_str("Issues found. Fix the failures above and run again.\n");
    }
    out
}
