//! Scripted conformance probe: a fixed sequence of requests, each checked
//! against a minimal structural contract.

use crate::error::SessionError;
use crate::mcp::contracts::{DEFAULT_STEP_TIMEOUT, METHOD_INITIALIZED};
use crate::mcp::{Message, Request, errors};
use crate::session::{ProcessSession, ServerCommand};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod steps;

/// Checks a response and returns a short detail, or the reason it failed.
pub type Validator = fn(&Message) -> Result<String, String>;

#[derive(Clone)]
pub struct ProbeStep {
    pub label: &'static str,
    pub method: &'static str,
    pub params: Option<Value>,
    /// A failed handshake step aborts the remaining sequence.
    pub handshake: bool,
    pub validate: Validator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub label: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    pub detail: String,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    pub fn passed(&self) -> bool {
        self.status == StepStatus::Passed
    }

    fn skipped(step: &ProbeStep, reason: &str) -> Self {
        Self {
            label: step.label.to_string(),
            method: step.method.to_string(),
            id: None,
            status: StepStatus::Skipped,
            error: None,
            detail: reason.to_string(),
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub server: String,
    pub results: Vec<ProbeResult>,
}

impl ProbeReport {
    /// True only when every step ran and passed.
    pub fn all_passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(ProbeResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|result| !result.passed())
    }
}

pub struct ProtocolProbe {
    steps: Vec<ProbeStep>,
    timeout: Duration,
}

impl Default for ProtocolProbe {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_TIMEOUT)
    }
}

impl ProtocolProbe {
    /// The standard seven-step script with the given per-step timeout.
    pub fn new(timeout: Duration) -> Self {
        Self::with_steps(steps::standard_steps(), timeout)
    }

    pub fn with_steps(steps: Vec<ProbeStep>, timeout: Duration) -> Self {
        Self { steps, timeout }
    }

    pub fn steps(&self) -> &[ProbeStep] {
        &self.steps
    }

    /// Spawns the server, runs the script, and always terminates the server.
    ///
    /// Only a spawn failure is returned as an error; every other failure is
    /// recorded in the report.
    pub fn run(&self, command: &ServerCommand) -> Result<ProbeReport, SessionError> {
        let mut session = ProcessSession::spawn(command)?;
        let mut report = self.run_session(&mut session);
        report.server = command.display();
        let exit = session.close();
        if !report.all_passed() && !exit.stderr.is_empty() {
            debug!(stderr = ?exit.stderr, "server stderr after failed probe");
        }
        Ok(report)
    }

    /// Runs the script over an already spawned session.
    pub fn run_session(&self, session: &mut ProcessSession) -> ProbeReport {
        let mut results = Vec::with_capacity(self.steps.len());
        let mut next_id: u64 = 1;
        let mut aborted: Option<String> = None;

        for step in &self.steps {
            if let Some(reason) = &aborted {
                results.push(ProbeResult::skipped(step, reason));
                continue;
            }

            let id = next_id;
            next_id += 1;
            let result = self.run_step(session, step, id);
            info!(
                step = step.label,
                id,
                passed = result.passed(),
                detail = %result.detail,
                "probe step finished"
            );

            if step.handshake {
                if result.passed() {
                    let initialized = Request::notification(METHOD_INITIALIZED, None);
                    if let Err(err) = session.send(&initialized) {
                        warn!(error = %err, "failed to send initialized notification");
                    }
                } else {
                    aborted = Some(format!("not run: {} failed", step.label));
                }
            }
            results.push(result);
        }

        ProbeReport {
            server: session.program().to_string(),
            results,
        }
    }

    fn run_step(&self, session: &mut ProcessSession, step: &ProbeStep, id: u64) -> ProbeResult {
        let request = Request::new(id, step.method, step.params.clone());
        let started = Instant::now();
        let outcome = session
            .call(&request, self.timeout)
            .map_err(|err| (err.kind(), err.to_string()))
            .and_then(|message| {
                (step.validate)(&message).map_err(|reason| (errors::VALIDATION_FAILED, reason))
            });
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, error, detail) = match outcome {
            Ok(detail) => (StepStatus::Passed, None, detail),
            Err((kind, detail)) => (StepStatus::Failed, Some(kind), detail),
        };
        ProbeResult {
            label: step.label.to_string(),
            method: step.method.to_string(),
            id: Some(id),
            status,
            error,
            detail,
            elapsed_ms,
        }
    }
}
