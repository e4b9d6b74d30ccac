//! Deployment descriptor audit.
//!
//! Walks a fixed list of checks, from locating the descriptor to a single
//! `initialize` handshake with the configured executable. Every check is
//! reported on its own; once one fails, the checks that depend on it are
//! recorded as skipped and nothing is spawned.

use crate::config::{self, DEFAULT_SERVER_KEY, ServerConfig};
use crate::error::{AuditError, SessionError};
use crate::mcp::contracts::{DEFAULT_HANDSHAKE_TIMEOUT, METHOD_INITIALIZE, initialize_params};
use crate::mcp::Request;
use crate::session::{ProcessSession, ServerCommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CHECK_CONFIG_FILE: &str = "config file";
pub const CHECK_CONFIG_JSON: &str = "config json";
pub const CHECK_SERVER_ENTRY: &str = "server entry";
pub const CHECK_COMMAND: &str = "command";
pub const CHECK_EXECUTABLE_EXISTS: &str = "executable exists";
pub const CHECK_EXECUTABLE_PERMISSION: &str = "executable permission";
pub const CHECK_HANDSHAKE: &str = "handshake";

const CHECK_ORDER: [&str; 7] = [
    CHECK_CONFIG_FILE,
    CHECK_CONFIG_JSON,
    CHECK_SERVER_ENTRY,
    CHECK_COMMAND,
    CHECK_EXECUTABLE_EXISTS,
    CHECK_EXECUTABLE_PERMISSION,
    CHECK_HANDSHAKE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    /// Accepted but not conclusive, e.g. a server still waiting for input.
    SoftPass,
    Fail,
    Skipped,
}

impl CheckStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, CheckStatus::Pass | CheckStatus::SoftPass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    pub message: String,
}

/// Aggregate consumed by the exit-code decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditResult {
    pub config_ok: bool,
    pub server_ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub config_path: Option<PathBuf>,
    pub server_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
    pub checks: Vec<AuditCheck>,
}

impl AuditReport {
    pub fn check(&self, name: &str) -> Option<&AuditCheck> {
        self.checks.iter().find(|check| check.name == name)
    }

    /// Descriptor and executable checks.
    pub fn config_ok(&self) -> bool {
        self.checks
            .iter()
            .filter(|check| check.name != CHECK_HANDSHAKE)
            .all(|check| check.status.is_ok())
    }

    /// Handshake check.
    pub fn server_ok(&self) -> bool {
        self.check(CHECK_HANDSHAKE)
            .is_some_and(|check| check.status.is_ok())
    }

    pub fn result(&self) -> AuditResult {
        AuditResult {
            config_ok: self.config_ok(),
            server_ok: self.server_ok(),
        }
    }

    pub fn passed(&self) -> bool {
        self.config_ok() && self.server_ok()
    }

    /// Error kind of the first failed check.
    pub fn first_failure(&self) -> Option<&'static str> {
        self.checks
            .iter()
            .find(|check| check.status == CheckStatus::Fail)
            .and_then(|check| check.error)
    }

    /// The configured server, once it is known to exist and be executable.
    pub fn runnable_command(&self) -> Option<ServerCommand> {
        let permitted = self
            .check(CHECK_EXECUTABLE_PERMISSION)
            .is_some_and(|check| check.status == CheckStatus::Pass);
        if !permitted {
            return None;
        }
        self.server.as_ref().map(ServerConfig::to_command)
    }
}

/// Records checks in order and fills in skipped ones when a check fails.
struct Checks {
    checks: Vec<AuditCheck>,
}

impl Checks {
    fn new() -> Self {
        Self {
            checks: Vec::with_capacity(CHECK_ORDER.len()),
        }
    }

    fn pass(&mut self, name: &'static str, message: impl Into<String>) {
        self.push(name, CheckStatus::Pass, None, message.into());
    }

    fn soft_pass(&mut self, name: &'static str, message: impl Into<String>) {
        self.push(name, CheckStatus::SoftPass, None, message.into());
    }

    fn fail(&mut self, name: &'static str, err: &AuditError) {
        self.push(name, CheckStatus::Fail, Some(err.kind()), err.to_string());
    }

    fn push(
        &mut self,
        name: &'static str,
        status: CheckStatus,
        error: Option<&'static str>,
        message: String,
    ) {
        info!(check = name, ?status, message = %message, "audit check");
        self.checks.push(AuditCheck {
            name,
            status,
            error,
            message,
        });
    }

    fn finish(mut self) -> Vec<AuditCheck> {
        let blocked_by = self
            .checks
            .iter()
            .find(|check| check.status == CheckStatus::Fail)
            .map(|check| check.name);
        for &name in CHECK_ORDER.iter().skip(self.checks.len()) {
            let message = match blocked_by {
                Some(failed) => format!("not checked: {failed} failed"),
                None => "not checked".to_string(),
            };
            self.checks.push(AuditCheck {
                name,
                status: CheckStatus::Skipped,
                error: None,
                message,
            });
        }
        self.checks
    }
}

pub struct ConfigAuditor {
    config_path: Option<PathBuf>,
    server_key: String,
    handshake_timeout: Duration,
}

impl Default for ConfigAuditor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigAuditor {
    /// Audits the default descriptor location and server key.
    pub fn new() -> Self {
        Self {
            config_path: config::default_config_path(),
            server_key: DEFAULT_SERVER_KEY.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_server_key(mut self, key: impl Into<String>) -> Self {
        self.server_key = key.into();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn run(&self) -> AuditReport {
        let mut checks = Checks::new();
        let server = self.run_checks(&mut checks);
        AuditReport {
            config_path: self.config_path.clone(),
            server_key: self.server_key.clone(),
            server,
            checks: checks.finish(),
        }
    }

    fn run_checks(&self, checks: &mut Checks) -> Option<ServerConfig> {
        let Some(path) = self.config_path.as_deref() else {
            let missing = PathBuf::from("~")
                .join(config::CONFIG_DIR)
                .join(config::CONFIG_FILE);
            checks.fail(CHECK_CONFIG_FILE, &AuditError::ConfigMissing(missing));
            return None;
        };
        if !path.exists() {
            checks.fail(
                CHECK_CONFIG_FILE,
                &AuditError::ConfigMissing(path.to_path_buf()),
            );
            return None;
        }
        checks.pass(CHECK_CONFIG_FILE, format!("found {}", path.display()));

        let document = match config::read_document(path) {
            Ok(document) => document,
            Err(err) => {
                checks.fail(CHECK_CONFIG_JSON, &err);
                return None;
            }
        };
        checks.pass(CHECK_CONFIG_JSON, "valid JSON");

        let entry = match config::select_entry(&document, &self.server_key) {
            Ok(entry) => entry,
            Err(err) => {
                checks.fail(CHECK_SERVER_ENTRY, &err);
                return None;
            }
        };
        checks.pass(
            CHECK_SERVER_ENTRY,
            format!("'{}' is configured", self.server_key),
        );

        let server = match config::parse_entry(&self.server_key, entry) {
            Ok(server) => server,
            Err(err) => {
                checks.fail(CHECK_COMMAND, &err);
                return None;
            }
        };
        checks.pass(CHECK_COMMAND, format!("command {}", server.command));

        let executable = server.command_path();
        if let Err(err) = check_exists(executable) {
            checks.fail(CHECK_EXECUTABLE_EXISTS, &err);
            return Some(server);
        }
        checks.pass(
            CHECK_EXECUTABLE_EXISTS,
            format!("{} exists", executable.display()),
        );

        if let Err(err) = check_executable(executable) {
            checks.fail(CHECK_EXECUTABLE_PERMISSION, &err);
            return Some(server);
        }
        checks.pass(
            CHECK_EXECUTABLE_PERMISSION,
            format!("{} is executable", executable.display()),
        );

        match handshake(&server.to_command(), self.handshake_timeout) {
            Ok(Handshake::Responded(detail)) => checks.pass(CHECK_HANDSHAKE, detail),
            Ok(Handshake::StillListening) => checks.soft_pass(
                CHECK_HANDSHAKE,
                format!(
                    "no response within {}ms; server may be waiting for more input",
                    self.handshake_timeout.as_millis()
                ),
            ),
            Err(err) => checks.fail(CHECK_HANDSHAKE, &err),
        }
        Some(server)
    }
}

fn check_exists(path: &Path) -> Result<(), AuditError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AuditError::ExecutableMissing(path.to_path_buf()))
    }
}

#[cfg(unix)]
fn check_executable(path: &Path) -> Result<(), AuditError> {
    use std::os::unix::fs::PermissionsExt;

    let runnable = fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false);
    if runnable {
        Ok(())
    } else {
        Err(AuditError::ExecutableNotRunnable(path.to_path_buf()))
    }
}

#[cfg(not(unix))]
fn check_executable(path: &Path) -> Result<(), AuditError> {
    let runnable = fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    if runnable {
        Ok(())
    } else {
        Err(AuditError::ExecutableNotRunnable(path.to_path_buf()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Responded(String),
    /// Timed out: the server may legitimately be waiting for more input.
    StillListening,
}

/// Sends one `initialize` request and waits briefly for an answer.
pub fn handshake(command: &ServerCommand, timeout: Duration) -> Result<Handshake, AuditError> {
    let mut session = ProcessSession::spawn(command)
        .map_err(|err| AuditError::ServerUnresponsive(err.to_string()))?;
    let request = Request::new(1, METHOD_INITIALIZE, Some(initialize_params()));
    let outcome = session.call(&request, timeout);
    let exit = session.close();
    debug!(status = ?exit.status, stderr = ?exit.stderr, "handshake session closed");

    match outcome {
        Ok(message) => {
            if let Some(summary) = message.error_summary() {
                return Err(AuditError::ServerUnresponsive(format!(
                    "initialize returned error {summary}"
                )));
            }
            if message.result.is_none() {
                return Err(AuditError::ServerUnresponsive(
                    "initialize response has no result".to_string(),
                ));
            }
            Ok(Handshake::Responded(
                "server starts and answers initialize".to_string(),
            ))
        }
        Err(err) if err.is_timeout() => Ok(Handshake::StillListening),
        Err(SessionError::EmptyResponse) => {
            let mut reason = "server exited without responding".to_string();
            if let Some(status) = exit.status {
                reason.push_str(&format!(" ({status})"));
            }
            if let Some(last) = exit.stderr.last() {
                reason.push_str(&format!("; stderr: {last}"));
            }
            Err(AuditError::ServerUnresponsive(reason))
        }
        Err(err) => Err(AuditError::ServerUnresponsive(err.to_string())),
    }
}
