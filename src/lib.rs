//! Conformance and deployment checks for MCP servers speaking JSON-RPC over stdio.

pub mod audit;
pub mod config;
pub mod error;
pub mod mcp;
pub mod probe;
pub mod report;
pub mod session;

pub use audit::{AuditReport, AuditResult, ConfigAuditor};
pub use error::{AuditError, SessionError};
pub use probe::{ProbeReport, ProbeResult, ProtocolProbe};
pub use session::{ProcessSession, ServerCommand};
