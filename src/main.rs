use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mcp_verify::config::DEFAULT_SERVER_KEY;
use mcp_verify::mcp::contracts::DEFAULT_STEP_TIMEOUT;
use mcp_verify::report::{self, VerificationReport};
use mcp_verify::{ConfigAuditor, ProtocolProbe, ServerCommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-verify")]
#[command(
    version,
    about = "Verify MCP server configuration and stdio protocol conformance"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_STEP_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
}

impl Default for OutputArgs {
    fn default() -> Self {
        Self {
            json: false,
            timeout_ms: DEFAULT_STEP_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Args, Clone, Default)]
struct AuditArgs {
    /// Path to the server descriptor (defaults to ~/.claude-code/mcp_servers.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Server entry to audit
    #[arg(long, default_value = DEFAULT_SERVER_KEY)]
    server: Option<String>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Clone)]
struct ProbeArgs {
    #[command(flatten)]
    output: OutputArgs,
    /// Server executable to probe
    command: PathBuf,
    /// Arguments passed to the server
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit the descriptor, then probe the configured server (default)
    Verify(AuditArgs),
    /// Audit the descriptor and handshake only
    Audit(AuditArgs),
    /// Run the protocol probe against a server command
    Probe(ProbeArgs),
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Verify(AuditArgs::default()));
    let (report, output) = match command {
        Commands::Verify(args) => (run_verify(&args, true), args.output),
        Commands::Audit(args) => (run_verify(&args, false), args.output),
        Commands::Probe(args) => (run_probe(&args), args.output),
    };

    print_report(&report, output.json)?;
    if !report.passed {
        process::exit(report.exit_code());
    }
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcp_verify=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_auditor(args: &AuditArgs) -> ConfigAuditor {
    let mut auditor = ConfigAuditor::new()
        .with_handshake_timeout(Duration::from_millis(args.output.timeout_ms));
    if let Some(path) = &args.config {
        auditor = auditor.with_config_path(path);
    }
    if let Some(key) = &args.server {
        auditor = auditor.with_server_key(key);
    }
    auditor
}

fn run_verify(args: &AuditArgs, probe: bool) -> VerificationReport {
    let audit = build_auditor(args).run();
    info!(result = ?audit.result(), "audit finished");

    if !probe {
        return VerificationReport::new(Some(audit), None, None);
    }
    let Some(command) = audit.runnable_command() else {
        return VerificationReport::new(
            Some(audit),
            None,
            Some("the audit did not resolve a runnable server".to_string()),
        );
    };
    let timeout = Duration::from_millis(args.output.timeout_ms);
    match ProtocolProbe::new(timeout).run(&command) {
        Ok(probe) => VerificationReport::new(Some(audit), Some(probe), None),
        Err(err) => VerificationReport::new(Some(audit), None, Some(err.to_string())),
    }
}

fn run_probe(args: &ProbeArgs) -> VerificationReport {
    let command = ServerCommand::new(&args.command).with_args(args.args.iter().cloned());
    let timeout = Duration::from_millis(args.output.timeout_ms);
    match ProtocolProbe::new(timeout).run(&command) {
        Ok(probe) => VerificationReport::new(None, Some(probe), None),
        Err(err) => VerificationReport::new(None, None, Some(err.to_string())),
    }
}

fn print_report(report: &VerificationReport, json_output: bool) -> Result<()> {
    if json_output {
        let output =
            serde_json::to_string_pretty(report).context("failed to serialize report")?;
        println!("{output}");
        return Ok(());
    }
    print!("{}", report::render(report));
    Ok(())
}
