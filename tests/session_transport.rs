use mcp_verify::mcp::Request;
use mcp_verify::{ProcessSession, ServerCommand, SessionError};
use serde_json::json;
use std::time::{Duration, Instant};

fn reference(mode: &str) -> ServerCommand {
    ServerCommand::new(env!("CARGO_BIN_EXE_reference-server")).with_args(["--mode", mode])
}

fn initialize(id: u64) -> Request {
    Request::new(
        id,
        "initialize",
        Some(json!({"capabilities": {}, "clientInfo": {"name": "test", "version": "0.0.0"}})),
    )
}

#[test]
fn initialize_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("normal"))?;
    let response = session.call(&initialize(1), Duration::from_secs(5))?;

    assert_eq!(response.jsonrpc.as_deref(), Some("2.0"));
    assert_eq!(response.id_u64(), Some(1));
    let server_info = response
        .result
        .as_ref()
        .and_then(|result| result.get("serverInfo"))
        .expect("serverInfo present");
    assert_eq!(
        server_info.get("name").and_then(|v| v.as_str()),
        Some("reference-server")
    );

    let exit = session.close();
    assert!(exit.status.is_some());
    assert!(exit.stderr.iter().any(|line| line.contains("starting")));
    Ok(())
}

#[test]
fn echo_is_identity() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("normal"))?;
    session.call(&initialize(1), Duration::from_secs(5))?;

    let inputs = ["", "Hello, MCP!", "  spaced  ", "안녕 \"quoted\" \\ slash", "line\nbreak"];
    for (offset, text) in inputs.iter().enumerate() {
        let request = Request::new(
            2 + offset as u64,
            "tools/call",
            Some(json!({"name": "echo", "arguments": {"text": text}})),
        );
        let response = session.call(&request, Duration::from_secs(5))?;
        let echoed = response
            .result
            .as_ref()
            .and_then(|result| result.get("content"))
            .and_then(|content| content.get(0))
            .and_then(|item| item.get("text"))
            .and_then(|text| text.as_str());
        assert_eq!(echoed, Some(*text));
    }
    Ok(())
}

#[test]
fn unsupported_operation_fails_gracefully() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("normal"))?;
    session.call(&initialize(1), Duration::from_secs(5))?;

    let request = Request::new(
        2,
        "tools/call",
        Some(json!({"name": "calculate", "arguments": {"operation": "modulo", "a": 1, "b": 2}})),
    );
    let response = session.call(&request, Duration::from_secs(5))?;
    let result = response.result.expect("result present");
    assert_eq!(result.get("isError").and_then(|v| v.as_bool()), Some(true));

    // The server is still answering afterwards.
    let response = session.call(&Request::new(3, "tools/list", None), Duration::from_secs(5))?;
    assert!(response.result.is_some());
    Ok(())
}

#[test]
fn notifications_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("chatty"))?;
    let response = session.call(&initialize(1), Duration::from_secs(5))?;
    assert_eq!(response.id_u64(), Some(1));
    assert!(response.result.is_some());

    let response = session.call(&Request::new(2, "tools/list", None), Duration::from_secs(5))?;
    assert_eq!(response.id_u64(), Some(2));
    Ok(())
}

#[test]
fn mismatched_id_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("wrong-id"))?;
    let err = session
        .call(&initialize(1), Duration::from_secs(5))
        .expect_err("id mismatch");
    match err {
        SessionError::UnexpectedId { expected, actual } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, "101");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn silent_server_times_out_within_bound() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("silent"))?;
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let err = session
        .call(&initialize(1), timeout)
        .expect_err("timeout");
    let elapsed = started.elapsed();
    assert!(err.is_timeout());
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(2));

    // The timed-out request is resolved, so the next one may be sent.
    session.send(&Request::new(2, "tools/list", None))?;

    let started = Instant::now();
    let exit = session.close();
    assert!(exit.status.is_some());
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[test]
fn exited_server_is_empty_response() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("exit"))?;
    let err = session
        .receive(Duration::from_secs(5))
        .expect_err("empty response");
    assert!(matches!(err, SessionError::EmptyResponse));

    let err = session
        .send(&initialize(1))
        .expect_err("write after exit");
    match err {
        SessionError::WriteError(source) => {
            assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe)
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn garbage_is_parse_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::spawn(&reference("garbage"))?;
    let err = session
        .call(&initialize(1), Duration::from_secs(5))
        .expect_err("parse error");
    assert!(matches!(err, SessionError::ParseError { .. }));
    Ok(())
}
