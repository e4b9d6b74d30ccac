//! Minimal MCP stdio server used as a probe target by the integration tests.
//!
//! `--mode` selects a misbehaviour so failure paths can be exercised against
//! a real subprocess.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::process;

const SERVER_NAME: &str = "reference-server";

#[derive(Parser)]
#[command(name = "reference-server")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Conforming server
    Normal,
    /// Reads requests and never answers
    Silent,
    /// Exits immediately without output
    Exit,
    /// Answers every request with a non-JSON line
    Garbage,
    /// Answers with an id that does not match the request
    WrongId,
    /// Sends a notification before every response
    Chatty,
    /// Echo tool returns altered text
    WrongEcho,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    eprintln!("{SERVER_NAME} starting in {:?} mode", cli.mode);

    if cli.mode == Mode::Exit {
        process::exit(0);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock().lines();
    let mut writer = io::BufWriter::new(stdout.lock());

    for line in reader {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(_) => continue,
        };
        let Some(id) = request.get("id").cloned() else {
            // Notifications are never answered.
            continue;
        };

        let response = match cli.mode {
            Mode::Silent => continue,
            Mode::Garbage => {
                writeln!(writer, "this is not json").context("failed to write response")?;
                writer.flush().context("failed to flush response")?;
                continue;
            }
            Mode::WrongId => {
                let shifted = id.as_u64().map(|id| json!(id + 100)).unwrap_or(json!(-1));
                handle_request(&request, shifted, cli.mode)
            }
            _ => handle_request(&request, id, cli.mode),
        };

        if cli.mode == Mode::Chatty {
            let notice = json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": { "level": "info", "data": "handling request" }
            });
            writeln!(writer, "{notice}").context("failed to write notification")?;
        }

        let serialized =
            serde_json::to_string(&response).context("failed to serialize response")?;
        writeln!(writer, "{serialized}").context("failed to write response")?;
        writer.flush().context("failed to flush response")?;
    }

    Ok(())
}

fn handle_request(request: &Value, id: Value, mode: Mode) -> Value {
    let method = request.get("method").and_then(|value| value.as_str());
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

    let result = match method {
        Some("initialize") => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })),
        Some("tools/list") => Ok(json!({ "tools": tool_definitions() })),
        Some("tools/call") => Ok(handle_tool_call(&params, mode)),
        Some("resources/list") => Ok(json!({
            "resources": [{
                "uri": "config://server",
                "name": "Server configuration",
                "mimeType": "application/json"
            }]
        })),
        Some("resources/read") => read_resource(&params),
        Some(other) => Err((-32601, format!("method not found: {other}"))),
        None => Err((-32600, "invalid request".to_string())),
    };

    match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }),
    }
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "echo",
            "description": "Echo back the provided text.",
            "inputSchema": {
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }
        }),
        json!({
            "name": "calculate",
            "description": "Apply add, subtract, multiply or divide to two numbers.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "operation": {
                        "type": "string",
                        "enum": ["add", "subtract", "multiply", "divide"]
                    },
                    "a": { "type": "number" },
                    "b": { "type": "number" }
                },
                "required": ["operation", "a", "b"]
            }
        }),
        json!({
            "name": "system_info",
            "description": "Report basic facts about the host.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

fn text_result(text: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }],
        "isError": false
    })
}

fn error_result(message: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": format!("Error: {}", message.into()) }],
        "isError": true
    })
}

fn handle_tool_call(params: &Value, mode: Mode) -> Value {
    let Some(name) = params.get("name").and_then(|value| value.as_str()) else {
        return error_result("params.name must be a string");
    };
    let args = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    match name {
        "echo" => match args.get("text").and_then(|value| value.as_str()) {
            Some(text) if mode == Mode::WrongEcho => text_result(text.to_uppercase()),
            Some(text) => text_result(text),
            None => error_result("text must be a string"),
        },
        "calculate" => calculate(&args),
        "system_info" => text_result(format!(
            "OS: {}\nArch: {}\nFamily: {}\nPID: {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::env::consts::FAMILY,
            process::id()
        )),
        _ => error_result(format!("unknown tool: {name}")),
    }
}

fn calculate(args: &Value) -> Value {
    let operation = args.get("operation").and_then(|value| value.as_str());
    let a = args.get("a").and_then(|value| value.as_f64());
    let b = args.get("b").and_then(|value| value.as_f64());
    let (Some(operation), Some(a), Some(b)) = (operation, a, b) else {
        return error_result("operation, a and b are required");
    };

    let value = match operation {
        "add" => a + b,
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" if b == 0.0 => return error_result("division by zero"),
        "divide" => a / b,
        other => return error_result(format!("unsupported operation: {other}")),
    };
    text_result(format!("{a} {operation} {b} = {value}"))
}

fn read_resource(params: &Value) -> Result<Value, (i64, String)> {
    match params.get("uri").and_then(|value| value.as_str()) {
        Some("config://server") => {
            let config = json!({
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "description": "Reference MCP server for conformance tests"
            });
            Ok(json!({
                "contents": [{
                    "uri": "config://server",
                    "mimeType": "application/json",
                    "text": config.to_string()
                }]
            }))
        }
        Some(uri) => Err((-32002, format!("resource not found: {uri}"))),
        None => Err((-32602, "uri must be a string".to_string())),
    }
}
