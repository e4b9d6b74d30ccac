use serde_json::json;
use std::time::Duration;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";

pub const TOOL_ECHO: &str = "echo";
pub const TOOL_CALCULATE: &str = "calculate";
pub const TOOL_SYSTEM_INFO: &str = "system_info";

pub const RESOURCE_SERVER_CONFIG: &str = "config://server";

pub const ECHO_TEXT: &str = "Hello, MCP!";
pub const CALCULATE_OPERATION: &str = "add";
pub const CALCULATE_A: i64 = 15;
pub const CALCULATE_B: i64 = 27;
pub const CALCULATE_EXPECTED: f64 = 42.0;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn initialize_params() -> serde_json::Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": CLIENT_VERSION
        }
    })
}

pub fn echo_call_params() -> serde_json::Value {
    json!({
        "name": TOOL_ECHO,
        "arguments": { "text": ECHO_TEXT }
    })
}

pub fn calculate_call_params() -> serde_json::Value {
    json!({
        "name": TOOL_CALCULATE,
        "arguments": {
            "operation": CALCULATE_OPERATION,
            "a": CALCULATE_A,
            "b": CALCULATE_B
        }
    })
}

pub fn system_info_call_params() -> serde_json::Value {
    json!({
        "name": TOOL_SYSTEM_INFO,
        "arguments": {}
    })
}

pub fn read_server_config_params() -> serde_json::Value {
    json!({ "uri": RESOURCE_SERVER_CONFIG })
}
