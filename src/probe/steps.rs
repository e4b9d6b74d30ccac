use super::ProbeStep;
use crate::mcp::Message;
use crate::mcp::contracts::{
    CALCULATE_A, CALCULATE_B, CALCULATE_EXPECTED, CALCULATE_OPERATION, ECHO_TEXT,
    METHOD_INITIALIZE, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST, RESOURCE_SERVER_CONFIG, calculate_call_params, echo_call_params,
    initialize_params, read_server_config_params, system_info_call_params,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const NUMBER_TOLERANCE: f64 = 1e-9;
const DETAIL_PREVIEW_CHARS: usize = 60;

static NUMBER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?"));

pub fn standard_steps() -> Vec<ProbeStep> {
    vec![
        ProbeStep {
            label: "initialize",
            method: METHOD_INITIALIZE,
            params: Some(initialize_params()),
            handshake: true,
            validate: validate_initialize,
        },
        ProbeStep {
            label: "list tools",
            method: METHOD_TOOLS_LIST,
            params: None,
            handshake: false,
            validate: validate_tools_list,
        },
        ProbeStep {
            label: "call echo",
            method: METHOD_TOOLS_CALL,
            params: Some(echo_call_params()),
            handshake: false,
            validate: validate_echo,
        },
        ProbeStep {
            label: "call calculate",
            method: METHOD_TOOLS_CALL,
            params: Some(calculate_call_params()),
            handshake: false,
            validate: validate_calculate,
        },
        ProbeStep {
            label: "call system_info",
            method: METHOD_TOOLS_CALL,
            params: Some(system_info_call_params()),
            handshake: false,
            validate: validate_system_info,
        },
        ProbeStep {
            label: "list resources",
            method: METHOD_RESOURCES_LIST,
            params: None,
            handshake: false,
            validate: validate_resources_list,
        },
        ProbeStep {
            label: "read config resource",
            method: METHOD_RESOURCES_READ,
            params: Some(read_server_config_params()),
            handshake: false,
            validate: validate_server_config,
        },
    ]
}

/// The `result` object of a successful response.
fn result_of(message: &Message) -> Result<&Value, String> {
    if let Some(summary) = message.error_summary() {
        return Err(format!("server returned error {summary}"));
    }
    message
        .result
        .as_ref()
        .filter(|value| value.is_object())
        .ok_or_else(|| "response has no result object".to_string())
}

fn array_field<'a>(result: &'a Value, field: &str) -> Result<&'a Vec<Value>, String> {
    result
        .get(field)
        .and_then(|value| value.as_array())
        .ok_or_else(|| format!("result.{field} must be an array"))
}

fn str_field<'a>(entry: &'a Value, field: &str) -> Option<&'a str> {
    entry.get(field).and_then(|value| value.as_str())
}

/// Text of `result.content[0]`, rejecting tool-level errors.
fn first_content_text(message: &Message) -> Result<&str, String> {
    let result = result_of(message)?;
    let text = result
        .get("content")
        .and_then(|value| value.as_array())
        .and_then(|arr| arr.first())
        .and_then(|value| value.get("text"))
        .and_then(|value| value.as_str());

    let is_error = result
        .get("isError")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    if is_error {
        return Err(format!("tool reported error: {}", text.unwrap_or("no text")));
    }
    text.ok_or_else(|| "result.content[0].text must be a string".to_string())
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut preview: String = first_line.chars().take(DETAIL_PREVIEW_CHARS).collect();
    if preview.len() < text.len() {
        preview.push_str("...");
    }
    preview
}

fn validate_initialize(message: &Message) -> Result<String, String> {
    let result = result_of(message)?;
    let info = result.get("serverInfo");
    let name = info.and_then(|value| str_field(value, "name"));
    let version = info.and_then(|value| str_field(value, "version"));
    Ok(match (name, version) {
        (Some(name), Some(version)) => format!("server {name} {version}"),
        (Some(name), None) => format!("server {name}"),
        _ => "handshake completed".to_string(),
    })
}

fn validate_tools_list(message: &Message) -> Result<String, String> {
    let tools = array_field(result_of(message)?, "tools")?;
    let mut names = Vec::with_capacity(tools.len());
    for (index, tool) in tools.iter().enumerate() {
        let Some(name) = str_field(tool, "name") else {
            return Err(format!("tools[{index}] has no name"));
        };
        if str_field(tool, "description").is_none() {
            return Err(format!("tool {name} has no description"));
        }
        names.push(name);
    }
    Ok(format!("{} tools: {}", tools.len(), names.join(", ")))
}

fn validate_echo(message: &Message) -> Result<String, String> {
    let text = first_content_text(message)?;
    if text == ECHO_TEXT {
        Ok(format!("echoed {text:?}"))
    } else {
        Err(format!("expected {ECHO_TEXT:?}, got {text:?}"))
    }
}

fn validate_calculate(message: &Message) -> Result<String, String> {
    let text = first_content_text(message)?;
    let value = last_number(text)?.ok_or_else(|| format!("no number in {text:?}"))?;
    if (value - CALCULATE_EXPECTED).abs() <= NUMBER_TOLERANCE {
        Ok(format!(
            "{CALCULATE_OPERATION}({CALCULATE_A}, {CALCULATE_B}) = {value}"
        ))
    } else {
        Err(format!(
            "{CALCULATE_OPERATION}({CALCULATE_A}, {CALCULATE_B}) expected {CALCULATE_EXPECTED}, got {value}"
        ))
    }
}

fn validate_system_info(message: &Message) -> Result<String, String> {
    let text = first_content_text(message)?;
    if text.trim().is_empty() {
        return Err("system info text is empty".to_string());
    }
    Ok(format!("{} ({} chars)", preview(text), text.chars().count()))
}

fn validate_resources_list(message: &Message) -> Result<String, String> {
    let resources = array_field(result_of(message)?, "resources")?;
    let mut uris = Vec::with_capacity(resources.len());
    for (index, resource) in resources.iter().enumerate() {
        let Some(uri) = str_field(resource, "uri") else {
            return Err(format!("resources[{index}] has no uri"));
        };
        if str_field(resource, "name").is_none() {
            return Err(format!("resource {uri} has no name"));
        }
        uris.push(uri);
    }
    Ok(format!("{} resources: {}", resources.len(), uris.join(", ")))
}

fn validate_server_config(message: &Message) -> Result<String, String> {
    let contents = array_field(result_of(message)?, "contents")?;
    let text = contents
        .first()
        .and_then(|value| str_field(value, "text"))
        .ok_or_else(|| "result.contents[0].text must be a string".to_string())?;
    let config: Value = serde_json::from_str(text)
        .map_err(|err| format!("{RESOURCE_SERVER_CONFIG} is not JSON: {err}"))?;

    let name = str_field(&config, "name")
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("{RESOURCE_SERVER_CONFIG} has no name"))?;
    let version = config
        .get("version")
        .and_then(scalar_text)
        .ok_or_else(|| format!("{RESOURCE_SERVER_CONFIG} has no version"))?;
    Ok(format!("{name} v{version}"))
}

/// Renders a non-empty string, number or boolean; anything else is absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Last numeric token in `text`, e.g. `42` in `"15 + 27 = 42"`.
fn last_number(text: &str) -> Result<Option<f64>, String> {
    last_match(&NUMBER, text)
}

fn last_match(pattern: &Result<Regex, regex::Error>, text: &str) -> Result<Option<f64>, String> {
    let pattern = pattern
        .as_ref()
        .map_err(|err| format!("invalid number pattern: {err}"))?;
    Ok(pattern
        .find_iter(text)
        .filter_map(|found| found.as_str().parse::<f64>().ok())
        .last())
}
