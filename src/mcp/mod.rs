use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod contracts;
pub mod errors;

/// Outgoing JSON-RPC request or notification. A notification has no `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: contracts::JSONRPC_VERSION,
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: contracts::JSONRPC_VERSION,
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Incoming JSON-RPC message as read from the server's stdout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Message {
    /// Server-originated notification: a method and no id.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn id_u64(&self) -> Option<u64> {
        self.id.as_ref().and_then(|value| value.as_u64())
    }

    pub fn id_display(&self) -> String {
        match &self.id {
            Some(value) => value.to_string(),
            None => "none".to_string(),
        }
    }

    /// Human-readable summary of a JSON-RPC error object, if present.
    pub fn error_summary(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let code = error.get("code").and_then(|value| value.as_i64());
        let message = error
            .get("message")
            .and_then(|value| value.as_str())
            .unwrap_or("no message");
        Some(match code {
            Some(code) => format!("{code}: {message}"),
            None => message.to_string(),
        })
    }
}
