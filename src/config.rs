use crate::error::AuditError;
use crate::session::ServerCommand;
use directories::BaseDirs;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_KEY: &str = "basic-mcp-server";
pub const CONFIG_DIR: &str = ".claude-code";
pub const CONFIG_FILE: &str = "mcp_servers.json";

/// `$HOME/.claude-code/mcp_servers.json`, or `None` without a home directory.
pub fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

/// One server entry from the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub key: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ServerConfig {
    pub fn command_path(&self) -> &Path {
        Path::new(&self.command)
    }

    pub fn to_command(&self) -> ServerCommand {
        ServerCommand {
            program: PathBuf::from(&self.command),
            args: self.args.clone(),
            env: self.env.clone(),
        }
    }
}

/// Reads and parses the descriptor at `path`.
pub fn read_document(path: &Path) -> Result<Value, AuditError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(AuditError::ConfigMissing(path.to_path_buf()));
        }
        Err(err) => {
            return Err(AuditError::ConfigInvalid {
                path: path.to_path_buf(),
                message: format!("failed to read: {err}"),
            });
        }
    };
    serde_json::from_str(&contents).map_err(|err| AuditError::ConfigInvalid {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// The entry stored under `key` in the top-level object.
pub fn select_entry<'a>(document: &'a Value, key: &str) -> Result<&'a Value, AuditError> {
    let obj = document.as_object().ok_or_else(|| {
        AuditError::ConfigIncomplete("top level must be an object keyed by server name".into())
    })?;
    obj.get(key)
        .ok_or_else(|| AuditError::ConfigIncomplete(format!("'{key}' not found in configuration")))
}

/// Extracts `command`, and the optional `args` and `env`, from a server entry.
pub fn parse_entry(key: &str, entry: &Value) -> Result<ServerConfig, AuditError> {
    let obj = entry
        .as_object()
        .ok_or_else(|| AuditError::ConfigIncomplete(format!("'{key}' must be an object")))?;

    let command = obj
        .get("command")
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            AuditError::ConfigIncomplete(format!("'{key}' has no command string"))
        })?;

    let args = match obj.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                AuditError::ConfigIncomplete(format!("'{key}'.args must contain only strings"))
            })?,
        Some(_) => {
            return Err(AuditError::ConfigIncomplete(format!(
                "'{key}'.args must be an array"
            )));
        }
    };

    let env = match obj.get("env") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(vars)) => vars
            .iter()
            .map(|(name, value)| value.as_str().map(|value| (name.clone(), value.to_string())))
            .collect::<Option<BTreeMap<_, _>>>()
            .ok_or_else(|| {
                AuditError::ConfigIncomplete(format!("'{key}'.env values must be strings"))
            })?,
        Some(_) => {
            return Err(AuditError::ConfigIncomplete(format!(
                "'{key}'.env must be an object"
            )));
        }
    };

    Ok(ServerConfig {
        key: key.to_string(),
        command: command.to_string(),
        args,
        env,
    })
}
