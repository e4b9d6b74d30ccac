pub const SPAWN_FAILED: &str = "spawn_failed";
pub const WRITE_ERROR: &str = "write_error";
pub const PARSE_ERROR: &str = "parse_error";
pub const EMPTY_RESPONSE: &str = "empty_response";
pub const TIMED_OUT: &str = "timed_out";
pub const UNEXPECTED_ID: &str = "unexpected_id";
pub const OUT_OF_SEQUENCE: &str = "out_of_sequence";

pub const CONFIG_MISSING: &str = "config_missing";
pub const CONFIG_INVALID: &str = "config_invalid";
pub const CONFIG_INCOMPLETE: &str = "config_incomplete";
pub const EXECUTABLE_MISSING: &str = "executable_missing";
pub const EXECUTABLE_NOT_RUNNABLE: &str = "executable_not_runnable";
pub const SERVER_UNRESPONSIVE: &str = "server_unresponsive";

pub const VALIDATION_FAILED: &str = "validation_failed";
