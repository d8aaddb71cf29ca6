//! JSON Schemas for the payloads the bridge accepts.
//!
//! Upstream validators use these to reject malformed payloads before they
//! reach the relay.

use schemars::schema_for;
use serde_json::Value;

use crate::command::CommandMessage;
use crate::options::OptionsConfig;

/// Schema of an inbound `{"command": {...}}` message.
pub fn message_schema() -> Value {
    serde_json::to_value(schema_for!(CommandMessage)).unwrap_or(Value::Null)
}

/// Schema of the options / reconfiguration surface.
pub fn options_schema() -> Value {
    serde_json::to_value(schema_for!(OptionsConfig)).unwrap_or(Value::Null)
}
