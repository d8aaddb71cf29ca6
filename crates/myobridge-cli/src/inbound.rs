//! Line-oriented inbound messages read from stdin.
//!
//! Each non-empty line is one JSON object, either a command message
//! (`{"command": {...}}`) or a reconfiguration (`{"options": {...}}`).

use myobridge_relay::Inbound;
use myobridge_types::{BridgeError, Command, OptionsConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(default)]
    command: Option<Command>,
    #[serde(default)]
    options: Option<OptionsConfig>,
}

/// Parse one stdin line.
///
/// Blank lines and objects carrying neither key yield `Ok(None)`.  A line
/// with both keys is treated as a command.
pub fn parse_line(line: &str) -> Result<Option<Inbound>, BridgeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: Line = serde_json::from_str(line)?;
    Ok(match (parsed.command, parsed.options) {
        (Some(command), _) => Some(Inbound::Command(command)),
        (None, Some(options)) => Some(Inbound::Reconfigure(options)),
        (None, None) => None,
    })
}

/// The Myo Connect host a reconfiguration asks for, if any.
pub fn requested_address(message: &Inbound) -> Option<&str> {
    match message {
        Inbound::Reconfigure(config) => config.ip_address.as_deref(),
        Inbound::Command(_) => None,
    }
}
