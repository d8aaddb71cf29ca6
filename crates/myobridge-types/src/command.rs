//! Inbound commands addressed to the armband.
//!
//! ```json
//! { "command": { "action": "vibrate", "vibrationLength": "medium" } }
//! ```
//!
//! Parsing is lenient: an unknown `action` deserialises to
//! [`Action::Unrecognized`] and an unknown `vibrationLength` resolves to
//! [`VibrationLength::Short`], so a malformed command degrades to a no-op
//! instead of a parse failure.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Top-level inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandMessage {
    pub command: Command,
}

/// A single command for the armband.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    #[serde(default)]
    pub action: Action,
    /// One of `short`, `medium`, `long`.  Only read for `vibrate`.
    #[serde(
        rename = "vibrationLength",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub vibration_length: Option<String>,
}

impl Command {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            vibration_length: None,
        }
    }

    /// A `vibrate` command with an explicit length name.
    pub fn vibrate(length: impl Into<String>) -> Self {
        Self {
            action: Action::Vibrate,
            vibration_length: Some(length.into()),
        }
    }

    /// The vibration length this command asks for, defaulting to
    /// [`VibrationLength::Short`].
    pub fn vibration(&self) -> VibrationLength {
        VibrationLength::from_name(self.vibration_length.as_deref()).unwrap_or_default()
    }
}

/// The enumerated set of supported actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Vibrate,
    RequestBluetoothStrength,
    ZeroOrientation,
    /// Any action name outside the supported set.
    #[default]
    #[serde(other)]
    #[schemars(skip)]
    Unrecognized,
}

/// Haptic feedback duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VibrationLength {
    #[default]
    Short,
    Medium,
    Long,
}

impl VibrationLength {
    pub fn from_name(name: Option<&str>) -> Option<Self> {
        match name? {
            "short" => Some(VibrationLength::Short),
            "medium" => Some(VibrationLength::Medium),
            "long" => Some(VibrationLength::Long),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VibrationLength::Short => "short",
            VibrationLength::Medium => "medium",
            VibrationLength::Long => "long",
        }
    }
}
