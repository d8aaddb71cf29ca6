//! `myobridge-types` – shared vocabulary for the armband relay.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - [`event`] – raw device events and the canonical outbound envelope.
//! - [`options`] – the runtime configuration surface and its resolved form.
//! - [`command`] – inbound commands addressed to the armband.
//! - [`schema`] – JSON Schemas for the inbound message and options payloads.

pub mod command;
pub mod event;
pub mod options;
pub mod schema;

use thiserror::Error;

pub use command::{Action, Command, CommandMessage, VibrationLength};
pub use event::{
    ImuSample, LifecycleEvent, OutboundEnvelope, Payload, Pose, Quaternion, RawEvent, Vector3,
};
pub use options::{
    DEFAULT_INTERVAL, IntervalValue, Options, OptionsConfig, Stream, StreamToggle, StreamToggles,
};

/// Error type spanning device failures, transport faults and serialization.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device action {action} failed: {details}")]
    DeviceAction { action: String, details: String },

    #[error("Relay channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}
