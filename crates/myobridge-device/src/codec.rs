//! Myo Connect wire format.
//!
//! Every WebSocket text frame is a two-element JSON array: a frame kind and
//! a body.  Inbound frames are `["event", {"type": .., "myo": .., ...}]`;
//! outbound frames are `["command", {"command": .., "myo": .., ...}]`.
//!
//! One inbound frame may expand to several [`RawEvent`]s: an `orientation`
//! frame carries the accelerometer and gyroscope readings of the same
//! sample, and a `pose` frame ends the previous pose before starting the new
//! one.

use myobridge_types::{
    BridgeError, ImuSample, Pose, Quaternion, RawEvent, Vector3, VibrationLength,
};
use serde::Deserialize;
use serde_json::{Value, json};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// Body of an `["event", {...}]` frame.  Fields are present depending on
/// `type`.
#[derive(Debug, Deserialize)]
struct EventBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    orientation: Option<Quaternion>,
    #[serde(default)]
    accelerometer: Option<[f64; 3]>,
    #[serde(default)]
    gyroscope: Option<[f64; 3]>,
    #[serde(default)]
    pose: Option<Pose>,
    #[serde(default)]
    rssi: Option<i32>,
    #[serde(default)]
    bluetooth_strength: Option<i32>,
    #[serde(default)]
    battery_level: Option<u8>,
}

fn vector([x, y, z]: [f64; 3]) -> Vector3 {
    Vector3::new(x, y, z)
}

fn missing(kind: &str, field: &str) -> BridgeError {
    BridgeError::Serialization(format!("{kind} event without {field}"))
}

/// Stateful decoder for inbound frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    last_pose: Option<Pose>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one text frame.
    ///
    /// Non-event frames decode to nothing.  Event types without a mapping
    /// decode to [`RawEvent::Unknown`].
    pub fn decode(&mut self, text: &str) -> Result<Vec<RawEvent>, BridgeError> {
        let (frame, body): (String, Value) = serde_json::from_str(text)?;
        if frame != "event" {
            return Ok(Vec::new());
        }
        let body: EventBody = serde_json::from_value(body)?;

        let events = match body.kind.as_str() {
            "connected" => vec![RawEvent::Connected],
            "disconnected" => {
                self.last_pose = None;
                vec![RawEvent::Disconnected]
            }
            "arm_synced" => vec![RawEvent::ArmSynced],
            "arm_unsynced" => vec![RawEvent::ArmUnsynced],
            "locked" => vec![RawEvent::Locked],
            "unlocked" => vec![RawEvent::Unlocked],
            "orientation" => {
                let orientation = body.orientation.ok_or_else(|| missing("orientation", "orientation"))?;
                let accelerometer = body.accelerometer.map(vector);
                let gyroscope = body.gyroscope.map(vector);

                let mut events = vec![RawEvent::Orientation(orientation)];
                events.extend(accelerometer.map(RawEvent::Accelerometer));
                events.extend(gyroscope.map(RawEvent::Gyroscope));
                if let (Some(accelerometer), Some(gyroscope)) = (accelerometer, gyroscope) {
                    events.push(RawEvent::Imu(ImuSample {
                        orientation,
                        accelerometer,
                        gyroscope,
                    }));
                }
                events
            }
            "pose" => {
                let pose = body.pose.ok_or_else(|| missing("pose", "pose"))?;
                let mut events = Vec::with_capacity(2);
                if let Some(previous) = self.last_pose.replace(pose)
                    && previous != pose
                    && previous != Pose::Rest
                {
                    events.push(RawEvent::Pose { pose: previous, edge: false });
                }
                events.push(RawEvent::Pose { pose, edge: true });
                events
            }
            "rssi" | "bluetooth_strength" => {
                let rssi = body
                    .rssi
                    .or(body.bluetooth_strength)
                    .ok_or_else(|| missing(&body.kind, "rssi"))?;
                vec![RawEvent::BluetoothStrength(rssi)]
            }
            "battery_level" => {
                let level = body.battery_level.ok_or_else(|| missing("battery_level", "battery_level"))?;
                vec![RawEvent::BatteryLevel(level)]
            }
            _ => vec![RawEvent::Unknown(body.kind)],
        };
        Ok(events)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound commands
// ─────────────────────────────────────────────────────────────────────────────

/// How long an unlock lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockMode {
    /// Stay unlocked until told otherwise.
    Hold,
    /// Relock after the armband's built-in timeout.
    Timed,
}

/// Commands understood by Myo Connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Vibrate(VibrationLength),
    RequestRssi,
    Unlock(UnlockMode),
}

impl DeviceCommand {
    /// Encode as a `["command", {...}]` frame for armband `myo`.
    pub fn encode(self, myo: u32) -> String {
        let body = match self {
            DeviceCommand::Vibrate(length) => {
                json!({ "command": "vibrate", "myo": myo, "type": length.as_str() })
            }
            DeviceCommand::RequestRssi => json!({ "command": "request_rssi", "myo": myo }),
            DeviceCommand::Unlock(mode) => {
                let kind = match mode {
                    UnlockMode::Hold => "hold",
                    UnlockMode::Timed => "timed",
                };
                json!({ "command": "unlock", "myo": myo, "type": kind })
            }
        };
        json!(["command", body]).to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
