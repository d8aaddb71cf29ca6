//! Raw device events and the canonical outbound envelope.
//!
//! A [`RawEvent`] is what the armband transport observed; a [`Payload`] is
//! what the relay publishes.  Every payload serialises as a mapping keyed by
//! its channel name:
//!
//! | Variant | Wire shape |
//! |---|---|
//! | [`Payload::Event`] | `{"event": "connected"}` |
//! | [`Payload::Accelerometer`] | `{"accelerometer": {"x": .., "y": .., "z": ..}}` |
//! | [`Payload::Gyroscope`] | `{"gyroscope": {"x": .., "y": .., "z": ..}}` |
//! | [`Payload::Orientation`] | `{"orientation": {"w": .., "x": .., "y": .., "z": ..}}` |
//! | [`Payload::Imu`] | `{"imu": {"orientation": .., "accelerometer": .., "gyroscope": ..}}` |
//! | [`Payload::Pose`] | `{"pose": "fist", "edge": true}` |
//! | [`Payload::BluetoothStrength`] | `{"bluetoothStrength": -62}` |
//! | [`Payload::BatteryLevel`] | `{"batteryLevel": 87}` |

use std::ops::Add;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Wildcard target used for broadcast envelopes.
pub const BROADCAST: &str = "*";

/// Orientation quaternion as reported by the armband.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }
}

/// Component-wise sum, used to apply the orientation offset.
impl Add for Quaternion {
    type Output = Quaternion;

    fn add(self, rhs: Quaternion) -> Quaternion {
        Quaternion {
            w: self.w + rhs.w,
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

/// Three-axis sensor reading (accelerometer in g, gyroscope in deg/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Combined inertial sample: one orientation frame with its motion readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub orientation: Quaternion,
    pub accelerometer: Vector3,
    pub gyroscope: Vector3,
}

/// Gestures recognised by the armband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Rest,
    Fist,
    WaveIn,
    WaveOut,
    FingersSpread,
    DoubleTap,
    #[serde(other)]
    Unknown,
}

/// Connection and state-transition events.  Never rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Connected,
    Disconnected,
    ArmSynced,
    ArmUnsynced,
    Locked,
    Unlocked,
}

/// An event observed on the device transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Connected,
    Disconnected,
    ArmSynced,
    ArmUnsynced,
    Locked,
    Unlocked,
    /// `edge` is `true` when the pose starts and `false` when it ends.
    Pose { pose: Pose, edge: bool },
    Accelerometer(Vector3),
    Gyroscope(Vector3),
    Orientation(Quaternion),
    Imu(ImuSample),
    /// Received signal strength in dBm.
    BluetoothStrength(i32),
    /// Battery charge in percent.
    BatteryLevel(u8),
    /// Any event name the relay has no mapping for.
    Unknown(String),
}

impl RawEvent {
    /// Transport-level name of this event.
    pub fn name(&self) -> &str {
        match self {
            RawEvent::Connected => "connected",
            RawEvent::Disconnected => "disconnected",
            RawEvent::ArmSynced => "arm_synced",
            RawEvent::ArmUnsynced => "arm_unsynced",
            RawEvent::Locked => "locked",
            RawEvent::Unlocked => "unlocked",
            RawEvent::Pose { .. } => "pose",
            RawEvent::Accelerometer(_) => "accelerometer",
            RawEvent::Gyroscope(_) => "gyroscope",
            RawEvent::Orientation(_) => "orientation",
            RawEvent::Imu(_) => "imu",
            RawEvent::BluetoothStrength(_) => "rssi",
            RawEvent::BatteryLevel(_) => "battery_level",
            RawEvent::Unknown(name) => name,
        }
    }

    /// The lifecycle event this raw event represents, if any.
    pub fn lifecycle(&self) -> Option<LifecycleEvent> {
        match self {
            RawEvent::Connected => Some(LifecycleEvent::Connected),
            RawEvent::Disconnected => Some(LifecycleEvent::Disconnected),
            RawEvent::ArmSynced => Some(LifecycleEvent::ArmSynced),
            RawEvent::ArmUnsynced => Some(LifecycleEvent::ArmUnsynced),
            RawEvent::Locked => Some(LifecycleEvent::Locked),
            RawEvent::Unlocked => Some(LifecycleEvent::Unlocked),
            _ => None,
        }
    }
}

/// Canonical outbound payload, one variant per channel key.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Event(LifecycleEvent),
    Accelerometer(Vector3),
    Gyroscope(Vector3),
    Orientation(Quaternion),
    Imu(ImuSample),
    Pose { pose: Pose, edge: bool },
    BluetoothStrength(i32),
    BatteryLevel(u8),
}

impl Payload {
    /// The channel key this payload is published under.
    pub fn channel_key(&self) -> &'static str {
        match self {
            Payload::Event(_) => "event",
            Payload::Accelerometer(_) => "accelerometer",
            Payload::Gyroscope(_) => "gyroscope",
            Payload::Orientation(_) => "orientation",
            Payload::Imu(_) => "imu",
            Payload::Pose { .. } => "pose",
            Payload::BluetoothStrength(_) => "bluetoothStrength",
            Payload::BatteryLevel(_) => "batteryLevel",
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let key = self.channel_key();
        match self {
            Payload::Pose { pose, edge } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(key, pose)?;
                map.serialize_entry("edge", edge)?;
                map.end()
            }
            Payload::Event(event) => single_entry(serializer, key, event),
            Payload::Accelerometer(v) | Payload::Gyroscope(v) => single_entry(serializer, key, v),
            Payload::Orientation(q) => single_entry(serializer, key, q),
            Payload::Imu(sample) => single_entry(serializer, key, sample),
            Payload::BluetoothStrength(rssi) => single_entry(serializer, key, rssi),
            Payload::BatteryLevel(level) => single_entry(serializer, key, level),
        }
    }
}

fn single_entry<S: Serializer, V: Serialize>(
    serializer: S,
    key: &str,
    value: &V,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

/// A message handed to the relay sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    /// Target device identifiers; `["*"]` for broadcast.
    pub devices: Vec<String>,
    pub payload: Payload,
}

impl OutboundEnvelope {
    /// Wrap `payload` in an envelope addressed to every listener.
    pub fn broadcast(payload: Payload) -> Self {
        Self {
            devices: vec![BROADCAST.to_string()],
            payload,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.devices.iter().any(|d| d == BROADCAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quaternion_addition_is_component_wise() {
        let sum = Quaternion::IDENTITY + Quaternion::new(0.5, -0.25, 1.0, 2.0);
        assert_eq!(sum, Quaternion::new(1.5, -0.25, 1.0, 2.0));
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = OutboundEnvelope::broadcast(Payload::Orientation(Quaternion::IDENTITY));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "devices": ["*"],
                "payload": { "orientation": { "w": 1.0, "x": 0.0, "y": 0.0, "z": 0.0 } }
            })
        );
        assert!(envelope.is_broadcast());
    }

    #[test]
    fn lifecycle_payload_uses_event_key() {
        let value = serde_json::to_value(Payload::Event(LifecycleEvent::ArmSynced)).unwrap();
        assert_eq!(value, json!({ "event": "arm_synced" }));
    }

    #[test]
    fn pose_payload_carries_edge() {
        let payload = Payload::Pose { pose: Pose::WaveIn, edge: false };
        let value = serde_json::to_value(payload).unwrap();
        assert_eq!(value, json!({ "pose": "wave_in", "edge": false }));
    }

    #[test]
    fn scalar_payloads_use_camel_case_keys() {
        let rssi = serde_json::to_value(Payload::BluetoothStrength(-61)).unwrap();
        assert_eq!(rssi, json!({ "bluetoothStrength": -61 }));

        let battery = serde_json::to_value(Payload::BatteryLevel(80)).unwrap();
        assert_eq!(battery, json!({ "batteryLevel": 80 }));
    }

    #[test]
    fn unknown_pose_name_deserialises_to_unknown() {
        let pose: Pose = serde_json::from_str("\"thumb_to_pinky\"").unwrap();
        assert_eq!(pose, Pose::Unknown);
    }

    #[test]
    fn raw_event_names_and_lifecycle() {
        assert_eq!(RawEvent::BluetoothStrength(-40).name(), "rssi");
        assert_eq!(RawEvent::Unknown("emg".into()).name(), "emg");
        assert_eq!(RawEvent::Locked.lifecycle(), Some(LifecycleEvent::Locked));
        assert_eq!(RawEvent::BatteryLevel(10).lifecycle(), None);
    }
}
