//! Runtime configuration.
//!
//! [`OptionsConfig`] is the loosely-typed surface accepted from the outside
//! world (every field optional); [`Options`] is the resolved, immutable value
//! the relay works from.  Resolution never fails: absent fields take their
//! defaults, a non-positive or unparseable interval falls back to whatever
//! interval was in force before, and a mistyped `id` addresses armband 0.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Coalescing interval applied when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// The high-frequency telemetry families that can be toggled and are rate
/// limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stream {
    Accelerometer,
    Gyroscope,
    Orientation,
    Imu,
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::Accelerometer,
        Stream::Gyroscope,
        Stream::Orientation,
        Stream::Imu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stream::Accelerometer => "accelerometer",
            Stream::Gyroscope => "gyroscope",
            Stream::Orientation => "orientation",
            Stream::Imu => "imu",
        }
    }
}

/// `{"enabled": bool}` toggle for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StreamToggle {
    #[serde(default)]
    pub enabled: bool,
}

/// The coalescing interval as supplied by the caller.
///
/// Older option payloads declared the interval as a string, so both
/// `500` and `"500"` are accepted.  Any other JSON value still
/// deserializes (as [`IntervalValue::Other`]) so one bad field cannot sink
/// the rest of a reconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum IntervalValue {
    Millis(i64),
    Text(String),
    #[schemars(skip)]
    Other(Value),
}

impl IntervalValue {
    /// The interval as a strictly positive duration, or `None` if the value
    /// is non-positive or unparseable.
    ///
    /// Whole floats such as `250.0` count as milliseconds.
    pub fn duration(&self) -> Option<Duration> {
        let millis = match self {
            IntervalValue::Millis(ms) => *ms,
            IntervalValue::Text(text) => text.trim().parse::<i64>().ok()?,
            IntervalValue::Other(value) => whole_number(value)?,
        };
        u64::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    let n = value.as_f64()?;
    (n.is_finite() && n.fract() == 0.0 && n.abs() <= i64::MAX as f64).then_some(n as i64)
}

/// Accept an armband index as a number or numeric string; anything else is
/// treated as absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match &value {
        Value::Number(n) => n.as_i64().or_else(|| whole_number(&value)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }))
}

/// Configuration surface accepted on startup and on every reconfiguration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OptionsConfig {
    /// Index of the armband commands are addressed to.
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<i64>")]
    pub id: Option<i64>,
    /// Coalescing interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<IntervalValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerometer: Option<StreamToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyroscope: Option<StreamToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<StreamToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu: Option<StreamToggle>,
    /// Host running Myo Connect.  Not part of the resolved [`Options`]; the
    /// transport reconnects when it changes.
    #[serde(rename = "ipAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Per-stream enable flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamToggles {
    pub accelerometer: bool,
    pub gyroscope: bool,
    pub orientation: bool,
    pub imu: bool,
}

impl StreamToggles {
    pub fn enabled(&self, stream: Stream) -> bool {
        match stream {
            Stream::Accelerometer => self.accelerometer,
            Stream::Gyroscope => self.gyroscope,
            Stream::Orientation => self.orientation,
            Stream::Imu => self.imu,
        }
    }
}

/// Resolved runtime options.  Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub device_id: u32,
    /// Always strictly positive.
    pub interval: Duration,
    pub streams: StreamToggles,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            device_id: 0,
            interval: DEFAULT_INTERVAL,
            streams: StreamToggles::default(),
        }
    }
}

impl Options {
    /// Resolve `config` into a complete [`Options`] value.
    ///
    /// Each field is defaulted independently when absent.  An interval that
    /// is present but invalid keeps `fallback_interval` (the interval
    /// currently in force).
    pub fn resolve(config: &OptionsConfig, fallback_interval: Duration) -> Self {
        let fallback_interval = if fallback_interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            fallback_interval
        };
        let toggle = |t: Option<StreamToggle>| t.map(|t| t.enabled).unwrap_or(false);

        Self {
            device_id: config
                .id
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or(0),
            interval: match &config.interval {
                None => DEFAULT_INTERVAL,
                Some(value) => value.duration().unwrap_or(fallback_interval),
            },
            streams: StreamToggles {
                accelerometer: toggle(config.accelerometer),
                gyroscope: toggle(config.gyroscope),
                orientation: toggle(config.orientation),
                imu: toggle(config.imu),
            },
        }
    }
}
