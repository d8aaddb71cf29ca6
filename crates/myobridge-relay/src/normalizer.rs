//! Raw event → canonical payload mapping.
//!
//! High-frequency streams (accelerometer, gyroscope, orientation, imu) are
//! gated by their enable flag and routed to a rate-limited channel.
//! Lifecycle, pose, signal-strength and battery events are never gated and
//! go out immediately.  Unknown events are dropped without complaint.

use myobridge_types::{Options, Payload, RawEvent, Stream, VibrationLength};

use crate::device::DeviceAction;
use crate::dispatcher::OrientationReference;

/// Haptic feedback sent to the armband whenever it connects.
pub const CONNECT_FEEDBACK: DeviceAction = DeviceAction::Vibrate(VibrationLength::Short);

/// Where a normalized event should go.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Publish right away.
    Immediate(Payload),
    /// Publish through the channel for `Stream`.
    Coalesced(Stream, Payload),
    /// The stream is disabled in the current options.
    Gated(Stream),
    /// No mapping for this event.
    Unhandled,
}

/// Map `event` to its outbound route under `options`.
///
/// Orientation readings are recorded in `orientation` before gating, so a
/// later `zeroOrientation` sees the latest reading even while the stream is
/// disabled.  The offset is read once per event.
pub fn normalize(event: RawEvent, options: &Options, orientation: &mut OrientationReference) -> Route {
    if let Some(lifecycle) = event.lifecycle() {
        return Route::Immediate(Payload::Event(lifecycle));
    }

    match event {
        RawEvent::Pose { pose, edge } => Route::Immediate(Payload::Pose { pose, edge }),
        RawEvent::BluetoothStrength(rssi) => Route::Immediate(Payload::BluetoothStrength(rssi)),
        RawEvent::BatteryLevel(level) => Route::Immediate(Payload::BatteryLevel(level)),
        RawEvent::Accelerometer(v) => gate(options, Stream::Accelerometer, || {
            Payload::Accelerometer(v)
        }),
        RawEvent::Gyroscope(v) => gate(options, Stream::Gyroscope, || Payload::Gyroscope(v)),
        RawEvent::Orientation(q) => {
            orientation.observe(q);
            let reference = *orientation;
            gate(options, Stream::Orientation, || {
                Payload::Orientation(reference.adjust(q))
            })
        }
        RawEvent::Imu(mut sample) => {
            orientation.observe(sample.orientation);
            let reference = *orientation;
            gate(options, Stream::Imu, || {
                sample.orientation = reference.adjust(sample.orientation);
                Payload::Imu(sample)
            })
        }
        _ => Route::Unhandled,
    }
}

/// Device action to fire as a side effect of `event`.
pub fn feedback_for(event: &RawEvent) -> Option<DeviceAction> {
    matches!(event, RawEvent::Connected).then_some(CONNECT_FEEDBACK)
}

fn gate(options: &Options, stream: Stream, payload: impl FnOnce() -> Payload) -> Route {
    if options.streams.enabled(stream) {
        Route::Coalesced(stream, payload())
    } else {
        Route::Gated(stream)
    }
}
