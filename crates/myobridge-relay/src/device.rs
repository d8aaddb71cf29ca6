//! The armband seam.
//!
//! The relay never talks to a transport directly.  It consumes a stream of
//! [`RawEvent`]s and asks a [`Device`] to perform a small set of actions.
//! Implementations live elsewhere (the Myo Connect WebSocket client in
//! `myobridge-device`, mocks in tests).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use myobridge_types::{BridgeError, RawEvent, VibrationLength};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Actions the relay can ask of the armband.
///
/// Every method targets the armband identified by `device_id`.  Results of
/// queries (signal strength) arrive later as [`RawEvent`]s, never as return
/// values.
#[async_trait]
pub trait Device: Send + Sync {
    /// Trigger haptic feedback.
    async fn vibrate(&self, device_id: u32, length: VibrationLength) -> Result<(), BridgeError>;

    /// Ask for a signal-strength reading.
    async fn request_bluetooth_strength(&self, device_id: u32) -> Result<(), BridgeError>;
}

/// A device-side action decided by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Vibrate(VibrationLength),
    RequestBluetoothStrength,
}

impl DeviceAction {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::Vibrate(_) => "vibrate",
            DeviceAction::RequestBluetoothStrength => "requestBluetoothStrength",
        }
    }

    /// Perform the action against `device`.
    pub async fn apply(self, device: &dyn Device, device_id: u32) -> Result<(), BridgeError> {
        match self {
            DeviceAction::Vibrate(length) => device.vibrate(device_id, length).await,
            DeviceAction::RequestBluetoothStrength => {
                device.request_bluetooth_strength(device_id).await
            }
        }
    }
}

/// Run `action` in the background.  Failures are logged and go no further.
pub fn spawn_action(device: Arc<dyn Device>, device_id: u32, action: DeviceAction) -> JoinHandle<()> {
    tokio::spawn(async move {
        match action.apply(device.as_ref(), device_id).await {
            Ok(()) => debug!(action = action.name(), device_id, "device action sent"),
            Err(e) => warn!(action = action.name(), device_id, error = %e, "device action failed"),
        }
    })
}

/// Adapt an mpsc receiver into the event stream the relay consumes.
pub fn event_stream(rx: mpsc::Receiver<RawEvent>) -> BoxStream<'static, RawEvent> {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}
