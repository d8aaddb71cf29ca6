//! [`Dispatcher`] – maps inbound commands to device actions.
//!
//! | Action | Effect |
//! |---|---|
//! | `vibrate` | [`DeviceAction::Vibrate`] with the requested length (default `short`) |
//! | `requestBluetoothStrength` | [`DeviceAction::RequestBluetoothStrength`]; the reading arrives later as an event |
//! | `zeroOrientation` | Capture the latest orientation reading as the new offset |
//!
//! Dispatch is gated on the armband being connected.  Anything that cannot
//! be dispatched is logged and dropped; the dispatcher never fails.

use myobridge_types::{Action, Command, Quaternion};
use tracing::{debug, info};

use crate::device::DeviceAction;

/// Latest raw orientation and the offset applied to outgoing readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationReference {
    latest: Option<Quaternion>,
    offset: Option<Quaternion>,
}

impl OrientationReference {
    /// Remember `raw` as the most recent unadjusted reading.
    pub fn observe(&mut self, raw: Quaternion) {
        self.latest = Some(raw);
    }

    pub fn latest(&self) -> Option<Quaternion> {
        self.latest
    }

    pub fn offset(&self) -> Option<Quaternion> {
        self.offset
    }

    /// Replace the offset with the latest reading.  Returns `false` when no
    /// reading has been observed yet.
    pub fn zero(&mut self) -> bool {
        match self.latest {
            Some(latest) => {
                self.offset = Some(latest);
                true
            }
            None => false,
        }
    }

    /// Apply the offset (component-wise sum) to `raw`.
    pub fn adjust(&self, raw: Quaternion) -> Quaternion {
        match self.offset {
            Some(offset) => raw + offset,
            None => raw,
        }
    }
}

/// Turns [`Command`]s into [`DeviceAction`]s and owns the orientation offset.
#[derive(Debug, Default)]
pub struct Dispatcher {
    orientation: OrientationReference,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orientation(&self) -> &OrientationReference {
        &self.orientation
    }

    pub fn orientation_mut(&mut self) -> &mut OrientationReference {
        &mut self.orientation
    }

    /// Decide what `command` should do.
    ///
    /// Returns the device action to perform, if any.  `zeroOrientation` is
    /// handled locally and never produces an action.
    pub fn dispatch(&mut self, command: &Command, connected: bool) -> Option<DeviceAction> {
        if !connected {
            debug!(action = ?command.action, "armband not connected; command dropped");
            return None;
        }

        match command.action {
            Action::Vibrate => Some(DeviceAction::Vibrate(command.vibration())),
            Action::RequestBluetoothStrength => Some(DeviceAction::RequestBluetoothStrength),
            Action::ZeroOrientation => {
                if self.orientation.zero() {
                    info!(offset = ?self.orientation.offset(), "orientation zeroed");
                } else {
                    debug!("no orientation reading yet; zeroOrientation ignored");
                }
                None
            }
            Action::Unrecognized => {
                debug!("unrecognized action ignored");
                None
            }
        }
    }
}
