//! Outbound side of the relay.
//!
//! The relay hands every envelope to a [`RelaySink`].  [`EnvelopeBus`] is the
//! in-process implementation: a [`tokio::sync::broadcast`] channel so every
//! subscriber (stdout writer, bus publisher, test) sees every envelope
//! without any one of them blocking the relay.

use myobridge_types::{BridgeError, OutboundEnvelope};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered envelopes before old ones
/// are dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Receives normalized, rate-limited envelopes.
///
/// Delivery is best effort: an `Err` is logged by the relay and otherwise
/// ignored.
pub trait RelaySink: Send + Sync {
    /// Publish one envelope.  Returns the number of consumers it reached.
    fn publish(&self, envelope: OutboundEnvelope) -> Result<usize, BridgeError>;
}

/// Broadcast bus for outbound envelopes.  Clones share the same channel.
#[derive(Clone, Debug)]
pub struct EnvelopeBus {
    sender: broadcast::Sender<OutboundEnvelope>,
}

impl EnvelopeBus {
    /// Create a bus buffering up to `capacity` envelopes per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EnvelopeReceiver {
        EnvelopeReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EnvelopeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RelaySink for EnvelopeBus {
    /// Fails with [`BridgeError::Channel`] when nobody is subscribed.
    fn publish(&self, envelope: OutboundEnvelope) -> Result<usize, BridgeError> {
        self.sender
            .send(envelope)
            .map_err(|_| BridgeError::Channel("no subscribers for outbound envelopes".to_string()))
    }
}

/// Subscriber handle on an [`EnvelopeBus`].
pub struct EnvelopeReceiver {
    receiver: broadcast::Receiver<OutboundEnvelope>,
}

impl EnvelopeReceiver {
    /// Wait for the next envelope.
    ///
    /// A subscriber that falls behind skips the envelopes it missed (logged)
    /// and carries on; telemetry is latest-value-wins.  Returns `None` once
    /// the bus is closed.
    pub async fn recv(&mut self) -> Option<OutboundEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "envelope subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`][Self::recv]; `None` when nothing is
    /// buffered.
    pub fn try_recv(&mut self) -> Option<OutboundEnvelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "envelope subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
