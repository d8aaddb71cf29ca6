//! Per-stream rate limiting.
//!
//! A [`Channel`] coalesces a high-frequency stream into at most one emission
//! per interval:
//!
//! ```text
//!            publish                    publish (in cooldown)
//!   IDLE ──────────────► COOLDOWN ───────────────────────► PENDING
//!    ▲     emit now          │ ▲                              │
//!    │                       │ └──────── deadline: emit ──────┘
//!    └─── deadline: nothing ─┘           held value, restart cooldown
//! ```
//!
//! The first value after an idle period is emitted immediately (leading
//! edge).  Values arriving during the cooldown overwrite a single pending
//! slot; when the cooldown expires the most recent one is emitted (trailing
//! edge).  Memory per channel is constant regardless of input rate.
//!
//! A channel never owns a timer.  The caller asks for the next
//! [`deadline`][Channel::deadline] and calls [`flush`][Channel::flush] when it
//! passes, so dropping a channel cancels its pending emission outright.
//!
//! A zero interval degrades to pass-through.

use std::collections::BTreeMap;
use std::time::Duration;

use myobridge_types::{Payload, Stream};
use tokio::time::Instant;

// ─────────────────────────────────────────────────────────────────────────────
// Single channel
// ─────────────────────────────────────────────────────────────────────────────

/// Observable state of a [`Channel`] at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No emission within the last interval; the next value goes out at once.
    Idle,
    /// An emission happened recently and nothing is waiting.
    Cooldown,
    /// A value is held and will be emitted when the cooldown expires.
    Pending,
}

/// Leading-edge, trailing-flush rate limiter for a single stream.
#[derive(Debug)]
pub struct Channel<T> {
    interval: Duration,
    cooldown_until: Option<Instant>,
    pending: Option<T>,
}

impl<T> Channel<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cooldown_until: None,
            pending: None,
        }
    }

    pub fn state(&self, now: Instant) -> ChannelState {
        match (self.cooldown_until, &self.pending) {
            (_, Some(_)) => ChannelState::Pending,
            (Some(until), None) if now < until => ChannelState::Cooldown,
            _ => ChannelState::Idle,
        }
    }

    /// Offer `value` to the channel.
    ///
    /// Returns the value back when it should be emitted right away, or
    /// `None` when it has been parked in the pending slot.
    pub fn publish(&mut self, now: Instant, value: T) -> Option<T> {
        if self.interval.is_zero() {
            return Some(value);
        }
        match self.cooldown_until {
            Some(until) if now < until => {
                self.pending = Some(value);
                None
            }
            _ => {
                // Cooldown over: anything still parked is older than `value`.
                self.pending = None;
                self.cooldown_until = Some(now + self.interval);
                Some(value)
            }
        }
    }

    /// When the pending value is due, if one is held.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().and(self.cooldown_until)
    }

    /// Advance the state machine to `now`.
    ///
    /// Returns the held value if the cooldown has expired while a value was
    /// pending; the channel then re-enters cooldown.
    pub fn flush(&mut self, now: Instant) -> Option<T> {
        match self.cooldown_until {
            Some(until) if now >= until => match self.pending.take() {
                Some(value) => {
                    self.cooldown_until = Some(now + self.interval);
                    Some(value)
                }
                None => {
                    self.cooldown_until = None;
                    None
                }
            },
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel set
// ─────────────────────────────────────────────────────────────────────────────

/// The rate-limited channels for one generation of options.
///
/// Rebuilt from scratch on every reconfiguration; the old set (and any value
/// it was holding) is simply dropped.
#[derive(Debug)]
pub struct ChannelSet {
    generation: u64,
    channels: BTreeMap<Stream, Channel<Payload>>,
}

impl ChannelSet {
    pub fn new(interval: Duration, generation: u64) -> Self {
        Self {
            generation,
            channels: Stream::ALL
                .into_iter()
                .map(|stream| (stream, Channel::new(interval)))
                .collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self, stream: Stream, now: Instant) -> ChannelState {
        self.channels
            .get(&stream)
            .map_or(ChannelState::Idle, |c| c.state(now))
    }

    pub fn publish(&mut self, stream: Stream, now: Instant, payload: Payload) -> Option<Payload> {
        match self.channels.get_mut(&stream) {
            Some(channel) => channel.publish(now, payload),
            None => Some(payload),
        }
    }

    /// Earliest pending deadline across all channels.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.channels.values().filter_map(Channel::deadline).min()
    }

    /// Collect every pending value whose cooldown has expired by `now`.
    pub fn flush_due(&mut self, now: Instant) -> Vec<(Stream, Payload)> {
        self.channels
            .iter_mut()
            .filter_map(|(stream, channel)| channel.flush(now).map(|p| (*stream, p)))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
