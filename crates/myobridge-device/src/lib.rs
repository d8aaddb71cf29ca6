//! `myobridge-device` – Myo Connect transport.
//!
//! Talks to the Myo Connect daemon over its local WebSocket API and exposes
//! the armband to the relay:
//!
//! - [`codec`] – frame decoder ([`FrameDecoder`]) and command encoder
//!   ([`DeviceCommand`]).
//! - [`client`] – [`MyoConnect`], the connection handle implementing
//!   [`myobridge_relay::Device`].

pub mod client;
pub mod codec;

pub use client::{DEFAULT_PORT, MyoConnect};
pub use codec::{DeviceCommand, FrameDecoder, UnlockMode};
