//! `myobridge-relay` – event normalization and rate-limiting relay.
//!
//! Sits between an armband's raw event stream and a pub/sub bus:
//!
//! - [`options`] – [`OptionStore`]: the active options snapshot, replaced
//!   wholesale on every reconfiguration.
//! - [`normalizer`] – raw event → canonical payload, gated per stream.
//! - [`channel`] – [`Channel`]: leading-edge, trailing-flush rate limiter,
//!   one per high-frequency stream.
//! - [`dispatcher`] – [`Dispatcher`]: inbound commands → device actions, and
//!   the orientation offset.
//! - [`device`] – the [`Device`] trait the relay drives.
//! - [`sink`] – the [`RelaySink`] trait and the broadcast [`EnvelopeBus`].
//! - [`relay`] – [`Relay`]: the single-task event loop wiring it together.

pub mod channel;
pub mod device;
pub mod dispatcher;
pub mod normalizer;
pub mod options;
pub mod relay;
pub mod sink;

pub use channel::{Channel, ChannelSet, ChannelState};
pub use device::{Device, DeviceAction, event_stream, spawn_action};
pub use dispatcher::{Dispatcher, OrientationReference};
pub use normalizer::{Route, normalize};
pub use options::OptionStore;
pub use relay::{Inbound, Relay, RelayHandle};
pub use sink::{EnvelopeBus, EnvelopeReceiver, RelaySink};
