//! [`Relay`] – the event loop tying the pieces together.
//!
//! ```text
//!  device events ──► normalize ──► ChannelSet ──► RelaySink
//!                      ▲   │ immediate ─────────────▲
//!                      │   └─ connect feedback ──► Device
//!  RelayHandle ──► Inbound ──► Dispatcher ───────► Device
//!                      └────► OptionStore ──► rebuild ChannelSet
//! ```
//!
//! Everything runs on one task.  The loop waits on three sources: the
//! earliest channel deadline, inbound messages from [`RelayHandle`]s, and
//! the device event stream.  Because channel timers are derived from the
//! live [`ChannelSet`], replacing the set on reconfiguration cancels every
//! pending emission of the old generation.

use std::sync::Arc;

use futures_util::StreamExt;
use myobridge_types::{BridgeError, Command, Options, OptionsConfig, OutboundEnvelope, Payload, RawEvent};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace};

use crate::channel::ChannelSet;
use crate::device::{Device, DeviceAction, spawn_action};
use crate::dispatcher::Dispatcher;
use crate::normalizer::{Route, feedback_for, normalize};
use crate::options::OptionStore;
use crate::sink::RelaySink;

/// Buffered inbound messages before senders wait.
const INBOUND_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Inbound messages
// ─────────────────────────────────────────────────────────────────────────────

/// A message for the relay from outside the device stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    Reconfigure(OptionsConfig),
}

/// Cloneable sender for commands and reconfigurations.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<Inbound>,
}

impl RelayHandle {
    pub async fn send(&self, message: Inbound) -> Result<(), BridgeError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BridgeError::Channel("relay has shut down".to_string()))
    }

    pub async fn command(&self, command: Command) -> Result<(), BridgeError> {
        self.send(Inbound::Command(command)).await
    }

    pub async fn reconfigure(&self, config: OptionsConfig) -> Result<(), BridgeError> {
        self.send(Inbound::Reconfigure(config)).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relay
// ─────────────────────────────────────────────────────────────────────────────

/// Normalizes, rate limits and republishes device events; dispatches
/// inbound commands.
pub struct Relay {
    device: Arc<dyn Device>,
    sink: Arc<dyn RelaySink>,
    store: OptionStore,
    options: Arc<Options>,
    channels: ChannelSet,
    dispatcher: Dispatcher,
    connected: bool,
    inbound: mpsc::Receiver<Inbound>,
    inbound_open: bool,
}

impl Relay {
    /// Build a relay whose first options generation is resolved from
    /// `initial`.  The relay starts disconnected.
    pub fn new(
        device: Arc<dyn Device>,
        sink: Arc<dyn RelaySink>,
        initial: &OptionsConfig,
    ) -> (Self, RelayHandle) {
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let store = OptionStore::new(initial);
        let options = store.current();
        let relay = Self {
            device,
            sink,
            channels: ChannelSet::new(options.interval, store.generation()),
            options,
            store,
            dispatcher: Dispatcher::new(),
            connected: false,
            inbound,
            inbound_open: true,
        };
        (relay, RelayHandle { tx })
    }

    /// Swap in a new device connection (after a reconnect).
    ///
    /// Options and the orientation offset carry over; the connection flag
    /// resets until the new device reports `connected`.
    pub fn attach(&mut self, device: Arc<dyn Device>) {
        self.device = device;
        self.connected = false;
    }

    pub fn options(&self) -> Arc<Options> {
        Arc::clone(&self.options)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Replace the options and rebuild every channel.
    ///
    /// Values parked in the old channels are dropped, not flushed.
    pub fn apply_options(&mut self, config: &OptionsConfig) {
        let options = self.store.apply(config);
        let dropped_pending = self.channels.next_deadline().is_some();
        self.channels = ChannelSet::new(options.interval, self.store.generation());
        info!(
            generation = self.channels.generation(),
            interval_ms = options.interval.as_millis() as u64,
            dropped_pending,
            "channels rebuilt"
        );
        self.options = options;
    }

    /// Process one raw device event observed at `now`.
    pub fn handle_event(&mut self, event: RawEvent, now: Instant) {
        trace!(event = event.name(), "raw event");
        match event {
            RawEvent::Connected => self.connected = true,
            RawEvent::Disconnected => self.connected = false,
            _ => {}
        }
        if let Some(action) = feedback_for(&event) {
            self.perform(action);
        }

        let options = Arc::clone(&self.options);
        match normalize(event, &options, self.dispatcher.orientation_mut()) {
            Route::Immediate(payload) => self.emit(payload),
            Route::Coalesced(stream, payload) => {
                if let Some(payload) = self.channels.publish(stream, now, payload) {
                    self.emit(payload);
                }
            }
            Route::Gated(stream) => trace!(stream = stream.name(), "stream disabled; event dropped"),
            Route::Unhandled => trace!("unhandled event dropped"),
        }
    }

    /// Dispatch an inbound command.
    pub fn handle_command(&mut self, command: &Command) {
        if let Some(action) = self.dispatcher.dispatch(command, self.connected) {
            self.perform(action);
        }
    }

    /// Emit every coalesced value whose cooldown has expired by `now`.
    pub fn flush_due(&mut self, now: Instant) {
        for (stream, payload) in self.channels.flush_due(now) {
            trace!(stream = stream.name(), "trailing flush");
            self.emit(payload);
        }
    }

    /// Drive the relay until `events` ends.
    ///
    /// The inbound side may close earlier; the relay then keeps forwarding
    /// device events on its own.
    pub async fn run<S>(&mut self, mut events: S) -> Result<(), BridgeError>
    where
        S: futures_util::Stream<Item = RawEvent> + Unpin,
    {
        info!(generation = self.store.generation(), "relay running");
        loop {
            let deadline = self.channels.next_deadline();
            tokio::select! {
                biased;

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush_due(Instant::now());
                }
                message = self.inbound.recv(), if self.inbound_open => match message {
                    Some(Inbound::Command(command)) => self.handle_command(&command),
                    Some(Inbound::Reconfigure(config)) => self.apply_options(&config),
                    None => {
                        debug!("inbound channel closed");
                        self.inbound_open = false;
                    }
                },
                event = events.next() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => {
                        info!("device event stream ended");
                        self.connected = false;
                        return Ok(());
                    }
                },
            }
        }
    }

    fn perform(&self, action: DeviceAction) {
        spawn_action(Arc::clone(&self.device), self.options.device_id, action);
    }

    fn emit(&self, payload: Payload) {
        let key = payload.channel_key();
        if let Err(e) = self.sink.publish(OutboundEnvelope::broadcast(payload)) {
            trace!(channel = key, error = %e, "envelope not delivered");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::event_stream;
    use crate::sink::{EnvelopeBus, EnvelopeReceiver};
    use async_trait::async_trait;
    use myobridge_types::{
        Action, IntervalValue, LifecycleEvent, Quaternion, StreamToggle, VibrationLength, Vector3,
    };
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    #[derive(Default)]
    struct MockDevice {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockDevice {
        fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(BridgeError::DeviceUnavailable("armband out of range".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Device for MockDevice {
        async fn vibrate(&self, device_id: u32, length: VibrationLength) -> Result<(), BridgeError> {
            self.record(format!("vibrate:{device_id}:{}", length.as_str()))
        }

        async fn request_bluetooth_strength(&self, device_id: u32) -> Result<(), BridgeError> {
            self.record(format!("rssi:{device_id}"))
        }
    }

    struct Harness {
        events: mpsc::Sender<RawEvent>,
        handle: RelayHandle,
        rx: EnvelopeReceiver,
        device: Arc<MockDevice>,
        task: JoinHandle<Result<(), BridgeError>>,
    }

    impl Harness {
        fn start(config: OptionsConfig) -> Self {
            Self::with_device(config, MockDevice::default())
        }

        fn with_device(config: OptionsConfig, device: MockDevice) -> Self {
            let bus = EnvelopeBus::default();
            let rx = bus.subscribe();
            let device = Arc::new(device);
            let (mut relay, handle) = Relay::new(device.clone(), Arc::new(bus), &config);
            let (events, events_rx) = mpsc::channel(64);
            let task = tokio::spawn(async move { relay.run(event_stream(events_rx)).await });
            Self { events, handle, rx, device, task }
        }

        async fn send(&self, event: RawEvent) {
            self.events.send(event).await.expect("relay alive");
        }

        async fn next(&mut self) -> Option<Payload> {
            timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .ok()
                .flatten()
                .map(|envelope| envelope.payload)
        }

        /// `true` if nothing is published within `window`.
        async fn quiet_for(&mut self, window: Duration) -> bool {
            timeout(window, self.rx.recv()).await.is_err()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn streams(interval_ms: i64, orientation: bool, gyroscope: bool) -> OptionsConfig {
        OptionsConfig {
            interval: Some(IntervalValue::Millis(interval_ms)),
            orientation: Some(StreamToggle { enabled: orientation }),
            gyroscope: Some(StreamToggle { enabled: gyroscope }),
            ..OptionsConfig::default()
        }
    }

    fn orientation(w: f64) -> RawEvent {
        RawEvent::Orientation(Quaternion::new(w, 0.0, 0.0, 0.0))
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_forwarded_and_vibrates() {
        let mut h = Harness::start(OptionsConfig::default());
        h.send(RawEvent::Connected).await;

        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Connected)));
        settle().await;
        assert_eq!(h.device.calls(), vec!["vibrate:0:short".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_in_cooldown_emits_last_value_once() {
        let mut h = Harness::start(streams(100, true, false));

        h.send(orientation(0.1)).await;
        assert_eq!(h.next().await, Some(Payload::Orientation(Quaternion::new(0.1, 0.0, 0.0, 0.0))));

        let start = Instant::now();
        for w in [0.2, 0.3, 0.4, 0.5] {
            h.send(orientation(w)).await;
        }
        assert_eq!(h.next().await, Some(Payload::Orientation(Quaternion::new(0.5, 0.0, 0.0, 0.0))));
        assert!(Instant::now() - start >= Duration::from_millis(100));
        assert!(h.quiet_for(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_events_bypass_rate_limiting() {
        let mut h = Harness::start(streams(1_000, true, true));
        for event in [RawEvent::Locked, RawEvent::Unlocked, RawEvent::Locked] {
            h.send(event).await;
        }
        let start = Instant::now();
        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Locked)));
        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Unlocked)));
        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Locked)));
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_stream_is_silent_until_reenabled() {
        let mut h = Harness::start(OptionsConfig::default());
        let g = Vector3::new(10.0, 0.0, -3.0);

        for _ in 0..3 {
            h.send(RawEvent::Gyroscope(g)).await;
        }
        h.send(RawEvent::BatteryLevel(50)).await;
        // Order is preserved, so the sentinel arriving first proves the
        // gyroscope readings were dropped.
        assert_eq!(h.next().await, Some(Payload::BatteryLevel(50)));

        h.handle.reconfigure(streams(100, false, true)).await.unwrap();
        settle().await;

        let g2 = Vector3::new(11.0, 0.0, -3.0);
        h.send(RawEvent::Gyroscope(g)).await;
        h.send(RawEvent::Gyroscope(g2)).await;
        assert_eq!(h.next().await, Some(Payload::Gyroscope(g)));
        assert_eq!(h.next().await, Some(Payload::Gyroscope(g2)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_orientation_offsets_later_readings() {
        let mut h = Harness::start(streams(100, true, false));
        h.send(RawEvent::Connected).await;
        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Connected)));

        h.send(RawEvent::Orientation(Quaternion::IDENTITY)).await;
        assert_eq!(h.next().await, Some(Payload::Orientation(Quaternion::IDENTITY)));

        h.handle.command(Command::new(Action::ZeroOrientation)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        h.send(RawEvent::Orientation(Quaternion::IDENTITY)).await;
        assert_eq!(
            h.next().await,
            Some(Payload::Orientation(Quaternion::new(2.0, 0.0, 0.0, 0.0)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commands_reach_the_device_when_connected() {
        let mut h = Harness::start(OptionsConfig { id: Some(3), ..OptionsConfig::default() });
        h.send(RawEvent::Connected).await;
        h.next().await;

        h.handle.command(Command::new(Action::Vibrate)).await.unwrap();
        h.handle.command(Command::vibrate("long")).await.unwrap();
        h.handle.command(Command::new(Action::RequestBluetoothStrength)).await.unwrap();
        h.handle.command(Command::new(Action::Unrecognized)).await.unwrap();
        settle().await;

        assert_eq!(
            h.device.calls(),
            vec![
                "vibrate:3:short".to_string(),
                "vibrate:3:short".to_string(),
                "vibrate:3:long".to_string(),
                "rssi:3".to_string(),
            ]
        );

        // The reading comes back later as an ordinary event.
        h.send(RawEvent::BluetoothStrength(-58)).await;
        assert_eq!(h.next().await, Some(Payload::BluetoothStrength(-58)));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_dropped_while_disconnected() {
        let mut h = Harness::start(OptionsConfig::default());
        h.handle.command(Command::vibrate("medium")).await.unwrap();
        settle().await;
        assert!(h.device.calls().is_empty());

        h.send(RawEvent::Connected).await;
        h.send(RawEvent::Disconnected).await;
        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Connected)));
        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Disconnected)));

        h.handle.command(Command::new(Action::RequestBluetoothStrength)).await.unwrap();
        settle().await;
        // Only the connect feedback went out.
        assert_eq!(h.device.calls(), vec!["vibrate:0:short".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn device_failure_does_not_block_telemetry() {
        let mut h = Harness::with_device(streams(100, true, false), MockDevice::failing());
        h.send(RawEvent::Connected).await;
        h.send(RawEvent::Orientation(Quaternion::IDENTITY)).await;

        assert_eq!(h.next().await, Some(Payload::Event(LifecycleEvent::Connected)));
        assert_eq!(h.next().await, Some(Payload::Orientation(Quaternion::IDENTITY)));

        h.handle.command(Command::vibrate("short")).await.unwrap();
        h.send(RawEvent::BatteryLevel(12)).await;
        assert_eq!(h.next().await, Some(Payload::BatteryLevel(12)));
        settle().await;
        assert_eq!(h.device.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfiguration_cancels_pending_emission() {
        let mut h = Harness::start(streams(1_000, true, false));

        h.send(orientation(0.1)).await;
        assert!(h.next().await.is_some());
        h.send(orientation(0.2)).await;
        settle().await;

        h.handle.reconfigure(streams(200, true, false)).await.unwrap();
        settle().await;

        // The rebuilt channel is idle: the next reading goes straight out.
        let start = Instant::now();
        h.send(orientation(0.3)).await;
        assert_eq!(h.next().await, Some(Payload::Orientation(Quaternion::new(0.3, 0.0, 0.0, 0.0))));
        assert_eq!(Instant::now(), start);

        // The value parked before the rebuild never surfaces.
        assert!(h.quiet_for(Duration::from_secs(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_events_are_dropped() {
        let mut h = Harness::start(streams(100, true, true));
        h.send(RawEvent::Unknown("emg".into())).await;
        h.send(RawEvent::BatteryLevel(99)).await;
        assert_eq!(h.next().await, Some(Payload::BatteryLevel(99)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_when_event_stream_ends() {
        let h = Harness::start(OptionsConfig::default());
        h.send(RawEvent::Connected).await;
        drop(h.events);
        let result = timeout(Duration::from_secs(1), h.task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_inbound_does_not_stop_relay() {
        let Harness { events, handle, mut rx, task, .. } = Harness::start(OptionsConfig::default());
        drop(handle);
        settle().await;
        events.send(RawEvent::ArmSynced).await.unwrap();
        let envelope = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.payload, Payload::Event(LifecycleEvent::ArmSynced));
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_options_rebuilds_channels_synchronously() {
        let bus = EnvelopeBus::default();
        let mut rx = bus.subscribe();
        let (mut relay, _handle) =
            Relay::new(Arc::new(MockDevice::default()), Arc::new(bus), &streams(500, true, false));
        let t0 = Instant::now();

        relay.handle_event(orientation(1.0), t0);
        relay.handle_event(orientation(2.0), t0);
        assert!(rx.try_recv().is_some());

        relay.apply_options(&streams(50, true, false));
        assert_eq!(relay.options().interval, Duration::from_millis(50));

        relay.flush_due(t0 + Duration::from_secs(1));
        assert!(rx.try_recv().is_none());

        relay.attach(Arc::new(MockDevice::default()));
        assert!(!relay.is_connected());
    }
}
