//! `myobridge` – relays a Myo armband onto a line-oriented pub/sub bus.
//!
//! The binary:
//!
//! 1. Loads `~/.myobridge/config.toml`, writing the defaults on first run.
//! 2. Connects to Myo Connect, retrying with a fixed delay, and optionally
//!    unlocks the armband so poses keep streaming.
//! 3. Writes every outbound envelope to stdout as one JSON line.
//! 4. Reads `{"command": ..}` and `{"options": ..}` lines from stdin.
//! 5. Reconnects on socket loss or when a reconfiguration carries a new
//!    `ipAddress`, keeping options and the orientation offset.
//!
//! `myobridge schema` prints the JSON Schemas of the inbound payloads and
//! exits.

mod config;
mod inbound;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use myobridge_device::{MyoConnect, UnlockMode};
use myobridge_relay::{EnvelopeBus, EnvelopeReceiver, Relay, RelayHandle};
use myobridge_types::{BridgeError, DEFAULT_INTERVAL, Options, RawEvent, schema};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() {
    if std::env::args().nth(1).as_deref() == Some("schema") {
        print_schemas();
        return;
    }

    let guard = telemetry::init_tracing("myobridge");

    let cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => info!(path = %config::config_path().display(), "wrote default config"),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(error = %e, "configuration error");
            drop(guard);
            std::process::exit(2);
        }
    };

    let code = tokio::select! {
        result = run(cfg) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "bridge stopped");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received; shutting down");
            0
        }
    };

    // The stdin reader sits on a blocking thread that would hold up runtime
    // shutdown, so exit directly once spans are flushed.
    drop(guard);
    std::process::exit(code);
}

fn print_schemas() {
    let schemas = serde_json::json!({
        "message": schema::message_schema(),
        "options": schema::options_schema(),
    });
    match serde_json::to_string_pretty(&schemas) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("[myobridge] could not render schemas: {e}"),
    }
}

/// Connect, relay, and reconnect until shut down.
///
/// The connection is re-established when the socket drops or when a
/// reconfiguration names a different Myo Connect host.
async fn run(cfg: Config) -> Result<(), BridgeError> {
    let delay = Duration::from_millis(cfg.reconnect_delay_ms);
    let initial_host = cfg.options.ip_address.clone().unwrap_or_else(|| cfg.ip_address.clone());
    let (host_tx, mut host) = watch::channel(initial_host);

    let bus = EnvelopeBus::default();
    tokio::spawn(write_envelopes(bus.subscribe()));

    let device_id = Options::resolve(&cfg.options, DEFAULT_INTERVAL).device_id;
    let (device, mut events) = connect_with_retry(&mut host, &cfg, delay, device_id).await;

    let (mut relay, handle) = Relay::new(device, Arc::new(bus), &cfg.options);
    tokio::spawn(forward_stdin(handle, host_tx));

    loop {
        let moved = tokio::select! {
            result = relay.run(events) => {
                result?;
                false
            }
            Ok(()) = host.changed() => true,
        };
        if moved {
            info!(host = %*host.borrow(), "Myo Connect host changed; reconnecting");
        } else {
            warn!(delay_ms = cfg.reconnect_delay_ms, "lost Myo Connect; reconnecting");
            tokio::time::sleep(delay).await;
        }

        let device_id = relay.options().device_id;
        let (device, next) = connect_with_retry(&mut host, &cfg, delay, device_id).await;
        relay.attach(device);
        events = next;
    }
}

/// Keep trying the current host every `delay` until the handshake succeeds.
async fn connect_with_retry(
    host: &mut watch::Receiver<String>,
    cfg: &Config,
    delay: Duration,
    device_id: u32,
) -> (Arc<MyoConnect>, BoxStream<'static, RawEvent>) {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let url = MyoConnect::url_for(&host.borrow_and_update(), cfg.port);
        match MyoConnect::connect(&url).await {
            Ok((client, events)) => {
                if cfg.unlock_on_connect
                    && let Err(e) = client.unlock(device_id, UnlockMode::Hold).await
                {
                    warn!(error = %e, "unlock after connect failed");
                }
                return (Arc::new(client), events);
            }
            Err(e) => {
                warn!(attempt, url = %url, error = %e, "Myo Connect unreachable; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Write each envelope to stdout as one JSON line.
async fn write_envelopes(mut envelopes: EnvelopeReceiver) {
    let mut stdout = tokio::io::stdout();
    while let Some(envelope) = envelopes.recv().await {
        let mut line = match serde_json::to_vec(&envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "envelope not serializable");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            error!(error = %e, "stdout closed; envelope writer stopping");
            return;
        }
        if let Err(e) = stdout.flush().await {
            error!(error = %e, "stdout flush failed; envelope writer stopping");
            return;
        }
    }
}

/// Feed stdin lines into the relay until EOF, publishing host changes to
/// the connection loop.
async fn forward_stdin(handle: RelayHandle, host: watch::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        match inbound::parse_line(&line) {
            Ok(Some(message)) => {
                let next_host = inbound::requested_address(&message).map(str::to_owned);
                if handle.send(message).await.is_err() {
                    break;
                }
                if let Some(next_host) = next_host {
                    host.send_if_modified(|current| {
                        let changed = *current != next_host;
                        if changed {
                            *current = next_host;
                        }
                        changed
                    });
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring malformed inbound line"),
        }
    }
    debug!("stdin closed");
}
