//! [`MyoConnect`] – WebSocket client for the Myo Connect daemon.
//!
//! [`MyoConnect::connect`] opens the socket and returns two halves:
//!
//! * the client itself, which implements [`Device`] and writes command
//!   frames;
//! * a stream of decoded [`RawEvent`]s fed by a background reader task.
//!   The stream ends when the socket closes.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{SinkExt, StreamExt};
use myobridge_relay::{Device, event_stream};
use myobridge_types::{BridgeError, RawEvent, VibrationLength};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::codec::{DeviceCommand, FrameDecoder, UnlockMode};

/// Port Myo Connect listens on by default.
pub const DEFAULT_PORT: u16 = 10138;

/// Decoded events buffered between the socket reader and the relay.
const EVENT_BUFFER: usize = 256;

type Writer = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// A live connection to Myo Connect.
pub struct MyoConnect {
    writer: Mutex<Writer>,
}

impl MyoConnect {
    /// WebSocket URL of the Myo Connect API on `ip_address:port`.
    pub fn url_for(ip_address: &str, port: u16) -> String {
        format!("ws://{ip_address}:{port}/myo/3")
    }

    /// Connect to `url` and start decoding events.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<(Self, BoxStream<'static, RawEvent>), BridgeError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| BridgeError::Transport(format!("connect to {url}: {e}")))?;
        info!(url, "connected to Myo Connect");

        let (writer, mut reader) = ws.split();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader_url = url.to_string();

        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            while let Some(frame) = reader.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(url = %reader_url, error = %e, "websocket read error");
                        break;
                    }
                };
                let events = match decoder.decode(text.as_str()) {
                    Ok(events) => events,
                    Err(e) => {
                        debug!(error = %e, "undecodable frame skipped");
                        continue;
                    }
                };
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            info!(url = %reader_url, "Myo Connect socket closed");
        });

        let client = Self {
            writer: Mutex::new(writer),
        };
        Ok((client, event_stream(rx)))
    }

    /// Unlock armband `myo` so it keeps reporting poses.
    ///
    /// [`UnlockMode::Timed`] relocks after the armband's built-in timeout,
    /// which Myo Connect does not let callers change.
    pub async fn unlock(&self, myo: u32, mode: UnlockMode) -> Result<(), BridgeError> {
        self.send(myo, DeviceCommand::Unlock(mode)).await
    }

    async fn send(&self, myo: u32, command: DeviceCommand) -> Result<(), BridgeError> {
        let frame = command.encode(myo);
        self.writer
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| BridgeError::DeviceAction {
                action: format!("{command:?}"),
                details: e.to_string(),
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Device for MyoConnect {
    async fn vibrate(&self, device_id: u32, length: VibrationLength) -> Result<(), BridgeError> {
        self.send(device_id, DeviceCommand::Vibrate(length)).await
    }

    async fn request_bluetooth_strength(&self, device_id: u32) -> Result<(), BridgeError> {
        self.send(device_id, DeviceCommand::RequestRssi).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
