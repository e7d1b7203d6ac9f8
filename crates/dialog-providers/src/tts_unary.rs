//! Unary TTS adapter: one websocket connection held for the whole dialog session, submitting
//! one complete utterance per `send_text` call and reading its synthesized audio until the
//! provider's terminal (negative-sequence) frame — as opposed to [`crate::tts_bidi`]'s
//! continuous per-token streaming. Used when the language variant is dialect-only and no
//! bidirectional stream is available for it.
//!
//! Requests are framed with [`dialog_protocol::encode_simple`] (no sequence number on the
//! client side); the provider's audio responses still carry their own sequence number, which
//! [`dialog_protocol::decode`] recovers to detect the terminal frame of each utterance.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use dialog_protocol::{decode, encode_simple, CompressionBit, Frame, MessageType};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::TtsConfig;
use crate::error::{ProviderError, Result};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Unary TTS adapter, constructed once per provider configuration.
#[derive(Debug, Clone)]
pub struct TtsUnary {
    config: TtsConfig,
}

impl TtsUnary {
    /// Create a new adapter from the given configuration.
    #[must_use]
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }

    /// Open the websocket and return a fresh, unstarted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the websocket handshake fails.
    pub async fn dial(&self) -> Result<TtsUnarySession> {
        let mut request = self
            .config
            .url_unary
            .clone()
            .into_client_request()
            .map_err(ProviderError::WebSocket)?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer;{}", self.config.access_key()))
                .map_err(|e| ProviderError::Config(e.to_string()))?,
        );

        let (socket, _response) = connect_async(request).await?;
        let (sink, stream) = socket.split();
        Ok(TtsUnarySession {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            app_key: self.config.app_key.clone(),
            resource_id: self.config.resource_id.clone(),
            speaker: self.config.speaker.clone(),
            req_id: uuid::Uuid::new_v4().to_string(),
            uid: uuid::Uuid::new_v4().to_string(),
            closed: AtomicBool::new(true),
        })
    }
}

/// One unary TTS session over an open websocket, spanning the whole dialog session. Safe to
/// call from one sender task and one receiver task concurrently.
#[derive(Debug)]
pub struct TtsUnarySession {
    sink: Mutex<SplitSink<Socket, WsMessage>>,
    stream: Mutex<SplitStream<Socket>>,
    app_key: String,
    resource_id: String,
    speaker: String,
    req_id: String,
    uid: String,
    closed: AtomicBool,
}

impl TtsUnarySession {
    /// Prepare the request template. Unlike [`crate::tts_bidi::TtsBidiSession::start`], no
    /// handshake round-trip is required before the first [`TtsUnarySession::send_text`].
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for parity with the bidirectional session's surface.
    pub async fn start(&self) -> Result<()> {
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Submit one complete utterance for synthesis.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let payload = serde_json::json!({
            "app": { "appid": self.app_key, "token": "access_token", "cluster": self.resource_id },
            "user": { "uid": self.uid },
            "audio": {
                "voice_type": self.speaker,
                "encoding": "pcm",
                "rate": 24000,
                "speed_ratio": 1.0,
                "volume_ratio": 1.0,
                "pitch_ratio": 1.0,
            },
            "request": { "reqid": self.req_id, "text": text, "text_type": "plain", "operation": "submit" },
        });
        let bytes = encode_simple(MessageType::FullClientRequest, CompressionBit::Gzip, &payload)?;
        self.sink.lock().await.send(WsMessage::Binary(bytes.into())).await.map_err(ProviderError::WebSocket)
    }

    /// Receive the next audio chunk of the current utterance, or `None` once the provider's
    /// terminal (negative-sequence) frame is observed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying frame cannot be decoded or the provider reports an
    /// error frame.
    pub async fn receive_audio(&self) -> Result<Option<Bytes>> {
        loop {
            let frame = self.read_frame().await?;
            match frame.header.msg_type {
                MessageType::AudioOnlyServer => {
                    if frame.is_terminal() {
                        return Ok(if frame.payload.is_empty() {
                            None
                        } else {
                            Some(Bytes::from(frame.payload))
                        });
                    }
                    if frame.payload.is_empty() {
                        continue;
                    }
                    return Ok(Some(Bytes::from(frame.payload)));
                }
                MessageType::FrontendServer => continue,
                other => {
                    return Err(ProviderError::Protocol(format!(
                        "unexpected message type during unary audio receive: {other:?}"
                    )))
                }
            }
        }
    }

    /// Close the underlying websocket. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sink.lock().await.close().await.map_err(ProviderError::WebSocket)
    }

    async fn read_frame(&self) -> Result<Frame> {
        let mut stream = self.stream.lock().await;
        loop {
            let message = stream
                .next()
                .await
                .ok_or_else(|| ProviderError::StreamClosed("tts-unary socket closed".into()))??;
            match message {
                WsMessage::Binary(bytes) => return Ok(decode(&bytes)?),
                WsMessage::Close(_) => {
                    return Err(ProviderError::StreamClosed("tts-unary socket closed".into()))
                }
                WsMessage::Text(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
                    continue
                }
            }
        }
    }
}
