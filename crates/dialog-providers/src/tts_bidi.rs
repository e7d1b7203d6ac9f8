//! Bidirectional (streaming) TTS adapter: one websocket connection shared across an entire
//! dialog session, with one TTS session opened per connection.
//!
//! Handshake order is Start-Connection -> Connection-Started -> Start-Session -> Session-Started,
//! then any number of Task-Request/audio-frame round trips, then Finish-Session ->
//! Finish-Connection -> Connection-Finished.
//!
//! The session splits its socket into independent sink and stream halves so a sender task
//! and a receiver task can drive it concurrently; each half is serialized by its own mutex,
//! per the adapter-internal-mutex requirement on provider sockets.

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

mod event {
    pub const START_CONNECTION: i32 = 1;
    pub const FINISH_CONNECTION: i32 = 2;
    pub const CONNECTION_STARTED: i32 = 50;
    pub const CONNECTION_FAILED: i32 = 51;
    pub const CONNECTION_FINISHED: i32 = 52;
    pub const START_SESSION: i32 = 100;
    pub const FINISH_SESSION: i32 = 102;
    pub const SESSION_STARTED: i32 = 150;
    pub const SESSION_FINISHED: i32 = 152;
    pub const SESSION_FAILED: i32 = 153;
    pub const TASK_REQUEST: i32 = 200;
    pub const TTS_SENTENCE_START: i32 = 350;
    pub const TTS_SENTENCE_END: i32 = 351;
    pub const TTS_RESPONSE: i32 = 352;
}

/// Bidirectional TTS adapter, constructed once per provider configuration.
#[derive(Debug, Clone)]
pub struct TtsBidi {
    config: TtsConfig,
}

impl TtsBidi {
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
    pub async fn dial(&self) -> Result<TtsBidiSession> {
        let mut request = self
            .config
            .url_bidi
            .clone()
            .into_client_request()
            .map_err(ProviderError::WebSocket)?;
        let headers = request.headers_mut();
        headers.insert(
            "X-Api-App-Key",
            HeaderValue::from_str(&self.config.app_key)
                .map_err(|e| ProviderError::Config(e.to_string()))?,
        );
        headers.insert(
            "X-Api-Access-Key",
            HeaderValue::from_str(self.config.access_key())
                .map_err(|e| ProviderError::Config(e.to_string()))?,
        );
        headers.insert(
            "X-Api-Resource-Id",
            HeaderValue::from_str(&self.config.resource_id)
                .map_err(|e| ProviderError::Config(e.to_string()))?,
        );
        headers.insert(
            "X-Api-Connect-Id",
            HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
                .map_err(|e| ProviderError::Config(e.to_string()))?,
        );

        let (socket, _response) = connect_async(request).await?;
        let (sink, stream) = socket.split();
        Ok(TtsBidiSession {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            speaker: self.config.speaker.clone(),
            session_id: uuid::Uuid::new_v4().to_string(),
            closed: AtomicBool::new(true),
        })
    }
}

/// One TTS session over an open websocket. Safe to call from one sender task and one
/// receiver task concurrently: `send_text` locks only the sink, `receive_audio` only the
/// stream.
#[derive(Debug)]
pub struct TtsBidiSession {
    sink: Mutex<SplitSink<Socket, WsMessage>>,
    stream: Mutex<SplitStream<Socket>>,
    speaker: String,
    session_id: String,
    closed: AtomicBool,
}

impl TtsBidiSession {
    /// Perform the connection and session handshake. Must be called exactly once before
    /// [`TtsBidiSession::send_text`] or [`TtsBidiSession::receive_audio`].
    ///
    /// # Errors
    ///
    /// Returns an error if either handshake step is rejected or times out.
    pub async fn start(&self) -> Result<()> {
        self.write_event(MessageType::FullClientRequest, event::START_CONNECTION, serde_json::json!({}))
            .await?;
        self.expect_event(event::CONNECTION_STARTED).await?;

        let payload = serde_json::json!({
            "event": event::START_SESSION,
            "namespace": "BidirectionalTTS",
            "req_params": {
                "speaker": self.speaker,
                "audio_params": { "format": "pcm", "sample_rate": 24000, "speech_rate": 14 },
            },
        });
        self.write_event(MessageType::FullClientRequest, event::START_SESSION, payload).await?;
        self.expect_event(event::SESSION_STARTED).await?;
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Submit one utterance of text for synthesis.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let payload = serde_json::json!({
            "event": event::TASK_REQUEST,
            "namespace": "BidirectionalTTS",
            "req_params": {
                "text": text,
                "speaker": self.speaker,
                "audio_params": { "format": "pcm", "sample_rate": 24000 },
            },
        });
        self.write_event(MessageType::FullClientRequest, event::TASK_REQUEST, payload).await
    }

    /// Receive the next audio chunk, or `None` once the provider signals the turn is finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying frame cannot be decoded or the provider reports an
    /// error frame.
    pub async fn receive_audio(&self) -> Result<Option<Bytes>> {
        loop {
            let frame = self.read_frame().await?;
            let event_num = frame.payload_json().ok().and_then(|v| v["event"].as_i64());
            match frame.header.msg_type {
                MessageType::AudioOnlyServer => return Ok(Some(Bytes::from(frame.payload))),
                MessageType::FullServerResponse => {
                    if event_num == Some(i64::from(event::SESSION_FINISHED))
                        || event_num == Some(i64::from(event::SESSION_FAILED))
                    {
                        return Ok(None);
                    }
                    // Sentence-start/end/bookkeeping frames carry no audio; keep reading.
                    continue;
                }
                other => {
                    return Err(ProviderError::Protocol(format!(
                        "unexpected message type during audio receive: {other:?}"
                    )))
                }
            }
        }
    }

    /// Close the session and the underlying connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails; the socket is still closed.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.write_event(MessageType::FullClientRequest, event::FINISH_SESSION, serde_json::json!({}))
            .await?;
        self.write_event(
            MessageType::FullClientRequest,
            event::FINISH_CONNECTION,
            serde_json::json!({}),
        )
        .await?;
        let _ = self.expect_event(event::CONNECTION_FINISHED).await;
        self.sink.lock().await.close().await.map_err(ProviderError::WebSocket)
    }

    async fn write_event(
        &self,
        msg_type: MessageType,
        event_num: i32,
        mut payload: serde_json::Value,
    ) -> Result<()> {
        if let Some(obj) = payload.as_object_mut() {
            obj.entry("event").or_insert(serde_json::json!(event_num));
            obj.entry("session_id").or_insert(serde_json::json!(self.session_id));
        }
        let bytes = encode_simple(msg_type, CompressionBit::None, &payload)?;
        self.sink.lock().await.send(WsMessage::Binary(bytes.into())).await.map_err(ProviderError::WebSocket)
    }

    async fn read_frame(&self) -> Result<Frame> {
        let mut stream = self.stream.lock().await;
        loop {
            let message = stream
                .next()
                .await
                .ok_or_else(|| ProviderError::StreamClosed("tts-bidi socket closed".into()))??;
            match message {
                WsMessage::Binary(bytes) => return Ok(decode(&bytes)?),
                WsMessage::Text(text) => return Ok(decode(text.as_bytes())?),
                WsMessage::Close(_) => {
                    return Err(ProviderError::StreamClosed("tts-bidi socket closed".into()))
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            }
        }
    }

    async fn expect_event(&self, expected: i32) -> Result<()> {
        let frame = self.read_frame().await?;
        let got = frame.payload_json().ok().and_then(|v| v["event"].as_i64());
        if got == Some(i64::from(expected)) {
            Ok(())
        } else {
            Err(ProviderError::EventNotReceived { expected })
        }
    }
}
