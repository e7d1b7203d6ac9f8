//! Bidirectional (streaming) ASR adapter: one websocket per dialog session, PCM chunks in,
//! incremental transcripts out.
//!
//! Single-channel PCM, 16kHz, 16-bit, gzip-compressed JSON control frames and raw (gzip'd)
//! audio frames, following the shared sequenced wire format in [`dialog_protocol`]. The
//! session splits its socket so the `listen` and `recognise` tasks can drive it
//! concurrently, one sending audio, the other receiving transcripts.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use dialog_protocol::{decode, encode_sequenced, encode_sequenced_raw, CodecError, CompressionBit, MessageType};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::AsrConfig;
use crate::error::{ProviderError, Result};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One incremental (or final) transcript fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsrResult {
    /// Recognized text so far for the current utterance.
    pub text: String,
    /// `true` once the provider considers this utterance's recognition final.
    pub is_final: bool,
}

/// Bidirectional ASR adapter.
#[derive(Debug, Clone)]
pub struct AsrBidi {
    config: AsrConfig,
}

impl AsrBidi {
    /// Create a new adapter from the given configuration.
    #[must_use]
    pub fn new(config: AsrConfig) -> Self {
        Self { config }
    }

    /// Open the websocket and send the recognition configuration handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    pub async fn dial(&self) -> Result<AsrSession> {
        let mut request =
            self.config.url.clone().into_client_request().map_err(ProviderError::WebSocket)?;
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
        let session = AsrSession {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            seq: AtomicI32::new(1),
            closed: AtomicBool::new(false),
        };
        session.start().await?;
        Ok(session)
    }
}

/// One ASR recognition session over an open websocket. Safe to call from one sender task
/// (`send_audio`/`last`) and one receiver task (`recv_result`) concurrently.
#[derive(Debug)]
pub struct AsrSession {
    sink: Mutex<SplitSink<Socket, WsMessage>>,
    stream: Mutex<SplitStream<Socket>>,
    seq: AtomicI32,
    closed: AtomicBool,
}

impl AsrSession {
    async fn start(&self) -> Result<()> {
        let payload = serde_json::json!({
            "user": { "uid": "dialog-session" },
            "audio": {
                "format": "pcm",
                "sample_rate": 16000,
                "bits": 16,
                "channels": 1,
                "codec": "raw",
            },
            "request": {
                "model_name": "bigmodel",
                "enable_punc": true,
                "result_type": "single",
            },
        });
        let seq = self.seq.load(Ordering::SeqCst);
        let frame = encode_sequenced(MessageType::FullClientRequest, CompressionBit::Gzip, seq, &payload)?;
        self.sink.lock().await.send(WsMessage::Binary(frame.into())).await.map_err(ProviderError::WebSocket)
    }

    /// Stream one chunk of raw PCM audio to the recognizer.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub async fn send_audio(&self, data: &[u8]) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = encode_sequenced_raw(MessageType::AudioOnlyRequest, CompressionBit::Gzip, seq, data)?;
        self.sink.lock().await.send(WsMessage::Binary(frame.into())).await.map_err(ProviderError::WebSocket)
    }

    /// Send the final audio frame with a negative sequence number, signalling the provider
    /// to flush and finish recognition of the current utterance.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub async fn last(&self) -> Result<()> {
        let prior = self.seq.load(Ordering::SeqCst);
        let seq = -(prior.abs() + 1);
        self.seq.store(seq, Ordering::SeqCst);
        let frame = encode_sequenced_raw(MessageType::AudioOnlyRequest, CompressionBit::Gzip, seq, b"")?;
        self.sink.lock().await.send(WsMessage::Binary(frame.into())).await.map_err(ProviderError::WebSocket)
    }

    /// Receive the next transcript fragment, or `None` once the provider sends its terminal
    /// (negative-sequence) frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying frame cannot be decoded, the socket closes
    /// unexpectedly, or the provider reports an error frame.
    pub async fn recv_result(&self) -> Result<Option<AsrResult>> {
        loop {
            let bytes = {
                let mut stream = self.stream.lock().await;
                let message = stream
                    .next()
                    .await
                    .ok_or_else(|| ProviderError::StreamClosed("asr-bidi socket closed".into()))??;
                match message {
                    WsMessage::Binary(bytes) => bytes,
                    WsMessage::Close(_) => {
                        return Err(ProviderError::StreamClosed("asr-bidi socket closed".into()))
                    }
                    WsMessage::Text(_)
                    | WsMessage::Ping(_)
                    | WsMessage::Pong(_)
                    | WsMessage::Frame(_) => continue,
                }
            };

            let frame = match decode(&bytes) {
                Ok(frame) => frame,
                Err(CodecError::ServerError { code, message }) => {
                    return Err(ProviderError::Status {
                        status: code.try_into().unwrap_or(u16::MAX),
                        body_preview: message,
                    })
                }
                Err(e) => return Err(ProviderError::Codec(e)),
            };

            if frame.is_terminal() {
                return Ok(None);
            }

            let payload = frame.payload_json()?;
            let text = payload["result"]["text"].as_str().unwrap_or_default().to_string();
            let is_final = payload["result"]["definite"].as_bool().unwrap_or(false);
            return Ok(Some(AsrResult { text, is_final }));
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
}
