//! The `/voice/asr` session: a thin pair of tasks wrapped around one ASR-bidi provider
//! session. Unlike [`crate::dialog::DialogEngine`], there is no transcript store, job queue,
//! or steady-state command protocol — just audio in, recognized text out.

use std::sync::Arc;

use chrono::Utc;
use dialog_providers::{AsrBidiProvider, AsrBidiSession};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::VoiceEngineConfig;
use crate::error::{EngineError, Result};
use crate::protocol::{AsrResponse, END_OF_SPEECH_BYTE};
use crate::socket::{send_json, ClientMessage, ClientSocketReader, ClientSocketWriter};

/// Orchestrates one `/voice/asr` session: a `listen` task forwarding client audio to the
/// provider and a `recognize` task relaying recognized text back to the client.
pub struct VoiceEngine {
    asr: Arc<dyn AsrBidiProvider>,
    config: VoiceEngineConfig,
}

impl VoiceEngine {
    /// Assemble an engine from its dependencies, injected once at startup by the gateway.
    #[must_use]
    pub fn new(asr: Arc<dyn AsrBidiProvider>, config: VoiceEngineConfig) -> Self {
        Self { asr, config }
    }

    /// Drive one session to completion: dial the ASR provider, then run `listen` and
    /// `recognize` concurrently until either observes a fatal condition.
    ///
    /// The root cancellation token is constructed fresh for this call rather than derived
    /// from any inbound request context, so the session outlives a dropped HTTP upgrade
    /// future; it is still torn down deterministically once either task signals `finish`.
    ///
    /// # Errors
    ///
    /// Returns an error if dialing the ASR provider times out or fails.
    pub async fn run<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: ClientSocketReader + 'static,
        W: ClientSocketWriter + Send + 'static,
    {
        let session = tokio::time::timeout(self.config.provider_connect_deadline, self.asr.dial())
            .await
            .map_err(|_| EngineError::Socket("timed out dialing asr provider".into()))??;
        let session: Arc<dyn AsrBidiSession> = Arc::from(session);
        let writer = Arc::new(Mutex::new(writer));
        let cancel = CancellationToken::new();
        let (finish_tx, mut finish_rx) = mpsc::channel::<()>(1);

        let listen = tokio::spawn(Self::listen_task(
            reader,
            session.clone(),
            self.config.socket_read_idle,
            finish_tx.clone(),
            cancel.clone(),
        ));
        let recognize = tokio::spawn(Self::recognize_task(
            session.clone(),
            writer.clone(),
            finish_tx,
            cancel.clone(),
        ));

        finish_rx.recv().await;
        cancel.cancel();
        let _ = listen.await;
        let _ = recognize.await;

        let _ = session.close().await;
        let mut guard = writer.lock().await;
        let _ = guard.close().await;
        debug!("voice session closed");
        Ok(())
    }

    async fn listen_task<R: ClientSocketReader>(
        mut reader: R,
        session: Arc<dyn AsrBidiSession>,
        idle_deadline: std::time::Duration,
        finish: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = tokio::time::timeout(idle_deadline, reader.recv()) => message,
            };
            let message = match message {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(err))) => {
                    warn!(error = %err, "voice socket read failed");
                    break;
                }
                Ok(None) => {
                    debug!("voice socket closed");
                    break;
                }
                Err(_) => {
                    warn!("voice socket idle deadline elapsed");
                    break;
                }
            };

            let bytes = match message {
                ClientMessage::Binary(bytes) => bytes,
                ClientMessage::Text(_) => continue,
            };

            let outcome = if bytes.len() == 1 && bytes[0] == END_OF_SPEECH_BYTE {
                session.last().await
            } else {
                session.send_audio(&bytes).await
            };
            if let Err(err) = outcome {
                warn!(error = %err, "listen task failed writing to asr provider");
                break;
            }
        }
        let _ = finish.try_send(());
    }

    async fn recognize_task<W: ClientSocketWriter + Send + 'static>(
        session: Arc<dyn AsrBidiSession>,
        writer: Arc<Mutex<W>>,
        finish: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) {
        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = session.recv_result() => result,
            };
            match result {
                Ok(Some(fragment)) => {
                    if fragment.text.is_empty() {
                        continue;
                    }
                    let response = AsrResponse { text: fragment.text, timestamp: Utc::now().timestamp() };
                    let mut guard = writer.lock().await;
                    if send_json(&mut *guard, &response).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "recognize task failed reading from asr provider");
                    break;
                }
            }
        }
        let _ = finish.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use dialog_providers::AsrResult;

    use super::*;

    #[derive(Default)]
    struct SharedState {
        sent_audio: Vec<Vec<u8>>,
        last_called: bool,
        closed: bool,
    }

    struct FakeAsrSession {
        state: Arc<StdMutex<SharedState>>,
        results: Arc<StdMutex<VecDeque<dialog_providers::Result<Option<AsrResult>>>>>,
    }

    #[async_trait]
    impl AsrBidiSession for FakeAsrSession {
        async fn send_audio(&self, data: &[u8]) -> dialog_providers::Result<()> {
            self.state.lock().expect("lock").sent_audio.push(data.to_vec());
            Ok(())
        }

        async fn last(&self) -> dialog_providers::Result<()> {
            self.state.lock().expect("lock").last_called = true;
            Ok(())
        }

        async fn recv_result(&self) -> dialog_providers::Result<Option<AsrResult>> {
            match self.results.lock().expect("lock").pop_front() {
                Some(result) => result,
                None => Ok(None),
            }
        }

        async fn close(&self) -> dialog_providers::Result<()> {
            self.state.lock().expect("lock").closed = true;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeAsrProvider {
        state: Arc<StdMutex<SharedState>>,
        results: Arc<StdMutex<VecDeque<dialog_providers::Result<Option<AsrResult>>>>>,
    }

    #[async_trait]
    impl AsrBidiProvider for FakeAsrProvider {
        async fn dial(&self) -> dialog_providers::Result<Box<dyn AsrBidiSession>> {
            Ok(Box::new(FakeAsrSession { state: self.state.clone(), results: self.results.clone() }))
        }
    }

    struct SlowAsrProvider;

    #[async_trait]
    impl AsrBidiProvider for SlowAsrProvider {
        async fn dial(&self) -> dialog_providers::Result<Box<dyn AsrBidiSession>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Box::new(FakeAsrSession {
                state: Arc::new(StdMutex::new(SharedState::default())),
                results: Arc::new(StdMutex::new(VecDeque::new())),
            }))
        }
    }

    #[derive(Default)]
    struct FakeReader {
        messages: VecDeque<ClientMessage>,
    }

    #[async_trait]
    impl ClientSocketReader for FakeReader {
        async fn recv(&mut self) -> Option<Result<ClientMessage>> {
            self.messages.pop_front().map(Ok)
        }
    }

    #[derive(Clone, Default)]
    struct FakeWriter {
        texts: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl ClientSocketWriter for FakeWriter {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.texts.lock().expect("lock").push(text);
            Ok(())
        }

        async fn send_binary(&mut self, _data: Bytes) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_audio_and_relays_recognized_text_skipping_empty_fragments() {
        let provider = FakeAsrProvider::default();
        *provider.results.lock().expect("lock") = VecDeque::from(vec![
            Ok(Some(AsrResult { text: String::new(), is_final: false })),
            Ok(Some(AsrResult { text: "你好".into(), is_final: true })),
            Ok(None),
        ]);
        let state = provider.state.clone();

        let engine = Arc::new(VoiceEngine::new(Arc::new(provider), VoiceEngineConfig::default()));
        let reader = FakeReader {
            messages: VecDeque::from(vec![
                ClientMessage::Binary(Bytes::from_static(b"pcm-chunk-1")),
                ClientMessage::Binary(Bytes::from_static(b"pcm-chunk-2")),
                ClientMessage::Binary(Bytes::from_static(&[END_OF_SPEECH_BYTE])),
            ]),
        };
        let writer = FakeWriter::default();
        let texts = writer.texts.clone();

        engine.run(reader, writer).await.expect("voice session");

        let state = state.lock().expect("lock");
        assert_eq!(state.sent_audio, vec![b"pcm-chunk-1".to_vec(), b"pcm-chunk-2".to_vec()]);
        assert!(state.last_called, "0xFF sentinel must trigger AsrBidiSession::last()");
        assert!(state.closed, "session must be closed on shutdown");

        let texts = texts.lock().expect("lock");
        assert_eq!(texts.len(), 1, "the empty fragment must not be forwarded to the client");
        assert!(texts[0].contains("你好"));
    }

    #[tokio::test]
    async fn client_disconnect_ends_the_session_cleanly() {
        let provider = FakeAsrProvider::default();
        let engine = Arc::new(VoiceEngine::new(Arc::new(provider), VoiceEngineConfig::default()));
        let reader = FakeReader::default();
        let writer = FakeWriter::default();
        let texts = writer.texts.clone();

        engine.run(reader, writer).await.expect("voice session");
        assert!(texts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn provider_dial_timeout_surfaces_as_error() {
        let config = VoiceEngineConfig {
            provider_connect_deadline: Duration::from_millis(20),
            ..VoiceEngineConfig::default()
        };
        let engine = Arc::new(VoiceEngine::new(Arc::new(SlowAsrProvider), config));
        let result = engine.run(FakeReader::default(), FakeWriter::default()).await;
        assert!(result.is_err());
    }
}
