//! The main orchestrator: one [`DialogEngine`] per live `/chat/` session.
//!
//! Lifecycle is `Init -> Validated -> Running -> Closing -> Closed`. The first two
//! transitions are sequential and awaited inline in [`DialogEngine::run`]; `Running` fans
//! out into the `tts-up`, `tts-down`, `history`, and per-utterance LLM tasks described in
//! [`crate::channels`]; `Closing` cancels and drains them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dialog_providers::{ChatLlmProvider, TtsProvider, TtsSession};
use dialog_store::{AnalysisJob, JobPublisher, TranscriptStore};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::{channel_pair, ChannelSenders, HistoryMsg};
use crate::config::DialogEngineConfig;
use crate::error::{EngineError, Result};
use crate::protocol::{
    ChatEndFrame, ChatRequest, ChatTokenFrame, ErrorEnvelope, SessionOpen, CMD_END, CMD_PING,
    CMD_UTTERANCE,
};
use crate::socket::{send_json, ClientMessage, ClientSocketReader, ClientSocketWriter};

const LANG_BIDI: &str = "zh";
const LANG_UNARY: &str = "zh-shanghai";

/// Orchestrates one dialog session: LLM turns, TTS playback, transcript recording, and the
/// end-of-session analysis hand-off. Depends only on capability traits so it can be driven
/// against in-crate fakes in tests.
pub struct DialogEngine {
    chat: Arc<dyn ChatLlmProvider>,
    tts_bidi: Arc<dyn TtsProvider>,
    tts_unary: Arc<dyn TtsProvider>,
    store: Arc<dyn TranscriptStore>,
    queue: Arc<dyn JobPublisher>,
    config: DialogEngineConfig,
}

impl DialogEngine {
    /// Assemble an engine from its dependencies, injected once at startup by the gateway.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatLlmProvider>,
        tts_bidi: Arc<dyn TtsProvider>,
        tts_unary: Arc<dyn TtsProvider>,
        store: Arc<dyn TranscriptStore>,
        queue: Arc<dyn JobPublisher>,
        config: DialogEngineConfig,
    ) -> Self {
        Self { chat, tts_bidi, tts_unary, store, queue, config }
    }

    /// Drive one session to completion: read the session-open frame, run the greeting turn,
    /// then alternate steady-state utterances until the client ends the session or a read
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the session-open frame is missing, times out, or names an
    /// unsupported language. Steady-state failures are logged and folded into the ordinary
    /// shutdown path rather than returned, since the client has already been told the
    /// session ended.
    pub async fn run<R, W>(self: Arc<Self>, mut reader: R, writer: W) -> Result<()>
    where
        R: ClientSocketReader + 'static,
        W: ClientSocketWriter + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));

        let open = match self.read_session_open(&mut reader).await {
            Ok(open) => open,
            Err(err) => {
                let envelope = ErrorEnvelope { code: 1, msg: err.to_string() };
                let mut guard = writer.lock().await;
                let _ = send_json(&mut *guard, &envelope).await;
                let _ = guard.close().await;
                return Err(err);
            }
        };
        info!(from = %open.from, lang = %open.lang, "dialog session validated");

        let is_bidi = match open.lang.as_str() {
            LANG_BIDI => true,
            LANG_UNARY => false,
            other => {
                let err = EngineError::UnsupportedLanguage(other.to_string());
                let envelope = ErrorEnvelope { code: 1, msg: err.to_string() };
                let mut guard = writer.lock().await;
                let _ = send_json(&mut *guard, &envelope).await;
                let _ = guard.close().await;
                return Err(err);
            }
        };

        let tts_provider = if is_bidi { self.tts_bidi.clone() } else { self.tts_unary.clone() };
        let tts_box = tokio::time::timeout(self.config.provider_connect_deadline, tts_provider.dial())
            .await
            .map_err(|_| EngineError::Socket("timed out dialing tts provider".into()))??;
        let tts_session: Arc<dyn TtsSession> = Arc::from(tts_box);
        tts_session.start().await?;

        let (senders, mut receivers) = channel_pair(self.config.capacities);
        let cancel = CancellationToken::new();
        let round = Arc::new(AtomicU32::new(0));
        let start_time = Utc::now().timestamp();
        let turn_handles: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let tts_up = tokio::spawn(Self::tts_up_task(
            tts_session.clone(),
            receivers.out_text,
            is_bidi,
            cancel.clone(),
        ));
        let tts_down = tokio::spawn(Self::tts_down_task(
            tts_session.clone(),
            writer.clone(),
            cancel.clone(),
        ));
        let history = tokio::spawn(Self::history_task(
            self.store.clone(),
            receivers.ai_history,
            receivers.user_history,
        ));
        // `out_audio` and `stop` have no wired consumer; drop their receivers so the
        // channels close cleanly and the senders never block waiting on a reader that will
        // never arrive.
        drop(receivers.out_audio);
        drop(receivers.stop);

        let session_id = self.run_greeting_turn(&senders, &writer).await;
        let session_id = match session_id {
            Ok(id) => id,
            Err(err) => {
                cancel.cancel();
                drop(senders);
                let _ = tts_up.await;
                let _ = tts_down.await;
                let _ = history.await;
                let _ = tts_session.close().await;
                let mut guard = writer.lock().await;
                let _ = guard.close().await;
                return Err(err);
            }
        };
        info!(session_id = %session_id, "greeting turn complete, entering steady state");

        self.steady_state(
            &mut reader,
            writer.clone(),
            &senders,
            &session_id,
            round.clone(),
            cancel.clone(),
            turn_handles.clone(),
        )
        .await;

        let end_frame = ChatEndFrame::ordinary_close();
        {
            let mut guard = writer.lock().await;
            let _ = send_json(&mut *guard, &end_frame).await;
        }
        cancel.cancel();
        drop(senders);

        for handle in turn_handles.lock().await.drain(..) {
            let _ = handle.await;
        }
        let _ = tts_up.await;
        let _ = tts_down.await;
        let _ = history.await;

        {
            let mut guard = writer.lock().await;
            let _ = guard.close().await;
        }
        let _ = tts_session.close().await;

        let rounds = round.load(Ordering::SeqCst);
        if rounds > self.config.min_rounds {
            let job = AnalysisJob { session_id: session_id.clone(), start: start_time, end: Utc::now().timestamp() };
            if let Err(err) = self.queue.publish(&job).await {
                warn!(session_id = %session_id, error = %err, "failed to publish analysis job");
            }
        }

        info!(session_id = %session_id, rounds, "dialog session closed");
        Ok(())
    }

    async fn read_session_open<R: ClientSocketReader>(&self, reader: &mut R) -> Result<SessionOpen> {
        let message = tokio::time::timeout(self.config.open_frame_deadline, reader.recv())
            .await
            .map_err(|_| EngineError::OpenFrameTimeout)?
            .ok_or(EngineError::OpenFrameTimeout)??;
        match message {
            ClientMessage::Text(text) => Ok(serde_json::from_str(&text)?),
            ClientMessage::Binary(_) => {
                Err(EngineError::Protocol("session-open frame must be text".into()))
            }
        }
    }

    /// Run the fixed-greeting turn inline so startup can synchronously learn the provider's
    /// session id before any steady-state utterance is accepted.
    async fn run_greeting_turn<W: ClientSocketWriter + Send + 'static>(
        &self,
        senders: &ChannelSenders,
        writer: &Arc<Mutex<W>>,
    ) -> Result<String> {
        let mut cursor = self.chat.stream_call(&self.config.greeting, "")?;
        let mut session_id = String::new();
        let mut record = String::new();

        while let Some(next) = cursor.next_token().await {
            let token = next?;
            if session_id.is_empty() && !token.session_id.is_empty() {
                session_id = token.session_id.clone();
                self.store.append_system(&session_id, &self.config.greeting).await?;
            }
            record.push_str(&token.content);
            let _ = senders.out_text.send(token.content.clone()).await;
            let frame = ChatTokenFrame {
                id: token.id.unwrap_or_default(),
                content: token.content,
                session_id: session_id.clone(),
                timestamp: Utc::now().timestamp(),
                finish: token.finish,
            };
            let mut guard = writer.lock().await;
            send_json(&mut *guard, &frame).await?;
        }

        if session_id.is_empty() {
            return Err(EngineError::MalformedJob(
                "chat provider never assigned a session id".into(),
            ));
        }
        self.store.append_ai(&session_id, &record).await?;
        Ok(session_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn steady_state<R: ClientSocketReader, W: ClientSocketWriter + Send + 'static>(
        &self,
        reader: &mut R,
        writer: Arc<Mutex<W>>,
        senders: &ChannelSenders,
        session_id: &str,
        round: Arc<AtomicU32>,
        cancel: CancellationToken,
        turn_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    ) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = tokio::time::timeout(self.config.socket_read_idle, reader.recv()) => message,
            };
            let message = match message {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(err))) => {
                    warn!(session_id, error = %err, "client socket read failed");
                    break;
                }
                Ok(None) => {
                    debug!(session_id, "client socket closed");
                    break;
                }
                Err(_) => {
                    warn!(session_id, "client socket idle deadline elapsed");
                    break;
                }
            };

            let text = match message {
                ClientMessage::Text(text) => text,
                ClientMessage::Binary(_) => continue,
            };
            let request: ChatRequest = match serde_json::from_str(&text) {
                Ok(request) => request,
                Err(err) => {
                    warn!(session_id, error = %err, "malformed client frame, ignoring");
                    continue;
                }
            };

            match request.cmd {
                CMD_END => break,
                CMD_PING => {
                    let mut guard = writer.lock().await;
                    let _ = guard.send_binary(bytes::Bytes::new()).await;
                }
                CMD_UTTERANCE => {
                    let user_msg =
                        HistoryMsg { session_id: session_id.to_string(), content: request.msg.clone() };
                    if senders.user_history.send(user_msg).await.is_err() {
                        break;
                    }
                    round.fetch_add(1, Ordering::SeqCst);
                    let handle = tokio::spawn(Self::llm_turn_task(
                        self.chat.clone(),
                        request.msg,
                        session_id.to_string(),
                        senders.clone(),
                        writer.clone(),
                    ));
                    turn_handles.lock().await.push(handle);
                }
                other => {
                    debug!(session_id, cmd = other, "unrecognized cmd, ignoring");
                }
            }
        }
    }

    async fn llm_turn_task<W: ClientSocketWriter + Send + 'static>(
        chat: Arc<dyn ChatLlmProvider>,
        prompt: String,
        session_id: String,
        senders: ChannelSenders,
        writer: Arc<Mutex<W>>,
    ) {
        let outcome = Self::run_llm_turn(chat, &prompt, &session_id, &senders, &writer).await;
        let history_msg = match outcome {
            Ok(record) => HistoryMsg { session_id, content: record },
            Err(err) => HistoryMsg { session_id, content: format!("stop:{err}") },
        };
        let _ = senders.ai_history.send(history_msg).await;
    }

    async fn run_llm_turn<W: ClientSocketWriter + Send + 'static>(
        chat: Arc<dyn ChatLlmProvider>,
        prompt: &str,
        session_id: &str,
        senders: &ChannelSenders,
        writer: &Arc<Mutex<W>>,
    ) -> Result<String> {
        let mut cursor = chat.stream_call(prompt, session_id)?;
        let mut record = String::new();
        while let Some(next) = cursor.next_token().await {
            let token = next?;
            record.push_str(&token.content);
            let _ = senders.out_text.send(token.content.clone()).await;
            let frame = ChatTokenFrame {
                id: token.id.unwrap_or_default(),
                content: token.content,
                session_id: session_id.to_string(),
                timestamp: Utc::now().timestamp(),
                finish: token.finish,
            };
            let mut guard = writer.lock().await;
            send_json(&mut *guard, &frame).await?;
        }
        Ok(record)
    }

    async fn tts_up_task(
        tts: Arc<dyn TtsSession>,
        mut out_text: tokio::sync::mpsc::Receiver<String>,
        is_bidi: bool,
        cancel: CancellationToken,
    ) {
        let mut buffer = String::new();
        loop {
            let token = tokio::select! {
                () = cancel.cancelled() => break,
                token = out_text.recv() => token,
            };
            let Some(token) = token else { break };

            if is_bidi {
                if let Err(err) = tts.send_text(&token).await {
                    warn!(error = %err, "tts-up send failed");
                    break;
                }
                continue;
            }

            if token.is_empty() {
                if !buffer.is_empty() {
                    if let Err(err) = tts.send_text(&buffer).await {
                        warn!(error = %err, "tts-up flush failed");
                        break;
                    }
                    buffer.clear();
                }
                continue;
            }
            buffer.push_str(&token);
        }
    }

    async fn tts_down_task<W: ClientSocketWriter + Send + 'static>(
        tts: Arc<dyn TtsSession>,
        writer: Arc<Mutex<W>>,
        cancel: CancellationToken,
    ) {
        loop {
            let audio = tokio::select! {
                () = cancel.cancelled() => break,
                audio = tts.receive_audio() => audio,
            };
            match audio {
                Ok(Some(bytes)) => {
                    let mut guard = writer.lock().await;
                    if guard.send_binary(bytes).await.is_err() {
                        break;
                    }
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "tts-down receive failed");
                    break;
                }
            }
        }
    }

    // Each channel's arm is guarded so a drained channel stops being polled instead of
    // ending the loop for both — otherwise whichever channel happens to close first (they
    // close simultaneously when the senders are dropped, and `select!` picks pseudo-randomly
    // among ready arms) could discard buffered, already-accepted entries still sitting on the
    // other channel.
    async fn history_task(
        store: Arc<dyn TranscriptStore>,
        mut ai_history: tokio::sync::mpsc::Receiver<HistoryMsg>,
        mut user_history: tokio::sync::mpsc::Receiver<HistoryMsg>,
    ) {
        let mut ai_open = true;
        let mut user_open = true;
        while ai_open || user_open {
            tokio::select! {
                msg = ai_history.recv(), if ai_open => {
                    match msg {
                        Some(msg) => {
                            if msg.content.starts_with("stop:") {
                                warn!(session_id = %msg.session_id, reason = %msg.content, "llm turn stopped early");
                            }
                            if let Err(err) = store.append_ai(&msg.session_id, &msg.content).await {
                                warn!(session_id = %msg.session_id, error = %err, "failed to append ai history");
                            }
                        }
                        None => ai_open = false,
                    }
                }
                msg = user_history.recv(), if user_open => {
                    match msg {
                        Some(msg) => {
                            if let Err(err) = store.append_user(&msg.session_id, &msg.content).await {
                                warn!(session_id = %msg.session_id, error = %err, "failed to append user history");
                            }
                        }
                        None => user_open = false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use dialog_providers::{ChatCursor, ChatToken};
    use dialog_store::{AnalysisJob, ChatHistoryEntry};

    use super::*;

    struct FakeChatCursor {
        tokens: VecDeque<dialog_providers::Result<ChatToken>>,
    }

    #[async_trait]
    impl ChatCursor for FakeChatCursor {
        async fn next_token(&mut self) -> Option<dialog_providers::Result<ChatToken>> {
            self.tokens.pop_front()
        }

        fn close(&mut self) {
            self.tokens.clear();
        }
    }

    /// Queues one canned turn (a vector of token results) per call to `stream_call`,
    /// consumed in FIFO order: the first call is the greeting turn, subsequent calls are
    /// steady-state turns. A turn may include an `Err` partway through to model a provider
    /// disconnect mid-stream.
    struct FakeChat {
        turns: StdMutex<VecDeque<Vec<dialog_providers::Result<ChatToken>>>>,
    }

    impl ChatLlmProvider for FakeChat {
        fn stream_call(
            &self,
            _prompt: &str,
            _session_id: &str,
        ) -> dialog_providers::Result<Box<dyn ChatCursor>> {
            let tokens = self.turns.lock().expect("lock").pop_front().unwrap_or_default();
            Ok(Box::new(FakeChatCursor { tokens: VecDeque::from(tokens) }))
        }
    }

    fn token(content: &str, session_id: &str) -> ChatToken {
        ChatToken {
            id: Some(1),
            session_id: session_id.to_string(),
            content: content.to_string(),
            finish: "stop".to_string(),
        }
    }

    fn ok_turn(content: &str, session_id: &str) -> Vec<dialog_providers::Result<ChatToken>> {
        vec![Ok(token(content, session_id))]
    }

    struct FakeTtsSession {
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TtsSession for FakeTtsSession {
        async fn start(&self) -> dialog_providers::Result<()> {
            Ok(())
        }

        async fn send_text(&self, text: &str) -> dialog_providers::Result<()> {
            self.sent.lock().expect("lock").push(text.to_string());
            Ok(())
        }

        async fn receive_audio(&self) -> dialog_providers::Result<Option<bytes::Bytes>> {
            // Yield so a session with no real audio to deliver does not spin the runtime;
            // a real provider socket read always has a suspension point here.
            tokio::task::yield_now().await;
            Ok(None)
        }

        async fn close(&self) -> dialog_providers::Result<()> {
            Ok(())
        }
    }

    struct FakeTtsProvider {
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TtsProvider for FakeTtsProvider {
        async fn dial(&self) -> dialog_providers::Result<Box<dyn TtsSession>> {
            Ok(Box::new(FakeTtsSession { sent: self.sent.clone() }))
        }
    }

    struct FakeStore {
        entries: StdMutex<Vec<ChatHistoryEntry>>,
    }

    #[async_trait]
    impl TranscriptStore for FakeStore {
        async fn append_system(&self, _session_id: &str, content: &str) -> dialog_store::Result<()> {
            self.entries.lock().expect("lock").push(ChatHistoryEntry {
                role: "system".into(),
                content: content.into(),
            });
            Ok(())
        }

        async fn append_user(&self, _session_id: &str, content: &str) -> dialog_store::Result<()> {
            self.entries
                .lock()
                .expect("lock")
                .push(ChatHistoryEntry { role: "user".into(), content: content.into() });
            Ok(())
        }

        async fn append_ai(&self, _session_id: &str, content: &str) -> dialog_store::Result<()> {
            self.entries
                .lock()
                .expect("lock")
                .push(ChatHistoryEntry { role: "ai".into(), content: content.into() });
            Ok(())
        }

        async fn list(&self, _session_id: &str) -> dialog_store::Result<Vec<ChatHistoryEntry>> {
            Ok(self.entries.lock().expect("lock").clone())
        }

        async fn delete(&self, _session_id: &str) -> dialog_store::Result<()> {
            self.entries.lock().expect("lock").clear();
            Ok(())
        }
    }

    struct FakeQueue {
        jobs: StdMutex<Vec<AnalysisJob>>,
    }

    #[async_trait]
    impl JobPublisher for FakeQueue {
        async fn publish(&self, job: &AnalysisJob) -> dialog_store::Result<()> {
            self.jobs.lock().expect("lock").push(job.clone());
            Ok(())
        }
    }

    struct FakeReader {
        messages: VecDeque<ClientMessage>,
    }

    #[async_trait]
    impl ClientSocketReader for FakeReader {
        async fn recv(&mut self) -> Option<Result<ClientMessage>> {
            self.messages.pop_front().map(Ok)
        }
    }

    #[derive(Default, Clone)]
    struct FakeWriter {
        texts: Arc<StdMutex<Vec<String>>>,
        binaries: Arc<StdMutex<Vec<bytes::Bytes>>>,
    }

    #[async_trait]
    impl ClientSocketWriter for FakeWriter {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.texts.lock().expect("lock").push(text);
            Ok(())
        }

        async fn send_binary(&mut self, data: bytes::Bytes) -> Result<()> {
            self.binaries.lock().expect("lock").push(data);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// A reader fed live from the test, used when a scenario needs to withhold the next
    /// client frame until a prior round has visibly completed (the engine itself spawns a
    /// fresh task per utterance without waiting for the previous one, the way a real client
    /// would naturally pace itself).
    struct LiveReader {
        rx: tokio::sync::mpsc::Receiver<ClientMessage>,
    }

    #[async_trait]
    impl ClientSocketReader for LiveReader {
        async fn recv(&mut self) -> Option<Result<ClientMessage>> {
            self.rx.recv().await.map(Ok)
        }
    }

    impl FakeStore {
        async fn wait_len(&self, n: usize) {
            for _ in 0..2000 {
                if self.entries.lock().expect("lock").len() >= n {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            panic!("transcript store never reached {n} entries");
        }
    }

    fn open_frame(lang: &str) -> ClientMessage {
        let open = serde_json::json!({"timestamp": 1_700_000_000, "from": "u1", "lang": lang});
        ClientMessage::Text(open.to_string())
    }

    fn utterance(msg: &str) -> ClientMessage {
        ClientMessage::Text(serde_json::json!({"cmd": 0, "msg": msg}).to_string())
    }

    fn ping() -> ClientMessage {
        ClientMessage::Text(serde_json::json!({"cmd": 1}).to_string())
    }

    fn end() -> ClientMessage {
        ClientMessage::Text(serde_json::json!({"cmd": -1}).to_string())
    }

    fn test_config(min_rounds: u32) -> DialogEngineConfig {
        DialogEngineConfig { min_rounds, ..DialogEngineConfig::default() }
    }

    fn build_engine(
        turns: Vec<Vec<dialog_providers::Result<ChatToken>>>,
        min_rounds: u32,
    ) -> (Arc<DialogEngine>, Arc<FakeStore>, Arc<FakeQueue>, Arc<StdMutex<Vec<String>>>) {
        let chat = Arc::new(FakeChat { turns: StdMutex::new(VecDeque::from(turns)) });
        let tts_sent = Arc::new(StdMutex::new(Vec::new()));
        let tts = Arc::new(FakeTtsProvider { sent: tts_sent.clone() });
        let store = Arc::new(FakeStore { entries: StdMutex::new(Vec::new()) });
        let queue = Arc::new(FakeQueue { jobs: StdMutex::new(Vec::new()) });
        let engine = Arc::new(DialogEngine::new(
            chat,
            tts.clone(),
            tts,
            store.clone(),
            queue.clone(),
            test_config(min_rounds),
        ));
        (engine, store, queue, tts_sent)
    }

    #[tokio::test]
    async fn happy_path_records_transcript_in_causal_order_and_publishes_job() {
        let turns = vec![
            ok_turn("你好呀", "sess-1"),
            ok_turn("回复一", ""),
            ok_turn("回复二", ""),
            ok_turn("回复三", ""),
        ];
        let (engine, store, queue, tts_sent) = build_engine(turns, 2);

        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let reader = LiveReader { rx };
        let writer = FakeWriter::default();
        let writer_texts = writer.texts.clone();

        let run_handle = tokio::spawn(engine.run(reader, writer));

        tx.send(open_frame("zh")).await.expect("send open frame");
        store.wait_len(2).await;
        tx.send(utterance("我今天心情不好")).await.expect("send utterance 1");
        store.wait_len(4).await;
        tx.send(utterance("还是不好")).await.expect("send utterance 2");
        store.wait_len(6).await;
        tx.send(utterance("好一点了")).await.expect("send utterance 3");
        store.wait_len(8).await;
        tx.send(end()).await.expect("send end");

        tokio::time::timeout(std::time::Duration::from_secs(5), run_handle)
            .await
            .expect("session did not finish")
            .expect("run task panicked")
            .expect("session run");

        let entries = store.entries.lock().expect("lock").clone();
        let roles: Vec<&str> = entries.iter().map(|e| e.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "ai", "user", "ai", "user", "ai", "user", "ai"]);
        assert_eq!(entries[0].content, "你好呀");
        assert_eq!(entries[1].content, "你好呀");

        let jobs = queue.jobs.lock().expect("lock").clone();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].session_id, "sess-1");

        // bidi mode: tts-up forwards every token verbatim, including the greeting.
        assert_eq!(tts_sent.lock().expect("lock").len(), 4);

        // one token frame per turn plus the terminal close frame.
        let texts = writer_texts.lock().expect("lock");
        assert!(texts.iter().any(|t| t.contains("对话结束")));
    }

    #[tokio::test]
    async fn short_session_persists_transcript_but_publishes_no_job() {
        let turns = vec![ok_turn("你好呀", "sess-2"), ok_turn("回复", "")];
        let (engine, store, queue, _sent) = build_engine(turns, 3);

        let reader = FakeReader {
            messages: VecDeque::from(vec![open_frame("zh"), utterance("早上好"), end()]),
        };
        let writer = FakeWriter::default();

        tokio::time::timeout(std::time::Duration::from_secs(5), engine.run(reader, writer))
            .await
            .expect("session did not finish")
            .expect("session run");

        assert!(queue.jobs.lock().expect("lock").is_empty());
        assert_eq!(store.entries.lock().expect("lock").len(), 4);
    }

    #[tokio::test]
    async fn keepalive_does_not_touch_transcript_and_echoes_empty_binary_frame() {
        let turns = vec![ok_turn("你好呀", "sess-3")];
        let (engine, store, queue, _sent) = build_engine(turns, 3);

        let reader = FakeReader {
            messages: VecDeque::from(vec![open_frame("zh"), ping(), end()]),
        };
        let writer = FakeWriter::default();
        let binaries = writer.binaries.clone();

        tokio::time::timeout(std::time::Duration::from_secs(5), engine.run(reader, writer))
            .await
            .expect("session did not finish")
            .expect("session run");

        // greeting only: system + ai, no user/ai pair from the keepalive.
        assert_eq!(store.entries.lock().expect("lock").len(), 2);
        assert!(queue.jobs.lock().expect("lock").is_empty());
        assert!(binaries.lock().expect("lock").iter().any(bytes::Bytes::is_empty));
    }

    #[tokio::test]
    async fn unknown_language_is_rejected_before_any_provider_dial() {
        let (engine, store, queue, tts_sent) = build_engine(Vec::new(), 3);

        let reader = FakeReader { messages: VecDeque::from(vec![open_frame("fr")]) };
        let writer = FakeWriter::default();
        let writer_texts = writer.texts.clone();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), engine.run(reader, writer))
            .await
            .expect("session did not finish");

        assert!(result.is_err());
        assert!(store.entries.lock().expect("lock").is_empty());
        assert!(queue.jobs.lock().expect("lock").is_empty());
        assert!(tts_sent.lock().expect("lock").is_empty());
        let texts = writer_texts.lock().expect("lock");
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("unsupported language"));
    }

    #[tokio::test]
    async fn provider_disconnect_mid_turn_records_stop_sentinel() {
        let turns = vec![
            ok_turn("你好呀", "sess-4"),
            vec![
                Ok(token("半句", "")),
                Err(dialog_providers::ProviderError::Protocol("connection reset".into())),
            ],
        ];
        let (engine, store, queue, _sent) = build_engine(turns, 3);

        let reader = FakeReader {
            messages: VecDeque::from(vec![open_frame("zh"), utterance("你还在吗"), end()]),
        };
        let writer = FakeWriter::default();

        tokio::time::timeout(std::time::Duration::from_secs(5), engine.run(reader, writer))
            .await
            .expect("session did not finish")
            .expect("session run");

        let entries = store.entries.lock().expect("lock").clone();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3].role, "ai");
        assert!(entries[3].content.starts_with("stop:"));
        assert!(!entries[3].content.contains("半句"));
        assert!(queue.jobs.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn history_task_drains_both_channels_fully_after_simultaneous_close() {
        let store = Arc::new(FakeStore { entries: StdMutex::new(Vec::new()) });
        let (ai_tx, ai_rx) = tokio::sync::mpsc::channel(10);
        let (user_tx, user_rx) = tokio::sync::mpsc::channel(10);

        for i in 0..5 {
            ai_tx
                .send(HistoryMsg { session_id: "s".into(), content: format!("ai-{i}") })
                .await
                .expect("send");
        }
        for i in 0..5 {
            user_tx
                .send(HistoryMsg { session_id: "s".into(), content: format!("user-{i}") })
                .await
                .expect("send");
        }
        // Both senders drop in the same statement, so both channels close at the same
        // instant — the exact condition under which `select!`'s pseudo-random arm choice
        // could previously end the loop on whichever channel happened to report `None`
        // first, discarding the other's still-buffered entries.
        drop((ai_tx, user_tx));

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            DialogEngine::history_task(store.clone(), ai_rx, user_rx),
        )
        .await
        .expect("history task did not finish");

        let entries = store.entries.lock().expect("lock").clone();
        assert_eq!(entries.len(), 10, "buffered entries on both channels must all be drained");
    }
}
