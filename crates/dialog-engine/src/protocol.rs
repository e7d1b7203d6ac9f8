//! JSON wire shapes exchanged with the client over the chat and voice websockets.

use serde::{Deserialize, Serialize};

/// The first frame on a `/chat/` connection, fixing the session's caller and TTS language.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionOpen {
    /// Caller-supplied timestamp, unix seconds.
    pub timestamp: i64,
    /// Opaque caller identifier, logged but not otherwise interpreted.
    pub from: String,
    /// TTS language tag; only `"zh"` and `"zh-shanghai"` are supported.
    pub lang: String,
}

/// A steady-state client request on `/chat/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// `0` = user utterance, `-1` = end session, `1` = keepalive.
    pub cmd: i64,
    /// Utterance text; empty for `cmd != 0`.
    #[serde(default)]
    pub msg: String,
}

/// `cmd` value meaning "user utterance".
pub const CMD_UTTERANCE: i64 = 0;
/// `cmd` value meaning "end the session".
pub const CMD_END: i64 = -1;
/// `cmd` value meaning "keepalive ping".
pub const CMD_PING: i64 = 1;

/// One streamed LLM token, written to the client socket as it arrives.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTokenFrame {
    /// Monotonic id of this token within the stream.
    pub id: u64,
    /// The delta content for this token.
    pub content: String,
    /// Session id fixed by the provider on the first token.
    pub session_id: String,
    /// Wall-clock timestamp of this frame, unix seconds.
    pub timestamp: i64,
    /// Non-empty once the provider signals the turn is complete.
    pub finish: String,
}

/// Terminal frame written once, immediately before the socket closes.
#[derive(Debug, Clone, Serialize)]
pub struct ChatEndFrame {
    /// `0` on an ordinary close.
    pub code: i32,
    /// Human-readable close reason.
    pub msg: String,
}

impl ChatEndFrame {
    /// The fixed terminal frame written on every session close: `{code:0, msg:"对话结束"}`.
    #[must_use]
    pub fn ordinary_close() -> Self {
        Self { code: 0, msg: "对话结束".to_string() }
    }
}

/// Error envelope written in place of the terminal frame when startup validation fails.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Non-zero error code.
    pub code: i32,
    /// Human-readable error message.
    pub msg: String,
}

/// One recognized transcript fragment, written to the client on `/voice/asr`.
#[derive(Debug, Clone, Serialize)]
pub struct AsrResponse {
    /// Recognized text.
    pub text: String,
    /// Wall-clock timestamp of this frame, unix seconds.
    pub timestamp: i64,
}

/// The one-byte client frame that signals end-of-speech on `/voice/asr`.
pub const END_OF_SPEECH_BYTE: u8 = 0xFF;
