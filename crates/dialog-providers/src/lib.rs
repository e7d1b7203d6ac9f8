//! Provider adapters: Chat-LLM, Report-LLM, TTS (bidirectional and unary), and ASR
//! (bidirectional).
//!
//! Each adapter owns exactly the transport concerns of its provider; callers in
//! `dialog-engine` hold these as concrete types behind the channel boundary rather than as
//! trait objects, since each provider has a fixed protocol shape with no alternate
//! implementation to swap in at runtime.

mod asr_bidi;
mod chat;
mod config;
mod error;
mod report;
mod traits;
mod tts_bidi;
mod tts_unary;

pub use asr_bidi::{AsrBidi, AsrResult, AsrSession};
pub use chat::{ChatLlm, ChatToken};
pub use config::{AsrConfig, ChatLlmConfig, ProvidersConfig, ReportLlmConfig, TtsConfig};
pub use error::{ProviderError, Result};
pub use report::ReportLlm;
pub use traits::{AsrBidiProvider, AsrBidiSession, ChatCursor, ChatLlmProvider, ReportLlmProvider, TtsProvider, TtsSession};
pub use tts_bidi::{TtsBidi, TtsBidiSession};
pub use tts_unary::{TtsUnary, TtsUnarySession};
