//! Orchestration core for one live dialog (chat+TTS) session, one live ASR session, and the
//! analysis worker that drains completed sessions from the job queue.
//!
//! None of the three depend on a concrete transport: [`dialog::DialogEngine`] and
//! [`voice::VoiceEngine`] are driven against the [`socket::ClientSocketReader`]/
//! [`socket::ClientSocketWriter`] traits so `dialog-gateway` can adapt an `axum` websocket
//! while tests adapt an in-memory channel pair; [`analysis::AnalysisWorker`] is driven
//! against the capability traits exported by `dialog-providers`/`dialog-store`.

mod analysis;
mod channels;
mod config;
mod dialog;
mod error;
mod protocol;
mod socket;
mod voice;

pub use analysis::AnalysisWorker;
pub use channels::{channel_pair, ChannelReceivers, ChannelSenders, HistoryMsg};
pub use config::{ChannelCapacities, DialogEngineConfig, VoiceEngineConfig};
pub use dialog::DialogEngine;
pub use error::{EngineError, Result};
pub use protocol::{
    AsrResponse, ChatEndFrame, ChatRequest, ChatTokenFrame, ErrorEnvelope, SessionOpen,
    CMD_END, CMD_PING, CMD_UTTERANCE, END_OF_SPEECH_BYTE,
};
pub use socket::{send_json, ClientMessage, ClientSocketReader, ClientSocketWriter};
pub use voice::VoiceEngine;
