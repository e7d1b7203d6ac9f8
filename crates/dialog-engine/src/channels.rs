//! The five named channels a [`crate::dialog::DialogEngine`] owns for one session.
//!
//! `out_audio` and `stop` are constructed (so their capacities are configurable and the
//! shutdown path has something to account for) but never given a producer — `tts-down`
//! writes synthesized audio straight to the client socket rather than through a channel.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::ChannelCapacities;

/// One transcript entry destined for the `history` task, carrying the session id so the
/// task can append to the right store key even before any regular round has run.
#[derive(Debug, Clone)]
pub struct HistoryMsg {
    /// The session id fixed by the Chat-LLM provider on the first token.
    pub session_id: String,
    /// The recorded content, or the `"stop:<error>"` sentinel on a failed turn.
    pub content: String,
}

/// Sending halves of the engine's channels, held by producer tasks.
#[derive(Debug, Clone)]
pub struct ChannelSenders {
    /// AI-authored transcript entries.
    pub ai_history: mpsc::Sender<HistoryMsg>,
    /// User-authored transcript entries.
    pub user_history: mpsc::Sender<HistoryMsg>,
    /// LLM token text destined for TTS.
    pub out_text: mpsc::Sender<String>,
    /// Declared but never sent to; see `DESIGN.md`.
    pub out_audio: mpsc::Sender<Bytes>,
    /// Declared but never sent to; see `DESIGN.md`.
    pub stop: mpsc::Sender<()>,
}

/// Receiving halves of the engine's channels, held by consumer tasks and the engine itself.
#[derive(Debug)]
pub struct ChannelReceivers {
    /// AI-authored transcript entries.
    pub ai_history: mpsc::Receiver<HistoryMsg>,
    /// User-authored transcript entries.
    pub user_history: mpsc::Receiver<HistoryMsg>,
    /// LLM token text destined for TTS.
    pub out_text: mpsc::Receiver<String>,
    /// Declared but never received from; see `DESIGN.md`.
    pub out_audio: mpsc::Receiver<Bytes>,
    /// Declared but never received from; see `DESIGN.md`.
    pub stop: mpsc::Receiver<()>,
}

/// Construct both halves of the engine's concurrency fabric from the configured capacities.
///
/// `stop`'s capacity of `0` makes it a rendezvous channel.
#[must_use]
pub fn channel_pair(capacities: ChannelCapacities) -> (ChannelSenders, ChannelReceivers) {
    let (ai_history_tx, ai_history_rx) = mpsc::channel(capacities.ai_history.max(1));
    let (user_history_tx, user_history_rx) = mpsc::channel(capacities.user_history.max(1));
    let (out_text_tx, out_text_rx) = mpsc::channel(capacities.out_text.max(1));
    let (out_audio_tx, out_audio_rx) = mpsc::channel(capacities.out_audio.max(1));
    let (stop_tx, stop_rx) = mpsc::channel(capacities.stop.max(1));

    let senders = ChannelSenders {
        ai_history: ai_history_tx,
        user_history: user_history_tx,
        out_text: out_text_tx,
        out_audio: out_audio_tx,
        stop: stop_tx,
    };
    let receivers = ChannelReceivers {
        ai_history: ai_history_rx,
        user_history: user_history_rx,
        out_text: out_text_rx,
        out_audio: out_audio_rx,
        stop: stop_rx,
    };
    (senders, receivers)
}
