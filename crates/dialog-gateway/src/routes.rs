//! Route handlers: the two WS upgrade endpoints and the read-only history listing.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dialog_engine::{DialogEngine, VoiceEngine};
use dialog_store::ReportArchive;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ws_socket::{AxumSocketReader, AxumSocketWriter};

/// Handlers share one clone of this per connection/request.
#[derive(Clone)]
pub struct AppState {
    /// The dialog (chat+TTS) engine, shared across every `/chat/` connection.
    pub dialog: Arc<DialogEngine>,
    /// The voice (ASR-only) engine, shared across every `/voice/asr` connection.
    pub voice: Arc<VoiceEngine>,
    /// The report archive, read by the history-listing endpoint.
    pub archive: Arc<dyn ReportArchive>,
}

pub async fn chat_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let reader = AxumSocketReader::new(stream);
        let writer = AxumSocketWriter::new(sink);
        if let Err(err) = state.dialog.run(reader, writer).await {
            warn!(error = %err, "dialog session ended with an error");
        }
    })
}

pub async fn voice_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let reader = AxumSocketReader::new(stream);
        let writer = AxumSocketWriter::new(sink);
        if let Err(err) = state.voice.run(reader, writer).await {
            warn!(error = %err, "voice session ended with an error");
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub code: i32,
    pub msg: String,
    pub history: Vec<dialog_store::TranscriptBundle>,
    pub total: u64,
}

pub async fn history_list(
    State(state): State<AppState>,
    Query(query): Query<HistoryListQuery>,
) -> impl IntoResponse {
    match state.archive.find(query.page, query.limit).await {
        Ok((history, total)) => {
            Json(HistoryListResponse { code: 0, msg: String::new(), history, total })
        }
        Err(err) => {
            warn!(error = %err, "failed to list report history");
            Json(HistoryListResponse { code: 1, msg: err.to_string(), history: Vec::new(), total: 0 })
        }
    }
}
