//! Gateway binary: hosts the dialog and voice websocket engines behind an `axum` HTTP
//! server, and the read-only report history listing.

mod config;
mod routes;
mod ws_socket;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use dialog_engine::{DialogEngine, VoiceEngine};
use dialog_providers::{AsrBidi, ChatLlm, ReportLlm, TtsBidi, TtsUnary};
use dialog_store::{LapinJobQueue, MongoReportArchive, RedisTranscriptStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::GatewayConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::load()?;
    let http = reqwest::Client::new();

    let chat = Arc::new(ChatLlm::new(config.providers.chat.clone(), http.clone()));
    let tts_bidi = Arc::new(TtsBidi::new(config.providers.tts.clone()));
    let tts_unary = Arc::new(TtsUnary::new(config.providers.tts.clone()));
    let asr = Arc::new(AsrBidi::new(config.providers.asr.clone()));

    let transcript_store = Arc::new(RedisTranscriptStore::connect(&config.redis).await?);
    let job_queue = Arc::new(LapinJobQueue::connect(&config.rabbitmq).await?);
    let report_archive: Arc<dyn dialog_store::ReportArchive> =
        Arc::new(MongoReportArchive::connect(&config.mongo).await?);

    let dialog = Arc::new(DialogEngine::new(
        chat,
        tts_bidi,
        tts_unary,
        transcript_store,
        job_queue,
        config.engine.clone(),
    ));
    let voice = Arc::new(VoiceEngine::new(asr, config.voice.clone()));

    let state = AppState { dialog, voice, archive: report_archive };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/chat/", get(routes::chat_ws))
        .route("/voice/asr", get(routes::voice_ws))
        .route("/chat/history/list", get(routes::history_list))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(listen = %config.listen, "dialog-gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
