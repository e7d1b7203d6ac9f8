//! Analyzer binary: a long-lived process draining the analysis job queue, one delivery at
//! a time, forever.

mod config;

use dialog_engine::AnalysisWorker;
use dialog_providers::ReportLlm;
use dialog_store::{LapinJobQueue, MongoReportArchive, RedisTranscriptStore};
use tracing::{error, info};

use crate::config::AnalyzerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = AnalyzerConfig::load()?;
    let http = reqwest::Client::new();

    let queue = LapinJobQueue::connect(&config.rabbitmq).await?;
    let consumer = queue.consumer().await?;
    let transcript = RedisTranscriptStore::connect(&config.redis).await?;
    let report_llm = ReportLlm::new(config.providers.report.clone(), http);
    let archive = MongoReportArchive::connect(&config.mongo).await?;

    let mut worker = AnalysisWorker::new(consumer, transcript, report_llm, archive);
    info!("dialog-analyzer draining the analysis job queue");
    if let Err(err) = worker.run().await {
        error!(error = %err, "analysis worker stopped");
        return Err(err.into());
    }
    Ok(())
}
