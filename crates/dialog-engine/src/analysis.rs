//! The analysis worker: a long-lived consumer that drains the job queue, reads a session's
//! transcript, calls the Report-LLM, persists the resulting bundle, and retires the
//! transcript. Delivery is at-least-once; the final transcript delete is idempotent, so a
//! duplicate delivery after a successful prior run is a harmless no-op.

use dialog_providers::ReportLlmProvider;
use dialog_store::{JobConsumer, ReportArchive, TranscriptBundle, TranscriptStore};
use tracing::{error, info, warn};

use crate::error::Result;

/// Drives the analysis job queue to completion, one delivery at a time.
pub struct AnalysisWorker<C, T, R, A>
where
    C: JobConsumer,
    T: TranscriptStore,
    R: ReportLlmProvider,
    A: ReportArchive,
{
    consumer: C,
    transcript: T,
    report_llm: R,
    archive: A,
}

impl<C, T, R, A> AnalysisWorker<C, T, R, A>
where
    C: JobConsumer,
    T: TranscriptStore,
    R: ReportLlmProvider,
    A: ReportArchive,
{
    /// Assemble a worker from its dependencies, injected once at startup by the analyzer
    /// binary.
    #[must_use]
    pub fn new(consumer: C, transcript: T, report_llm: R, archive: A) -> Self {
        Self { consumer, transcript, report_llm, archive }
    }

    /// Drain the job queue forever, processing one delivery at a time (`prefetch=1`).
    /// Returns once the consumer stream ends, which only happens if the broker connection
    /// itself is torn down.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the next delivery from the broker fails outright; errors
    /// processing an individual job are nacked and logged, never propagated.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(delivery) = self.consumer.next_delivery().await? {
            let Some(job) = delivery.job.clone() else {
                warn!("malformed analysis job payload, discarding without requeue");
                if let Err(err) = delivery.nack(false).await {
                    error!(error = %err, "failed to nack malformed analysis job");
                }
                continue;
            };

            match self.process(&job).await {
                Ok(()) => {
                    if let Err(err) = delivery.ack().await {
                        error!(session_id = %job.session_id, error = %err, "failed to ack analysis job");
                    }
                    info!(session_id = %job.session_id, "analysis job processed");
                }
                Err(err) => {
                    warn!(session_id = %job.session_id, error = %err, "analysis job failed, requeuing");
                    if let Err(nack_err) = delivery.nack(true).await {
                        error!(session_id = %job.session_id, error = %nack_err, "failed to nack analysis job");
                    }
                }
            }
        }
        Ok(())
    }

    async fn process(&self, job: &dialog_store::AnalysisJob) -> Result<()> {
        let dialogs = self.transcript.list(&job.session_id).await?;
        if dialogs.is_empty() {
            // A prior delivery already archived this session and deleted its transcript;
            // this is a redelivery of the same job (at-least-once), arriving after that
            // run's `insert` but before its `ack` landed. Treat it as already processed so
            // a redelivery doesn't produce a second report document for the same session.
            info!(session_id = %job.session_id, "transcript already retired, treating delivery as already processed");
            return Ok(());
        }
        let plain_text = dialogs
            .iter()
            .map(|entry| format!("{}:{}", entry.role, entry.content))
            .collect::<Vec<_>>()
            .join("\n");

        let report = self.report_llm.call(&plain_text).await?;

        let bundle = TranscriptBundle {
            id: None,
            session_id: job.session_id.clone(),
            start_time: job.start,
            end_time: job.end,
            dialogs,
            report: Some(report),
        };
        self.archive.insert(&bundle).await?;
        self.transcript.delete(&job.session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use dialog_providers::ProviderError;
    use dialog_store::{AnalysisJob, ChatHistoryEntry, JobDelivery, JobDeliveryHandle};

    use super::*;

    struct FakeHandle {
        acked: StdMutex<bool>,
        nacked: StdMutex<Option<bool>>,
    }

    #[async_trait]
    impl JobDeliveryHandle for FakeHandle {
        async fn ack(&self) -> dialog_store::Result<()> {
            *self.acked.lock().expect("lock") = true;
            Ok(())
        }

        async fn nack(&self, requeue: bool) -> dialog_store::Result<()> {
            *self.nacked.lock().expect("lock") = Some(requeue);
            Ok(())
        }
    }

    struct FakeConsumer {
        jobs: StdMutex<Vec<Option<AnalysisJob>>>,
    }

    #[async_trait]
    impl JobConsumer for FakeConsumer {
        async fn next_delivery(&mut self) -> dialog_store::Result<Option<JobDelivery>> {
            let mut jobs = self.jobs.lock().expect("lock");
            Ok(jobs.pop().map(|job| {
                JobDelivery::new(
                    job,
                    Box::new(FakeHandle { acked: StdMutex::new(false), nacked: StdMutex::new(None) }),
                )
            }))
        }
    }

    struct FakeTranscript {
        entries: Vec<ChatHistoryEntry>,
        deleted: StdMutex<bool>,
    }

    #[async_trait]
    impl TranscriptStore for FakeTranscript {
        async fn append_system(&self, _session_id: &str, _content: &str) -> dialog_store::Result<()> {
            Ok(())
        }
        async fn append_user(&self, _session_id: &str, _content: &str) -> dialog_store::Result<()> {
            Ok(())
        }
        async fn append_ai(&self, _session_id: &str, _content: &str) -> dialog_store::Result<()> {
            Ok(())
        }
        async fn list(&self, _session_id: &str) -> dialog_store::Result<Vec<ChatHistoryEntry>> {
            Ok(self.entries.clone())
        }
        async fn delete(&self, _session_id: &str) -> dialog_store::Result<()> {
            *self.deleted.lock().expect("lock") = true;
            Ok(())
        }
    }

    struct FakeReportLlm {
        fail: bool,
    }

    #[async_trait]
    impl ReportLlmProvider for FakeReportLlm {
        async fn call(&self, _prompt: &str) -> dialog_providers::Result<serde_json::Value> {
            if self.fail {
                return Err(ProviderError::Protocol("boom".into()));
            }
            Ok(serde_json::json!({"grade": "ok"}))
        }
    }

    struct FakeArchive {
        inserted: StdMutex<Vec<TranscriptBundle>>,
    }

    #[async_trait]
    impl ReportArchive for FakeArchive {
        async fn insert(&self, bundle: &TranscriptBundle) -> dialog_store::Result<()> {
            self.inserted.lock().expect("lock").push(bundle.clone());
            Ok(())
        }
        async fn find(&self, _page: u64, _limit: u64) -> dialog_store::Result<(Vec<TranscriptBundle>, u64)> {
            Ok((Vec::new(), 0))
        }
    }

    fn sample_job() -> AnalysisJob {
        AnalysisJob { session_id: "abc".into(), start: 1_700_000_000, end: 1_700_000_100 }
    }

    #[tokio::test]
    async fn successful_job_archives_and_deletes_transcript() {
        let consumer = FakeConsumer { jobs: StdMutex::new(vec![Some(sample_job())]) };
        let transcript = FakeTranscript {
            entries: vec![ChatHistoryEntry { role: "ai".into(), content: "你好呀".into() }],
            deleted: StdMutex::new(false),
        };
        let archive = FakeArchive { inserted: StdMutex::new(Vec::new()) };
        let mut worker = AnalysisWorker::new(consumer, transcript, FakeReportLlm { fail: false }, archive);

        worker.run().await.expect("worker run");
        let inserted = worker.archive.inserted.lock().expect("lock");
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].session_id, "abc");
        assert_eq!(inserted[0].report, Some(serde_json::json!({"grade": "ok"})));
        assert!(*worker.transcript.deleted.lock().expect("lock"));
    }

    #[tokio::test]
    async fn malformed_job_is_nacked_without_requeue() {
        let consumer = FakeConsumer { jobs: StdMutex::new(vec![None]) };
        let transcript = FakeTranscript { entries: Vec::new(), deleted: StdMutex::new(false) };
        let archive = FakeArchive { inserted: StdMutex::new(Vec::new()) };
        let mut worker = AnalysisWorker::new(consumer, transcript, FakeReportLlm { fail: false }, archive);

        worker.run().await.expect("worker run");
    }

    #[tokio::test]
    async fn report_llm_failure_requeues_and_leaves_transcript_intact() {
        let consumer = FakeConsumer { jobs: StdMutex::new(vec![Some(sample_job())]) };
        let transcript = FakeTranscript {
            entries: vec![ChatHistoryEntry { role: "user".into(), content: "嗨".into() }],
            deleted: StdMutex::new(false),
        };
        let archive = FakeArchive { inserted: StdMutex::new(Vec::new()) };
        let mut worker = AnalysisWorker::new(consumer, transcript, FakeReportLlm { fail: true }, archive);

        worker.run().await.expect("worker run");
        assert!(worker.archive.inserted.lock().expect("lock").is_empty());
        assert!(!*worker.transcript.deleted.lock().expect("lock"));
    }

    #[tokio::test]
    async fn redelivery_of_an_already_retired_session_is_acked_without_duplicate_archive() {
        let consumer = FakeConsumer { jobs: StdMutex::new(vec![Some(sample_job())]) };
        let transcript = FakeTranscript { entries: Vec::new(), deleted: StdMutex::new(false) };
        let archive = FakeArchive { inserted: StdMutex::new(Vec::new()) };
        let mut worker = AnalysisWorker::new(consumer, transcript, FakeReportLlm { fail: false }, archive);

        worker.run().await.expect("worker run");
        assert!(worker.archive.inserted.lock().expect("lock").is_empty());
    }
}
