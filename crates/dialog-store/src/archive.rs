//! Paged report archive backed by MongoDB: the final record of one analyzed session,
//! combining its dialogs with the Report-LLM's opaque structured report.

use async_trait::async_trait;
use bson::doc;
use futures_util::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};

use crate::config::MongoConfig;
use crate::error::Result;
use crate::transcript::ChatHistoryEntry;

const DEFAULT_COLLECTION: &str = "history";

/// The persisted `{session-id, start-time, end-time, dialogs[], report?}` document.
/// Immutable after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptBundle {
    /// Mongo's surrogate id, present once the document has been inserted.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<bson::oid::ObjectId>,
    /// Session identifier the bundle covers.
    pub session_id: String,
    /// Session start, Unix seconds.
    pub start_time: i64,
    /// Session end, Unix seconds.
    pub end_time: i64,
    /// The ordered dialog turns recorded during the session.
    pub dialogs: Vec<ChatHistoryEntry>,
    /// The Report-LLM's opaque structured report, stored verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
}

/// Capability surface the analysis worker depends on to persist and list reports.
#[async_trait]
pub trait ReportArchive: Send + Sync {
    /// Insert a newly completed bundle.
    async fn insert(&self, bundle: &TranscriptBundle) -> Result<()>;
    /// Return one page of bundles sorted by `start_time` descending, plus the total count.
    async fn find(&self, page: u64, limit: u64) -> Result<(Vec<TranscriptBundle>, u64)>;
}

/// MongoDB-backed report archive.
#[derive(Clone)]
pub struct MongoReportArchive {
    collection: Collection<TranscriptBundle>,
}

impl MongoReportArchive {
    /// Connect to MongoDB and bind to the configured database's `history` collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string cannot be parsed or the client cannot be
    /// constructed.
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.url).await?;
        let db: Database = client.database(&config.db);
        let collection = db.collection::<TranscriptBundle>(DEFAULT_COLLECTION);
        Ok(Self { collection })
    }
}

#[async_trait]
impl ReportArchive for MongoReportArchive {
    async fn insert(&self, bundle: &TranscriptBundle) -> Result<()> {
        self.collection.insert_one(bundle).await?;
        Ok(())
    }

    async fn find(&self, page: u64, limit: u64) -> Result<(Vec<TranscriptBundle>, u64)> {
        let skip = page.saturating_sub(1).saturating_mul(limit);
        let options = FindOptions::builder()
            .sort(doc! { "start_time": -1 })
            .skip(skip)
            .limit(limit.try_into().unwrap_or(i64::MAX))
            .build();
        let mut cursor = self.collection.find(doc! {}).with_options(options).await?;
        let mut docs = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            docs.push(doc);
        }
        let total = self.collection.count_documents(doc! {}).await?;
        Ok((docs, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_round_trips_through_json() {
        let bundle = TranscriptBundle {
            id: None,
            session_id: "abc".into(),
            start_time: 1_700_000_000,
            end_time: 1_700_000_100,
            dialogs: vec![ChatHistoryEntry { role: "ai".into(), content: "你好".into() }],
            report: Some(serde_json::json!({"grade": "low"})),
        };
        let raw = serde_json::to_string(&bundle).expect("serialize");
        let back: TranscriptBundle = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back.session_id, bundle.session_id);
        assert_eq!(back.dialogs, bundle.dialogs);
    }
}
