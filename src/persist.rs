//! Storage collaborator seam. Engines hand every scored result to a
//! [`Persist`] sink and never wait on it or fail because of it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::SentimentLabel;
use crate::engine::AnalysisResult;
use crate::queue::Metadata;
use crate::utils::duration_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Batch,
    Stream,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Batch => "batch",
            ProcessingMode::Stream => "stream",
        }
    }
}

/// Flattened, storage-ready view of one scored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub record_id: Uuid,
    pub source: String,
    pub text: String,
    pub sentiment: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    pub processing_mode: ProcessingMode,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl SentimentRecord {
    pub fn from_result(result: &AnalysisResult, source: &str, mode: ProcessingMode) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            source: source.to_string(),
            text: result.original_text.clone(),
            sentiment: result.label,
            score: result.score,
            confidence: result.confidence,
            latency: result.latency,
            processing_mode: mode,
            timestamp: result.timestamp,
            metadata: result.metadata.clone(),
        }
    }
}

/// Fire-and-forget storage sink.
///
/// An `Err` is logged by the caller and otherwise ignored; implementations
/// should return quickly and do slow work elsewhere.
pub trait Persist: Send + Sync {
    fn persist(&self, record: &SentimentRecord) -> anyhow::Result<()>;
}

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Forward `record` to `sink`, swallowing and logging any failure.
pub(crate) fn persist_quietly(sink: &dyn Persist, record: &SentimentRecord) {
    if let Err(err) = sink.persist(record) {
        log_warn!(
            "failed to persist {} record {} from {}: {err:#}",
            record.processing_mode.as_str(),
            record.record_id,
            record.source
        );
    }
}
