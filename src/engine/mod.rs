//! Batch and stream execution strategies plus the result types they share.

mod batch;
mod pool;
mod stream;

pub use batch::{BatchConfig, BatchEngine, BatchLifetimeStats, BatchOutput, BatchStatistics};
pub use pool::WorkerPool;
pub use stream::{StreamConfig, StreamEngine, StreamStatistics, WindowStatistics};

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{SentimentLabel, Verdict};
use crate::error::ItemError;
use crate::queue::Metadata;
use crate::utils::duration_ms;

/// Outcome for one input text. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub original_text: String,
    #[serde(rename = "sentiment")]
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl AnalysisResult {
    pub(crate) fn scored(
        original_text: String,
        verdict: Verdict,
        latency: Duration,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            original_text,
            label: verdict.label,
            score: verdict.score,
            confidence: verdict.confidence.clamp(0.0, 1.0),
            latency,
            timestamp: Utc::now(),
            details: verdict.details,
            metadata,
            error: None,
        }
    }

    /// Neutral placeholder for text that preprocessing reduced to nothing.
    /// Latency is zero because nothing was scored.
    pub(crate) fn empty_input(original_text: String, metadata: Option<Metadata>) -> Self {
        Self {
            original_text,
            label: SentimentLabel::Neutral,
            score: 0.0,
            confidence: 0.0,
            latency: Duration::ZERO,
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            metadata,
            error: Some(ItemError::EmptyAfterPreprocessing),
        }
    }

    pub(crate) fn scoring_failed(
        original_text: String,
        message: String,
        latency: Duration,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            original_text,
            label: SentimentLabel::Error,
            score: 0.0,
            confidence: 0.0,
            latency,
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            metadata,
            error: Some(ItemError::Scoring(message)),
        }
    }

    /// True for empty-input and scoring-failure outcomes.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Batch results arrive in completion order; `index` points back at the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedResult {
    pub index: usize,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

/// Label counts over non-error results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
}

impl SentimentDistribution {
    /// Count `result` unless it carries an error. Returns whether it was counted.
    pub fn record(&mut self, result: &AnalysisResult) -> bool {
        if result.is_error() {
            return false;
        }
        match result.label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Negative => self.negative += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Error => return false,
        }
        true
    }

    pub fn get(&self, label: SentimentLabel) -> u64 {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Negative => self.negative,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Error => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.negative + self.neutral
    }
}

impl<'a> FromIterator<&'a AnalysisResult> for SentimentDistribution {
    fn from_iter<I: IntoIterator<Item = &'a AnalysisResult>>(iter: I) -> Self {
        let mut distribution = Self::default();
        for result in iter {
            distribution.record(result);
        }
        distribution
    }
}
