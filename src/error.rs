use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that abort a whole engine call or construction.
///
/// Item-level problems never show up here; they travel on
/// [`AnalysisResult::error`](crate::engine::AnalysisResult) instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("processing cancelled before completion")]
    Cancelled,

    #[error("worker pool is no longer accepting jobs")]
    WorkerPoolClosed,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error reported by a [`Score`](crate::analysis::Score) implementation for one text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("scoring failed: {0}")]
pub struct ScoreError(pub String);

impl ScoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Returned by [`BoundedQueue::try_push`](crate::queue::BoundedQueue::try_push)
/// when the queue is full. Hands the rejected item back to the producer.
#[derive(Debug, Error)]
#[error("queue is at capacity ({capacity})")]
pub struct QueueFull<T> {
    pub item: T,
    pub capacity: usize,
}

/// Why a single item ended up without a real sentiment verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ItemError {
    #[error("text too short after preprocessing")]
    EmptyAfterPreprocessing,

    #[error("{0}")]
    Scoring(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ItemError::Scoring("boom".into())).unwrap();
        assert_eq!(json, r#"{"kind":"scoring","message":"boom"}"#);

        let json = serde_json::to_string(&ItemError::EmptyAfterPreprocessing).unwrap();
        assert_eq!(json, r#"{"kind":"empty_after_preprocessing"}"#);
    }

    #[test]
    fn test_queue_full_returns_item() {
        let err = QueueFull {
            item: "payload",
            capacity: 3,
        };
        assert_eq!(err.to_string(), "queue is at capacity (3)");
        assert_eq!(err.item, "payload");
    }
}
