//! Text cleaning and scoring collaborators consumed by the engines.
//!
//! Both engines only see the [`Preprocess`] and [`Score`] traits; the
//! regex preprocessor and lexicon scorer in this module are the defaults
//! wired by [`Pipeline`](crate::Pipeline).

mod lexicon;
mod preprocessor;

pub use lexicon::{LexiconScorer, ScorerConfig};
pub use preprocessor::{PreprocessConfig, TextPreprocessor};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;

/// Sentiment class attached to every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Error,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Error => "error",
        }
    }

    /// Classify a compound score against the configured thresholds.
    pub fn from_score(score: f64, positive_threshold: f64, negative_threshold: f64) -> Self {
        if score >= positive_threshold {
            SentimentLabel::Positive
        } else if score <= negative_threshold {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a [`Score`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: SentimentLabel,
    /// Compound score in `[-1, 1]`.
    pub score: f64,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

impl Verdict {
    pub fn new(label: SentimentLabel, score: f64, confidence: f64) -> Self {
        Self {
            label,
            score,
            confidence: confidence.clamp(0.0, 1.0),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: f64) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Text-cleaning collaborator. An empty return value means "nothing left to score".
pub trait Preprocess: Send + Sync {
    fn preprocess(&self, text: &str) -> String;
}

/// Sentiment-scoring collaborator.
///
/// Called concurrently from the batch worker pool, so implementations must
/// not rely on shared mutable state.
pub trait Score: Send + Sync {
    fn score(&self, text: &str) -> Result<Verdict, ScoreError>;
}

impl<F> Preprocess for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn preprocess(&self, text: &str) -> String {
        self(text)
    }
}

impl<F> Score for F
where
    F: Fn(&str) -> Result<Verdict, ScoreError> + Send + Sync,
{
    fn score(&self, text: &str) -> Result<Verdict, ScoreError> {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_score() {
        assert_eq!(SentimentLabel::from_score(0.4, 0.05, -0.05), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.05, 0.05, -0.05), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.0, 0.05, -0.05), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.05, 0.05, -0.05), SentimentLabel::Negative);
    }

    #[test]
    fn test_verdict_clamps_confidence() {
        assert_eq!(Verdict::new(SentimentLabel::Positive, 0.9, 1.7).confidence, 1.0);
        assert_eq!(Verdict::new(SentimentLabel::Negative, -0.9, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_closures_act_as_collaborators() {
        let upper = |text: &str| text.to_uppercase();
        assert_eq!(upper.preprocess("abc"), "ABC");

        let always_neutral =
            |_: &str| -> Result<Verdict, ScoreError> { Ok(Verdict::new(SentimentLabel::Neutral, 0.0, 0.0)) };
        assert_eq!(always_neutral.score("x").unwrap().label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_label_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SentimentLabel::Negative).unwrap(), "\"negative\"");
        assert_eq!(SentimentLabel::Error.to_string(), "error");
    }
}
