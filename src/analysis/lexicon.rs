use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Score, SentimentLabel, Verdict};
use crate::error::ScoreError;

/// Normalisation constant for the compound score: `sum / sqrt(sum² + ALPHA)`.
const ALPHA: f64 = 1.0;

/// How many following tokens a negation word flips.
const NEGATION_SCOPE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub positive_threshold: f64,
    pub negative_threshold: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            positive_threshold: 0.05,
            negative_threshold: -0.05,
        }
    }
}

/// Deterministic word-list scorer with negation and intensifier handling.
///
/// Stateless after construction, so one instance can be shared by every
/// worker thread.
pub struct LexiconScorer {
    config: ScorerConfig,
    words: HashMap<String, f64>,
    negations: HashSet<String>,
    intensifiers: HashMap<String, f64>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default())
    }
}

impl LexiconScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let positive_words = [
            ("love", 0.8),
            ("loved", 0.8),
            ("like", 0.4),
            ("good", 0.5),
            ("great", 0.7),
            ("amazing", 0.8),
            ("awesome", 0.8),
            ("excellent", 0.8),
            ("exceptional", 0.8),
            ("outstanding", 0.8),
            ("fantastic", 0.8),
            ("wonderful", 0.8),
            ("incredible", 0.7),
            ("perfect", 0.8),
            ("best", 0.8),
            ("happy", 0.6),
            ("enjoy", 0.6),
            ("pleased", 0.6),
            ("nice", 0.4),
            ("recommend", 0.5),
            ("exceeded", 0.5),
            ("worth", 0.3),
            ("decent", 0.2),
            ("breakthrough", 0.5),
            ("innovation", 0.3),
            ("growth", 0.4),
        ];

        let negative_words = [
            ("terrible", -0.8),
            ("worst", -0.9),
            ("awful", -0.8),
            ("horrible", -0.8),
            ("hate", -0.8),
            ("bad", -0.6),
            ("poor", -0.6),
            ("disappointing", -0.7),
            ("disappointed", -0.7),
            ("waste", -0.6),
            ("garbage", -0.8),
            ("useless", -0.7),
            ("broke", -0.5),
            ("broken", -0.5),
            ("overpriced", -0.4),
            ("mediocre", -0.3),
            ("questionable", -0.3),
            ("sad", -0.5),
            ("angry", -0.6),
            ("complaints", -0.3),
            ("fail", -0.7),
            ("failed", -0.7),
        ];

        let words = positive_words
            .into_iter()
            .chain(negative_words)
            .map(|(word, score)| (word.to_string(), score))
            .collect();

        let negations = [
            "not", "no", "never", "nothing", "none", "cannot", "cant", "dont", "doesnt", "didnt",
            "wont", "isnt", "wasnt", "arent", "hardly", "barely",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let intensifiers = [
            ("very", 1.5),
            ("really", 1.3),
            ("absolutely", 1.5),
            ("extremely", 1.6),
            ("highly", 1.4),
            ("so", 1.2),
            ("totally", 1.4),
        ]
        .into_iter()
        .map(|(word, factor)| (word.to_string(), factor))
        .collect();

        Self {
            config,
            words,
            negations,
            intensifiers,
        }
    }

    /// Add or override a lexicon entry.
    pub fn with_word(mut self, word: &str, score: f64) -> Self {
        self.words.insert(word.to_lowercase(), score.clamp(-1.0, 1.0));
        self
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn analyze(&self, text: &str) -> Verdict {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|raw| {
                raw.chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|token| !token.is_empty())
            .collect();

        let mut total = 0.0;
        let mut matched = 0usize;
        let mut negate_remaining = 0usize;
        let mut boost = 1.0;

        for token in &tokens {
            if self.negations.contains(token) {
                negate_remaining = NEGATION_SCOPE;
                continue;
            }
            if let Some(factor) = self.intensifiers.get(token) {
                boost *= factor;
                continue;
            }

            if let Some(value) = self.words.get(token) {
                let mut contribution = value * boost;
                if negate_remaining > 0 {
                    contribution = -contribution * 0.5;
                }
                total += contribution;
                matched += 1;
            }

            // Intensifiers only modify the word right after them.
            boost = 1.0;
            negate_remaining = negate_remaining.saturating_sub(1);
        }

        let compound = if matched == 0 {
            0.0
        } else {
            (total / (total * total + ALPHA).sqrt()).clamp(-1.0, 1.0)
        };

        let label = SentimentLabel::from_score(
            compound,
            self.config.positive_threshold,
            self.config.negative_threshold,
        );

        Verdict::new(label, compound, compound.abs().min(1.0))
            .with_detail("matched_words", matched as f64)
            .with_detail("token_count", tokens.len() as f64)
            .with_detail("raw_total", total)
    }
}

impl Score for LexiconScorer {
    fn score(&self, text: &str) -> Result<Verdict, ScoreError> {
        Ok(self.analyze(text))
    }
}
