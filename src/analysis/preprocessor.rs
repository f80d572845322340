use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::Preprocess;

/// Toggles for the cleaning pipeline. Whitespace is always collapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub lowercase: bool,
    pub remove_urls: bool,
    pub remove_mentions: bool,
    pub remove_hashtags: bool,
    pub remove_punctuation: bool,
    /// Cleaned texts shorter than this (in chars) are rejected as empty.
    pub min_length: usize,
    /// Cleaned texts are truncated to this many chars.
    pub max_length: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_urls: true,
            remove_mentions: true,
            remove_hashtags: true,
            remove_punctuation: true,
            min_length: 3,
            max_length: 512,
        }
    }
}

/// Regex-based cleaner for short social/news texts.
pub struct TextPreprocessor {
    config: PreprocessConfig,
    url_regex: Regex,
    mention_regex: Regex,
    hashtag_regex: Regex,
    punctuation_regex: Regex,
    whitespace_regex: Regex,
}

impl Default for TextPreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl TextPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            config,
            url_regex: pattern(r"https?://\S+|www\.\S+"),
            mention_regex: pattern(r"@\w+"),
            hashtag_regex: pattern(r"#\w+"),
            punctuation_regex: pattern(r"[^\w\s]"),
            whitespace_regex: pattern(r"\s+"),
        }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Clean `text`; returns an empty string when nothing usable remains.
    ///
    /// Order: NFC normalisation, lowercase, URLs, mentions, hashtags,
    /// punctuation, whitespace collapse, then the length window.
    pub fn clean(&self, text: &str) -> String {
        let mut current: String = text.nfc().collect();

        if self.config.lowercase {
            current = current.to_lowercase();
        }
        if self.config.remove_urls {
            current = self.url_regex.replace_all(&current, "").into_owned();
        }
        if self.config.remove_mentions {
            current = self.mention_regex.replace_all(&current, "").into_owned();
        }
        if self.config.remove_hashtags {
            current = self.hashtag_regex.replace_all(&current, "").into_owned();
        }
        if self.config.remove_punctuation {
            current = self.punctuation_regex.replace_all(&current, "").into_owned();
        }

        let collapsed = self.whitespace_regex.replace_all(&current, " ");
        let trimmed = collapsed.trim();

        if trimmed.chars().count() < self.config.min_length {
            return String::new();
        }

        trimmed.chars().take(self.config.max_length).collect()
    }

    /// True when `text` survives cleaning.
    pub fn is_valid_text(&self, text: &str) -> bool {
        !self.clean(text).is_empty()
    }
}

impl Preprocess for TextPreprocessor {
    fn preprocess(&self, text: &str) -> String {
        self.clean(text)
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|err| panic!("invalid built-in pattern {source}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_urls_mentions_and_hashtags() {
        let pre = TextPreprocessor::default();
        let cleaned =
            pre.clean("Check out this amazing article! https://example.com @user #AI #MachineLearning");
        assert_eq!(cleaned, "check out this amazing article");
    }

    #[test]
    fn test_collapses_whitespace_and_lowercases() {
        let pre = TextPreprocessor::default();
        assert_eq!(
            pre.clean("THIS IS IN ALL CAPS WITH EXTRA     SPACES!!!"),
            "this is in all caps with extra spaces"
        );
    }

    #[test]
    fn test_short_and_empty_texts_become_empty() {
        let pre = TextPreprocessor::default();
        assert_eq!(pre.clean(""), "");
        assert_eq!(pre.clean("!!"), "");
        assert_eq!(pre.clean("@only #tags"), "");
        assert!(!pre.is_valid_text("   "));
    }

    #[test]
    fn test_truncates_to_max_length_on_char_boundary() {
        let pre = TextPreprocessor::new(PreprocessConfig {
            max_length: 4,
            ..PreprocessConfig::default()
        });
        assert_eq!(pre.clean("héllo wörld"), "héll");
    }

    #[test]
    fn test_flags_can_be_disabled() {
        let pre = TextPreprocessor::new(PreprocessConfig {
            lowercase: false,
            remove_punctuation: false,
            ..PreprocessConfig::default()
        });
        assert_eq!(pre.clean("Great job!"), "Great job!");
    }
}
