use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::analysis::SentimentLabel;
use crate::persist::ProcessingMode;
use crate::queue::Metadata;

/// Fixed-width UTC form so that string comparison in SQL orders by time.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_label(value: &str) -> Result<SentimentLabel> {
    match value {
        "positive" => Ok(SentimentLabel::Positive),
        "negative" => Ok(SentimentLabel::Negative),
        "neutral" => Ok(SentimentLabel::Neutral),
        "error" => Ok(SentimentLabel::Error),
        other => Err(anyhow!("unknown sentiment label {other}")),
    }
}

pub fn parse_mode(value: &str) -> Result<ProcessingMode> {
    match value {
        "batch" => Ok(ProcessingMode::Batch),
        "stream" => Ok(ProcessingMode::Stream),
        other => Err(anyhow!("unknown processing mode {other}")),
    }
}

pub fn metadata_to_json(metadata: Option<&Metadata>) -> Result<Option<String>> {
    metadata
        .map(|map| serde_json::to_string(map).context("failed to encode metadata"))
        .transpose()
}

pub fn metadata_from_json(value: Option<String>) -> Result<Option<Metadata>> {
    value
        .map(|raw| serde_json::from_str(&raw).context("failed to decode metadata_json"))
        .transpose()
}
