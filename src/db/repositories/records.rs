use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{
    helpers::{
        format_datetime, metadata_from_json, metadata_to_json, parse_datetime, parse_label,
        parse_mode, parse_uuid,
    },
    Database,
};
use crate::persist::SentimentRecord;

const RECORD_COLUMNS: &str = "record_id, source, text, sentiment, score, confidence, latency_ms, processing_mode, timestamp, metadata_json";

/// Aggregate view over the records stored since a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub since: DateTime<Utc>,
    pub total_records: u64,
    pub average_score: f64,
    pub sentiment_distribution: BTreeMap<String, u64>,
    pub source_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub count: u64,
}

fn row_to_record(row: &Row) -> Result<SentimentRecord> {
    let record_id: String = row.get("record_id")?;
    let sentiment: String = row.get("sentiment")?;
    let processing_mode: String = row.get("processing_mode")?;
    let timestamp: String = row.get("timestamp")?;
    let latency_ms: f64 = row.get("latency_ms")?;

    Ok(SentimentRecord {
        record_id: parse_uuid(&record_id, "record_id")?,
        source: row.get("source")?,
        text: row.get("text")?,
        sentiment: parse_label(&sentiment)?,
        score: row.get("score")?,
        confidence: row.get("confidence")?,
        latency: Duration::try_from_secs_f64(latency_ms / 1000.0)
            .context("failed to parse latency_ms")?,
        processing_mode: parse_mode(&processing_mode)?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        metadata: metadata_from_json(row.get("metadata_json")?)?,
    })
}

pub(crate) fn insert_record(conn: &mut Connection, record: &SentimentRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO sentiment_records
            (record_id, source, text, sentiment, score, confidence, latency_ms, processing_mode, timestamp, metadata_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.record_id.to_string(),
            record.source,
            record.text,
            record.sentiment.as_str(),
            record.score,
            record.confidence,
            record.latency.as_secs_f64() * 1000.0,
            record.processing_mode.as_str(),
            format_datetime(&record.timestamp),
            metadata_to_json(record.metadata.as_ref())?,
        ],
    )
    .with_context(|| format!("failed to insert sentiment record {}", record.record_id))?;
    Ok(())
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SentimentRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

impl Database {
    pub async fn insert_record(&self, record: &SentimentRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| insert_record(conn, &record)).await
    }

    /// Newest first.
    pub async fn recent_records(&self, limit: usize) -> Result<Vec<SentimentRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sentiment_records
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1"
                ),
                params![limit],
            )
        })
        .await
    }

    /// Oldest first, both bounds inclusive.
    pub async fn records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SentimentRecord>> {
        self.execute(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sentiment_records
                     WHERE timestamp >= ?1 AND timestamp <= ?2
                     ORDER BY timestamp ASC, id ASC"
                ),
                params![format_datetime(&start), format_datetime(&end)],
            )
        })
        .await
    }

    pub async fn sentiment_summary(&self, since: DateTime<Utc>) -> Result<SentimentSummary> {
        self.execute(move |conn| {
            let since_str = format_datetime(&since);

            let (total, average): (i64, Option<f64>) = conn
                .query_row(
                    "SELECT COUNT(*), AVG(score) FROM sentiment_records WHERE timestamp >= ?1",
                    params![since_str],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .context("failed to summarize sentiment records")?;

            let sentiment_distribution = grouped_counts(
                conn,
                "SELECT sentiment, COUNT(*) FROM sentiment_records
                 WHERE timestamp >= ?1 GROUP BY sentiment",
                &since_str,
            )?;
            let source_distribution = grouped_counts(
                conn,
                "SELECT source, COUNT(*) FROM sentiment_records
                 WHERE timestamp >= ?1 GROUP BY source",
                &since_str,
            )?;

            Ok(SentimentSummary {
                since,
                total_records: u64::try_from(total).unwrap_or(0),
                average_score: average.unwrap_or(0.0),
                sentiment_distribution,
                source_distribution,
            })
        })
        .await
    }

    /// Most active source first.
    pub async fn source_counts(&self, since: DateTime<Utc>) -> Result<Vec<SourceCount>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT source, COUNT(*) AS count FROM sentiment_records
                 WHERE timestamp >= ?1
                 GROUP BY source
                 ORDER BY count DESC, source ASC",
            )?;
            let mut rows = stmt.query(params![format_datetime(&since)])?;
            let mut counts = Vec::new();
            while let Some(row) = rows.next()? {
                let count: i64 = row.get(1)?;
                counts.push(SourceCount {
                    source: row.get(0)?,
                    count: u64::try_from(count).unwrap_or(0),
                });
            }
            Ok(counts)
        })
        .await
    }
}

fn grouped_counts(conn: &Connection, sql: &str, since: &str) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![since])?;
    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        counts.insert(key, u64::try_from(count).unwrap_or(0));
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SentimentLabel;
    use crate::persist::{Persist, ProcessingMode};
    use crate::queue::Metadata;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn record(source: &str, sentiment: SentimentLabel, score: f64, minute: u32) -> SentimentRecord {
        SentimentRecord {
            record_id: Uuid::new_v4(),
            source: source.to_string(),
            text: format!("{source} text at {minute}"),
            sentiment,
            score,
            confidence: score.abs(),
            latency: Duration::from_micros(750),
            processing_mode: ProcessingMode::Stream,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            metadata: None,
        }
    }

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("records.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (_dir, db) = open();
        let mut metadata = Metadata::new();
        metadata.insert("lang".into(), serde_json::json!("en"));
        let mut original = record("review", SentimentLabel::Positive, 0.7, 1);
        original.metadata = Some(metadata);

        db.insert_record(&original).await.unwrap();
        let recent = db.recent_records(10).await.unwrap();

        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].record_id, original.record_id);
        assert_eq!(recent[0].metadata, original.metadata);
        assert_eq!(recent[0].sentiment, SentimentLabel::Positive);
        assert!((recent[0].latency.as_secs_f64() * 1e6 - 750.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_persist_submits_without_waiting() {
        let (_dir, db) = open();
        db.persist(&record("twitter", SentimentLabel::Negative, -0.4, 2))
            .unwrap();
        db.persist(&record("twitter", SentimentLabel::Neutral, 0.0, 3))
            .unwrap();

        // Queries run after earlier submissions on the same thread.
        let recent = db.recent_records(5).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sentiment, SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn test_summary_and_source_counts() {
        let (_dir, db) = open();
        for rec in [
            record("review", SentimentLabel::Positive, 0.8, 1),
            record("review", SentimentLabel::Negative, -0.4, 10),
            record("news", SentimentLabel::Positive, 0.2, 20),
            record("twitter", SentimentLabel::Neutral, 0.0, 30),
        ] {
            db.insert_record(&rec).await.unwrap();
        }

        let since = Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap();
        let summary = db.sentiment_summary(since).await.unwrap();
        assert_eq!(summary.total_records, 3);
        assert!((summary.average_score - (-0.4 + 0.2 + 0.0) / 3.0).abs() < 1e-9);
        assert_eq!(summary.sentiment_distribution.get("positive"), Some(&1));
        assert_eq!(summary.source_distribution.get("review"), Some(&1));

        let all = db
            .source_counts(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(
            all[0],
            SourceCount {
                source: "review".into(),
                count: 2
            }
        );
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_summary_is_zeroed() {
        let (_dir, db) = open();
        let summary = db.sentiment_summary(Utc::now()).await.unwrap();
        assert_eq!(summary.total_records, 0);
        assert_eq!(summary.average_score, 0.0);
        assert!(summary.sentiment_distribution.is_empty());
    }

    #[tokio::test]
    async fn test_records_between_is_inclusive() {
        let (_dir, db) = open();
        for minute in [1, 2, 3, 4] {
            db.insert_record(&record("news", SentimentLabel::Neutral, 0.0, minute))
                .await
                .unwrap();
        }

        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 2, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 0).unwrap();
        let window = db.records_between(start, end).await.unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].timestamp, start);
        assert_eq!(window[1].timestamp, end);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.insert_record(&record("review", SentimentLabel::Positive, 0.5, 1))
                .await
                .unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(db.recent_records(10).await.unwrap().len(), 1);
    }
}
