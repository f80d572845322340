use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use super::{AnalysisResult, SentimentDistribution};
use crate::analysis::{Preprocess, Score};
use crate::error::{PipelineError, Result};
use crate::persist::{persist_quietly, Persist, ProcessingMode, SentimentRecord};
use crate::queue::{Metadata, QueueItem};
use crate::utils::{duration_ms, duration_secs, ratio_or_zero};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const STREAM_SOURCE: &str = "stream";

/// Upper bound on slots reserved up front; larger windows grow on demand.
const MAX_PREALLOCATED_WINDOW: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Number of most recent scored results kept for window statistics.
    pub window_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "window_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Lifetime counters since construction or the last `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub total_processed: u64,
    pub error_count: u64,
    /// Sum of scoring latencies.
    #[serde(rename = "total_time_secs", with = "duration_secs")]
    pub total_time: Duration,
    #[serde(rename = "avg_latency_ms", with = "duration_ms")]
    pub avg_latency: Duration,
    #[serde(rename = "min_latency_ms", with = "duration_ms")]
    pub min_latency: Duration,
    #[serde(rename = "max_latency_ms", with = "duration_ms")]
    pub max_latency: Duration,
    /// `total_processed / uptime`.
    pub overall_throughput: f64,
    /// Window sample count over the window's summed latency.
    pub current_throughput: f64,
    #[serde(rename = "uptime_secs", with = "duration_secs")]
    pub uptime: Duration,
}

/// Figures recomputed from whatever the window holds right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    pub sample_count: usize,
    pub capacity: usize,
    pub sentiment_distribution: SentimentDistribution,
    pub average_score: f64,
    #[serde(rename = "avg_latency_ms", with = "duration_ms")]
    pub avg_latency: Duration,
    #[serde(rename = "min_latency_ms", with = "duration_ms")]
    pub min_latency: Duration,
    #[serde(rename = "max_latency_ms", with = "duration_ms")]
    pub max_latency: Duration,
}

struct StreamState {
    window: VecDeque<AnalysisResult>,
    latencies: VecDeque<Duration>,
    total_processed: u64,
    error_count: u64,
    total_time: Duration,
    min_latency: Option<Duration>,
    max_latency: Duration,
    started_at: Instant,
}

impl StreamState {
    fn new(window_size: usize) -> Self {
        let reserved = window_size.min(MAX_PREALLOCATED_WINDOW);
        Self {
            window: VecDeque::with_capacity(reserved),
            latencies: VecDeque::with_capacity(reserved),
            total_processed: 0,
            error_count: 0,
            total_time: Duration::ZERO,
            min_latency: None,
            max_latency: Duration::ZERO,
            started_at: Instant::now(),
        }
    }

    fn clear(&mut self) {
        self.window.clear();
        self.latencies.clear();
        self.total_processed = 0;
        self.error_count = 0;
        self.total_time = Duration::ZERO;
        self.min_latency = None;
        self.max_latency = Duration::ZERO;
        self.started_at = Instant::now();
    }

    fn record(&mut self, result: &AnalysisResult, window_size: usize) {
        let latency = result.latency;

        self.total_processed += 1;
        self.total_time += latency;
        self.min_latency = Some(self.min_latency.map_or(latency, |min| min.min(latency)));
        self.max_latency = self.max_latency.max(latency);

        while self.window.len() >= window_size {
            self.window.pop_front();
            self.latencies.pop_front();
        }
        self.window.push_back(result.clone());
        self.latencies.push_back(latency);
    }

    fn window_latency_sum(&self) -> Duration {
        self.latencies.iter().sum()
    }
}

/// Latency-oriented engine: scores one item per call and keeps a sliding
/// window of the most recent results.
pub struct StreamEngine {
    config: StreamConfig,
    preprocessor: Arc<dyn Preprocess>,
    scorer: Arc<dyn Score>,
    state: Mutex<StreamState>,
    sink: Option<Arc<dyn Persist>>,
}

impl StreamEngine {
    pub fn new(
        config: StreamConfig,
        preprocessor: Arc<dyn Preprocess>,
        scorer: Arc<dyn Score>,
    ) -> Result<Self> {
        config.validate()?;
        let state = Mutex::new(StreamState::new(config.window_size));

        log_info!("Stream engine initialized with window_size={}", config.window_size);

        Ok(Self {
            config,
            preprocessor,
            scorer,
            state,
            sink: None,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn Persist>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn process_stream_item(&self, text: &str, metadata: Option<Metadata>) -> AnalysisResult {
        self.process(text, metadata, STREAM_SOURCE)
    }

    /// Score a dequeued item; its `source` travels to the sink.
    pub fn process_queue_item(&self, item: QueueItem) -> AnalysisResult {
        let QueueItem {
            text,
            source,
            metadata,
            ..
        } = item;
        self.process(&text, metadata, &source)
    }

    pub fn get_stats(&self) -> StreamStatistics {
        let state = self.lock_state();
        let uptime = state.started_at.elapsed();
        let processed = state.total_processed as f64;

        StreamStatistics {
            total_processed: state.total_processed,
            error_count: state.error_count,
            total_time: state.total_time,
            avg_latency: Duration::from_secs_f64(ratio_or_zero(
                state.total_time.as_secs_f64(),
                processed,
            )),
            min_latency: state.min_latency.unwrap_or(Duration::ZERO),
            max_latency: state.max_latency,
            overall_throughput: ratio_or_zero(processed, uptime.as_secs_f64()),
            current_throughput: ratio_or_zero(
                state.latencies.len() as f64,
                state.window_latency_sum().as_secs_f64(),
            ),
            uptime,
        }
    }

    pub fn get_window_stats(&self) -> WindowStatistics {
        let state = self.lock_state();
        let sample_count = state.window.len();
        let score_sum: f64 = state.window.iter().map(|result| result.score).sum();
        let latency_sum = state.window_latency_sum();

        WindowStatistics {
            sample_count,
            capacity: self.config.window_size,
            sentiment_distribution: state.window.iter().collect(),
            average_score: ratio_or_zero(score_sum, sample_count as f64),
            avg_latency: Duration::from_secs_f64(ratio_or_zero(
                latency_sum.as_secs_f64(),
                sample_count as f64,
            )),
            min_latency: state.latencies.iter().min().copied().unwrap_or(Duration::ZERO),
            max_latency: state.latencies.iter().max().copied().unwrap_or(Duration::ZERO),
        }
    }

    /// Oldest first.
    pub fn window_results(&self) -> Vec<AnalysisResult> {
        self.lock_state().window.iter().cloned().collect()
    }

    /// Zero the counters, clear the window and restart the uptime clock.
    pub fn reset(&self) {
        self.lock_state().clear();
        log_info!("Stream statistics reset");
    }

    fn process(&self, text: &str, metadata: Option<Metadata>, source: &str) -> AnalysisResult {
        let started = Instant::now();
        let cleaned = self.preprocessor.preprocess(text);

        if cleaned.is_empty() {
            log_debug!("stream item empty after preprocessing");
            return AnalysisResult::empty_input(text.to_string(), metadata);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.scorer.score(&cleaned)));
        let message = match outcome {
            Ok(Ok(verdict)) => {
                let result =
                    AnalysisResult::scored(text.to_string(), verdict, started.elapsed(), metadata);
                self.lock_state().record(&result, self.config.window_size);

                if let Some(sink) = self.sink.as_deref() {
                    let record = SentimentRecord::from_result(&result, source, ProcessingMode::Stream);
                    persist_quietly(sink, &record);
                }

                log_debug!(
                    "Processed stream item in {:.2}ms",
                    result.latency.as_secs_f64() * 1000.0
                );
                return result;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => "scorer panicked".to_string(),
        };

        log_warn!("stream item from {source} failed: {message}");
        self.lock_state().error_count += 1;
        AnalysisResult::scoring_failed(text.to_string(), message, started.elapsed(), metadata)
    }

    fn lock_state(&self) -> MutexGuard<'_, StreamState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{LexiconScorer, SentimentLabel, TextPreprocessor, Verdict};
    use crate::error::{ItemError, ScoreError};
    use crate::persist::testing::MemorySink;

    fn engine(window_size: usize) -> StreamEngine {
        StreamEngine::new(
            StreamConfig { window_size },
            Arc::new(TextPreprocessor::default()),
            Arc::new(LexiconScorer::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_window_is_invalid() {
        let outcome = StreamEngine::new(
            StreamConfig { window_size: 0 },
            Arc::new(TextPreprocessor::default()),
            Arc::new(LexiconScorer::default()),
        );
        assert!(matches!(outcome, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_huge_window_is_allocated_lazily() {
        let engine = engine(usize::MAX / 2);
        engine.process_stream_item("this works great", None);

        let stats = engine.get_window_stats();
        assert_eq!(stats.sample_count, 1);
        assert_eq!(stats.capacity, usize::MAX / 2);
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let engine = engine(2);
        engine.process_stream_item("alpha is good", None);
        engine.process_stream_item("beta is bad", None);
        engine.process_stream_item("gamma is great", None);

        let window: Vec<String> = engine
            .window_results()
            .into_iter()
            .map(|result| result.original_text)
            .collect();
        assert_eq!(window, vec!["beta is bad", "gamma is great"]);

        let stats = engine.get_window_stats();
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.sentiment_distribution.negative, 1);
        assert_eq!(stats.sentiment_distribution.positive, 1);
        assert_eq!(engine.get_stats().total_processed, 3);
    }

    #[test]
    fn test_empty_engine_reports_zeros() {
        let engine = engine(10);
        let window = engine.get_window_stats();
        assert_eq!(window.sample_count, 0);
        assert_eq!(window.average_score, 0.0);
        assert_eq!(window.avg_latency, Duration::ZERO);

        let stats = engine.get_stats();
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.min_latency, Duration::ZERO);
        assert!(!stats.current_throughput.is_nan());
        assert!(!stats.overall_throughput.is_nan());
    }

    #[test]
    fn test_mixed_input_scenario() {
        let engine = engine(10);
        let results: Vec<AnalysisResult> = ["I love this!", "", "Terrible."]
            .iter()
            .map(|text| engine.process_stream_item(text, None))
            .collect();

        assert!(results[0].score > 0.0);
        assert!(results[2].score < 0.0);
        assert_eq!(results[1].label, SentimentLabel::Neutral);
        assert_eq!(results[1].error, Some(ItemError::EmptyAfterPreprocessing));
        assert_eq!(results[1].latency, Duration::ZERO);

        // Empty input stays out of the window and the counters.
        assert_eq!(engine.get_window_stats().sample_count, 2);
        assert_eq!(engine.get_stats().total_processed, 2);
        assert_eq!(engine.get_stats().error_count, 0);
    }

    #[test]
    fn test_metadata_is_attached() {
        let engine = engine(5);
        let mut metadata = Metadata::new();
        metadata.insert("user".into(), serde_json::json!("u-17"));

        let result = engine.process_stream_item("what a great day", Some(metadata.clone()));
        assert_eq!(result.metadata, Some(metadata));
    }

    #[test]
    fn test_scoring_failure_counts_as_error() {
        let flaky = |text: &str| -> std::result::Result<Verdict, ScoreError> {
            if text.contains("broken") {
                Err(ScoreError::new("backend down"))
            } else {
                Ok(Verdict::new(SentimentLabel::Positive, 0.4, 0.4))
            }
        };
        let engine = StreamEngine::new(
            StreamConfig { window_size: 4 },
            Arc::new(TextPreprocessor::default()),
            Arc::new(flaky),
        )
        .unwrap();

        engine.process_stream_item("works fine", None);
        let failed = engine.process_stream_item("this is broken", None);

        assert_eq!(failed.label, SentimentLabel::Error);
        assert!(failed.is_error());
        let stats = engine.get_stats();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(engine.get_window_stats().sample_count, 1);
    }

    #[test]
    fn test_panicking_scorer_is_contained() {
        let panicky = |_: &str| -> std::result::Result<Verdict, ScoreError> { panic!("bad model") };
        let engine = StreamEngine::new(
            StreamConfig { window_size: 4 },
            Arc::new(TextPreprocessor::default()),
            Arc::new(panicky),
        )
        .unwrap();

        let result = engine.process_stream_item("anything at all", None);
        assert_eq!(result.label, SentimentLabel::Error);
        assert_eq!(engine.get_stats().error_count, 1);
    }

    #[test]
    fn test_latency_bounds_track_items() {
        let engine = engine(3);
        for text in ["good", "bad stuff", "fine weather", "great food"] {
            engine.process_stream_item(text, None);
        }

        let stats = engine.get_stats();
        assert!(stats.min_latency <= stats.avg_latency);
        assert!(stats.avg_latency <= stats.max_latency);

        let window = engine.get_window_stats();
        assert_eq!(window.sample_count, 3);
        assert!(window.min_latency <= window.max_latency);
    }

    #[test]
    fn test_reset_clears_everything() {
        let engine = engine(3);
        engine.process_stream_item("lovely", None);
        engine.process_stream_item("awful", None);
        engine.reset();

        assert_eq!(engine.get_stats().total_processed, 0);
        assert_eq!(engine.get_window_stats().sample_count, 0);
        assert!(engine.window_results().is_empty());
    }

    #[test]
    fn test_queue_item_source_reaches_sink() {
        let sink = Arc::new(MemorySink::default());
        let engine = engine(3).with_sink(sink.clone());

        engine.process_queue_item(QueueItem::new("best purchase ever", "review"));
        engine.process_stream_item("worst purchase ever", None);
        engine.process_stream_item("", None);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "review");
        assert_eq!(records[1].source, "stream");
        assert!(records.iter().all(|r| r.processing_mode == ProcessingMode::Stream));
    }
}
