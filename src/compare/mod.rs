//! Runs one dataset through both engines and reports how they differ.

mod flow;
mod resources;

pub use flow::{flow_metadata, ComparisonRow, FlowDiagram, FlowMetadata, FlowStage};
pub use resources::{PhaseResources, ResourceMonitor, ResourceSample};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::analysis::{Preprocess, Score, SentimentLabel};
use crate::engine::{
    AnalysisResult, BatchConfig, BatchEngine, BatchOutput, StreamConfig, StreamEngine,
    StreamStatistics, WindowStatistics,
};
use crate::error::Result;
use crate::utils::{duration_ms, duration_secs, ratio_or_zero, round_to};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Batch,
    Stream,
    /// Equal times, or a phase too fast to measure.
    Tie,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Batch => "batch",
            Method::Stream => "stream",
            Method::Tie => "tie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub dataset_size: usize,
    #[serde(rename = "batch_total_time_secs", with = "duration_secs")]
    pub batch_total_time: Duration,
    #[serde(rename = "stream_total_time_secs", with = "duration_secs")]
    pub stream_total_time: Duration,
    pub batch_throughput: f64,
    pub stream_throughput: f64,
    #[serde(rename = "batch_avg_latency_ms", with = "duration_ms")]
    pub batch_avg_latency: Duration,
    #[serde(rename = "stream_avg_latency_ms", with = "duration_ms")]
    pub stream_avg_latency: Duration,
    #[serde(rename = "time_difference_secs", with = "duration_secs")]
    pub time_difference: Duration,
    pub faster_method: Method,
    pub speed_improvement_pct: f64,
    pub sentiment_agreement_pct: f64,
    /// What the batch engine reported for its own run.
    #[serde(rename = "batch_engine_time_secs", with = "duration_secs")]
    pub batch_engine_time: Duration,
    /// Growth of the stream engine's cumulative scoring time during the run.
    #[serde(rename = "stream_engine_time_secs", with = "duration_secs")]
    pub stream_engine_time: Duration,
    pub batch_resources: PhaseResources,
    pub stream_resources: PhaseResources,
}

/// Stream side of a comparison: per-item results in input order plus the
/// engine's statistics right after the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRun {
    pub results: Vec<AnalysisResult>,
    pub statistics: StreamStatistics,
    pub window: WindowStatistics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub batch: BatchOutput,
    pub stream: StreamRun,
    pub comparison: ComparisonResult,
    pub flow: FlowMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodPair<T> {
    pub batch: T,
    pub stream: T,
}

/// Chart-friendly summary of the most recent comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub throughput: MethodPair<f64>,
    pub latency_ms: MethodPair<f64>,
    pub total_time_secs: MethodPair<f64>,
    pub winner: Method,
    pub improvement_pct: f64,
}

impl From<&ComparisonResult> for PerformanceMetrics {
    fn from(result: &ComparisonResult) -> Self {
        let millis = |d: Duration| d.as_secs_f64() * 1000.0;
        Self {
            throughput: MethodPair {
                batch: result.batch_throughput,
                stream: result.stream_throughput,
            },
            latency_ms: MethodPair {
                batch: millis(result.batch_avg_latency),
                stream: millis(result.stream_avg_latency),
            },
            total_time_secs: MethodPair {
                batch: result.batch_total_time.as_secs_f64(),
                stream: result.stream_total_time.as_secs_f64(),
            },
            winner: result.faster_method,
            improvement_pct: result.speed_improvement_pct,
        }
    }
}

pub struct ComparisonHarness {
    batch: BatchEngine,
    stream: StreamEngine,
    monitor: ResourceMonitor,
    last: Mutex<Option<ComparisonResult>>,
}

impl ComparisonHarness {
    pub fn new(
        batch_config: BatchConfig,
        stream_config: StreamConfig,
        preprocessor: Arc<dyn Preprocess>,
        scorer: Arc<dyn Score>,
    ) -> Result<Self> {
        let batch = BatchEngine::new(batch_config, Arc::clone(&preprocessor), Arc::clone(&scorer))?;
        let stream = StreamEngine::new(stream_config, preprocessor, scorer)?;
        Ok(Self::from_engines(batch, stream))
    }

    pub fn from_engines(batch: BatchEngine, stream: StreamEngine) -> Self {
        log_info!("Processing comparison harness initialized");
        Self {
            batch,
            stream,
            monitor: ResourceMonitor::new(),
            last: Mutex::new(None),
        }
    }

    pub fn batch_engine(&self) -> &BatchEngine {
        &self.batch
    }

    pub fn stream_engine(&self) -> &StreamEngine {
        &self.stream
    }

    /// Score `texts` with the batch engine, then one by one with the stream
    /// engine, and compare the two phases.
    pub fn run_comparison<S: AsRef<str>>(&self, texts: &[S]) -> ComparisonReport {
        let dataset_size = texts.len();
        log_info!("Starting comparison with {dataset_size} texts");

        let batch_before = self.monitor.sample();
        let batch_started = Instant::now();
        let batch = self.batch.process_large_dataset(texts);
        let batch_total_time = batch_started.elapsed();
        let batch_resources = PhaseResources {
            before: batch_before,
            after: self.monitor.sample(),
        };

        let stream_time_before = self.stream.get_stats().total_time;
        let stream_before = self.monitor.sample();
        let stream_started = Instant::now();
        let stream_results: Vec<AnalysisResult> = texts
            .iter()
            .map(|text| self.stream.process_stream_item(text.as_ref(), None))
            .collect();
        let stream_total_time = stream_started.elapsed();
        let stream_resources = PhaseResources {
            before: stream_before,
            after: self.monitor.sample(),
        };
        let stream_statistics = self.stream.get_stats();

        let batch_labels = batch.labels_in_input_order();
        let stream_labels: Vec<SentimentLabel> = stream_results.iter().map(|r| r.label).collect();

        let comparison = ComparisonResult {
            dataset_size,
            batch_total_time,
            stream_total_time,
            batch_throughput: ratio_or_zero(dataset_size as f64, batch_total_time.as_secs_f64()),
            stream_throughput: ratio_or_zero(dataset_size as f64, stream_total_time.as_secs_f64()),
            batch_avg_latency: per_item(batch_total_time, dataset_size),
            stream_avg_latency: mean_scored_latency(&stream_results),
            time_difference: time_difference(batch_total_time, stream_total_time),
            faster_method: faster_method(batch_total_time, stream_total_time),
            speed_improvement_pct: speed_improvement_pct(batch_total_time, stream_total_time),
            sentiment_agreement_pct: sentiment_agreement_pct(&batch_labels, &stream_labels),
            batch_engine_time: batch.statistics.total_time,
            stream_engine_time: stream_statistics.total_time.saturating_sub(stream_time_before),
            batch_resources,
            stream_resources,
        };

        log_info!(
            "Comparison completed. Faster method: {} ({:.2}% faster, {:.2}% agreement)",
            comparison.faster_method.as_str(),
            comparison.speed_improvement_pct,
            comparison.sentiment_agreement_pct
        );

        *self.lock_last() = Some(comparison.clone());

        ComparisonReport {
            batch,
            stream: StreamRun {
                results: stream_results,
                statistics: stream_statistics,
                window: self.stream.get_window_stats(),
            },
            comparison,
            flow: flow_metadata(),
        }
    }

    pub fn flow_metadata(&self) -> FlowMetadata {
        flow_metadata()
    }

    /// `None` until the first comparison has run.
    pub fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        self.lock_last().as_ref().map(PerformanceMetrics::from)
    }

    pub fn last_comparison(&self) -> Option<ComparisonResult> {
        self.lock_last().clone()
    }

    fn lock_last(&self) -> MutexGuard<'_, Option<ComparisonResult>> {
        match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Smaller wall time wins; equal or unmeasurable times are a tie.
pub fn faster_method(batch: Duration, stream: Duration) -> Method {
    if batch.is_zero() || stream.is_zero() || batch == stream {
        Method::Tie
    } else if batch < stream {
        Method::Batch
    } else {
        Method::Stream
    }
}

/// `(max / min - 1) * 100`, rounded to two decimals. Zero when either side is zero.
pub fn speed_improvement_pct(batch: Duration, stream: Duration) -> f64 {
    let (a, b) = (batch.as_secs_f64(), stream.as_secs_f64());
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    round_to((a.max(b) / a.min(b) - 1.0) * 100.0, 2)
}

/// Share of index-aligned pairs with the same label, rounded to two decimals.
pub fn sentiment_agreement_pct(batch: &[SentimentLabel], stream: &[SentimentLabel]) -> f64 {
    let agreeing = batch.iter().zip(stream).filter(|(b, s)| b == s).count();
    let compared = batch.len().max(stream.len());
    round_to(ratio_or_zero(agreeing as f64 * 100.0, compared as f64), 2)
}

fn time_difference(a: Duration, b: Duration) -> Duration {
    a.max(b) - a.min(b)
}

fn per_item(total: Duration, items: usize) -> Duration {
    Duration::from_secs_f64(ratio_or_zero(total.as_secs_f64(), items as f64))
}

fn mean_scored_latency(results: &[AnalysisResult]) -> Duration {
    let scored: Vec<Duration> = results
        .iter()
        .filter(|result| !result.is_error())
        .map(|result| result.latency)
        .collect();
    per_item(scored.iter().sum(), scored.len())
}
