use std::{
    any::Any,
    collections::HashMap,
    convert::Infallible,
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::pool::WorkerPool;
use super::{AnalysisResult, IndexedResult, SentimentDistribution};
use crate::analysis::{Preprocess, Score, SentimentLabel};
use crate::error::{PipelineError, Result};
use crate::persist::{persist_quietly, Persist, ProcessingMode, SentimentRecord};
use crate::utils::{duration_ms, duration_secs, ratio_or_zero};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// How often the collector re-checks the cancellation token while waiting.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

const BATCH_SOURCE: &str = "batch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per chunk; the last chunk may be smaller.
    pub batch_size: usize,
    /// Threads in the long-lived scoring pool.
    pub worker_count: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            worker_count: 4,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker_count must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_count(&self, items: usize) -> usize {
        items.div_ceil(self.batch_size.max(1))
    }
}

/// Aggregate for exactly one `process_large_dataset` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_items: usize,
    pub error_count: usize,
    pub chunk_count: usize,
    #[serde(rename = "total_time_secs", with = "duration_secs")]
    pub total_time: Duration,
    #[serde(rename = "avg_time_per_item_ms", with = "duration_ms")]
    pub avg_time_per_item: Duration,
    /// Items per second over `total_time`.
    pub throughput: f64,
    pub sentiment_distribution: SentimentDistribution,
    /// Mean score of the non-error results.
    pub average_score: f64,
}

impl BatchStatistics {
    pub fn from_results(results: &[IndexedResult], total_time: Duration, chunk_count: usize) -> Self {
        let total_items = results.len();
        let sentiment_distribution: SentimentDistribution =
            results.iter().map(|indexed| &indexed.result).collect();
        let error_count = results.iter().filter(|indexed| indexed.result.is_error()).count();

        let score_sum: f64 = results
            .iter()
            .filter(|indexed| !indexed.result.is_error())
            .map(|indexed| indexed.result.score)
            .sum();

        let secs = total_time.as_secs_f64();

        Self {
            total_items,
            error_count,
            chunk_count,
            total_time,
            avg_time_per_item: Duration::from_secs_f64(ratio_or_zero(secs, total_items as f64)),
            throughput: ratio_or_zero(total_items as f64, secs),
            sentiment_distribution,
            average_score: ratio_or_zero(score_sum, (total_items - error_count) as f64),
        }
    }
}

/// Running totals across every call since construction or `reset`.
/// Updated after each chunk completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchLifetimeStats {
    pub total_processed: u64,
    pub error_count: u64,
    pub chunks_completed: u64,
    #[serde(rename = "total_time_secs", with = "duration_secs")]
    pub total_time: Duration,
    #[serde(rename = "avg_time_per_item_ms", with = "duration_ms")]
    pub avg_time_per_item: Duration,
    pub throughput: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Completion order, not input order. Use `index` to realign.
    pub results: Vec<IndexedResult>,
    pub statistics: BatchStatistics,
}

impl BatchOutput {
    /// Results sorted back into input order.
    pub fn into_input_order(self) -> Vec<AnalysisResult> {
        let mut results = self.results;
        results.sort_by_key(|indexed| indexed.index);
        results.into_iter().map(|indexed| indexed.result).collect()
    }

    pub fn labels_in_input_order(&self) -> Vec<SentimentLabel> {
        let mut pairs: Vec<(usize, SentimentLabel)> = self
            .results
            .iter()
            .map(|indexed| (indexed.index, indexed.result.label))
            .collect();
        pairs.sort_by_key(|(index, _)| *index);
        pairs.into_iter().map(|(_, label)| label).collect()
    }
}

/// Throughput-oriented engine: chunks a dataset and scores each chunk on a
/// shared worker pool.
pub struct BatchEngine {
    config: BatchConfig,
    preprocessor: Arc<dyn Preprocess>,
    scorer: Arc<dyn Score>,
    pool: WorkerPool,
    lifetime: Mutex<BatchLifetimeStats>,
    sink: Option<Arc<dyn Persist>>,
}

impl BatchEngine {
    pub fn new(
        config: BatchConfig,
        preprocessor: Arc<dyn Preprocess>,
        scorer: Arc<dyn Score>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_count)?;

        log_info!(
            "Batch engine initialized with batch_size={}, workers={}",
            config.batch_size,
            config.worker_count
        );

        Ok(Self {
            config,
            preprocessor,
            scorer,
            pool,
            lifetime: Mutex::new(BatchLifetimeStats::default()),
            sink: None,
        })
    }

    /// Forward every scored result to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn Persist>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Score one chunk. Indexes in the returned results are chunk-relative.
    pub fn process_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<IndexedResult> {
        match self.run_chunk(texts, 0, &Uninterrupted) {
            Ok(results) => results,
            Err(never) => match never {},
        }
    }

    /// Score `texts` chunk by chunk. Always returns one result per input.
    pub fn process_large_dataset<S: AsRef<str>>(&self, texts: &[S]) -> BatchOutput {
        match self.run_dataset(texts, &Uninterrupted) {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Like [`process_large_dataset`](Self::process_large_dataset) but gives up
    /// with [`PipelineError::Cancelled`] once `token` fires. Partial results
    /// are discarded; chunks that already finished stay in the lifetime stats.
    pub fn process_large_dataset_cancellable<S: AsRef<str>>(
        &self,
        texts: &[S],
        token: &CancellationToken,
    ) -> Result<BatchOutput> {
        self.run_dataset(texts, token)
    }

    /// Copy of the running totals.
    pub fn get_stats(&self) -> BatchLifetimeStats {
        self.lock_lifetime().clone()
    }

    pub fn reset(&self) {
        *self.lock_lifetime() = BatchLifetimeStats::default();
        log_info!("Batch statistics reset");
    }

    fn run_dataset<S: AsRef<str>, I: Interrupt>(
        &self,
        texts: &[S],
        interrupt: &I,
    ) -> std::result::Result<BatchOutput, I::Error> {
        let started = Instant::now();
        let num_chunks = self.config.chunk_count(texts.len());
        let mut all_results = Vec::with_capacity(texts.len());

        log_info!("Processing {} texts in {} batches", texts.len(), num_chunks);

        for (chunk_number, chunk) in texts.chunks(self.config.batch_size).enumerate() {
            if let Err(err) = interrupt.check() {
                log_warn!("batch run cancelled before chunk {}", chunk_number + 1);
                return Err(err);
            }

            let offset = chunk_number * self.config.batch_size;
            let chunk_results = self.run_chunk(chunk, offset, interrupt)?;
            all_results.extend(chunk_results);

            log_info!("Completed batch {}/{}", chunk_number + 1, num_chunks);
        }

        let statistics = BatchStatistics::from_results(&all_results, started.elapsed(), num_chunks);

        log_info!(
            "Batch run finished: {} items in {:.3}s ({:.1} items/s, {} errors)",
            statistics.total_items,
            statistics.total_time.as_secs_f64(),
            statistics.throughput,
            statistics.error_count
        );

        Ok(BatchOutput {
            results: all_results,
            statistics,
        })
    }

    fn run_chunk<S: AsRef<str>, I: Interrupt>(
        &self,
        chunk: &[S],
        offset: usize,
        interrupt: &I,
    ) -> std::result::Result<Vec<IndexedResult>, I::Error> {
        let started = Instant::now();
        let token = interrupt.token();

        let cleaned: Vec<String> = chunk
            .iter()
            .map(|text| self.preprocessor.preprocess(text.as_ref()))
            .collect();

        let (reply_tx, reply_rx) = mpsc::channel::<IndexedResult>();
        let mut results = Vec::with_capacity(chunk.len());
        let mut pending: HashMap<usize, String> = HashMap::new();

        for (position, (text, cleaned)) in chunk.iter().zip(cleaned).enumerate() {
            let index = offset + position;
            let original = text.as_ref().to_string();

            if cleaned.is_empty() {
                log_debug!("item {index} empty after preprocessing");
                results.push(IndexedResult {
                    index,
                    result: AnalysisResult::empty_input(original, None),
                });
                continue;
            }

            interrupt.check()?;

            pending.insert(index, original.clone());
            let job = ScoreJob {
                index,
                original,
                cleaned,
                scorer: Arc::clone(&self.scorer),
                token: token.clone(),
                reply: reply_tx.clone(),
            };

            if let Err(job) = self.pool.execute(Box::new(move || job.run())) {
                log_warn!(
                    "{}; scoring item {index} on the calling thread",
                    PipelineError::WorkerPoolClosed
                );
                job();
            }
        }
        drop(reply_tx);

        while !pending.is_empty() {
            interrupt.check()?;

            match reply_rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(indexed) => {
                    pending.remove(&indexed.index);
                    results.push(indexed);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log_error!("{} scoring jobs ended without a result", pending.len());
                    for (index, original) in pending.drain() {
                        results.push(IndexedResult {
                            index,
                            result: AnalysisResult::scoring_failed(
                                original,
                                "worker exited before returning a result".into(),
                                Duration::ZERO,
                                None,
                            ),
                        });
                    }
                }
            }
        }

        self.record_chunk(&results, started.elapsed());
        self.persist_chunk(&results);

        Ok(results)
    }

    fn record_chunk(&self, results: &[IndexedResult], elapsed: Duration) {
        let errors = results.iter().filter(|indexed| indexed.result.is_error()).count();
        let mut stats = self.lock_lifetime();

        stats.total_processed += results.len() as u64;
        stats.error_count += errors as u64;
        stats.chunks_completed += 1;
        stats.total_time += elapsed;

        let secs = stats.total_time.as_secs_f64();
        let processed = stats.total_processed as f64;
        stats.avg_time_per_item = Duration::from_secs_f64(ratio_or_zero(secs, processed));
        stats.throughput = ratio_or_zero(processed, secs);
    }

    fn persist_chunk(&self, results: &[IndexedResult]) {
        let Some(sink) = self.sink.as_deref() else {
            return;
        };

        for indexed in results.iter().filter(|indexed| !indexed.result.is_error()) {
            let record =
                SentimentRecord::from_result(&indexed.result, BATCH_SOURCE, ProcessingMode::Batch);
            persist_quietly(sink, &record);
        }
    }

    fn lock_lifetime(&self) -> MutexGuard<'_, BatchLifetimeStats> {
        match self.lifetime.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One item's scoring work, executed on a pool thread.
struct ScoreJob {
    index: usize,
    original: String,
    cleaned: String,
    scorer: Arc<dyn Score>,
    token: Option<CancellationToken>,
    reply: mpsc::Sender<IndexedResult>,
}

impl ScoreJob {
    fn run(self) {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return;
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.scorer.score(&self.cleaned)));
        let latency = started.elapsed();

        let result = match outcome {
            Ok(Ok(verdict)) => AnalysisResult::scored(self.original, verdict, latency, None),
            Ok(Err(err)) => {
                AnalysisResult::scoring_failed(self.original, err.to_string(), latency, None)
            }
            Err(payload) => AnalysisResult::scoring_failed(
                self.original,
                format!("scorer panicked: {}", panic_message(payload.as_ref())),
                latency,
                None,
            ),
        };

        // The collector may already have given up on a cancelled run.
        let _ = self.reply.send(IndexedResult {
            index: self.index,
            result,
        });
    }
}

/// Where a run looks to see whether it should stop early.
trait Interrupt {
    type Error;

    fn check(&self) -> std::result::Result<(), Self::Error>;

    /// Token handed to pool jobs so queued work can be skipped.
    fn token(&self) -> Option<CancellationToken>;
}

/// Runs started without a token always finish.
struct Uninterrupted;

impl Interrupt for Uninterrupted {
    type Error = Infallible;

    fn check(&self) -> std::result::Result<(), Infallible> {
        Ok(())
    }

    fn token(&self) -> Option<CancellationToken> {
        None
    }
}

impl Interrupt for CancellationToken {
    type Error = PipelineError;

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn token(&self) -> Option<CancellationToken> {
        Some(self.clone())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
