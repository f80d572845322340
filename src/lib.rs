pub mod analysis;
pub mod compare;
pub mod consumer;
pub mod db;
pub mod engine;
pub mod error;
pub mod persist;
pub mod queue;
pub mod sample;
pub mod settings;
pub mod utils;

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use log::info;
use serde::Serialize;

use analysis::{LexiconScorer, Preprocess, Score, TextPreprocessor};
use compare::{ComparisonHarness, ComparisonResult, FlowMetadata, PerformanceMetrics};
use consumer::{ConsumerStats, QueueConsumer};
use db::{Database, SentimentSummary};
use engine::{StreamEngine, StreamStatistics, WindowStatistics};
use error::PipelineError;
use persist::Persist;
use queue::{BoundedQueue, QueueItem, QueueStats};
use settings::{PipelineSettings, SettingsStore, ENV_DB_PATH, ENV_SETTINGS_PATH};

const DEFAULT_SETTINGS_FILE: &str = "sentiflow-settings.json";
const DEFAULT_DB_FILE: &str = "sentiflow.sqlite3";
const DEMO_QUEUE_ITEMS: usize = 200;
const DEMO_DATASET_SIZE: usize = 500;
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The wired-up components: one queue feeding a persisting stream engine,
/// plus a comparison harness with its own pair of engines.
pub struct Pipeline {
    pub queue: Arc<BoundedQueue<QueueItem>>,
    pub stream: Arc<StreamEngine>,
    pub harness: Arc<ComparisonHarness>,
}

impl Pipeline {
    pub fn from_settings(
        settings: &PipelineSettings,
        sink: Option<Arc<dyn Persist>>,
    ) -> Result<Self, PipelineError> {
        let preprocessor: Arc<dyn Preprocess> =
            Arc::new(TextPreprocessor::new(settings.preprocess.clone()));
        let scorer: Arc<dyn Score> = Arc::new(LexiconScorer::new(settings.scorer.clone()));

        let queue = Arc::new(BoundedQueue::from_config(&settings.queue)?);

        let mut stream = StreamEngine::new(
            settings.stream.clone(),
            Arc::clone(&preprocessor),
            Arc::clone(&scorer),
        )?;
        if let Some(sink) = sink {
            stream = stream.with_sink(sink);
        }

        let harness = ComparisonHarness::new(
            settings.batch.clone(),
            settings.stream.clone(),
            preprocessor,
            scorer,
        )?;

        Ok(Self {
            queue,
            stream: Arc::new(stream),
            harness: Arc::new(harness),
        })
    }
}

/// What the binary prints once a run is over.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub queue: QueueStats,
    pub consumer: ConsumerStats,
    pub stream: StreamStatistics,
    pub window: WindowStatistics,
    pub stored: SentimentSummary,
    pub comparison: ComparisonResult,
    pub performance: Option<PerformanceMetrics>,
    pub flow: FlowMetadata,
}

/// Entry point for the `sentiflow` binary.
pub fn run() -> anyhow::Result<()> {
    utils::logging::init();
    info!("sentiflow starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let summary = runtime.block_on(run_demo())?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_demo() -> anyhow::Result<RunSummary> {
    let started_at = Utc::now();

    let settings_path = env_path(ENV_SETTINGS_PATH, DEFAULT_SETTINGS_FILE);
    let store = SettingsStore::new(settings_path)?;
    let mut settings = store.get();
    settings.apply_env_overrides()?;

    let database = Database::new(env_path(ENV_DB_PATH, DEFAULT_DB_FILE))?;
    let pipeline = Pipeline::from_settings(&settings, Some(Arc::new(database.clone())))
        .context("invalid pipeline settings")?;

    let items = sample::sample_items(DEMO_QUEUE_ITEMS, &mut rand::thread_rng());
    for item in items {
        pipeline.queue.push(item);
    }
    info!("Enqueued {} sample items", pipeline.queue.len());

    let mut consumer = QueueConsumer::new();
    consumer.start(
        Arc::clone(&pipeline.queue),
        Arc::clone(&pipeline.stream),
        settings.consumer.clone(),
    )?;
    while !pipeline.queue.is_empty() {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    consumer.stop().await?;

    let harness = Arc::clone(&pipeline.harness);
    let texts = sample::sample_texts(DEMO_DATASET_SIZE);
    let report = tokio::task::spawn_blocking(move || harness.run_comparison(&texts))
        .await
        .context("comparison worker join failed")?;

    let stored = database.sentiment_summary(started_at).await?;

    Ok(RunSummary {
        queue: pipeline.queue.stats(),
        consumer: consumer.stats(),
        stream: pipeline.stream.get_stats(),
        window: pipeline.stream.get_window_stats(),
        stored,
        comparison: report.comparison,
        performance: pipeline.harness.performance_metrics(),
        flow: report.flow,
    })
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var_os(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
