use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::analysis::{PreprocessConfig, ScorerConfig};
use crate::consumer::ConsumerConfig;
use crate::engine::{BatchConfig, StreamConfig};
use crate::queue::QueueConfig;

pub const ENV_BATCH_SIZE: &str = "SENTIFLOW_BATCH_SIZE";
pub const ENV_WORKERS: &str = "SENTIFLOW_WORKERS";
pub const ENV_WINDOW_SIZE: &str = "SENTIFLOW_WINDOW_SIZE";
pub const ENV_SETTINGS_PATH: &str = "SENTIFLOW_SETTINGS";
pub const ENV_DB_PATH: &str = "SENTIFLOW_DB";

/// Everything needed to assemble a pipeline. Missing sections fall back to
/// their defaults when read from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub queue: QueueConfig,
    pub batch: BatchConfig,
    pub stream: StreamConfig,
    pub preprocess: PreprocessConfig,
    pub scorer: ScorerConfig,
    pub consumer: ConsumerConfig,
}

impl PipelineSettings {
    /// Apply `SENTIFLOW_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparseable values are errors.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, ENV_BATCH_SIZE)? {
            self.batch.batch_size = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_WORKERS)? {
            self.batch.worker_count = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_WINDOW_SIZE)? {
            self.stream.window_size = value;
        }
        Ok(())
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
        None => Ok(None),
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PipelineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring malformed settings in {}: {err}; using defaults",
                    path.display()
                );
                PipelineSettings::default()
            })
        } else {
            PipelineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> PipelineSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: PipelineSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: PipelineSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", self.path.display()))?;
        *self.write() = data;
        Ok(())
    }

    pub fn persist(&self, data: &PipelineSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, PipelineSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, PipelineSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
