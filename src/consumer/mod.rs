//! Background task that drains the bounded queue into the stream engine.

mod loop_worker;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::StreamEngine;
use crate::queue::{BoundedQueue, QueueItem};

use loop_worker::consume_loop;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// How long one pop waits for an item before the drain gives up.
    pub pop_timeout_ms: u64,
    /// Upper bound on items handled per drain.
    pub drain_batch: usize,
    /// Pause between drains.
    pub idle_interval_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            pop_timeout_ms: 1000,
            drain_batch: 50,
            idle_interval_ms: 250,
        }
    }
}

impl ConsumerConfig {
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStats {
    pub drains: u64,
    /// Items taken off the queue.
    pub processed: u64,
    /// Items that produced an error result.
    pub errors: u64,
    pub last_drain_at: Option<DateTime<Utc>>,
}

/// Owns the consumer task. Mirrors a start/stop controller: one task at a
/// time, stopped through a cancellation token and awaited on `stop`.
pub struct QueueConsumer {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl QueueConsumer {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            stats: Arc::new(Mutex::new(ConsumerStats::default())),
        }
    }

    /// Spawn the drain loop on the current tokio runtime.
    pub fn start(
        &mut self,
        queue: Arc<BoundedQueue<QueueItem>>,
        engine: Arc<StreamEngine>,
        config: ConsumerConfig,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("queue consumer already running");
        }
        if config.drain_batch == 0 {
            bail!("drain_batch must be greater than zero");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(consume_loop(
            queue,
            engine,
            config,
            Arc::clone(&self.stats),
            cancel_token.clone(),
        ));

        info!("Queue consumer started");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel the loop and wait for the in-flight drain to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("queue consumer task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> ConsumerStats {
        lock_stats(&self.stats).clone()
    }
}

impl Default for QueueConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

pub(crate) fn lock_stats(stats: &Mutex<ConsumerStats>) -> MutexGuard<'_, ConsumerStats> {
    match stats.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
