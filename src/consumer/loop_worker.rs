use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::StreamEngine;
use crate::queue::{BoundedQueue, QueueItem};

use super::{lock_stats, ConsumerConfig, ConsumerStats};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Longest single blocking wait on the queue, so cancellation is noticed
/// even with a very long `pop_timeout`.
const POP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone, Copy)]
struct DrainReport {
    processed: u64,
    errors: u64,
}

pub async fn consume_loop(
    queue: Arc<BoundedQueue<QueueItem>>,
    engine: Arc<StreamEngine>,
    config: ConsumerConfig,
    stats: Arc<Mutex<ConsumerStats>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.idle_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let drain = tokio::task::spawn_blocking({
                    let queue = Arc::clone(&queue);
                    let engine = Arc::clone(&engine);
                    let config = config.clone();
                    let token = cancel_token.clone();
                    move || drain_once(&queue, &engine, &config, &token)
                });

                match drain.await {
                    Ok(report) => record_drain(&stats, report),
                    Err(err) => log_error!("queue drain worker join failed: {err}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("queue consumer shutting down");
                break;
            }
        }
    }
}

/// Pop up to `drain_batch` items, scoring each as it arrives. Stops early on
/// an empty queue or cancellation.
fn drain_once(
    queue: &BoundedQueue<QueueItem>,
    engine: &StreamEngine,
    config: &ConsumerConfig,
    token: &CancellationToken,
) -> DrainReport {
    let mut report = DrainReport::default();

    for _ in 0..config.drain_batch {
        if token.is_cancelled() {
            break;
        }
        let Some(item) = pop_or_cancel(queue, config.pop_timeout(), token) else {
            break;
        };

        let result = engine.process_queue_item(item);
        report.processed += 1;
        if result.is_error() {
            report.errors += 1;
        }
    }

    report
}

/// Wait for an item for up to `timeout`, giving up early once `token` fires.
fn pop_or_cancel(
    queue: &BoundedQueue<QueueItem>,
    timeout: Duration,
    token: &CancellationToken,
) -> Option<QueueItem> {
    let deadline = Instant::now().checked_add(timeout);

    loop {
        let slice = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(POP_SLICE),
            None => POP_SLICE,
        };
        if let Some(item) = queue.pop(slice) {
            return Some(item);
        }
        if token.is_cancelled() || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return None;
        }
    }
}

fn record_drain(stats: &Mutex<ConsumerStats>, report: DrainReport) {
    let mut stats = lock_stats(stats);
    stats.drains += 1;
    stats.processed += report.processed;
    stats.errors += report.errors;
    stats.last_drain_at = Some(Utc::now());

    if report.processed > 0 {
        log_debug!(
            "Drained {} items ({} errors); {} processed so far",
            report.processed,
            report.errors,
            stats.processed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_or_cancel_returns_waiting_item() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.push(QueueItem::new("already here", "test"));

        let item = pop_or_cancel(&queue, Duration::MAX, &CancellationToken::new());
        assert_eq!(item.map(|item| item.text), Some("already here".to_string()));
    }

    #[test]
    fn test_pop_or_cancel_gives_up_on_cancel() {
        let queue = BoundedQueue::<QueueItem>::new(4).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let started = Instant::now();
        assert!(pop_or_cancel(&queue, Duration::MAX, &token).is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pop_or_cancel_zero_timeout_does_not_wait() {
        let queue = BoundedQueue::<QueueItem>::new(4).unwrap();
        assert!(pop_or_cancel(&queue, Duration::ZERO, &CancellationToken::new()).is_none());
    }
}
