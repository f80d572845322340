mod types;

pub use types::{Metadata, QueueConfig, QueueItem, QueueStats};

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{PipelineError, QueueFull};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Fixed-capacity multi-producer/multi-consumer buffer.
///
/// New items enter at the head, consumers take from the tail. `push` never
/// blocks: at capacity the oldest item is dropped and counted in
/// [`QueueStats::evicted`].
pub struct BoundedQueue<T> {
    inner: Mutex<QueueState<T>>,
    not_empty: Condvar,
    capacity: usize,
}

struct QueueState<T> {
    items: VecDeque<T>,
    pushed: u64,
    popped: u64,
    evicted: u64,
    rejected: u64,
    /// Set while evictions happen back to back, so only the first one warns.
    overflowing: bool,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacity must be greater than zero".into(),
            ));
        }

        Ok(Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                pushed: 0,
                popped: 0,
                evicted: 0,
                rejected: 0,
                overflowing: false,
            }),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, PipelineError> {
        Self::new(config.capacity)
    }

    /// Insert at the head, evicting the tail item when full. Returns the new length.
    pub fn push(&self, item: T) -> usize {
        let len = {
            let mut state = self.lock();
            if state.items.len() >= self.capacity {
                state.items.pop_back();
                state.evicted += 1;
                if !state.overflowing {
                    state.overflowing = true;
                    log_warn!(
                        "queue at capacity ({}), evicting oldest items (evicted so far: {})",
                        self.capacity,
                        state.evicted
                    );
                }
            } else {
                state.overflowing = false;
            }
            state.items.push_front(item);
            state.pushed += 1;
            state.items.len()
        };

        self.not_empty.notify_one();
        len
    }

    /// Like [`push`](Self::push) but refuses the item instead of evicting.
    pub fn try_push(&self, item: T) -> Result<usize, QueueFull<T>> {
        let len = {
            let mut state = self.lock();
            if state.items.len() >= self.capacity {
                state.rejected += 1;
                return Err(QueueFull {
                    item,
                    capacity: self.capacity,
                });
            }
            state.items.push_front(item);
            state.pushed += 1;
            state.items.len()
        };

        self.not_empty.notify_one();
        Ok(len)
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive.
    /// A zero timeout never waits.
    /// A timeout too large to express as a deadline waits indefinitely.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();

        loop {
            if let Some(item) = state.items.pop_back() {
                state.popped += 1;
                return Some(item);
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    match self.not_empty.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.not_empty.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        state.overflowing = false;
        log_debug!("queue cleared ({} items dropped)", dropped);
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            len: state.items.len(),
            capacity: self.capacity,
            pushed: state.pushed,
            popped: state.popped,
            evicted: state.evicted,
            rejected: state.rejected,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copy items by position, head (newest) = 0, `end` inclusive.
    /// A negative `end` means "through the tail".
    pub fn peek_range(&self, start: usize, end: isize) -> Vec<T> {
        let state = self.lock();
        let len = state.items.len();
        let stop = if end < 0 {
            len
        } else {
            (end as usize).saturating_add(1).min(len)
        };

        if start >= stop {
            return Vec::new();
        }

        state.items.range(start..stop).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedQueue::<u32>::new(0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(8).unwrap();
        assert_eq!(queue.push(1), 1);
        assert_eq!(queue.push(2), 2);
        assert_eq!(queue.push(3), 3);

        assert_eq!(queue.pop(Duration::ZERO), Some(1));
        assert_eq!(queue.pop(Duration::ZERO), Some(2));
        assert_eq!(queue.pop(Duration::ZERO), Some(3));
        assert_eq!(queue.pop(Duration::ZERO), None);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = BoundedQueue::new(2).unwrap();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.push("c"), 2);

        let stats = queue.stats();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.pushed, 3);
        assert_eq!(queue.pop(Duration::ZERO), Some("b"));
        assert_eq!(queue.pop(Duration::ZERO), Some("c"));
    }

    #[test]
    fn test_try_push_rejects_when_full() {
        let queue = BoundedQueue::new(1).unwrap();
        assert_eq!(queue.try_push(10).unwrap(), 1);

        let err = queue.try_push(11).unwrap_err();
        assert_eq!(err.item, 11);
        assert_eq!(queue.stats().rejected, 1);
        assert_eq!(queue.pop(Duration::ZERO), Some(10));
    }

    #[test]
    fn test_pop_times_out_on_empty() {
        let queue = BoundedQueue::<u8>::new(1).unwrap();
        let started = Instant::now();
        assert_eq!(queue.pop(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_pop_with_huge_timeout() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        queue.push(1);
        assert_eq!(queue.pop(Duration::MAX), Some(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(2);
        assert_eq!(consumer.join().unwrap(), Some(2));
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(BoundedQueue::new(4).unwrap());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(42);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_peek_range_is_head_first() {
        let queue = BoundedQueue::new(5).unwrap();
        for n in 1..=4 {
            queue.push(n);
        }
        assert_eq!(queue.peek_range(0, -1), vec![4, 3, 2, 1]);
        assert_eq!(queue.peek_range(1, 2), vec![3, 2]);
        assert!(queue.peek_range(3, 1).is_empty());
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        let queue = Arc::new(BoundedQueue::new(10_000).unwrap());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for n in 0..250 {
                        queue.push(p * 1000 + n);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut taken = 0;
                    while queue.pop(Duration::from_millis(10)).is_some() {
                        taken += 1;
                    }
                    taken
                })
            })
            .collect();
        let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();

        assert_eq!(total, 1000);
        let stats = queue.stats();
        assert_eq!(stats.popped, 1000);
        assert_eq!(stats.len, 0);
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = BoundedQueue::new(3).unwrap();
        queue.push(QueueItem::new("hello world", "test"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
