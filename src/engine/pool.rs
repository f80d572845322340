use std::{
    panic::{self, AssertUnwindSafe},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use log::{error, info};

use crate::error::PipelineError;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum PoolCommand {
    Run(Job),
    Shutdown,
}

/// Fixed set of OS threads fed through a bounded job channel.
///
/// Created once per [`BatchEngine`](super::BatchEngine) and reused by every
/// call. `execute` blocks while all slots in the channel are taken. Dropping
/// the pool drains queued jobs, then joins every worker.
pub struct WorkerPool {
    sender: mpsc::SyncSender<PoolCommand>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, PipelineError> {
        if size == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker_count must be greater than zero".into(),
            ));
        }

        let (sender, receiver) = mpsc::sync_channel::<PoolCommand>(size);
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);

        for worker_id in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("sentiflow-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, receiver))
                .map_err(|err| {
                    PipelineError::InvalidConfig(format!("failed to spawn worker thread: {err}"))
                })?;
            workers.push(handle);
        }

        info!("Worker pool started with {size} threads");

        Ok(Self {
            sender,
            workers,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `job` for a worker. Hands the job back if the pool has shut down,
    /// so the caller can run it elsewhere.
    pub fn execute(&self, job: Job) -> Result<(), Job> {
        self.sender
            .send(PoolCommand::Run(job))
            .map_err(|mpsc::SendError(command)| match command {
                PoolCommand::Run(job) => job,
                PoolCommand::Shutdown => Box::new(|| {}) as Job,
            })
    }
}

fn worker_loop(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<PoolCommand>>>) {
    loop {
        let command = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };

        match command {
            Ok(PoolCommand::Run(job)) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Job panicked on worker {worker_id}; worker continues");
                }
            }
            Ok(PoolCommand::Shutdown) | Err(_) => break,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            if let Err(err) = self.sender.send(PoolCommand::Shutdown) {
                error!("Failed to send shutdown to worker: {err}");
            }
        }

        for handle in self.workers.drain(..) {
            if let Err(join_err) = handle.join() {
                error!("Failed to join worker thread: {join_err:?}");
            }
        }

        info!("Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_workers_is_invalid() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_runs_all_jobs_across_calls() {
        let pool = WorkerPool::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _round in 0..2 {
            let (tx, rx) = mpsc::channel();
            for _ in 0..20 {
                let counter = Arc::clone(&counter);
                let tx = tx.clone();
                pool.execute(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(());
                }))
                .unwrap_or_else(|_| panic!("pool closed"));
            }
            drop(tx);
            assert_eq!(rx.iter().count(), 20);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        pool.execute(Box::new(|| panic!("scorer exploded")))
            .unwrap_or_else(|_| panic!("pool closed"));

        let (tx, rx) = mpsc::channel();
        pool.execute(Box::new(move || {
            let _ = tx.send(7);
        }))
        .unwrap_or_else(|_| panic!("pool closed"));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
    }

    #[test]
    fn test_drop_joins_after_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2).unwrap();
            for _ in 0..4 {
                let counter = Arc::clone(&counter);
                pool.execute(Box::new(move || {
                    thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap_or_else(|_| panic!("pool closed"));
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
