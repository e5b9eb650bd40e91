// crates/meridian-eventcheck/src/heavycheck.rs
//
// Batched, bounded-parallelism executor for the expensive checker stages.
//
// Tasks are split into batches of `max_batch`. Each batch is one job on a
// bounded channel; when `max_queued_batches` jobs are waiting, `enqueue`
// awaits until a worker frees a slot. Workers verify a batch on the blocking
// pool and then hand the whole batch, verdicts filled, to its callback.
//
// A task accepted onto the channel is always completed: `close` stops
// intake but lets the workers drain what was already queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use meridian_core::Event;

use crate::error::{CheckError, RejectReason};
use crate::stages::{run_stages, Check};
use crate::task::{terminate, EventTask, OnChecked, Verdict};

/// Heavy-check queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeavyCheckConfig {
    /// Worker count. 0 means one worker per available CPU.
    #[serde(default)]
    pub threads: usize,

    /// Maximum tasks verified as one job.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Jobs that may wait in the channel before `enqueue` blocks.
    #[serde(default = "default_max_queued_batches")]
    pub max_queued_batches: usize,
}

fn default_max_batch() -> usize {
    32
}

fn default_max_queued_batches() -> usize {
    64
}

impl Default for HeavyCheckConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_batch: default_max_batch(),
            max_queued_batches: default_max_queued_batches(),
        }
    }
}

impl HeavyCheckConfig {
    /// Worker count with `threads = 0` resolved.
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn validate(&self) -> Result<(), CheckError> {
        if self.max_batch == 0 {
            return Err(CheckError::InvalidConfig("heavy_check.max_batch must be > 0".to_string()));
        }
        if self.max_queued_batches == 0 {
            return Err(CheckError::InvalidConfig(
                "heavy_check.max_queued_batches must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters exposed for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeavyCheckStats {
    pub batches: u64,
    pub checked: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    checked: AtomicU64,
    rejected: AtomicU64,
}

struct Job {
    tasks: Vec<EventTask>,
    on_done: OnChecked,
}

type Inputs = Vec<(Arc<Event>, Vec<Arc<Event>>)>;

/// Fixed pool of verification workers behind a bounded job channel.
pub struct HeavyCheckQueue {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    max_batch: usize,
    counters: Arc<Counters>,
}

impl HeavyCheckQueue {
    /// Start the worker pool. Must be called inside a tokio runtime.
    pub fn new(stages: Vec<Arc<dyn Check>>, config: &HeavyCheckConfig) -> Result<Self, CheckError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel::<Job>(config.max_queued_batches);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let stages: Arc<[Arc<dyn Check>]> = stages.into();
        let counters = Arc::new(Counters::default());

        let count = config.worker_count();
        let workers = (0..count)
            .map(|n| tokio::spawn(worker_loop(n, rx.clone(), stages.clone(), counters.clone())))
            .collect();

        tracing::info!(
            "Heavy-check queue started (workers={}, max_batch={}, max_queued_batches={})",
            count,
            config.max_batch,
            config.max_queued_batches
        );

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            max_batch: config.max_batch,
            counters,
        })
    }

    /// Queue `tasks` for verification.
    ///
    /// Awaits while the channel is full. If the queue is closed, every task
    /// not yet handed to a worker is completed with `Rejected(Terminated)`
    /// and `QueueClosed` is returned.
    pub async fn enqueue(&self, tasks: Vec<EventTask>, on_done: OnChecked) -> Result<(), CheckError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            tracing::warn!("Heavy-check queue closed, terminating {} tasks", tasks.len());
            terminate(tasks, &on_done);
            return Err(CheckError::QueueClosed);
        };

        let mut remaining = tasks;
        while !remaining.is_empty() {
            let rest = if remaining.len() > self.max_batch {
                remaining.split_off(self.max_batch)
            } else {
                Vec::new()
            };
            let batch = std::mem::replace(&mut remaining, rest);

            let job = Job {
                tasks: batch,
                on_done: on_done.clone(),
            };
            if let Err(mpsc::error::SendError(job)) = sender.send(job).await {
                let mut unsent = job.tasks;
                unsent.append(&mut remaining);
                tracing::warn!("Heavy-check queue closed, terminating {} tasks", unsent.len());
                terminate(unsent, &on_done);
                return Err(CheckError::QueueClosed);
            }
        }

        Ok(())
    }

    /// Stop intake and wait until the workers have drained every queued job.
    pub async fn close(&self) {
        // Dropping the last sender ends each worker's `recv` loop once the
        // channel is empty.
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!("Heavy-check worker failed: {}", e);
            }
        }
        tracing::info!("Heavy-check queue drained and closed");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn stats(&self) -> HeavyCheckStats {
        HeavyCheckStats {
            batches: self.counters.batches.load(Ordering::Relaxed),
            checked: self.counters.checked.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

async fn worker_loop(
    n: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    stages: Arc<[Arc<dyn Check>]>,
    counters: Arc<Counters>,
) {
    tracing::debug!("Heavy-check worker {} started", n);

    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(Job { mut tasks, on_done }) = job else {
            break;
        };

        // Verify copies of the inputs so the tasks themselves never leave
        // this worker, even if verification panics.
        let inputs: Inputs = tasks
            .iter()
            .map(|t| (t.event().clone(), t.parents().to_vec()))
            .collect();
        let batch_stages = stages.clone();
        let verdicts = tokio::task::spawn_blocking(move || {
            inputs
                .iter()
                .map(|(event, parents)| Verdict::from(run_stages(&batch_stages, event, parents)))
                .collect::<Vec<_>>()
        })
        .await;

        match verdicts {
            Ok(verdicts) => {
                for (task, verdict) in tasks.iter_mut().zip(verdicts) {
                    if !verdict.is_accepted() {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    task.set_verdict(verdict);
                }
            }
            Err(e) => {
                tracing::error!("Heavy-check batch of {} tasks failed: {}", tasks.len(), e);
                for task in tasks.iter_mut() {
                    task.set_verdict(Verdict::Rejected(RejectReason::Terminated));
                }
            }
        }

        counters.batches.fetch_add(1, Ordering::Relaxed);
        counters.checked.fetch_add(tasks.len() as u64, Ordering::Relaxed);
        on_done(tasks);
    }

    tracing::debug!("Heavy-check worker {} exited", n);
}
