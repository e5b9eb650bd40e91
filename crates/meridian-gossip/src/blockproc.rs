// crates/meridian-gossip/src/blockproc.rs
//
// Block-sealing worker.
//
// Decided blocks are sealed one at a time, in decision order, by a single
// task. Each job carries an in-flight guard for the coordinator and one for
// the processor itself, so shutdown and `wait_idle` both see queued blocks.
//
// Sealing takes the engine write lock (raising `block_busy`), persists the
// block, and on the last block of an epoch rolls the epoch over: the store's
// epoch advances, the engine and DAG reset, and a fresh epoch context is
// swapped into the cell shared with the checkers.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use meridian_core::{Block, BlockDecision, Epoch, MeridianError};
use meridian_eventcheck::{EpochContext, EpochContextCell};
use meridian_store::{EpochState, Store};

use crate::coordinator::{EngineCoordinator, EngineWriteGuard, Inflight, InflightGuard};
use crate::feed::ServiceFeed;
use crate::fetcher::Fetcher;

struct BlockJob {
    decision: BlockDecision,
    _service: InflightGuard,
    _pending: InflightGuard,
}

/// Everything the sealing worker touches.
pub struct Sealer {
    pub coordinator: Arc<EngineCoordinator>,
    pub store: Store,
    pub context: Arc<EpochContextCell>,
    pub feed: ServiceFeed,
    pub fetcher: Arc<Fetcher>,
    pub blocks_per_epoch: u64,
}

impl Sealer {
    /// Seal one decided block. Decisions queued behind the block that ended
    /// their epoch are dropped: the engine was reset and their epoch is over.
    async fn seal(&self, decision: BlockDecision) -> Result<Option<Block>, MeridianError> {
        let mut state = self.coordinator.write_block().await;

        let current = self.context.load().epoch();
        if decision.epoch != current {
            tracing::warn!(
                "Dropping block of finished epoch {} (now {}, atropos {}, {} events)",
                decision.epoch,
                current,
                decision.atropos,
                decision.events.len()
            );
            return Ok(None);
        }

        let index = self.store.last_block_index()?.map_or(1, |last| last + 1);
        let block = Block {
            index,
            epoch: decision.epoch,
            atropos: decision.atropos,
            events: decision.events,
            sealed_at: Utc::now(),
        };
        self.store.put_block(&block)?;

        let next_epoch = if self.blocks_per_epoch > 0 && index % self.blocks_per_epoch == 0 {
            Some(self.rollover(&mut state)?)
        } else {
            None
        };

        self.store.commit()?;
        drop(state);

        tracing::debug!(
            "Sealed block {} (epoch {}, {} events, atropos {})",
            block.index,
            block.epoch,
            block.events.len(),
            block.atropos
        );
        self.feed.publish_block(block.clone());
        if let Some(epoch) = next_epoch {
            self.feed.publish_epoch(epoch);
        }

        Ok(Some(block))
    }

    fn rollover(&self, state: &mut EngineWriteGuard<'_>) -> Result<Epoch, MeridianError> {
        let current = self
            .store
            .get_epoch_state()?
            .ok_or_else(|| MeridianError::NotFound("epoch state".to_string()))?;

        let next = EpochState {
            epoch: current.epoch + 1,
            validators: current.validators,
            rules: current.rules,
            started_at: Utc::now(),
        };
        self.store.set_epoch_state(&next)?;

        state.engine.reset(next.epoch, &next.validators)?;
        state.dag.reset();
        self.context.swap(EpochContext::new(
            next.epoch,
            next.validators,
            next.rules,
            next.started_at,
        ));
        self.fetcher.clear();

        tracing::info!("=== EPOCH {} START === (after epoch {})", next.epoch, current.epoch);
        Ok(next.epoch)
    }
}

/// Single-worker queue of decided blocks.
pub struct BlockProcessor {
    tx: Mutex<Option<mpsc::UnboundedSender<BlockJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Inflight>,
}

impl BlockProcessor {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start(sealer: Sealer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(sealer, rx));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending: Arc::new(Inflight::new()),
        }
    }

    /// Queue a decided block. Returns false once the processor is closed.
    pub fn submit(&self, decision: BlockDecision, guard: InflightGuard) -> bool {
        let job = BlockJob {
            decision,
            _service: guard,
            _pending: self.pending.track(),
        };
        let tx = self.tx.lock();
        match tx.as_ref().map(|tx| tx.send(job)) {
            Some(Ok(())) => true,
            _ => {
                tracing::warn!("Block processor closed, dropping decided block");
                false
            }
        }
    }

    /// Blocks queued or being sealed.
    pub fn pending(&self) -> usize {
        self.pending.count()
    }

    /// Wait until every queued block is sealed.
    pub async fn wait_idle(&self) {
        self.pending.wait_zero().await;
    }

    /// Stop accepting blocks, seal what is queued, and join the worker.
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("Block processor failed: {}", e);
            }
        }
    }
}

async fn run(sealer: Sealer, mut rx: mpsc::UnboundedReceiver<BlockJob>) {
    while let Some(job) = rx.recv().await {
        if sealer.coordinator.is_halted() {
            tracing::debug!("Node halted, skipping block at atropos {}", job.decision.atropos);
            continue;
        }
        if let Err(e) = sealer.seal(job.decision).await {
            sealer.coordinator.halt(&format!("block sealing failed: {}", e));
        }
    }
    tracing::debug!("Block processor exited");
}
