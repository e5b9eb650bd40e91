// crates/meridian-gossip/src/service.rs
//
// The node service: wires the store, checkers, coordinator, fetcher, block
// processor and feed together, and runs the admission loop.
//
// Network events flow:
//   submit -> parent resolution (read lock) -> Checkers::enqueue
//          -> completion callback -> admission loop -> process_event (write lock)
//
// The admission loop is the only consumer of checked network events, so
// unknown-parent reports are handled in the same order as admissions. A
// report is re-examined under the read lock before it is parked in the
// fetcher; `process_event` releases parked events under the write lock. The
// two cannot interleave, so no parked event misses its release.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use meridian_core::{
    ConsensusEngine, Event, EventId, FutureImport, MeridianError, PeerSource, UnsignedEvent,
};
use meridian_eventcheck::{
    Checkers, EpochContext, EpochContextCell, EventTask, OnChecked, Pipeline, RejectReason, Verdict,
};
use meridian_store::Store;

use crate::blockproc::{BlockProcessor, Sealer};
use crate::config::ServiceConfig;
use crate::coordinator::{EngineCoordinator, EngineState, EngineWriteGuard, InflightGuard};
use crate::dag::DagIndex;
use crate::emitter::EmitterHandle;
use crate::feed::ServiceFeed;
use crate::fetcher::{Fetcher, DEFAULT_MAX_WAITING};

/// Outcome of a successful `process_event` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored, indexed and fed to the engine.
    Inserted,
    /// Already in the DAG; nothing changed.
    Duplicate,
    /// The epoch rolled over after the event was checked; dropped.
    Stale,
}

/// A checked network event on its way to the admission loop.
enum Checked {
    Accepted(Arc<Event>),
    Missing(Arc<Event>, Vec<EventId>),
}

struct CheckedItem {
    checked: Checked,
    _guard: Arc<InflightGuard>,
}

pub struct Service {
    config: ServiceConfig,
    store: Store,
    context: Arc<EpochContextCell>,
    coordinator: Arc<EngineCoordinator>,
    checkers: Checkers,
    fetcher: Arc<Fetcher>,
    feed: ServiceFeed,
    blocks: BlockProcessor,
    peers: Arc<dyn PeerSource>,
    admit_tx: Mutex<Option<mpsc::UnboundedSender<CheckedItem>>>,
    admission: Mutex<Option<JoinHandle<()>>>,
    emitter: Mutex<Option<EmitterHandle>>,
}

impl Service {
    /// Build the service from the store's current epoch and start its
    /// workers. Must be called inside a tokio runtime.
    ///
    /// Events already stored for the current epoch are replayed into the
    /// DAG index and the engine; decisions from the replay were sealed
    /// before the restart and are discarded.
    pub fn new(
        config: ServiceConfig,
        store: Store,
        mut engine: Box<dyn ConsensusEngine>,
        peers: Arc<dyn PeerSource>,
    ) -> Result<Arc<Self>, MeridianError> {
        let epoch_state = store
            .get_epoch_state()?
            .ok_or_else(|| MeridianError::NotFound("epoch state (store not initialized)".to_string()))?;

        engine.reset(epoch_state.epoch, &epoch_state.validators)?;
        let mut dag = DagIndex::new();
        for event in store.epoch_events(epoch_state.epoch)? {
            let event = Arc::new(event);
            engine.process(&event)?;
            dag.insert(event);
        }
        if !dag.is_empty() {
            tracing::info!("Restored {} events of epoch {}", dag.len(), epoch_state.epoch);
        }

        let context = Arc::new(EpochContextCell::new(EpochContext::new(
            epoch_state.epoch,
            epoch_state.validators,
            epoch_state.rules,
            epoch_state.started_at,
        )));
        let coordinator = Arc::new(EngineCoordinator::new(engine, dag));
        let fetcher = Arc::new(Fetcher::new(store.clone(), DEFAULT_MAX_WAITING));
        let checkers = Checkers::new(
            Pipeline::standard(context.clone()),
            &config.heavy_check,
            fetcher.clone(),
        )?;
        let feed = ServiceFeed::default();
        let blocks = BlockProcessor::start(Sealer {
            coordinator: coordinator.clone(),
            store: store.clone(),
            context: context.clone(),
            feed: feed.clone(),
            fetcher: fetcher.clone(),
            blocks_per_epoch: config.engine.blocks_per_epoch,
        });

        let (admit_tx, admit_rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            config,
            store,
            context,
            coordinator,
            checkers,
            fetcher,
            feed,
            blocks,
            peers,
            admit_tx: Mutex::new(Some(admit_tx)),
            admission: Mutex::new(None),
            emitter: Mutex::new(None),
        });

        let loop_handle = tokio::spawn(service.clone().run_admission(admit_rx));
        *service.admission.lock() = Some(loop_handle);

        tracing::info!("Service started in epoch {}", epoch_state.epoch);
        Ok(service)
    }

    /// Submit network events for admission.
    ///
    /// Returns once the events are handed to the checkers; verdicts arrive
    /// asynchronously. Events already in the DAG are skipped.
    pub async fn submit(&self, events: Vec<Arc<Event>>) -> Result<(), MeridianError> {
        self.coordinator.ensure_open()?;
        let admit_tx = self.admit_tx.lock().clone().ok_or(MeridianError::Stopped)?;
        let guard = Arc::new(self.coordinator.track());

        let tasks: Vec<EventTask> = {
            let state = self.coordinator.read().await;
            events
                .into_iter()
                .filter(|event| !state.dag.contains(&event.id))
                .map(|event| {
                    let (parents, _) = state.dag.resolve(&event.parents);
                    EventTask::new(event, parents)
                })
                .collect()
        };
        if tasks.is_empty() {
            return Ok(());
        }

        let on_done: OnChecked = Arc::new(move |tasks: Vec<EventTask>| {
            for task in tasks {
                let (event, _, verdict) = task.into_parts();
                let checked = match verdict {
                    None => {
                        tracing::trace!("Event {} dropped: not interesting", event.id);
                        continue;
                    }
                    Some(Verdict::Accepted) => Checked::Accepted(event),
                    Some(Verdict::Rejected(RejectReason::UnknownParent(missing))) => {
                        Checked::Missing(event, missing)
                    }
                    Some(Verdict::Rejected(RejectReason::Terminated)) => {
                        tracing::debug!("Event {} not checked: shutting down", event.id);
                        continue;
                    }
                    Some(Verdict::Rejected(reason)) => {
                        tracing::warn!("Rejected event {} from network: {}", event.id, reason);
                        continue;
                    }
                };
                let item = CheckedItem {
                    checked,
                    _guard: guard.clone(),
                };
                if admit_tx.send(item).is_err() {
                    tracing::debug!("Admission loop gone, dropping checked event");
                }
            }
        });

        self.checkers.enqueue(tasks, on_done).await?;
        Ok(())
    }

    async fn run_admission(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<CheckedItem>) {
        while let Some(item) = rx.recv().await {
            match item.checked {
                Checked::Accepted(event) => {
                    let id = event.id;
                    match self.process_event(event).await {
                        Ok(Admission::Inserted) => tracing::trace!("Admitted event {}", id),
                        Ok(Admission::Duplicate) => {}
                        Ok(Admission::Stale) => tracing::debug!("Event {} went stale before admission", id),
                        Err(MeridianError::Stopped) => tracing::debug!("Event {} not admitted: stopped", id),
                        Err(e) => tracing::error!("Admission of event {} failed: {}", id, e),
                    }
                }
                Checked::Missing(event, missing) => self.park(event, missing).await,
            }
        }
        tracing::debug!("Admission loop exited");
    }

    /// Park an event in the fetcher, unless its parents arrived meanwhile.
    async fn park(self: &Arc<Self>, event: Arc<Event>, missing: Vec<EventId>) {
        let state = self.coordinator.read().await;
        let still_missing: Vec<EventId> = missing
            .into_iter()
            .filter(|id| !state.dag.contains(id))
            .collect();

        if still_missing.is_empty() {
            drop(state);
            self.resubmit(vec![event]);
        } else {
            self.fetcher.push_missing(event, still_missing);
        }
    }

    fn resubmit(self: &Arc<Self>, events: Vec<Arc<Event>>) {
        if events.is_empty() {
            return;
        }
        let service = self.clone();
        self.coordinator.spawn_tracked(async move {
            if let Err(e) = service.submit(events).await {
                tracing::debug!("Re-submission failed: {}", e);
            }
        });
    }

    /// Connect a checked event to the DAG and the engine.
    ///
    /// Takes the events write lock. Store and engine failures halt the node
    /// and come back as `Fatal`.
    pub async fn process_event(self: &Arc<Self>, event: Arc<Event>) -> Result<Admission, MeridianError> {
        if self.coordinator.is_halted() {
            return Err(MeridianError::Fatal("node halted".to_string()));
        }
        let mut state = self.coordinator.write_events().await;
        self.connect(&mut state, event)
    }

    /// `process_event` for a caller already holding the write lock.
    pub fn connect(
        self: &Arc<Self>,
        state: &mut EngineState,
        event: Arc<Event>,
    ) -> Result<Admission, MeridianError> {
        if self.coordinator.is_halted() {
            return Err(MeridianError::Fatal("node halted".to_string()));
        }
        if state.stopped {
            return Err(MeridianError::Stopped);
        }
        if state.dag.contains(&event.id) {
            return Ok(Admission::Duplicate);
        }
        let current = self.context.load().epoch();
        if event.epoch != current {
            return Ok(Admission::Stale);
        }

        if let Err(e) = self.store.put_event(&event) {
            return Err(self.fatal(format!("storing event {}: {}", event.id, e)));
        }
        state.dag.insert(event.clone());
        let decisions = match state.engine.process(&event) {
            Ok(decisions) => decisions,
            Err(e) => return Err(self.fatal(format!("engine rejected event {}: {}", event.id, e))),
        };
        for decision in decisions {
            self.blocks.submit(decision, self.coordinator.track());
        }

        // Re-submission runs on its own task and waits for the lock.
        let released = self.fetcher.release(&event.id);
        self.resubmit(released);
        Ok(Admission::Inserted)
    }

    /// Take the events write lock once no decided block is waiting to be
    /// sealed. While the guard is held no block seals and the epoch cannot
    /// roll over, so local emission can build and connect an event as one
    /// step.
    pub async fn lock_engine(&self) -> EngineWriteGuard<'_> {
        loop {
            self.wait_block_end().await;
            let state = self.coordinator.write_events().await;
            if self.blocks.pending() == 0 {
                return state;
            }
            drop(state);
        }
    }

    fn fatal(&self, reason: String) -> MeridianError {
        self.coordinator.halt(&reason);
        MeridianError::Fatal(reason)
    }

    /// Fill the ancestry-derived fields of a local event from `state` and
    /// the current epoch context, then call `on_indexed` once with the
    /// completed event.
    pub fn build_event<F>(
        &self,
        state: &EngineState,
        event: &mut UnsignedEvent,
        on_indexed: F,
    ) -> Result<(), MeridianError>
    where
        F: FnOnce(&UnsignedEvent),
    {
        let ctx = self.context.load();

        let (parents, missing) = state.dag.resolve(&event.parents);
        if !missing.is_empty() {
            return Err(MeridianError::InvalidState(format!(
                "{} parents of the new event are unknown",
                missing.len()
            )));
        }

        event.epoch = ctx.epoch();
        let self_parent = state.dag.last_event(event.creator).cloned();
        match &self_parent {
            Some(sp) => {
                if event.parents.first() != Some(&sp.id) {
                    return Err(MeridianError::InvalidState(
                        "first parent must be the creator's latest event".to_string(),
                    ));
                }
                event.seq = sp.seq + 1;
                if event.created_at <= sp.created_at {
                    event.created_at = sp.created_at + chrono::Duration::milliseconds(1);
                }
            }
            None => event.seq = 1,
        }
        event.lamport = parents.iter().map(|p| p.lamport).max().unwrap_or(0) + 1;

        let payload: usize = event.transactions.iter().map(|tx| tx.0.len()).sum();
        event.gas_power_used =
            ctx.rules()
                .gas
                .event_cost(event.parents.len(), event.transactions.len(), payload);
        let available = ctx
            .available_gas_power(event.creator, self_parent.as_deref(), event.created_at)
            .ok_or_else(|| {
                MeridianError::InvalidState(format!("{} is not a validator of epoch {}", event.creator, ctx.epoch()))
            })?;
        if event.gas_power_used > available {
            return Err(MeridianError::InvalidState(format!(
                "insufficient gas power: needs {}, available {}",
                event.gas_power_used, available
            )));
        }
        event.gas_power_left = available - event.gas_power_used;

        on_indexed(&*event);
        Ok(())
    }

    /// Wait until every decided block is sealed.
    pub async fn wait_block_end(&self) {
        self.blocks.wait_idle().await;
    }

    pub(crate) fn set_emitter(&self, handle: EmitterHandle) -> Option<EmitterHandle> {
        self.emitter.lock().replace(handle)
    }

    /// Shut the service down.
    ///
    /// Closes intake, stops the emitter, drains the heavy-check queue and the
    /// admission loop, waits for in-flight work, marks the engine stopped
    /// under the write lock, waits for block sealing, and commits the store.
    pub async fn stop(&self) -> Result<(), MeridianError> {
        tracing::info!("Stopping service");
        self.coordinator.close();

        let emitter = self.emitter.lock().take();
        if let Some(emitter) = emitter {
            emitter.stop().await;
        }

        self.checkers.close().await;

        drop(self.admit_tx.lock().take());
        let admission = self.admission.lock().take();
        if let Some(admission) = admission {
            if let Err(e) = admission.await {
                tracing::error!("Admission loop failed: {}", e);
            }
        }

        self.coordinator.wait_quiescent().await;
        {
            let mut state = self.coordinator.write_events().await;
            self.coordinator.mark_stopped(&mut state);
        }
        self.wait_block_end().await;
        self.coordinator.wait_quiescent().await;
        self.blocks.close().await;

        self.store.commit()?;
        tracing::info!("Service stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn context(&self) -> &Arc<EpochContextCell> {
        &self.context
    }

    pub fn coordinator(&self) -> &Arc<EngineCoordinator> {
        &self.coordinator
    }

    pub fn checkers(&self) -> &Checkers {
        &self.checkers
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn feed(&self) -> &ServiceFeed {
        &self.feed
    }

    pub fn peers(&self) -> &Arc<dyn PeerSource> {
        &self.peers
    }

    /// Whether `id` is in the current epoch's DAG.
    pub async fn contains_event(&self, id: &EventId) -> bool {
        self.coordinator.read().await.dag.contains(id)
    }
}
