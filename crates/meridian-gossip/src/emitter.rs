// crates/meridian-gossip/src/emitter.rs
//
// Local event emitter.
//
// Ticks on a fixed interval. A tick is skipped while the engine is busy or
// the node is not synced; otherwise it locks the engine, picks parents, builds
// and signs an event, checks it, and connects it before releasing the lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use meridian_core::{Event, Keypair, MeridianError, UnsignedEvent, ValidatorId};
use meridian_eventcheck::Verdict;

use crate::config::EmitterConfig;
use crate::emitter_world::EmitterWorld;

pub struct Emitter {
    world: EmitterWorld,
    creator: ValidatorId,
    keypair: Keypair,
    config: EmitterConfig,
    emitted: u64,
}

impl Emitter {
    pub fn new(world: EmitterWorld, creator: ValidatorId, keypair: Keypair, config: EmitterConfig) -> Self {
        Self {
            world,
            creator,
            keypair,
            config,
            emitted: 0,
        }
    }

    /// Start the emitter loop and register it with the service so that
    /// `Service::stop` stops it.
    pub fn spawn(self) {
        let service = self.world.service().clone();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        if let Some(previous) = service.set_emitter(EmitterHandle { shutdown, task }) {
            tracing::warn!("Replacing a running emitter");
            previous.abort();
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Emitter started for {} (interval={}ms, max_parents={})",
            self.creator,
            self.config.interval_ms,
            self.config.max_parents
        );
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.interval_ms.max(1)));

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(_) => {}
                        Err(MeridianError::Fatal(e)) => {
                            tracing::error!("Emitter stopping: {}", e);
                            break;
                        }
                        Err(e) => tracing::debug!("Emission skipped: {}", e),
                    }
                }
            }
        }

        tracing::info!("Emitter stopped after {} events", self.emitted);
    }

    /// One emission attempt. Returns the emitted event, if any.
    pub async fn tick(&mut self) -> Result<Option<Arc<Event>>, MeridianError> {
        if self.world.is_busy() || !self.world.is_synced() {
            tracing::trace!("Emitter idle (busy or not synced)");
            return Ok(None);
        }

        // Held until the event is connected: no block seals in between.
        let mut state = self.world.lock().await;
        let parents = self.world.pick_parents(&state, self.creator, self.config.max_parents);
        let mut unsigned = UnsignedEvent::new(self.creator, parents.iter().map(|p| p.id).collect());
        self.world.build(&state, &mut unsigned, |e| {
            tracing::trace!("Built event seq {} lamport {} for {}", e.seq, e.lamport, e.creator)
        })?;

        let event = Arc::new(unsigned.sign(&self.keypair));
        if let Verdict::Rejected(reason) = self.world.check(&event, &parents) {
            tracing::warn!("Self event {} failed checks: {}", event.id, reason);
            return Ok(None);
        }

        self.world.process(&mut state, event.clone())?;
        drop(state);
        self.emitted += 1;
        tracing::debug!(
            "Emitted event {} (seq {}, {} peers)",
            event.id,
            event.seq,
            self.world.peers_num()
        );
        Ok(Some(event))
    }
}

/// Handle to a running emitter loop.
pub struct EmitterHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EmitterHandle {
    /// Signal the loop and wait for it to finish its current tick.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Emitter task failed: {}", e);
        }
    }

    fn abort(self) {
        self.task.abort();
    }
}
