// crates/meridian-gossip/src/emitter_world.rs
//
// The service as seen by the local event emitter.

use std::sync::Arc;

use rand::seq::SliceRandom;

use meridian_core::{Event, MeridianError, UnsignedEvent, ValidatorId};
use meridian_eventcheck::Verdict;

use crate::coordinator::{EngineState, EngineWriteGuard};
use crate::service::{Admission, Service};

#[derive(Clone)]
pub struct EmitterWorld {
    service: Arc<Service>,
}

impl EmitterWorld {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    /// Sanity check of a self event: every stage, inline.
    pub fn check(&self, event: &Event, parents: &[Arc<Event>]) -> Verdict {
        self.service.checkers().validate(event, parents)
    }

    /// Hold the engine for one emission: no block seals and the epoch does
    /// not roll over until the guard drops. Waits for queued blocks first.
    pub async fn lock(&self) -> EngineWriteGuard<'_> {
        self.service.lock_engine().await
    }

    /// Fill seq, lamport, epoch and gas power from the DAG and epoch context.
    pub fn build<F>(&self, state: &EngineState, event: &mut UnsignedEvent, on_indexed: F) -> Result<(), MeridianError>
    where
        F: FnOnce(&UnsignedEvent),
    {
        self.service.build_event(state, event, on_indexed)
    }

    /// Admit a self event and publish it for broadcast.
    ///
    /// A self event that cannot be connected means local state is broken:
    /// the node is halted and `Fatal` returned.
    pub fn process(&self, state: &mut EngineState, event: Arc<Event>) -> Result<(), MeridianError> {
        let failure = match self.service.connect(state, event.clone()) {
            Ok(Admission::Inserted) | Ok(Admission::Duplicate) => None,
            Ok(Admission::Stale) => Some("event epoch is no longer current".to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            let reason = format!("self-event {} connection failed: {}", event.id, reason);
            self.service.coordinator().halt(&reason);
            return Err(MeridianError::Fatal(reason));
        }

        self.service.feed().publish_emitted(event);
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.service.coordinator().is_busy()
    }

    pub fn is_synced(&self) -> bool {
        self.service.peers().is_synced()
    }

    pub fn peers_num(&self) -> usize {
        self.service.peers().peers_num()
    }

    /// Parents for the next event of `creator`: its latest event first, then
    /// the latest events of up to `max_parents - 1` other creators.
    pub fn pick_parents(&self, state: &EngineState, creator: ValidatorId, max_parents: usize) -> Vec<Arc<Event>> {
        let mut parents: Vec<Arc<Event>> = state.dag.last_event(creator).cloned().into_iter().collect();
        let others: Vec<Arc<Event>> = state
            .dag
            .frontier()
            .into_iter()
            .filter(|e| e.creator != creator)
            .collect();

        let room = max_parents.saturating_sub(parents.len());
        parents.extend(
            others
                .choose_multiple(&mut rand::thread_rng(), room)
                .cloned(),
        );
        parents
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }
}
