// crates/meridian-gossip/src/engine.rs
//
// Reference ordering engine.
//
// Stands in for the BFT ordering algorithm: it decides a block every
// `events_per_block` admitted events, in admission order, with the last
// event of the block as its atropos.

use meridian_core::{BlockDecision, ConsensusEngine, Epoch, Event, EventId, MeridianError, ValidatorSet};

#[derive(Debug)]
pub struct OrderingEngine {
    events_per_block: usize,
    epoch: Epoch,
    pending: Vec<EventId>,
}

impl OrderingEngine {
    pub fn new(events_per_block: usize) -> Self {
        Self {
            events_per_block: events_per_block.max(1),
            epoch: 0,
            pending: Vec::new(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Events admitted since the last decided block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl ConsensusEngine for OrderingEngine {
    fn reset(&mut self, epoch: Epoch, validators: &ValidatorSet) -> Result<(), MeridianError> {
        if validators.is_empty() {
            return Err(MeridianError::Engine(format!("epoch {} has no validators", epoch)));
        }
        self.epoch = epoch;
        self.pending.clear();
        Ok(())
    }

    fn process(&mut self, event: &Event) -> Result<Vec<BlockDecision>, MeridianError> {
        if event.epoch != self.epoch {
            return Err(MeridianError::Engine(format!(
                "event {} from epoch {} fed to epoch {}",
                event.id, event.epoch, self.epoch
            )));
        }

        self.pending.push(event.id);
        if self.pending.len() < self.events_per_block {
            return Ok(Vec::new());
        }

        let events = std::mem::take(&mut self.pending);
        Ok(vec![BlockDecision {
            epoch: self.epoch,
            atropos: event.id,
            events,
        }])
    }
}
