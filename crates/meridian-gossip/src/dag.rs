// crates/meridian-gossip/src/dag.rs
//
// In-memory index of the current epoch's admitted events.
//
// Only reachable through the engine lock guards; reset at epoch rollover.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use meridian_core::{Event, EventId, ValidatorId};

#[derive(Debug, Default)]
pub struct DagIndex {
    events: HashMap<EventId, Arc<Event>>,
    last_by_creator: HashMap<ValidatorId, Arc<Event>>,
    heads: HashSet<EventId>,
}

impl DagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event. Returns false if it was already indexed.
    pub fn insert(&mut self, event: Arc<Event>) -> bool {
        if self.events.contains_key(&event.id) {
            return false;
        }
        for parent in &event.parents {
            self.heads.remove(parent);
        }
        self.heads.insert(event.id);

        let newer = self
            .last_by_creator
            .get(&event.creator)
            .map_or(true, |last| event.seq > last.seq);
        if newer {
            self.last_by_creator.insert(event.creator, event.clone());
        }

        self.events.insert(event.id, event);
        true
    }

    pub fn get(&self, id: &EventId) -> Option<&Arc<Event>> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.events.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Split `ids` into the events known here and the ids that are not.
    pub fn resolve(&self, ids: &[EventId]) -> (Vec<Arc<Event>>, Vec<EventId>) {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.events.get(id) {
                Some(event) => found.push(event.clone()),
                None => missing.push(*id),
            }
        }
        (found, missing)
    }

    /// Highest-seq event of `creator` in this epoch.
    pub fn last_event(&self, creator: ValidatorId) -> Option<&Arc<Event>> {
        self.last_by_creator.get(&creator)
    }

    /// Latest event of every creator, ordered by creator id.
    pub fn frontier(&self) -> Vec<Arc<Event>> {
        let mut latest: Vec<_> = self.last_by_creator.values().cloned().collect();
        latest.sort_by_key(|e| e.creator);
        latest
    }

    /// Events no other indexed event references yet.
    pub fn heads(&self) -> Vec<EventId> {
        let mut heads: Vec<_> = self.heads.iter().copied().collect();
        heads.sort();
        heads
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.last_by_creator.clear();
        self.heads.clear();
    }
}
