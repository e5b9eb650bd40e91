// crates/meridian-gossip/src/fetcher.rs
//
// Interest predicate and future-import queue.
//
// An event is interesting while the store does not have it. Events rejected
// for unknown parents wait here, keyed by the parents they miss, until those
// parents are admitted; `release` hands back the events that no longer miss
// anything so the service can re-submit them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use meridian_core::{Event, EventId, FutureImport, InterestFilter};
use meridian_store::Store;

/// Default cap on events waiting for parents.
pub const DEFAULT_MAX_WAITING: usize = 4096;

#[derive(Debug, Default)]
struct Waiting {
    /// Waiting event -> the parents it still misses.
    events: HashMap<EventId, (Arc<Event>, HashSet<EventId>)>,
    /// Missing parent -> events waiting on it.
    by_parent: HashMap<EventId, Vec<EventId>>,
}

pub struct Fetcher {
    store: Store,
    max_waiting: usize,
    waiting: Mutex<Waiting>,
}

impl Fetcher {
    pub fn new(store: Store, max_waiting: usize) -> Self {
        Self {
            store,
            max_waiting,
            waiting: Mutex::new(Waiting::default()),
        }
    }

    /// Events that became complete now that `parent` is admitted.
    pub fn release(&self, parent: &EventId) -> Vec<Arc<Event>> {
        let mut waiting = self.waiting.lock();
        let Some(children) = waiting.by_parent.remove(parent) else {
            return Vec::new();
        };

        let mut released = Vec::new();
        for child in children {
            let complete = match waiting.events.get_mut(&child) {
                Some((_, missing)) => {
                    missing.remove(parent);
                    missing.is_empty()
                }
                None => false,
            };
            if complete {
                if let Some((event, _)) = waiting.events.remove(&child) {
                    released.push(event);
                }
            }
        }

        if !released.is_empty() {
            tracing::debug!("Parent {} released {} waiting events", parent, released.len());
        }
        released
    }

    pub fn is_waiting(&self, id: &EventId) -> bool {
        self.waiting.lock().events.contains_key(id)
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.lock().events.len()
    }

    /// Drop everything waiting. Used at epoch rollover, after which the
    /// waiting events can only be stale.
    pub fn clear(&self) {
        let mut waiting = self.waiting.lock();
        if !waiting.events.is_empty() {
            tracing::debug!("Dropping {} events waiting for parents", waiting.events.len());
        }
        waiting.events.clear();
        waiting.by_parent.clear();
    }
}

impl InterestFilter for Fetcher {
    fn only_interested(&self, ids: &[EventId]) -> Vec<EventId> {
        ids.iter()
            .filter(|id| match self.store.has_event(id) {
                Ok(known) => !known,
                Err(e) => {
                    tracing::warn!("Interest lookup for {} failed: {}", id, e);
                    true
                }
            })
            .copied()
            .collect()
    }
}

impl FutureImport for Fetcher {
    fn push_missing(&self, event: Arc<Event>, missing: Vec<EventId>) {
        let mut waiting = self.waiting.lock();
        let Waiting { events, by_parent } = &mut *waiting;

        if !events.contains_key(&event.id) && events.len() >= self.max_waiting {
            tracing::warn!(
                "Future-import queue full ({}), dropping event {}",
                self.max_waiting,
                event.id
            );
            return;
        }

        tracing::debug!("Event {} waits for {} parents", event.id, missing.len());
        let id = event.id;
        let entry = events.entry(id).or_insert_with(|| (event, HashSet::new()));
        for parent in missing {
            if entry.1.insert(parent) {
                by_parent.entry(parent).or_default().push(id);
            }
        }
    }
}
