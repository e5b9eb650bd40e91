// crates/meridian-core/src/traits.rs
//
// Narrow interfaces to the collaborators the admission pipeline consumes
// but does not implement: the key-value store, the consensus engine, the
// fetcher, and the peer/protocol manager.

use std::sync::Arc;

use crate::block::BlockDecision;
use crate::error::MeridianError;
use crate::event::{Epoch, Event, EventId};
use crate::validator::ValidatorSet;

/// Opaque key-value store.
///
/// Writes become durable after `commit`. Reads and iteration observe every
/// previously put key, committed or not.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, MeridianError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), MeridianError>;

    fn delete(&self, key: &[u8]) -> Result<(), MeridianError>;

    /// All live entries whose key starts with `prefix`, in key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, MeridianError>;

    /// Atomically persist all pending writes.
    fn commit(&self) -> Result<(), MeridianError>;
}

/// The opaque consensus ordering engine.
///
/// Always called with the engine write lock held, hence `&mut self`.
pub trait ConsensusEngine: Send + Sync {
    /// Start a fresh epoch with the given validator set.
    fn reset(&mut self, epoch: Epoch, validators: &ValidatorSet) -> Result<(), MeridianError>;

    /// Feed one admitted event. Returns any blocks decided as a result.
    ///
    /// An error here on an event that passed every check is fatal.
    fn process(&mut self, event: &Event) -> Result<Vec<BlockDecision>, MeridianError>;
}

/// Interest predicate supplied by the fetch/sync component.
pub trait InterestFilter: Send + Sync {
    /// Filter `ids` down to those still wanted.
    fn only_interested(&self, ids: &[EventId]) -> Vec<EventId>;
}

/// Future-import queue of the fetcher.
pub trait FutureImport: Send + Sync {
    /// Report an event rejected because `missing` parents are not yet known.
    fn push_missing(&self, event: Arc<Event>, missing: Vec<EventId>);
}

/// Read-only view of the protocol manager used to pace local emission.
pub trait PeerSource: Send + Sync {
    fn peers_num(&self) -> usize;

    fn is_synced(&self) -> bool;
}
