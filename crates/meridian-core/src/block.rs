// crates/meridian-core/src/block.rs
//
// Ordering decisions produced by the consensus engine and the blocks the
// node seals from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Epoch, EventId};

/// A block decided by the consensus engine, not yet sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDecision {
    /// Epoch the engine was in when it decided the block.
    pub epoch: Epoch,
    /// The event that finalized this block.
    pub atropos: EventId,
    /// Confirmed events, in the order the engine decided them.
    pub events: Vec<EventId>,
}

/// A sealed block as persisted by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub epoch: Epoch,
    pub atropos: EventId,
    pub events: Vec<EventId>,
    pub sealed_at: DateTime<Utc>,
}
