// crates/meridian-core/src/event.rs
//
// DAG events: the unit peers gossip and the consensus engine orders.
//
// An event is built mutably by the local emitter as an `UnsignedEvent`,
// then frozen by `sign`, which fixes the payload hash, the content-derived
// id and the creator's signature over that id.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{self, Keypair};
use crate::error::MeridianError;
use crate::validator::ValidatorId;

/// Epoch number.
pub type Epoch = u32;

/// Content-derived event identifier (SHA-256 of the unsigned fields).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub [u8; 32]);

impl EventId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, enough to tell events apart in logs.
        write!(f, "{}", &self.to_hex()[..12])
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self)
    }
}

/// An opaque transaction carried in an event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction(pub Vec<u8>);

/// Hash of an ordered transaction list.
pub fn payload_hash(transactions: &[Transaction]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((transactions.len() as u64).to_le_bytes());
    for tx in transactions {
        hasher.update((tx.0.len() as u64).to_le_bytes());
        hasher.update(&tx.0);
    }
    hasher.finalize().into()
}

/// A signed, immutable DAG event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub creator: ValidatorId,
    pub epoch: Epoch,
    /// Position in the creator's own chain, starting at 1.
    pub seq: u32,
    /// Lamport time: max parent lamport + 1.
    pub lamport: u32,
    /// Parent ids. When `seq > 1` the first entry is the self-parent.
    pub parents: Vec<EventId>,
    pub created_at: DateTime<Utc>,
    pub gas_power_used: u64,
    pub gas_power_left: u64,
    pub payload_hash: [u8; 32],
    pub transactions: Vec<Transaction>,
    /// Ed25519 signature over `id`.
    pub signature: Vec<u8>,
}

impl Event {
    /// Recompute the content-derived id from the event's fields.
    pub fn compute_id(&self) -> EventId {
        compute_id(&Header {
            creator: self.creator,
            epoch: self.epoch,
            seq: self.seq,
            lamport: self.lamport,
            parents: &self.parents,
            created_at: &self.created_at,
            gas_power_used: self.gas_power_used,
            gas_power_left: self.gas_power_left,
            payload_hash: &self.payload_hash,
        })
    }

    /// The self-parent id, if the event claims one.
    pub fn self_parent(&self) -> Option<&EventId> {
        if self.seq > 1 {
            self.parents.first()
        } else {
            None
        }
    }

    /// Total size of the transaction payload in bytes.
    pub fn payload_size(&self) -> usize {
        self.transactions.iter().map(|tx| tx.0.len()).sum()
    }

    /// Verify the signature against the given ed25519 public key.
    pub fn verify_signature(&self, public_key: &[u8; 32]) -> Result<bool, MeridianError> {
        crypto::verify_signature(public_key, self.id.as_bytes(), &self.signature)
    }
}

/// Mutable event under construction by the local emitter.
///
/// `build` on the emission adapter fills the ancestry-derived fields
/// (`seq`, `lamport`, gas power); `sign` freezes it into an `Event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub creator: ValidatorId,
    pub epoch: Epoch,
    pub seq: u32,
    pub lamport: u32,
    pub parents: Vec<EventId>,
    pub created_at: DateTime<Utc>,
    pub gas_power_used: u64,
    pub gas_power_left: u64,
    pub transactions: Vec<Transaction>,
}

impl UnsignedEvent {
    /// Start a new event for `creator` with the given parents.
    pub fn new(creator: ValidatorId, parents: Vec<EventId>) -> Self {
        Self {
            creator,
            epoch: 0,
            seq: 0,
            lamport: 0,
            parents,
            created_at: Utc::now(),
            gas_power_used: 0,
            gas_power_left: 0,
            transactions: Vec::new(),
        }
    }

    /// Compute the payload hash and id, then sign the id.
    pub fn sign(self, keypair: &Keypair) -> Event {
        let payload_hash = payload_hash(&self.transactions);
        let id = compute_id(&Header {
            creator: self.creator,
            epoch: self.epoch,
            seq: self.seq,
            lamport: self.lamport,
            parents: &self.parents,
            created_at: &self.created_at,
            gas_power_used: self.gas_power_used,
            gas_power_left: self.gas_power_left,
            payload_hash: &payload_hash,
        });
        let signature = keypair.sign(id.as_bytes());

        Event {
            id,
            creator: self.creator,
            epoch: self.epoch,
            seq: self.seq,
            lamport: self.lamport,
            parents: self.parents,
            created_at: self.created_at,
            gas_power_used: self.gas_power_used,
            gas_power_left: self.gas_power_left,
            payload_hash,
            transactions: self.transactions,
            signature,
        }
    }
}

struct Header<'a> {
    creator: ValidatorId,
    epoch: Epoch,
    seq: u32,
    lamport: u32,
    parents: &'a [EventId],
    created_at: &'a DateTime<Utc>,
    gas_power_used: u64,
    gas_power_left: u64,
    payload_hash: &'a [u8; 32],
}

fn compute_id(h: &Header<'_>) -> EventId {
    let mut hasher = Sha256::new();
    hasher.update(h.creator.0.to_le_bytes());
    hasher.update(h.epoch.to_le_bytes());
    hasher.update(h.seq.to_le_bytes());
    hasher.update(h.lamport.to_le_bytes());
    hasher.update((h.parents.len() as u32).to_le_bytes());
    for p in h.parents {
        hasher.update(p.as_bytes());
    }
    hasher.update(
        h.created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(h.gas_power_used.to_le_bytes());
    hasher.update(h.gas_power_left.to_le_bytes());
    hasher.update(h.payload_hash);
    EventId(hasher.finalize().into())
}
