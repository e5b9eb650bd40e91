// crates/meridian-core/src/lib.rs
//
// meridian-core: Core types, traits, and crypto primitives for the Meridian
// validator node.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the event and block data structures, the validator table, the
// error type, and the interfaces of the collaborators the admission pipeline
// talks to (store, consensus engine, fetcher, peers).

pub mod block;
pub mod crypto;
pub mod error;
pub mod event;
pub mod rules;
pub mod traits;
pub mod validator;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use meridian_core::Event;`

pub use block::{Block, BlockDecision};
pub use crypto::Keypair;
pub use error::MeridianError;
pub use event::{payload_hash, Epoch, Event, EventId, Transaction, UnsignedEvent};
pub use rules::{GasPowerRules, Rules};
pub use traits::{ConsensusEngine, FutureImport, InterestFilter, KvStore, PeerSource};
pub use validator::{Validator, ValidatorId, ValidatorSet};
