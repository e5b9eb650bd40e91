// crates/meridian-store/src/store.rs
//
// Typed node store over any `KvStore` backend.
//
// Key format:
//   - Event:      `event:{id_hex}` -> JSON-serialized Event
//   - DAG index:  `dag:{epoch:010}:{id_hex}` -> empty value (index only)
//   - Epoch:      `epoch_state` -> JSON-serialized EpochState
//   - Block:      `block:{index:020}` -> JSON-serialized Block
//   - Head:       `last_block` -> JSON u64
//
// The DAG index lets the node reload one epoch's events on restart without
// scanning every event ever stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use meridian_core::error::MeridianError;
use meridian_core::event::{Epoch, Event, EventId};
use meridian_core::rules::Rules;
use meridian_core::traits::KvStore;
use meridian_core::validator::ValidatorSet;
use meridian_core::Block;

const EPOCH_STATE_KEY: &[u8] = b"epoch_state";
const LAST_BLOCK_KEY: &[u8] = b"last_block";

/// Persisted state of the current epoch: the source data an epoch context
/// is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochState {
    pub epoch: Epoch,
    pub validators: ValidatorSet,
    pub rules: Rules,
    pub started_at: DateTime<Utc>,
}

/// Typed access to events, epoch state and blocks.
#[derive(Clone)]
pub struct Store {
    kv: Arc<dyn KvStore>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The raw backend, for callers that need to commit or iterate directly.
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    fn event_key(id: &EventId) -> Vec<u8> {
        format!("event:{}", id.to_hex()).into_bytes()
    }

    fn dag_prefix(epoch: Epoch) -> Vec<u8> {
        format!("dag:{:010}:", epoch).into_bytes()
    }

    fn block_key(index: u64) -> Vec<u8> {
        format!("block:{:020}", index).into_bytes()
    }

    fn put_json<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), MeridianError> {
        let json = serde_json::to_vec(value)?;
        self.kv.put(key, &json)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, MeridianError> {
        match self.kv.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store an event and its DAG index entry.
    pub fn put_event(&self, event: &Event) -> Result<(), MeridianError> {
        self.put_json(&Self::event_key(&event.id), event)?;
        let mut index_key = Self::dag_prefix(event.epoch);
        index_key.extend_from_slice(event.id.to_hex().as_bytes());
        self.kv.put(&index_key, &[])
    }

    pub fn get_event(&self, id: &EventId) -> Result<Option<Event>, MeridianError> {
        self.get_json(&Self::event_key(id))
    }

    pub fn has_event(&self, id: &EventId) -> Result<bool, MeridianError> {
        Ok(self.kv.get(&Self::event_key(id))?.is_some())
    }

    /// All events of an epoch, ordered by lamport time so parents come first.
    pub fn epoch_events(&self, epoch: Epoch) -> Result<Vec<Event>, MeridianError> {
        let prefix = Self::dag_prefix(epoch);
        let mut events = Vec::new();

        for (key, _) in self.kv.iter_prefix(&prefix)? {
            let hex_id = std::str::from_utf8(&key[prefix.len()..]).unwrap_or("");
            let Ok(bytes) = hex::decode(hex_id) else {
                tracing::warn!("Skipping malformed DAG index key under epoch {}", epoch);
                continue;
            };
            let Ok(raw) = <[u8; 32]>::try_from(bytes) else {
                continue;
            };
            if let Some(event) = self.get_event(&EventId(raw))? {
                events.push(event);
            }
        }

        events.sort_by_key(|e| (e.lamport, e.id));
        Ok(events)
    }

    pub fn get_epoch_state(&self) -> Result<Option<EpochState>, MeridianError> {
        self.get_json(EPOCH_STATE_KEY)
    }

    pub fn set_epoch_state(&self, state: &EpochState) -> Result<(), MeridianError> {
        self.put_json(EPOCH_STATE_KEY, state)
    }

    /// Current epoch, or an error if the store was never initialized.
    pub fn current_epoch(&self) -> Result<Epoch, MeridianError> {
        self.get_epoch_state()?
            .map(|s| s.epoch)
            .ok_or_else(|| MeridianError::NotFound("epoch state".to_string()))
    }

    /// Persist a sealed block and advance the head pointer.
    pub fn put_block(&self, block: &Block) -> Result<(), MeridianError> {
        self.put_json(&Self::block_key(block.index), block)?;
        self.put_json(LAST_BLOCK_KEY, &block.index)
    }

    pub fn get_block(&self, index: u64) -> Result<Option<Block>, MeridianError> {
        self.get_json(&Self::block_key(index))
    }

    pub fn last_block_index(&self) -> Result<Option<u64>, MeridianError> {
        self.get_json(LAST_BLOCK_KEY)
    }

    pub fn commit(&self) -> Result<(), MeridianError> {
        self.kv.commit()
    }
}
