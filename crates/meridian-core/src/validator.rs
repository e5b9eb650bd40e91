// crates/meridian-core/src/validator.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identity of a validator within the network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ValidatorId(pub u32);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A validator registered for an epoch.
///
/// The public key is the ed25519 key the validator signs its events with;
/// the weight drives both consensus voting power and gas-power allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: ValidatorId,
    pub public_key: [u8; 32],
    pub weight: u64,
}

/// The validator table of one epoch, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: BTreeMap<ValidatorId, Validator>,
}

impl ValidatorSet {
    pub fn new(validators: impl IntoIterator<Item = Validator>) -> Self {
        Self {
            validators: validators.into_iter().map(|v| (v.id, v)).collect(),
        }
    }

    pub fn get(&self, id: ValidatorId) -> Option<&Validator> {
        self.validators.get(&id)
    }

    pub fn contains(&self, id: ValidatorId) -> bool {
        self.validators.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sum of all validator weights.
    pub fn total_weight(&self) -> u64 {
        self.validators.values().map(|v| v.weight).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }
}
