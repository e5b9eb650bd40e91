// crates/meridian-eventcheck/src/context.rs
//
// Epoch-scoped check context and its atomically swapped holder.
//
// An `EpochContext` is built once per epoch from persisted state and never
// mutated. `EpochContextCell` hands out `Arc` snapshots; rollover replaces
// the whole snapshot, so a reader holds either the old context or the new
// one, never a mix.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use meridian_core::event::{Epoch, Event};
use meridian_core::rules::Rules;
use meridian_core::validator::{ValidatorId, ValidatorSet};

/// Per-validator gas-power allocation derived from weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorGas {
    pub alloc_per_sec: u64,
    pub max_stashed: u64,
    pub startup: u64,
}

/// Immutable validator keys, weights and rules of one epoch.
#[derive(Debug, Clone)]
pub struct EpochContext {
    epoch: Epoch,
    validators: ValidatorSet,
    rules: Rules,
    started_at: DateTime<Utc>,
    checksum: [u8; 32],
}

impl EpochContext {
    pub fn new(epoch: Epoch, validators: ValidatorSet, rules: Rules, started_at: DateTime<Utc>) -> Self {
        let checksum = Self::digest(epoch, &validators, &rules);
        Self {
            epoch,
            validators,
            rules,
            started_at,
            checksum,
        }
    }

    fn digest(epoch: Epoch, validators: &ValidatorSet, rules: &Rules) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(epoch.to_le_bytes());
        for v in validators.iter() {
            hasher.update(v.id.0.to_le_bytes());
            hasher.update(v.public_key);
            hasher.update(v.weight.to_le_bytes());
        }
        // Rules are plain data; their JSON form is stable for a given value.
        hasher.update(serde_json::to_vec(rules).unwrap_or_default());
        hasher.finalize().into()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Digest recorded at construction.
    pub fn checksum(&self) -> [u8; 32] {
        self.checksum
    }

    /// Recompute the digest and compare with the recorded one.
    pub fn is_consistent(&self) -> bool {
        Self::digest(self.epoch, &self.validators, &self.rules) == self.checksum
    }

    /// Gas-power allocation of a validator, or `None` if it is not in the set.
    pub fn validator_gas(&self, id: ValidatorId) -> Option<ValidatorGas> {
        let validator = self.validators.get(id)?;
        let total = self.validators.total_weight().max(1) as u128;
        let gas = &self.rules.gas;

        let alloc_per_sec = (gas.alloc_per_sec as u128 * validator.weight as u128 / total) as u64;
        let max_stashed = (alloc_per_sec as u128 * gas.max_alloc_period_ms as u128 / 1000) as u64;
        let startup = ((alloc_per_sec as u128 * gas.startup_alloc_period_ms as u128 / 1000) as u64)
            .max(gas.min_startup_gas);

        Some(ValidatorGas {
            alloc_per_sec,
            max_stashed,
            startup,
        })
    }

    /// Gas power available to `creator` for an event created at `created_at`.
    ///
    /// A self-parent from this epoch carries its leftover forward plus the
    /// allocation accrued since it was created, capped at the stash limit
    /// (or at the leftover itself if that is already higher). Without such
    /// a self-parent the validator starts from the startup allocation.
    pub fn available_gas_power(
        &self,
        creator: ValidatorId,
        self_parent: Option<&Event>,
        created_at: DateTime<Utc>,
    ) -> Option<u64> {
        let gas = self.validator_gas(creator)?;

        let available = match self_parent {
            Some(sp) if sp.epoch == self.epoch => {
                let elapsed_ms = (created_at - sp.created_at).num_milliseconds().max(0) as u128;
                let accrued = (gas.alloc_per_sec as u128 * elapsed_ms / 1000) as u64;
                let cap = gas.max_stashed.max(sp.gas_power_left);
                sp.gas_power_left.saturating_add(accrued).min(cap)
            }
            _ => gas.startup,
        };

        Some(available)
    }
}

/// Shared holder of the current epoch context.
#[derive(Debug)]
pub struct EpochContextCell {
    current: RwLock<Arc<EpochContext>>,
}

impl EpochContextCell {
    pub fn new(ctx: EpochContext) -> Self {
        Self {
            current: RwLock::new(Arc::new(ctx)),
        }
    }

    /// Snapshot of the current context. Cheap: clones an `Arc`.
    pub fn load(&self) -> Arc<EpochContext> {
        self.current.read().clone()
    }

    /// Replace the context wholesale, returning the previous one.
    pub fn swap(&self, ctx: EpochContext) -> Arc<EpochContext> {
        let next = Arc::new(ctx);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
