// crates/meridian-eventcheck/src/test_support.rs
//
// Shared fixtures for unit tests: a validator set with keys, a context cell,
// and builders producing events that pass every stage by default.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use meridian_core::{Event, Keypair, Rules, UnsignedEvent, Validator, ValidatorId, ValidatorSet};

use crate::context::{EpochContext, EpochContextCell};

pub(crate) struct Fixture {
    keypairs: BTreeMap<u32, Keypair>,
    pub cell: Arc<EpochContextCell>,
}

impl Fixture {
    /// Validators `1..=weights.len()` in epoch 1 with default rules.
    pub fn new(weights: &[u64]) -> Self {
        let keypairs: BTreeMap<u32, Keypair> = (1..=weights.len() as u32)
            .map(|id| (id, Keypair::generate()))
            .collect();
        let ctx = EpochContext::new(1, validator_set(&keypairs, weights), Rules::default(), Utc::now());
        Self {
            keypairs,
            cell: Arc::new(EpochContextCell::new(ctx)),
        }
    }

    pub fn keypair(&self, id: u32) -> &Keypair {
        &self.keypairs[&id]
    }

    pub fn epoch(&self) -> u32 {
        self.cell.load().epoch()
    }

    /// Replace the context with the same validators in `epoch`.
    pub fn rollover(&self, epoch: u32) {
        let current = self.cell.load();
        self.cell.swap(EpochContext::new(
            epoch,
            current.validators().clone(),
            current.rules().clone(),
            Utc::now(),
        ));
    }
}

fn validator_set(keypairs: &BTreeMap<u32, Keypair>, weights: &[u64]) -> ValidatorSet {
    ValidatorSet::new(keypairs.iter().zip(weights).map(|((id, kp), weight)| Validator {
        id: ValidatorId(*id),
        public_key: kp.public_key_bytes(),
        weight: *weight,
    }))
}

fn with_cost(fixture: &Fixture, mut e: UnsignedEvent) -> UnsignedEvent {
    let payload: usize = e.transactions.iter().map(|t| t.0.len()).sum();
    e.gas_power_used = fixture
        .cell
        .load()
        .rules()
        .gas
        .event_cost(e.parents.len(), e.transactions.len(), payload);
    e
}

/// First event of `creator` in the fixture's epoch, with no parents.
pub(crate) fn first_event(fixture: &Fixture, creator: u32) -> UnsignedEvent {
    let mut e = UnsignedEvent::new(ValidatorId(creator), vec![]);
    e.epoch = fixture.epoch();
    e.seq = 1;
    e.lamport = 1;
    with_cost(fixture, e)
}

/// Next event after `self_parent`, also referencing `others`.
pub(crate) fn child(fixture: &Fixture, self_parent: &Event, others: &[&Event]) -> UnsignedEvent {
    let mut parents = vec![self_parent.id];
    parents.extend(others.iter().map(|e| e.id));
    let lamport = others
        .iter()
        .map(|e| e.lamport)
        .chain(std::iter::once(self_parent.lamport))
        .max()
        .unwrap_or(0)
        + 1;

    let mut e = UnsignedEvent::new(self_parent.creator, parents);
    e.epoch = self_parent.epoch;
    e.seq = self_parent.seq + 1;
    e.lamport = lamport;
    e.created_at = self_parent.created_at + Duration::seconds(1);
    with_cost(fixture, e)
}

/// Re-derive the gas cost after a test changed parents or transactions.
pub(crate) fn recost(fixture: &Fixture, e: UnsignedEvent) -> UnsignedEvent {
    with_cost(fixture, e)
}

pub(crate) fn signed(fixture: &Fixture, e: UnsignedEvent) -> Arc<Event> {
    let creator = e.creator.0;
    Arc::new(e.sign(fixture.keypair(creator)))
}
