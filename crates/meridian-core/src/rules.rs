// crates/meridian-core/src/rules.rs
//
// Network rules fixed per epoch: structural limits and the clock-skew bound
// enforced by the basic check, and the gas-power economy enforced by the
// gas-power check.

use serde::{Deserialize, Serialize};

/// Structural limits and gas-power parameters of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    /// Maximum number of parents an event may reference.
    #[serde(default = "default_max_parents")]
    pub max_parents: usize,
    /// Maximum number of transactions in one event.
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
    /// Maximum total transaction bytes in one event.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// How far ahead of local time an event's creation time may be.
    #[serde(default = "default_max_clock_skew_ms")]
    pub max_clock_skew_ms: u64,
    #[serde(default)]
    pub gas: GasPowerRules,
}

/// Gas-power economy: how fast validators accrue the right to emit events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPowerRules {
    /// Gas power allocated per second to the whole validator set, split by weight.
    #[serde(default = "default_alloc_per_sec")]
    pub alloc_per_sec: u64,
    /// Longest period of allocation a validator may stash.
    #[serde(default = "default_max_alloc_period_ms")]
    pub max_alloc_period_ms: u64,
    /// Allocation period granted to a validator's first event of an epoch.
    #[serde(default = "default_startup_alloc_period_ms")]
    pub startup_alloc_period_ms: u64,
    /// Lower bound of the startup allocation.
    #[serde(default = "default_min_startup_gas")]
    pub min_startup_gas: u64,
    #[serde(default = "default_event_gas")]
    pub event_gas: u64,
    #[serde(default = "default_parent_gas")]
    pub parent_gas: u64,
    #[serde(default = "default_tx_gas")]
    pub tx_gas: u64,
    #[serde(default = "default_tx_byte_gas")]
    pub tx_byte_gas: u64,
}

fn default_max_parents() -> usize {
    10
}

fn default_max_transactions() -> usize {
    256
}

fn default_max_payload_bytes() -> usize {
    128 * 1024
}

fn default_max_clock_skew_ms() -> u64 {
    10_000
}

fn default_alloc_per_sec() -> u64 {
    1_000_000
}

fn default_max_alloc_period_ms() -> u64 {
    60_000
}

fn default_startup_alloc_period_ms() -> u64 {
    5_000
}

fn default_min_startup_gas() -> u64 {
    100_000
}

fn default_event_gas() -> u64 {
    28_000
}

fn default_parent_gas() -> u64 {
    2_400
}

fn default_tx_gas() -> u64 {
    21_000
}

fn default_tx_byte_gas() -> u64 {
    16
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            max_parents: default_max_parents(),
            max_transactions: default_max_transactions(),
            max_payload_bytes: default_max_payload_bytes(),
            max_clock_skew_ms: default_max_clock_skew_ms(),
            gas: GasPowerRules::default(),
        }
    }
}

impl Default for GasPowerRules {
    fn default() -> Self {
        Self {
            alloc_per_sec: default_alloc_per_sec(),
            max_alloc_period_ms: default_max_alloc_period_ms(),
            startup_alloc_period_ms: default_startup_alloc_period_ms(),
            min_startup_gas: default_min_startup_gas(),
            event_gas: default_event_gas(),
            parent_gas: default_parent_gas(),
            tx_gas: default_tx_gas(),
            tx_byte_gas: default_tx_byte_gas(),
        }
    }
}

impl GasPowerRules {
    /// Gas power an event consumes.
    pub fn event_cost(&self, parents: usize, transactions: usize, payload_bytes: usize) -> u64 {
        self.event_gas
            .saturating_add(self.parent_gas.saturating_mul(parents as u64))
            .saturating_add(self.tx_gas.saturating_mul(transactions as u64))
            .saturating_add(self.tx_byte_gas.saturating_mul(payload_bytes as u64))
    }
}
