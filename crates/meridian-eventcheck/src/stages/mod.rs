// crates/meridian-eventcheck/src/stages/mod.rs
//
// Checker stages, in cost-ascending order:
//   1. basic    - field presence and bounds, content-derived id
//   2. epoch    - event belongs to the current epoch and validator set
//   3. parents  - parent set is resolved and respects DAG ancestry rules
//   4. gaspower - creator has enough gas power for the event
//   5. heavy    - payload hash and signature verification
//
// Each stage answers pass or reject for one event. None mutates shared state.

use std::sync::Arc;

use meridian_core::Event;

use crate::error::RejectReason;

pub mod basic;
pub mod epoch;
pub mod gaspower;
pub mod heavy;
pub mod parents;

pub use basic::BasicCheck;
pub use epoch::EpochCheck;
pub use gaspower::GasPowerCheck;
pub use heavy::HeavyCheck;
pub use parents::ParentsCheck;

/// A single checker stage.
pub trait Check: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Evaluate `event` given the parents the caller resolved.
    fn check(&self, event: &Event, parents: &[Arc<Event>]) -> Result<(), RejectReason>;
}

/// Run `stages` in order, stopping at the first rejection.
pub fn run_stages(
    stages: &[Arc<dyn Check>],
    event: &Event,
    parents: &[Arc<Event>],
) -> Result<(), RejectReason> {
    for stage in stages {
        if let Err(reason) = stage.check(event, parents) {
            tracing::trace!("Event {} rejected by {} check: {}", event.id, stage.name(), reason);
            return Err(reason);
        }
    }
    Ok(())
}
