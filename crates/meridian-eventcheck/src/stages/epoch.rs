// crates/meridian-eventcheck/src/stages/epoch.rs

use std::sync::Arc;

use meridian_core::Event;

use crate::context::EpochContextCell;
use crate::error::RejectReason;
use crate::stages::Check;

/// Rejects events outside the current epoch or from non-validators.
///
/// The context cell is swapped under the engine write lock at the same time
/// the store's epoch advances, so it mirrors the store's current epoch.
pub struct EpochCheck {
    ctx: Arc<EpochContextCell>,
}

impl EpochCheck {
    pub fn new(ctx: Arc<EpochContextCell>) -> Self {
        Self { ctx }
    }
}

impl Check for EpochCheck {
    fn name(&self) -> &'static str {
        "epoch"
    }

    fn check(&self, event: &Event, _parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        let ctx = self.ctx.load();

        if event.epoch != ctx.epoch() {
            return Err(RejectReason::StaleEpoch {
                event: event.epoch,
                current: ctx.epoch(),
            });
        }
        if !ctx.validators().contains(event.creator) {
            return Err(RejectReason::Malformed(format!(
                "creator {} is not a validator of epoch {}",
                event.creator,
                ctx.epoch()
            )));
        }

        Ok(())
    }
}
