// crates/meridian-eventcheck/src/stages/gaspower.rs

use std::sync::Arc;

use meridian_core::Event;

use crate::context::EpochContextCell;
use crate::error::RejectReason;
use crate::stages::Check;

/// Enforces the creator's gas-power allowance.
///
/// Reads only an epoch-context snapshot and the self-parent, so it is safe
/// to run concurrently with any other reader. Epoch relevance is the epoch
/// stage's job; here a self-parent from another epoch than the context's
/// simply does not carry its leftover forward.
pub struct GasPowerCheck {
    ctx: Arc<EpochContextCell>,
}

impl GasPowerCheck {
    pub fn new(ctx: Arc<EpochContextCell>) -> Self {
        Self { ctx }
    }
}

impl Check for GasPowerCheck {
    fn name(&self) -> &'static str {
        "gaspower"
    }

    fn check(&self, event: &Event, parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        let ctx = self.ctx.load();

        let cost = ctx.rules().gas.event_cost(
            event.parents.len(),
            event.transactions.len(),
            event.payload_size(),
        );
        if event.gas_power_used != cost {
            return Err(RejectReason::Malformed(format!(
                "gas power used {} does not match cost {}",
                event.gas_power_used, cost
            )));
        }

        let self_parent = event
            .self_parent()
            .and_then(|id| parents.iter().find(|p| &p.id == id))
            .map(|p| p.as_ref());

        let available = ctx
            .available_gas_power(event.creator, self_parent, event.created_at)
            .ok_or_else(|| {
                RejectReason::Malformed(format!("creator {} has no gas allocation", event.creator))
            })?;

        let needed = event.gas_power_used.saturating_add(event.gas_power_left);
        if needed > available {
            return Err(RejectReason::InsufficientGasPower { needed, available });
        }

        Ok(())
    }
}
