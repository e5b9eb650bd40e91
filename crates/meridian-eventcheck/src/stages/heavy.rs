// crates/meridian-eventcheck/src/stages/heavy.rs

use std::sync::Arc;

use meridian_core::{payload_hash, Event};

use crate::context::EpochContextCell;
use crate::error::RejectReason;
use crate::stages::Check;

/// Payload hash and ed25519 signature verification.
///
/// The only stage expensive enough to be batched on the heavy-check queue.
pub struct HeavyCheck {
    ctx: Arc<EpochContextCell>,
}

impl HeavyCheck {
    pub fn new(ctx: Arc<EpochContextCell>) -> Self {
        Self { ctx }
    }
}

impl Check for HeavyCheck {
    fn name(&self) -> &'static str {
        "heavy"
    }

    fn check(&self, event: &Event, _parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        let ctx = self.ctx.load();

        // Keys are only known for the current epoch.
        if event.epoch != ctx.epoch() {
            return Err(RejectReason::StaleEpoch {
                event: event.epoch,
                current: ctx.epoch(),
            });
        }

        if event.payload_hash != payload_hash(&event.transactions) {
            return Err(RejectReason::Malformed("payload hash mismatch".to_string()));
        }

        let validator = ctx.validators().get(event.creator).ok_or_else(|| {
            RejectReason::Malformed(format!("creator {} has no registered key", event.creator))
        })?;

        match event.verify_signature(&validator.public_key) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RejectReason::BadSignature),
            Err(e) => {
                tracing::debug!("Signature of event {} unparseable: {}", event.id, e);
                Err(RejectReason::BadSignature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{first_event, signed, Fixture};

    #[test]
    fn test_signature_and_payload() {
        let fixture = Fixture::new(&[1, 1]);
        let check = HeavyCheck::new(fixture.cell.clone());

        let event = signed(&fixture, first_event(&fixture, 1));
        assert!(check.check(&event, &[]).is_ok());

        let forged = first_event(&fixture, 2).sign(fixture.keypair(1));
        assert_eq!(check.check(&forged, &[]), Err(RejectReason::BadSignature));

        let mut tampered = (*event).clone();
        tampered.transactions.push(meridian_core::Transaction(vec![9]));
        assert!(matches!(check.check(&tampered, &[]), Err(RejectReason::Malformed(_))));
    }

    #[test]
    fn test_uses_current_epoch_keys() {
        let fixture = Fixture::new(&[1]);
        let check = HeavyCheck::new(fixture.cell.clone());
        let event = signed(&fixture, first_event(&fixture, 1));

        fixture.rollover(2);
        assert_eq!(
            check.check(&event, &[]),
            Err(RejectReason::StaleEpoch { event: 1, current: 2 })
        );
    }
}
