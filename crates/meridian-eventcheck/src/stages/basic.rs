// crates/meridian-eventcheck/src/stages/basic.rs

use std::sync::Arc;

use chrono::Utc;

use meridian_core::Event;

use crate::context::EpochContextCell;
use crate::error::RejectReason;
use crate::stages::Check;

const SIGNATURE_LEN: usize = 64;

/// Structural check: no I/O, no ancestry lookups.
pub struct BasicCheck {
    ctx: Arc<EpochContextCell>,
}

impl BasicCheck {
    pub fn new(ctx: Arc<EpochContextCell>) -> Self {
        Self { ctx }
    }
}

fn malformed(msg: impl Into<String>) -> Result<(), RejectReason> {
    Err(RejectReason::Malformed(msg.into()))
}

impl Check for BasicCheck {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn check(&self, event: &Event, _parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        let ctx = self.ctx.load();
        let rules = ctx.rules();

        if event.epoch == 0 {
            return malformed("zero epoch");
        }
        if event.seq == 0 {
            return malformed("zero seq");
        }
        // Lamport time grows at least as fast as the creator's own chain.
        if event.lamport < event.seq {
            return malformed(format!("lamport {} below seq {}", event.lamport, event.seq));
        }
        if event.seq > 1 && event.parents.is_empty() {
            return malformed("missing self-parent");
        }
        if event.parents.len() > rules.max_parents {
            return malformed(format!(
                "{} parents exceed limit {}",
                event.parents.len(),
                rules.max_parents
            ));
        }
        if event.transactions.len() > rules.max_transactions {
            return malformed(format!(
                "{} transactions exceed limit {}",
                event.transactions.len(),
                rules.max_transactions
            ));
        }
        let payload = event.payload_size();
        if payload > rules.max_payload_bytes {
            return malformed(format!(
                "payload of {} bytes exceeds limit {}",
                payload, rules.max_payload_bytes
            ));
        }
        // Gas power accrues with the creator's own clock; bound it by ours.
        let ahead_ms = (event.created_at - Utc::now()).num_milliseconds();
        if ahead_ms > 0 && ahead_ms as u64 > rules.max_clock_skew_ms {
            return malformed(format!("created at {} is in the future", event.created_at));
        }
        if event.gas_power_used == 0 {
            return malformed("zero gas power used");
        }
        if event.signature.len() != SIGNATURE_LEN {
            return malformed(format!("signature length {}", event.signature.len()));
        }
        if event.id != event.compute_id() {
            return malformed("id does not match content");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{first_event, signed, Fixture};
    use chrono::Duration;
    use meridian_core::{EventId, Transaction};

    fn reason(check: &BasicCheck, event: &Event) -> String {
        match check.check(event, &[]) {
            Err(RejectReason::Malformed(msg)) => msg,
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_well_formed_first_event_passes() {
        let fixture = Fixture::new(&[1]);
        let check = BasicCheck::new(fixture.cell.clone());
        let event = signed(&fixture, first_event(&fixture, 1));
        assert!(check.check(&event, &[]).is_ok());
    }

    #[test]
    fn test_field_bounds() {
        let fixture = Fixture::new(&[1]);
        let check = BasicCheck::new(fixture.cell.clone());

        let mut e = first_event(&fixture, 1);
        e.seq = 0;
        assert_eq!(reason(&check, &signed(&fixture, e)), "zero seq");

        let mut e = first_event(&fixture, 1);
        e.seq = 3;
        e.lamport = 2;
        e.parents = vec![EventId([1u8; 32])];
        assert!(reason(&check, &signed(&fixture, e)).contains("below seq"));

        let mut e = first_event(&fixture, 1);
        e.seq = 2;
        e.lamport = 2;
        assert_eq!(reason(&check, &signed(&fixture, e)), "missing self-parent");

        let mut e = first_event(&fixture, 1);
        e.parents = (0..11u8).map(|i| EventId([i; 32])).collect();
        assert!(reason(&check, &signed(&fixture, e)).contains("parents exceed"));

        let mut e = first_event(&fixture, 1);
        e.transactions = vec![Transaction(vec![0u8; 128 * 1024 + 1])];
        assert!(reason(&check, &signed(&fixture, e)).contains("payload"));

        let mut e = first_event(&fixture, 1);
        e.gas_power_used = 0;
        assert_eq!(reason(&check, &signed(&fixture, e)), "zero gas power used");
    }

    #[test]
    fn test_future_creation_time_rejected() {
        let fixture = Fixture::new(&[1]);
        let check = BasicCheck::new(fixture.cell.clone());

        let mut e = first_event(&fixture, 1);
        e.created_at = Utc::now() + Duration::hours(1);
        assert!(reason(&check, &signed(&fixture, e)).ends_with("is in the future"));

        // Within the skew bound.
        let mut e = first_event(&fixture, 1);
        e.created_at = Utc::now() + Duration::seconds(2);
        assert!(check.check(&signed(&fixture, e), &[]).is_ok());
    }

    #[test]
    fn test_tampered_fields_break_id() {
        let fixture = Fixture::new(&[1]);
        let check = BasicCheck::new(fixture.cell.clone());

        let mut event = (*signed(&fixture, first_event(&fixture, 1))).clone();
        event.lamport += 1;
        assert_eq!(reason(&check, &event), "id does not match content");

        let mut event = (*signed(&fixture, first_event(&fixture, 1))).clone();
        event.signature.truncate(10);
        assert!(reason(&check, &event).starts_with("signature length"));
    }
}
