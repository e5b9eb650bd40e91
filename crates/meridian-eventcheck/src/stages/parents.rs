// crates/meridian-eventcheck/src/stages/parents.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use meridian_core::{Event, EventId};

use crate::error::RejectReason;
use crate::stages::Check;

/// Checks the parent set against DAG ancestry rules.
///
/// Parents are resolved by the caller; any id it could not resolve makes the
/// event `UnknownParent`, which the fetcher turns into a future import.
#[derive(Debug, Default)]
pub struct ParentsCheck;

impl ParentsCheck {
    pub fn new() -> Self {
        Self
    }
}

fn malformed(msg: impl Into<String>) -> Result<(), RejectReason> {
    Err(RejectReason::Malformed(msg.into()))
}

impl Check for ParentsCheck {
    fn name(&self) -> &'static str {
        "parents"
    }

    fn check(&self, event: &Event, parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        let mut seen = HashSet::with_capacity(event.parents.len());
        for id in &event.parents {
            if !seen.insert(id) {
                return malformed(format!("duplicate parent {}", id));
            }
        }

        let resolved: HashMap<&EventId, &Arc<Event>> = parents.iter().map(|p| (&p.id, p)).collect();
        let missing: Vec<EventId> = event
            .parents
            .iter()
            .filter(|id| !resolved.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(RejectReason::UnknownParent(missing));
        }

        let mut creators = HashSet::with_capacity(event.parents.len());
        let mut max_lamport = 0;
        for id in &event.parents {
            let parent = resolved[id];
            if parent.epoch != event.epoch {
                return malformed(format!(
                    "parent {} from epoch {} in epoch {} event",
                    id, parent.epoch, event.epoch
                ));
            }
            // One parent per creator: the self-parent for the creator itself.
            if !creators.insert(parent.creator) {
                return malformed(format!("several parents from creator {}", parent.creator));
            }
            max_lamport = max_lamport.max(parent.lamport);
        }

        if event.seq > 1 {
            let self_parent = resolved[&event.parents[0]];
            if self_parent.creator != event.creator {
                return malformed("first parent is not a self-parent");
            }
            if self_parent.seq + 1 != event.seq {
                return malformed(format!(
                    "self-parent seq {} does not precede seq {}",
                    self_parent.seq, event.seq
                ));
            }
            if event.created_at <= self_parent.created_at {
                return malformed("created before its self-parent");
            }
        } else if creators.contains(&event.creator) {
            return malformed("first event of a creator has a self-parent");
        }

        if event.lamport != max_lamport + 1 {
            return malformed(format!(
                "lamport {} is not max parent lamport {} + 1",
                event.lamport, max_lamport
            ));
        }

        Ok(())
    }
}
