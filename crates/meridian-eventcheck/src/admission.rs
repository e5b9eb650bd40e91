// crates/meridian-eventcheck/src/admission.rs
//
// Front of the heavy-check queue for network events.
//
// Drops events nobody is interested in any more, runs the cheap stages, and
// forwards the survivors to the heavy-check queue in one call. Dropped and
// rejected tasks are completed right away through the same callback.

use std::sync::Arc;

use meridian_core::InterestFilter;

use crate::error::CheckError;
use crate::heavycheck::HeavyCheckQueue;
use crate::stages::{run_stages, Check};
use crate::task::{EventTask, OnChecked, Verdict};

pub struct AdmissionFilter {
    interest: Arc<dyn InterestFilter>,
    light: Vec<Arc<dyn Check>>,
    heavy: Arc<HeavyCheckQueue>,
}

impl AdmissionFilter {
    pub fn new(
        interest: Arc<dyn InterestFilter>,
        light: Vec<Arc<dyn Check>>,
        heavy: Arc<HeavyCheckQueue>,
    ) -> Self {
        Self {
            interest,
            light,
            heavy,
        }
    }

    /// Filter `tasks` and forward the survivors.
    ///
    /// Every task reaches `on_done` exactly once: uninteresting ones with no
    /// verdict, light-check failures with their rejection, the rest from the
    /// heavy-check queue (or as `Terminated` if it is closed).
    pub async fn enqueue(&self, tasks: Vec<EventTask>, on_done: OnChecked) -> Result<(), CheckError> {
        let mut passed = Vec::with_capacity(tasks.len());

        for mut task in tasks {
            let id = task.event().id;
            if self.interest.only_interested(&[id]).is_empty() {
                tracing::trace!("Event {} no longer interesting, skipping checks", id);
                on_done(vec![task]);
                continue;
            }

            match run_stages(&self.light, task.event(), task.parents()) {
                Ok(()) => passed.push(task),
                Err(reason) => {
                    tracing::debug!("Event {} failed light checks: {}", id, reason);
                    task.set_verdict(Verdict::Rejected(reason));
                    on_done(vec![task]);
                }
            }
        }

        self.heavy.enqueue(passed, on_done).await
    }
}
