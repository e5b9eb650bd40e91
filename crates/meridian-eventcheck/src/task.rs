// crates/meridian-eventcheck/src/task.rs
//
// Verdicts and the task wrapper carried through the asynchronous checkers.
//
// A task is moved into its completion callback, so it can be completed at
// most once by construction; the queues guarantee it is completed at least
// once by never dropping a task they accepted.

use std::sync::Arc;

use meridian_core::Event;

use crate::error::RejectReason;

/// Outcome of running checker stages over an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), RejectReason> {
        match self {
            Verdict::Accepted => Ok(()),
            Verdict::Rejected(reason) => Err(reason),
        }
    }
}

impl From<Result<(), RejectReason>> for Verdict {
    fn from(result: Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => Verdict::Accepted,
            Err(reason) => Verdict::Rejected(reason),
        }
    }
}

/// One event awaiting a verdict, with the parents the caller could resolve.
#[derive(Debug)]
pub struct EventTask {
    event: Arc<Event>,
    parents: Vec<Arc<Event>>,
    verdict: Option<Verdict>,
}

impl EventTask {
    pub fn new(event: Arc<Event>, parents: Vec<Arc<Event>>) -> Self {
        Self {
            event,
            parents,
            verdict: None,
        }
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn parents(&self) -> &[Arc<Event>] {
        &self.parents
    }

    /// The verdict, or `None` if the task was completed without checking
    /// (nobody was interested in the event any more).
    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub(crate) fn set_verdict(&mut self, verdict: Verdict) {
        self.verdict = Some(verdict);
    }

    pub fn into_parts(self) -> (Arc<Event>, Vec<Arc<Event>>, Option<Verdict>) {
        (self.event, self.parents, self.verdict)
    }
}

/// Completion callback. Receives every task exactly once, possibly grouped
/// with other tasks of the same batch.
pub type OnChecked = Arc<dyn Fn(Vec<EventTask>) + Send + Sync>;

/// Complete tasks that will never be checked because their queue is gone.
pub(crate) fn terminate(mut tasks: Vec<EventTask>, on_done: &OnChecked) {
    if tasks.is_empty() {
        return;
    }
    for task in tasks.iter_mut() {
        task.set_verdict(Verdict::Rejected(RejectReason::Terminated));
    }
    on_done(tasks);
}
