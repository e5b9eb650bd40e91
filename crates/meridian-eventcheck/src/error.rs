use thiserror::Error;

use meridian_core::event::{Epoch, EventId};
use meridian_core::MeridianError;

/// Why a checker stage rejected an event.
///
/// Rejections are verdicts, not failures of the node: they travel inside
/// `Verdict::Rejected` through completion callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Structural violation: missing or out-of-bounds fields, bad ancestry.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// The event belongs to an epoch other than the current one.
    #[error("stale epoch: event epoch {event}, current epoch {current}")]
    StaleEpoch { event: Epoch, current: Epoch },

    /// Some parents are not known yet. Not permanent: the event is retried
    /// once the fetcher imports the missing ancestors.
    #[error("unknown parents: {0:?}")]
    UnknownParent(Vec<EventId>),

    /// Signature does not verify against the creator's epoch key.
    #[error("bad signature")]
    BadSignature,

    /// The creator does not have enough gas power for this event.
    #[error("insufficient gas power: needs {needed}, available {available}")]
    InsufficientGasPower { needed: u64, available: u64 },

    /// The task could not be handed to a closed queue and was never checked.
    #[error("terminated before check")]
    Terminated,
}

impl RejectReason {
    /// Whether the same event can never pass, no matter what arrives later.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            RejectReason::UnknownParent(_) | RejectReason::StaleEpoch { .. } | RejectReason::Terminated
        )
    }
}

/// Failures of the checking machinery itself.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("heavy-check queue is closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CheckError> for MeridianError {
    fn from(e: CheckError) -> Self {
        match e {
            CheckError::QueueClosed => MeridianError::QueueClosed("heavy-check".to_string()),
            CheckError::InvalidConfig(msg) => MeridianError::InvalidState(msg),
        }
    }
}
