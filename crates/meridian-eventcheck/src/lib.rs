// crates/meridian-eventcheck/src/lib.rs
//
// Event admission checks for the Meridian validator node: the checker
// stages, the epoch context they read, the heavy-check worker pool and the
// admission filter in front of it.

pub mod admission;
pub mod checkers;
pub mod context;
pub mod error;
pub mod heavycheck;
pub mod stages;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use admission::AdmissionFilter;
pub use checkers::{Checkers, Pipeline};
pub use context::{EpochContext, EpochContextCell, ValidatorGas};
pub use error::{CheckError, RejectReason};
pub use heavycheck::{HeavyCheckConfig, HeavyCheckQueue, HeavyCheckStats};
pub use stages::Check;
pub use task::{EventTask, OnChecked, Verdict};
