// crates/meridian-eventcheck/src/checkers.rs
//
// The checker aggregate: one ordered stage list, two ways to run it.
//
// `validate` runs every stage inline, for self events and re-validation.
// `enqueue` runs the light stages in the admission filter and the heavy
// stages on the heavy-check queue. Both walk the same stages in the same
// order, so they reach the same verdict for the same input.

use std::sync::Arc;

use meridian_core::{Event, InterestFilter};

use crate::admission::AdmissionFilter;
use crate::context::EpochContextCell;
use crate::error::{CheckError, RejectReason};
use crate::heavycheck::{HeavyCheckConfig, HeavyCheckQueue};
use crate::stages::{run_stages, BasicCheck, Check, EpochCheck, GasPowerCheck, HeavyCheck, ParentsCheck};
use crate::task::{EventTask, OnChecked, Verdict};

/// Ordered stage list, split at the point where work moves off the caller.
#[derive(Clone)]
pub struct Pipeline {
    light: Vec<Arc<dyn Check>>,
    heavy: Vec<Arc<dyn Check>>,
}

impl Pipeline {
    pub fn new(light: Vec<Arc<dyn Check>>, heavy: Vec<Arc<dyn Check>>) -> Self {
        Self { light, heavy }
    }

    /// basic, epoch, parents | gaspower, heavy.
    pub fn standard(ctx: Arc<EpochContextCell>) -> Self {
        Self::new(
            vec![
                Arc::new(BasicCheck::new(ctx.clone())),
                Arc::new(EpochCheck::new(ctx.clone())),
                Arc::new(ParentsCheck::new()),
            ],
            vec![Arc::new(GasPowerCheck::new(ctx.clone())), Arc::new(HeavyCheck::new(ctx))],
        )
    }

    pub fn light(&self) -> &[Arc<dyn Check>] {
        &self.light
    }

    pub fn heavy(&self) -> &[Arc<dyn Check>] {
        &self.heavy
    }

    pub fn validate_light(&self, event: &Event, parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        run_stages(&self.light, event, parents)
    }

    pub fn validate_heavy(&self, event: &Event, parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        run_stages(&self.heavy, event, parents)
    }

    pub fn validate(&self, event: &Event, parents: &[Arc<Event>]) -> Verdict {
        self.validate_light(event, parents)
            .and_then(|()| self.validate_heavy(event, parents))
            .into()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |stages: &[Arc<dyn Check>]| stages.iter().map(|s| s.name()).collect::<Vec<_>>();
        f.debug_struct("Pipeline")
            .field("light", &names(&self.light))
            .field("heavy", &names(&self.heavy))
            .finish()
    }
}

/// Synchronous and queued access to the checker stages.
pub struct Checkers {
    pipeline: Pipeline,
    heavy: Arc<HeavyCheckQueue>,
    filter: AdmissionFilter,
}

impl Checkers {
    /// Start the heavy-check workers and wire the admission filter in front.
    pub fn new(
        pipeline: Pipeline,
        config: &HeavyCheckConfig,
        interest: Arc<dyn InterestFilter>,
    ) -> Result<Self, CheckError> {
        let heavy = Arc::new(HeavyCheckQueue::new(pipeline.heavy().to_vec(), config)?);
        let filter = AdmissionFilter::new(interest, pipeline.light().to_vec(), heavy.clone());
        Ok(Self {
            pipeline,
            heavy,
            filter,
        })
    }

    /// Run every stage inline.
    pub fn validate(&self, event: &Event, parents: &[Arc<Event>]) -> Verdict {
        self.pipeline.validate(event, parents)
    }

    /// Admit network events asynchronously. See [`AdmissionFilter::enqueue`].
    pub async fn enqueue(&self, tasks: Vec<EventTask>, on_done: OnChecked) -> Result<(), CheckError> {
        self.filter.enqueue(tasks, on_done).await
    }

    /// Close the heavy-check queue and wait for queued work to finish.
    pub async fn close(&self) {
        self.heavy.close().await;
    }

    pub fn heavy_queue(&self) -> &Arc<HeavyCheckQueue> {
        &self.heavy
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}
