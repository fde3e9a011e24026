//! Stage trait.
//!
//! RULE: Every step of the pipeline implements PipelineStage.
//! A stage consumes the previous stage's complete output by value
//! and returns a new value; it never holds on to, or mutates, a
//! table another stage can see. Execution order is fixed and
//! documented in pipeline.rs.

use crate::{error::PipelineResult, event::PipelineEvent};

pub trait PipelineStage {
    type Input;
    type Output;

    /// Unique stable name for this stage.
    fn name(&self) -> &'static str;

    /// Run the stage once.
    ///
    /// - `input`:  the previous stage's output
    /// - `events`: the run's event log; append what this stage did
    fn run(
        &self,
        input: Self::Input,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Self::Output>;
}
