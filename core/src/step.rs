//! Step trait.
//!
//! RULE: Every reporting step implements PipelineStep.
//! A step owns its compiled configuration, reads its input streams from
//! the store, and writes every declared output stream or fails.
//! Steps never call each other.

use crate::{error::LgdResult, event::PipelineEvent, tabular::TabularStore};

pub trait PipelineStep: Send {
    /// Unique stable name for this step.
    fn name(&self) -> &'static str;

    /// Logical streams read, then streams written.
    fn streams(&self) -> (&'static [&'static str], &'static [&'static str]);

    /// Run the step once over its full input.
    fn run(&mut self, store: &mut dyn TabularStore) -> LgdResult<Vec<PipelineEvent>>;
}
