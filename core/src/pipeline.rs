//! The pipeline engine — runs reporting steps over a tabular store.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. QuadFposi     — reconcile new vs legacy positions
//!   2. CicliPreview  — classify lifecycles, aggregate totals
//!   3. RaccInc       — incoming migration linkage
//!   4. FrappPuma     — guarantee-to-cycle linkage
//!
//! RULES:
//!   - Steps execute in registration order, once per run.
//!   - Configuration is validated before the first record is read.
//!   - The first failing step aborts the run; its error is returned and a
//!     `RunFailed` entry closes the log, so counts gathered so far survive.

use crate::{
    cicli_preview_step::CicliPreviewStep,
    config::PipelineConfig,
    error::{LgdError, LgdResult},
    event::{EventLogEntry, PipelineEvent},
    frapp_puma_step::FrappPumaStep,
    quad_fposi_step::QuadFposiStep,
    racc_inc_step::RaccIncStep,
    step::PipelineStep,
    tabular::TabularStore,
    types::RunId,
};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    QuadFposi,
    CicliPreview,
    RaccInc,
    FrappPuma,
}

impl StepKind {
    /// Every step, in execution order.
    pub const ALL: [StepKind; 4] = [
        StepKind::QuadFposi,
        StepKind::CicliPreview,
        StepKind::RaccInc,
        StepKind::FrappPuma,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::QuadFposi    => "quad_fposi",
            Self::CicliPreview => "cicli_preview",
            Self::RaccInc      => "racc_inc",
            Self::FrappPuma    => "frapp_puma",
        }
    }

    pub fn build(&self, config: &PipelineConfig) -> LgdResult<Box<dyn PipelineStep>> {
        Ok(match self {
            Self::QuadFposi    => Box::new(QuadFposiStep::new(config)?),
            Self::CicliPreview => Box::new(CicliPreviewStep::new(config)?),
            Self::RaccInc      => Box::new(RaccIncStep::new(config)?),
            Self::FrappPuma    => Box::new(FrappPumaStep::new(config)?),
        })
    }
}

impl FromStr for StepKind {
    type Err = LgdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('-', "_");
        StepKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| LgdError::StepNotFound { name: s.to_string() })
    }
}

pub struct Pipeline {
    pub run_id: RunId,
    steps:      Vec<Box<dyn PipelineStep>>,
    log:        Vec<EventLogEntry>,
}

impl Pipeline {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            steps: Vec::new(),
            log:   Vec::new(),
        }
    }

    /// Validate `config` and register `kinds` in the documented order,
    /// whatever order they were requested in.
    pub fn build(config: &PipelineConfig, kinds: &[StepKind]) -> LgdResult<Self> {
        config.validate()?;

        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        let mut pipeline = Pipeline::new(run_id);

        for kind in StepKind::ALL.iter().filter(|k| kinds.contains(k)) {
            pipeline.register(kind.build(config)?);
        }
        log::debug!(
            "pipeline {} built with steps {:?}",
            pipeline.run_id,
            pipeline.step_names()
        );
        Ok(pipeline)
    }

    /// Register a step. Call in the documented execution order.
    pub fn register(&mut self, step: Box<dyn PipelineStep>) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Every logical stream the registered steps read or write.
    pub fn streams(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .flat_map(|s| {
                let (inputs, outputs) = s.streams();
                inputs.iter().chain(outputs.iter()).copied()
            })
            .collect()
    }

    pub fn log(&self) -> &[EventLogEntry] {
        &self.log
    }

    /// Run every registered step once.
    pub fn run(&mut self, store: &mut dyn TabularStore) -> LgdResult<RunReport> {
        let started = PipelineEvent::RunStarted {
            run_id: self.run_id.clone(),
            steps:  self.step_names().iter().map(|s| s.to_string()).collect(),
        };
        self.append("pipeline", started);

        for i in 0..self.steps.len() {
            let name = self.steps[i].name();
            log::info!("run {}: step {name} started", self.run_id);

            match self.steps[i].run(store) {
                Ok(events) => {
                    for event in events {
                        self.append(name, event);
                    }
                    log::info!("run {}: step {name} completed", self.run_id);
                }
                Err(e) => {
                    log::error!("run {}: step {name} failed: {e}", self.run_id);
                    let failed = PipelineEvent::RunFailed {
                        run_id: self.run_id.clone(),
                        step:   name.to_string(),
                        error:  e.to_string(),
                    };
                    self.append(name, failed);
                    return Err(e);
                }
            }
        }

        let completed = PipelineEvent::RunCompleted { run_id: self.run_id.clone() };
        self.append("pipeline", completed);

        Ok(self.report())
    }

    /// Counters over the log so far. After a failed run this still covers
    /// every step that completed before the failure.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_id:  self.run_id.clone(),
            entries: self.log.clone(),
        }
    }

    fn append(&mut self, step: &str, event: PipelineEvent) {
        self.log.push(EventLogEntry {
            seq:        self.log.len() as u64,
            run_id:     self.run_id.clone(),
            step:       step.to_string(),
            event_type: event.type_name().to_string(),
            event,
        });
    }
}

/// The log of a run, with the counters the runner prints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub run_id:  RunId,
    pub entries: Vec<EventLogEntry>,
}

impl RunReport {
    pub fn rows_written(&self, stream: &str) -> Option<u64> {
        self.entries.iter().find_map(|e| match &e.event {
            PipelineEvent::StreamWritten { stream: s, rows } if s == stream => Some(*rows),
            _ => None,
        })
    }

    pub fn unjoinable_total(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.event {
                PipelineEvent::RecordsUnjoinable { count, .. } => count,
                _ => 0,
            })
            .sum()
    }

    pub fn degraded_total(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.event {
                PipelineEvent::FieldsDegraded { fields, .. } => fields,
                _ => 0,
            })
            .sum()
    }

    /// Step name and error message when the run aborted.
    pub fn failure(&self) -> Option<(&str, &str)> {
        self.entries.iter().find_map(|e| match &e.event {
            PipelineEvent::RunFailed { step, error, .. } => Some((step.as_str(), error.as_str())),
            _ => None,
        })
    }

    pub fn written(&self) -> Vec<(&str, u64)> {
        self.entries
            .iter()
            .filter_map(|e| match &e.event {
                PipelineEvent::StreamWritten { stream, rows } => Some((stream.as_str(), *rows)),
                _ => None,
            })
            .collect()
    }
}
