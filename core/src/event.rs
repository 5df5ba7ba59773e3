//! Pipeline events — the audit trail of a run.
//!
//! Steps return events; the pipeline stamps them into the run log.
//! Variants are only ever appended.

use crate::types::RunId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Run lifecycle ──────────────────────────────
    RunStarted {
        run_id: RunId,
        steps:  Vec<String>,
    },
    RunCompleted {
        run_id: RunId,
    },
    RunFailed {
        run_id: RunId,
        step:   String,
        error:  String,
    },

    // ── Stream traffic ─────────────────────────────
    StreamRead {
        stream: String,
        rows:   u64,
    },
    StreamWritten {
        stream: String,
        rows:   u64,
    },

    // ── Data quality ───────────────────────────────
    /// Optional values that failed to parse and were treated as absent.
    FieldsDegraded {
        stream: String,
        fields: u64,
    },
    /// Rows excluded from a join because a key component was missing.
    RecordsUnjoinable {
        stream: String,
        count:  u64,
    },
    DuplicateKeys {
        count: u64,
    },
    /// Rows dropped by a configured filter (not an error).
    RecordsFiltered {
        stream: String,
        count:  u64,
    },
}

impl PipelineEvent {
    /// Stable name used in the event log.
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. }        => "run_started",
            PipelineEvent::RunCompleted { .. }      => "run_completed",
            PipelineEvent::RunFailed { .. }         => "run_failed",
            PipelineEvent::StreamRead { .. }        => "stream_read",
            PipelineEvent::StreamWritten { .. }     => "stream_written",
            PipelineEvent::FieldsDegraded { .. }    => "fields_degraded",
            PipelineEvent::RecordsUnjoinable { .. } => "records_unjoinable",
            PipelineEvent::DuplicateKeys { .. }     => "duplicate_keys",
            PipelineEvent::RecordsFiltered { .. }   => "records_filtered",
        }
    }
}

/// One persisted entry of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub seq:        u64,
    pub run_id:     RunId,
    pub step:       String,
    pub event_type: String,
    pub event:      PipelineEvent,
}
