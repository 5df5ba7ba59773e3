//! QuadFposi step — reconciles the new positions extract against the
//! legacy one.
//!
//! Execution order: slot 1.
//!
//! Design:
//!   - Both sides are decoded with their own schema, so the legacy
//!     `yy-MM-dd` dates are normalised before the key is built.
//!   - Legacy rows outside the configured window are dropped and counted.
//!     Rows with no usable default-start date are kept so the join can
//!     report them as unjoinable.
//!   - Four outputs: new-only, legacy-only, matched, conflicting. Matched
//!     and conflicting are disjoint; their union is every joined pair.
//!   - Output rows carry the office, then every primary column, then every
//!     legacy column, each qualified by its schema's stream name
//!     (`hadoop_fposi.codicebanca`, `old_fposi.codicebanca`). The missing
//!     side of an unmatched row is empty. Dates are written in the common
//!     pattern.

use crate::{
    config::PipelineConfig,
    error::LgdResult,
    event::PipelineEvent,
    position::{PositionCodec, PositionRecord},
    reconciliation::{ConflictDetector, Reconciliator},
    step::PipelineStep,
    tabular::{Table, TabularStore},
    temporal::{DatePattern, DateWindow},
    types::Office,
};

pub const PRIMARY: &str = "quad_fposi.primary";
pub const LEGACY: &str = "quad_fposi.legacy";
pub const NEW_ONLY: &str = "quad_fposi.new_only";
pub const LEGACY_ONLY: &str = "quad_fposi.legacy_only";
pub const MATCHED: &str = "quad_fposi.matched";
pub const CONFLICTING: &str = "quad_fposi.conflicting";

const INPUTS: &[&str] = &[PRIMARY, LEGACY];
const OUTPUTS: &[&str] = &[NEW_ONLY, LEGACY_ONLY, MATCHED, CONFLICTING];

pub struct QuadFposiStep {
    office:   Office,
    primary:  PositionCodec,
    legacy:   PositionCodec,
    common:   DatePattern,
    window:   DateWindow,
    detector: ConflictDetector,
}

impl QuadFposiStep {
    pub fn new(config: &PipelineConfig) -> LgdResult<Self> {
        Ok(Self {
            office:   config.office.clone(),
            primary:  PositionCodec::new(config.streams.primary.clone())?,
            legacy:   PositionCodec::new(config.streams.legacy.clone())?,
            common:   config.common_pattern()?,
            window:   config.legacy_window()?,
            detector: ConflictDetector::new(
                config.open_sentinel_date()?,
                config.reconciliation.conflict_rule,
            )
            .with_absent_dates(config.reconciliation.absent_dates),
        })
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec!["ufficio".to_string()];
        for codec in [&self.primary, &self.legacy] {
            let prefix = &codec.schema().stream;
            header.extend(
                codec
                    .schema()
                    .declared_columns()
                    .into_iter()
                    .map(|c| format!("{prefix}.{c}")),
            );
        }
        header
    }

    fn row(&self, new: Option<&PositionRecord>, legacy: Option<&PositionRecord>) -> Vec<Option<String>> {
        let mut row = vec![Some(self.office.clone())];
        match new {
            Some(r) => row.extend(self.primary.encode(r, &self.common)),
            None => row.extend(std::iter::repeat(None).take(self.primary.width())),
        }
        match legacy {
            Some(r) => row.extend(self.legacy.encode(r, &self.common)),
            None => row.extend(std::iter::repeat(None).take(self.legacy.width())),
        }
        row
    }

    fn read(
        &self,
        store: &mut dyn TabularStore,
        stream: &'static str,
        codec: &PositionCodec,
        events: &mut Vec<PipelineEvent>,
    ) -> LgdResult<Vec<PositionRecord>> {
        let rows = store.read(stream, &codec.schema().declared_columns())?;
        let (records, stats) = codec.decode_all(&rows);

        events.push(PipelineEvent::StreamRead { stream: stream.into(), rows: stats.rows });
        if stats.degraded_fields > 0 {
            events.push(PipelineEvent::FieldsDegraded {
                stream: stream.into(),
                fields: stats.degraded_fields,
            });
        }
        Ok(records)
    }
}

impl PipelineStep for QuadFposiStep {
    fn name(&self) -> &'static str {
        "quad_fposi"
    }

    fn streams(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (INPUTS, OUTPUTS)
    }

    fn run(&mut self, store: &mut dyn TabularStore) -> LgdResult<Vec<PipelineEvent>> {
        let mut events = Vec::new();

        let primary = self.read(store, PRIMARY, &self.primary, &mut events)?;
        let legacy = self.read(store, LEGACY, &self.legacy, &mut events)?;

        let before = legacy.len();
        let legacy: Vec<PositionRecord> = legacy
            .into_iter()
            .filter(|r| r.default_start_date.map_or(true, |d| self.window.contains(d)))
            .collect();
        let filtered = (before - legacy.len()) as u64;
        if filtered > 0 {
            log::info!("quad_fposi: {filtered} legacy rows outside the reconciliation window");
            events.push(PipelineEvent::RecordsFiltered { stream: LEGACY.into(), count: filtered });
        }

        let common = &self.common;
        let reconciliator = Reconciliator::new(
            |r: &PositionRecord| r.join_key(common),
            |r: &PositionRecord| r.join_key(common),
        );
        let result = reconciliator.reconcile(primary, legacy);

        for (stream, count) in [(PRIMARY, result.unjoinable.primary), (LEGACY, result.unjoinable.legacy)] {
            if count > 0 {
                events.push(PipelineEvent::RecordsUnjoinable { stream: stream.into(), count });
            }
        }
        if result.duplicate_keys > 0 {
            events.push(PipelineEvent::DuplicateKeys { count: result.duplicate_keys });
        }

        let header = self.header();
        let mut new_only = Table::new(header.clone());
        let mut legacy_only = Table::new(header.clone());
        let mut matched = Table::new(header.clone());
        let mut conflicting = Table::new(header);

        for r in result.new_only() {
            new_only.push(self.row(Some(r), None));
        }
        for r in result.legacy_only() {
            legacy_only.push(self.row(None, Some(r)));
        }
        let (ordinary, conflicts) =
            result.partition_matched(|n, l| self.detector.is_conflicting(n, l));
        for (n, l) in ordinary {
            matched.push(self.row(Some(n), Some(l)));
        }
        for (n, l) in conflicts {
            conflicting.push(self.row(Some(n), Some(l)));
        }

        for (stream, table) in [
            (NEW_ONLY, &new_only),
            (LEGACY_ONLY, &legacy_only),
            (MATCHED, &matched),
            (CONFLICTING, &conflicting),
        ] {
            store.write(stream, table)?;
            events.push(PipelineEvent::StreamWritten { stream: stream.into(), rows: table.len() as u64 });
        }

        log::info!(
            "quad_fposi: {} new-only, {} legacy-only, {} matched, {} conflicting",
            new_only.len(),
            legacy_only.len(),
            matched.len(),
            conflicting.len()
        );
        Ok(events)
    }
}
