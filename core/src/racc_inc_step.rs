//! RaccInc step — turns migration rows into incoming-linkage rows.
//!
//! Execution order: slot 3.
//!
//! Each migration row maps to exactly one output row: receiving bank and
//! customer, ceding bank and customer, the two number columns (always
//! empty) and `month_up`, the migration date one calendar month later.
//! An unparsable migration date leaves `month_up` empty and is counted.

use crate::{
    config::PipelineConfig,
    error::{LgdError, LgdResult},
    event::PipelineEvent,
    step::PipelineStep,
    tabular::{Row, Table, TabularStore},
    temporal::{shift_months, DatePattern},
};

pub const MIGRATIONS: &str = "racc_inc.migrations";
pub const OUT: &str = "racc_inc.out";

const INPUTS: &[&str] = &[MIGRATIONS];
const OUTPUTS: &[&str] = &[OUT];

const MIGRATION_COLUMNS: [&str; 5] = ["cd_isti_ced", "ndg_ced", "cd_isti_ric", "ndg_ric", "data_migraz"];

const OUT_COLUMNS: [&str; 7] = [
    "ist_ric_inc",
    "ndg_ric_inc",
    "num_ric_inc",
    "ist_ced_inc",
    "ndg_ced_inc",
    "num_ced_inc",
    "month_up",
];

pub struct RaccIncStep {
    /// Pattern of `data_migraz`, also used for `month_up`.
    pattern: DatePattern,
}

impl RaccIncStep {
    pub fn new(config: &PipelineConfig) -> LgdResult<Self> {
        Ok(Self { pattern: config.common_pattern()? })
    }

    /// `None` for an absent date; a `Format` error when the date does not
    /// parse or the shift leaves the calendar.
    fn month_up(&self, raw: Option<&str>) -> LgdResult<Option<String>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let date = self.pattern.parse(raw)?;
        let shifted = shift_months(date, 1).ok_or_else(|| LgdError::format(raw, self.pattern.as_str()))?;
        Ok(Some(self.pattern.format(shifted)))
    }

    fn link(&self, row: &Row, degraded: &mut u64) -> Vec<Option<String>> {
        let text = |c: &str| row.get(c).map(str::to_string);
        let month_up = match self.month_up(row.get("data_migraz")) {
            Ok(month) => month,
            Err(e) => {
                log::debug!("racc_inc: {e}");
                *degraded += 1;
                None
            }
        };
        vec![
            text("cd_isti_ric"),
            text("ndg_ric"),
            None,
            text("cd_isti_ced"),
            text("ndg_ced"),
            None,
            month_up,
        ]
    }
}

impl PipelineStep for RaccIncStep {
    fn name(&self) -> &'static str {
        "racc_inc"
    }

    fn streams(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (INPUTS, OUTPUTS)
    }

    fn run(&mut self, store: &mut dyn TabularStore) -> LgdResult<Vec<PipelineEvent>> {
        let required: Vec<String> = MIGRATION_COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows = store.read(MIGRATIONS, &required)?;

        let mut events = vec![PipelineEvent::StreamRead {
            stream: MIGRATIONS.into(),
            rows:   rows.len() as u64,
        }];

        let mut degraded = 0;
        let mut out = Table::new(OUT_COLUMNS.iter().map(|c| c.to_string()).collect());
        for row in &rows {
            out.push(self.link(row, &mut degraded));
        }
        if degraded > 0 {
            log::warn!("racc_inc: {degraded} migration dates could not be parsed");
            events.push(PipelineEvent::FieldsDegraded { stream: MIGRATIONS.into(), fields: degraded });
        }

        store.write(OUT, &out)?;
        events.push(PipelineEvent::StreamWritten { stream: OUT.into(), rows: out.len() as u64 });
        Ok(events)
    }
}
