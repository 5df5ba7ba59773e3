//! FrappPuma step — links guarantee rows to the default cycles they cover.
//!
//! Execution order: slot 4.
//!
//! Design:
//!   - Principal cycles (no link code) match guarantees of the same bank
//!     and linked customer whose reference date is on or after the cycle
//!     start and whose reference month is no later than the month of
//!     least(cycle end − 1 month, reference date of the run).
//!   - Linked cycles (link code present) match guarantees of the same
//!     bank, linked customer and exact reference date.
//!   - The union of both is de-duplicated and written in sorted order.
//!   - Any absent or unparsable value in a comparison means no match.

use crate::{
    config::PipelineConfig,
    error::LgdResult,
    event::PipelineEvent,
    step::PipelineStep,
    tabular::{Row, Table, TabularStore},
    temporal::{least_date, month_prefix, shift_months, DatePattern, TieBreak},
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

pub const CYCLES: &str = "frapp_puma.cycles";
pub const GUARANTEES: &str = "frapp_puma.guarantees";
pub const OUT: &str = "frapp_puma.out";

const INPUTS: &[&str] = &[CYCLES, GUARANTEES];
const OUTPUTS: &[&str] = &[OUT];

const CYCLE_COLUMNS: [&str; 8] = [
    "codicebanca",
    "ndgprincipale",
    "datainiziodef",
    "datafinedef",
    "codicebanca_collegato",
    "ndg_collegato",
    "cd_collegamento",
    "dt_rif_udct",
];

const GUARANTEE_COLUMNS: [&str; 9] = [
    "cd_istituto",
    "ndg",
    "sportello",
    "dt_riferimento",
    "conto_esteso",
    "cd_puma2",
    "ide_garanzia",
    "importo",
    "fair_value",
];

const CYCLE_OUT_COLUMNS: [&str; 3] = ["codicebanca", "ndgprincipale", "datainiziodef"];

pub struct FrappPumaStep {
    pattern: DatePattern,
    as_of:   NaiveDate,
    tie:     TieBreak,
}

struct CycleWindow {
    start:      Option<NaiveDate>,
    /// Last month a guarantee may fall in, as `yyyyMM`.
    last_month: Option<String>,
}

impl FrappPumaStep {
    pub fn new(config: &PipelineConfig) -> LgdResult<Self> {
        Ok(Self {
            pattern: config.common_pattern()?,
            as_of:   config.as_of()?,
            tie:     config.tie_break,
        })
    }

    fn date(&self, raw: Option<&str>) -> Option<NaiveDate> {
        raw.and_then(|r| self.pattern.parse(r).ok())
    }

    fn window(&self, row: &Row) -> CycleWindow {
        let last_month = self
            .date(row.get("datafinedef"))
            .and_then(|end| shift_months(end, -1))
            .map(|d| month_prefix(least_date(d, self.as_of, self.tie)));
        CycleWindow {
            start: self.date(row.get("datainiziodef")),
            last_month,
        }
    }

    fn covers(&self, cycle: &CycleWindow, guarantee: &Row) -> bool {
        let (Some(start), Some(last)) = (cycle.start, cycle.last_month.as_deref()) else {
            return false;
        };
        match self.date(guarantee.get("dt_riferimento")) {
            Some(reference) => reference >= start && month_prefix(reference).as_str() <= last,
            None => false,
        }
    }
}

fn output_row(guarantee: &Row, cycle: &Row) -> Vec<Option<String>> {
    let mut row: Vec<Option<String>> = vec![guarantee.get("cd_istituto").map(str::to_string)];
    row.extend(GUARANTEE_COLUMNS.iter().skip(1).map(|c| guarantee.get(c).map(str::to_string)));
    row.extend(CYCLE_OUT_COLUMNS.iter().map(|c| cycle.get(c).map(str::to_string)));
    row
}

fn key(row: &Row, bank: &str, customer: &str) -> Option<(String, String)> {
    Some((row.get(bank)?.to_string(), row.get(customer)?.to_string()))
}

fn names<const N: usize>(columns: [&str; N]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

impl PipelineStep for FrappPumaStep {
    fn name(&self) -> &'static str {
        "frapp_puma"
    }

    fn streams(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (INPUTS, OUTPUTS)
    }

    fn run(&mut self, store: &mut dyn TabularStore) -> LgdResult<Vec<PipelineEvent>> {
        let cycles = store.read(CYCLES, &names(CYCLE_COLUMNS))?;
        let guarantees = store.read(GUARANTEES, &names(GUARANTEE_COLUMNS))?;

        let mut events = vec![
            PipelineEvent::StreamRead { stream: CYCLES.into(), rows: cycles.len() as u64 },
            PipelineEvent::StreamRead { stream: GUARANTEES.into(), rows: guarantees.len() as u64 },
        ];

        let mut by_customer: BTreeMap<(String, String), Vec<&Row>> = BTreeMap::new();
        let mut unjoinable = 0u64;
        for g in &guarantees {
            match key(g, "cd_istituto", "ndg") {
                Some(k) => by_customer.entry(k).or_default().push(g),
                None => unjoinable += 1,
            }
        }
        if unjoinable > 0 {
            events.push(PipelineEvent::RecordsUnjoinable { stream: GUARANTEES.into(), count: unjoinable });
        }

        let mut linked: BTreeSet<Vec<Option<String>>> = BTreeSet::new();
        let mut unjoinable_cycles = 0u64;
        for row in &cycles {
            let Some(k) = key(row, "codicebanca_collegato", "ndg_collegato") else {
                unjoinable_cycles += 1;
                continue;
            };
            let Some(candidates) = by_customer.get(&k) else {
                continue;
            };

            if row.get("cd_collegamento").is_none() {
                let cycle = self.window(row);
                linked.extend(
                    candidates
                        .iter()
                        .filter(|g| self.covers(&cycle, g))
                        .map(|g| output_row(g, row)),
                );
            } else if let Some(udct) = row.get("dt_rif_udct") {
                linked.extend(
                    candidates
                        .iter()
                        .filter(|g| g.get("dt_riferimento") == Some(udct))
                        .map(|g| output_row(g, row)),
                );
            }
        }
        if unjoinable_cycles > 0 {
            events.push(PipelineEvent::RecordsUnjoinable { stream: CYCLES.into(), count: unjoinable_cycles });
        }

        let mut header = vec!["cd_isti".to_string()];
        header.extend(GUARANTEE_COLUMNS.iter().skip(1).map(|c| c.to_string()));
        header.extend(CYCLE_OUT_COLUMNS.iter().map(|c| c.to_string()));

        let mut out = Table::new(header);
        for row in linked {
            out.push(row);
        }
        store.write(OUT, &out)?;
        events.push(PipelineEvent::StreamWritten { stream: OUT.into(), rows: out.len() as u64 });

        log::info!("frapp_puma: {} guarantee links from {} cycles", out.len(), cycles.len());
        Ok(events)
    }
}
