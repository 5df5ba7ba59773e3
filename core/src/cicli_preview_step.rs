//! CicliPreview step — classifies every default cycle and produces the
//! preview detail and its monthly summary.
//!
//! Execution order: slot 2.
//!
//! Design:
//!   - Detail: one row per input position, in input order, with the four
//!     lifecycle fields and the granted/utilized totals of its
//!     (bank, customer, default-start) partition broadcast onto it.
//!   - Summary: one row per distinct combination of office, reference
//!     date, flag, bank, segment, opening month, closing month, status and
//!     sofferenza cycle, with its row count and sums. Rows come out in key
//!     order.
//!   - Detail dates use the report pattern. Months are `yyyyMM`.

use crate::{
    aggregation::{broadcast, summarize, AggregatedRecord},
    classification::{
        CicloSoff, ClassifiedRecord, FlagAperto, LifecycleClassifier, SegmentCalc, StatoAnagrafico,
    },
    config::PipelineConfig,
    error::LgdResult,
    event::PipelineEvent,
    position::{format_amount, PositionCodec},
    step::PipelineStep,
    tabular::{Table, TabularStore},
    temporal::{month_prefix, DatePattern},
    types::{BankCode, CustomerId, Office},
};
use chrono::NaiveDate;

pub const POSITIONS: &str = "cicli_preview.positions";
pub const DETAIL: &str = "cicli_preview.detail";
pub const SUMMARY: &str = "cicli_preview.summary";

const INPUTS: &[&str] = &[POSITIONS];
const OUTPUTS: &[&str] = &[DETAIL, SUMMARY];

const DETAIL_COLUMNS: [&str; 16] = [
    "ufficio",
    "codicebanca",
    "datarif",
    "ndgprincipale",
    "datainiziodef",
    "datafinedef",
    "datainiziopd",
    "datainizioinc",
    "datainizioristrutt",
    "datasofferenza",
    "totaccordatodatdef",
    "totutilizzdatdef",
    "segmento_calc",
    "ciclo_soff",
    "stato_anagrafico",
    "flag_aperto",
];

const SUMMARY_COLUMNS: [&str; 12] = [
    "ufficio",
    "datarif",
    "flag_aperto",
    "codicebanca",
    "segmento_calc",
    "mese_apertura",
    "mese_chiusura",
    "stato_anagrafico",
    "ciclo_soff",
    "row_count",
    "totaccordatodatdef",
    "totutilizzdatdef",
];

/// Grouping key of the summary output. Field order is the sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SummaryKey {
    pub office:           Office,
    pub as_of:            String,
    pub flag_aperto:      FlagAperto,
    pub bank_code:        Option<BankCode>,
    pub segment_calc:     SegmentCalc,
    pub month_opened:     Option<String>,
    pub month_closed:     Option<String>,
    pub stato_anagrafico: StatoAnagrafico,
    pub ciclo_soff:       CicloSoff,
}

type CycleKey = (Option<BankCode>, Option<CustomerId>, Option<NaiveDate>);

pub struct CicliPreviewStep {
    office:     Office,
    /// Reference date as configured, written verbatim as `datarif`.
    as_of:      String,
    codec:      PositionCodec,
    classifier: LifecycleClassifier,
    report:     DatePattern,
}

impl CicliPreviewStep {
    pub fn new(config: &PipelineConfig) -> LgdResult<Self> {
        Ok(Self {
            office:     config.office.clone(),
            as_of:      config.as_of_date.clone(),
            codec:      PositionCodec::new(config.streams.positions.clone())?,
            classifier: LifecycleClassifier::new(
                config.as_of()?,
                config.classification.soff_wins_ties,
            ),
            report:     config.report_pattern()?,
        })
    }

    fn summary_key(&self, c: &ClassifiedRecord) -> SummaryKey {
        SummaryKey {
            office:           self.office.clone(),
            as_of:            self.as_of.clone(),
            flag_aperto:      c.lifecycle.flag_aperto,
            bank_code:        c.position.bank_code.clone(),
            segment_calc:     c.lifecycle.segment_calc,
            month_opened:     c.position.default_start_date.map(month_prefix),
            month_closed:     c.position.default_end_date.map(month_prefix),
            stato_anagrafico: c.lifecycle.stato_anagrafico,
            ciclo_soff:       c.lifecycle.ciclo_soff,
        }
    }

    fn detail_row(&self, a: &AggregatedRecord<ClassifiedRecord>) -> Vec<Option<String>> {
        let p = &a.record.position;
        let l = &a.record.lifecycle;
        let date = |d: Option<NaiveDate>| d.map(|d| self.report.format(d));
        vec![
            Some(self.office.clone()),
            p.bank_code.clone(),
            Some(self.as_of.clone()),
            p.customer_id.clone(),
            date(p.default_start_date),
            date(p.default_end_date),
            date(p.past_due_start_date),
            date(p.workout_start_date),
            date(p.restructure_start_date),
            date(p.npl_start_date),
            a.totals.total_granted_sum.map(format_amount),
            a.totals.total_utilized_sum.map(format_amount),
            Some(l.segment_calc.as_str().to_string()),
            Some(l.ciclo_soff.as_str().to_string()),
            Some(l.stato_anagrafico.as_str().to_string()),
            Some(l.flag_aperto.as_str().to_string()),
        ]
    }
}

fn cycle_key(c: &ClassifiedRecord) -> CycleKey {
    (
        c.position.bank_code.clone(),
        c.position.customer_id.clone(),
        c.position.default_start_date,
    )
}

fn header<const N: usize>(columns: [&str; N]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

impl PipelineStep for CicliPreviewStep {
    fn name(&self) -> &'static str {
        "cicli_preview"
    }

    fn streams(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (INPUTS, OUTPUTS)
    }

    fn run(&mut self, store: &mut dyn TabularStore) -> LgdResult<Vec<PipelineEvent>> {
        let mut events = Vec::new();

        let rows = store.read(POSITIONS, &self.codec.schema().declared_columns())?;
        let (positions, stats) = self.codec.decode_all(&rows);
        events.push(PipelineEvent::StreamRead { stream: POSITIONS.into(), rows: stats.rows });
        let degraded = stats.degraded_fields + stats.bad_key_dates;
        if degraded > 0 {
            events.push(PipelineEvent::FieldsDegraded { stream: POSITIONS.into(), fields: degraded });
        }

        let classified: Vec<ClassifiedRecord> = positions
            .into_iter()
            .map(|p| self.classifier.classify(p))
            .collect();

        let summary = summarize(&classified, |c| self.summary_key(c));
        let detail = broadcast(classified, cycle_key);

        let mut detail_table = Table::new(header(DETAIL_COLUMNS));
        for a in &detail {
            detail_table.push(self.detail_row(a));
        }

        let mut summary_table = Table::new(header(SUMMARY_COLUMNS));
        for row in &summary {
            let k = &row.key;
            summary_table.push(vec![
                Some(k.office.clone()),
                Some(k.as_of.clone()),
                Some(k.flag_aperto.as_str().to_string()),
                k.bank_code.clone(),
                Some(k.segment_calc.as_str().to_string()),
                k.month_opened.clone(),
                k.month_closed.clone(),
                Some(k.stato_anagrafico.as_str().to_string()),
                Some(k.ciclo_soff.as_str().to_string()),
                Some(row.totals.row_count.to_string()),
                row.totals.total_granted_sum.map(format_amount),
                row.totals.total_utilized_sum.map(format_amount),
            ]);
        }

        for (stream, table) in [(DETAIL, &detail_table), (SUMMARY, &summary_table)] {
            store.write(stream, table)?;
            events.push(PipelineEvent::StreamWritten { stream: stream.into(), rows: table.len() as u64 });
        }

        log::info!(
            "cicli_preview: {} cycles classified into {} summary rows",
            detail_table.len(),
            summary_table.len()
        );
        Ok(events)
    }
}
