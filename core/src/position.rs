//! Position records — one credit exposure snapshot row per default cycle.
//!
//! A `PositionSchema` declares, per input stream, which column carries each
//! semantic field and which pattern its dates use. The schema is compiled
//! once into a `PositionCodec`; rows are decoded into strongly typed
//! `PositionRecord`s at ingestion and encoded back only at egress.
//!
//! Dates inside a record are `Option<NaiveDate>`. No sentinel string is
//! ever stored in a record.

use crate::{
    error::LgdResult,
    reconciliation::JoinKey,
    tabular::Row,
    temporal::DatePattern,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Schema ─────────────────────────────────────────────────────────

/// Column names for each semantic field. Optional fields a stream does
/// not carry are left out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionColumns {
    pub bank_code:              String,
    pub customer_id:            String,
    pub default_start_date:     String,
    #[serde(default)]
    pub default_end_date:       Option<String>,
    #[serde(default)]
    pub past_due_start_date:    Option<String>,
    #[serde(default)]
    pub workout_start_date:     Option<String>,
    #[serde(default)]
    pub restructure_start_date: Option<String>,
    #[serde(default)]
    pub npl_start_date:         Option<String>,
    #[serde(default)]
    pub total_granted:          Option<String>,
    #[serde(default)]
    pub total_utilized:         Option<String>,
    #[serde(default)]
    pub legal_nature_segment:   Option<String>,
    #[serde(default)]
    pub segment:                Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSchema {
    /// Stream name used in error messages and events.
    pub stream:       String,
    pub columns:      PositionColumns,
    /// Pattern of every date column in this stream.
    pub date_pattern: String,
    /// First year of the window two-digit years resolve into. Absent keeps
    /// the fixed 1969..=2068 window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub century_start: Option<i32>,
    /// Extra columns carried through untouched to the reconciliation outputs.
    #[serde(default)]
    pub passthrough:  Vec<String>,
}

/// Semantic date fields, in the order they are declared on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateField {
    DefaultStart,
    DefaultEnd,
    PastDueStart,
    WorkoutStart,
    RestructureStart,
    NplStart,
}

impl PositionSchema {
    pub fn compile_pattern(&self) -> LgdResult<DatePattern> {
        let pattern = DatePattern::new(&self.date_pattern)?;
        Ok(match self.century_start {
            Some(start) => pattern.with_century_start(start),
            None => pattern,
        })
    }

    /// Every column the stream must declare, mapped fields first.
    pub fn declared_columns(&self) -> Vec<String> {
        let c = &self.columns;
        let mut cols = vec![
            c.bank_code.clone(),
            c.customer_id.clone(),
            c.default_start_date.clone(),
        ];
        cols.extend(
            [
                &c.default_end_date,
                &c.past_due_start_date,
                &c.workout_start_date,
                &c.restructure_start_date,
                &c.npl_start_date,
                &c.total_granted,
                &c.total_utilized,
                &c.legal_nature_segment,
                &c.segment,
            ]
            .into_iter()
            .flatten()
            .cloned(),
        );
        cols.extend(self.passthrough.iter().cloned());
        cols
    }

    fn date_column(&self, field: DateField) -> Option<&str> {
        let c = &self.columns;
        match field {
            DateField::DefaultStart     => Some(c.default_start_date.as_str()),
            DateField::DefaultEnd       => c.default_end_date.as_deref(),
            DateField::PastDueStart     => c.past_due_start_date.as_deref(),
            DateField::WorkoutStart     => c.workout_start_date.as_deref(),
            DateField::RestructureStart => c.restructure_start_date.as_deref(),
            DateField::NplStart         => c.npl_start_date.as_deref(),
        }
    }
}

// ── Record ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub bank_code:              Option<String>,
    pub customer_id:            Option<String>,
    pub default_start_date:     Option<NaiveDate>,
    pub default_end_date:       Option<NaiveDate>,
    pub past_due_start_date:    Option<NaiveDate>,
    pub workout_start_date:     Option<NaiveDate>,
    pub restructure_start_date: Option<NaiveDate>,
    pub npl_start_date:         Option<NaiveDate>,
    pub total_granted:          Option<f64>,
    pub total_utilized:         Option<f64>,
    pub legal_nature_segment:   Option<String>,
    pub segment:                Option<String>,
    /// Passthrough columns in schema order.
    pub extra:                  Vec<(String, Option<String>)>,
}

impl PositionRecord {
    /// The three-part join key, or `None` when any part is missing.
    /// The date is rendered in `pattern` so both sides compare as strings.
    pub fn join_key(&self, pattern: &DatePattern) -> Option<JoinKey> {
        let bank_code = self.bank_code.as_ref().filter(|s| !s.is_empty())?;
        let customer_id = self.customer_id.as_ref().filter(|s| !s.is_empty())?;
        let start = self.default_start_date?;
        Some(JoinKey {
            bank_code:          bank_code.clone(),
            customer_id:        customer_id.clone(),
            default_start_date: pattern.format(start),
        })
    }

    pub fn date(&self, field: DateField) -> Option<NaiveDate> {
        match field {
            DateField::DefaultStart     => self.default_start_date,
            DateField::DefaultEnd       => self.default_end_date,
            DateField::PastDueStart     => self.past_due_start_date,
            DateField::WorkoutStart     => self.workout_start_date,
            DateField::RestructureStart => self.restructure_start_date,
            DateField::NplStart         => self.npl_start_date,
        }
    }

    fn date_mut(&mut self, field: DateField) -> &mut Option<NaiveDate> {
        match field {
            DateField::DefaultStart     => &mut self.default_start_date,
            DateField::DefaultEnd       => &mut self.default_end_date,
            DateField::PastDueStart     => &mut self.past_due_start_date,
            DateField::WorkoutStart     => &mut self.workout_start_date,
            DateField::RestructureStart => &mut self.restructure_start_date,
            DateField::NplStart         => &mut self.npl_start_date,
        }
    }
}

// ── Codec ──────────────────────────────────────────────────────────

const DATE_FIELDS: [DateField; 6] = [
    DateField::DefaultStart,
    DateField::DefaultEnd,
    DateField::PastDueStart,
    DateField::WorkoutStart,
    DateField::RestructureStart,
    DateField::NplStart,
];

/// Per-stream counters collected while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub rows:            u64,
    /// Optional dates or amounts that failed to parse and became absent.
    pub degraded_fields: u64,
    /// Rows whose default-start date failed to parse.
    pub bad_key_dates:   u64,
}

/// A compiled `PositionSchema`.
pub struct PositionCodec {
    schema:  PositionSchema,
    pattern: DatePattern,
}

impl PositionCodec {
    pub fn new(schema: PositionSchema) -> LgdResult<Self> {
        let pattern = schema.compile_pattern()?;
        Ok(Self { schema, pattern })
    }

    pub fn schema(&self) -> &PositionSchema {
        &self.schema
    }

    pub fn date_pattern(&self) -> &DatePattern {
        &self.pattern
    }

    pub fn decode_all(&self, rows: &[Row]) -> (Vec<PositionRecord>, DecodeStats) {
        let mut stats = DecodeStats::default();
        let records = rows.iter().map(|r| self.decode(r, &mut stats)).collect();
        if stats.degraded_fields > 0 || stats.bad_key_dates > 0 {
            log::warn!(
                "{}: {} unparsable optional fields treated as absent, {} unparsable key dates",
                self.schema.stream,
                stats.degraded_fields,
                stats.bad_key_dates
            );
        }
        (records, stats)
    }

    /// Decode one row. Unparsable optional values degrade to absent; an
    /// unparsable default-start date leaves the record without a join key.
    pub fn decode(&self, row: &Row, stats: &mut DecodeStats) -> PositionRecord {
        stats.rows += 1;
        let c = &self.schema.columns;
        let text = |col: &Option<String>| col.as_deref().and_then(|name| row.get(name)).map(str::to_string);

        let mut record = PositionRecord {
            bank_code:            row.get(&c.bank_code).map(str::to_string),
            customer_id:          row.get(&c.customer_id).map(str::to_string),
            legal_nature_segment: text(&c.legal_nature_segment),
            segment:              text(&c.segment),
            extra: self
                .schema
                .passthrough
                .iter()
                .map(|name| (name.clone(), row.get(name).map(str::to_string)))
                .collect(),
            ..Default::default()
        };

        for field in DATE_FIELDS {
            let Some(raw) = self.schema.date_column(field).and_then(|col| row.get(col)) else {
                continue;
            };
            match self.pattern.parse(raw) {
                Ok(date) => *record.date_mut(field) = Some(date),
                Err(e) if field == DateField::DefaultStart => {
                    log::debug!("{}: {e}; record is unjoinable", self.schema.stream);
                    stats.bad_key_dates += 1;
                }
                Err(e) => {
                    log::debug!("{}: {e}; field treated as absent", self.schema.stream);
                    stats.degraded_fields += 1;
                }
            }
        }

        record.total_granted = self.amount(row, &c.total_granted, stats);
        record.total_utilized = self.amount(row, &c.total_utilized, stats);
        record
    }

    fn amount(&self, row: &Row, column: &Option<String>, stats: &mut DecodeStats) -> Option<f64> {
        let raw = column.as_deref().and_then(|name| row.get(name))?;
        match parse_amount(raw) {
            Some(v) => Some(v),
            None => {
                log::debug!("{}: amount '{raw}' is not numeric; treated as absent", self.schema.stream);
                stats.degraded_fields += 1;
                None
            }
        }
    }

    /// Values for `declared_columns()`, dates rendered in `out`.
    pub fn encode(&self, record: &PositionRecord, out: &DatePattern) -> Vec<Option<String>> {
        let c = &self.schema.columns;
        let date = |d: Option<NaiveDate>| d.map(|d| out.format(d));

        let mut values = vec![
            record.bank_code.clone(),
            record.customer_id.clone(),
            date(record.default_start_date),
        ];
        let optional: [(&Option<String>, Option<String>); 9] = [
            (&c.default_end_date, date(record.default_end_date)),
            (&c.past_due_start_date, date(record.past_due_start_date)),
            (&c.workout_start_date, date(record.workout_start_date)),
            (&c.restructure_start_date, date(record.restructure_start_date)),
            (&c.npl_start_date, date(record.npl_start_date)),
            (&c.total_granted, record.total_granted.map(format_amount)),
            (&c.total_utilized, record.total_utilized.map(format_amount)),
            (&c.legal_nature_segment, record.legal_nature_segment.clone()),
            (&c.segment, record.segment.clone()),
        ];
        values.extend(
            optional
                .into_iter()
                .filter(|(col, _)| col.is_some())
                .map(|(_, v)| v),
        );
        values.extend(self.schema.passthrough.iter().map(|name| {
            record
                .extra
                .iter()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.clone())
        }));
        values
    }

    /// Width of an encoded row, used to pad the missing side of a join.
    pub fn width(&self) -> usize {
        self.schema.declared_columns().len()
    }
}

/// Amounts may use a decimal comma.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

pub fn format_amount(v: f64) -> String {
    v.to_string()
}
