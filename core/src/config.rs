//! Pipeline configuration — one immutable value, loaded once, passed by
//! reference into every step at construction.
//!
//! `validate()` compiles every pattern and parses every literal date up
//! front, so a bad configuration fails before any record is read.

use crate::{
    error::{LgdError, LgdResult},
    position::{PositionColumns, PositionSchema},
    reconciliation::{AbsentDates, ConflictRule},
    temporal::{BoundInclusivity, DatePattern, DateWindow, TieBreak},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub lower:       String,
    pub upper:       String,
    pub pattern:     String,
    #[serde(default)]
    pub inclusivity: BoundInclusivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Legacy rows are kept only when their default-start date is inside.
    pub legacy_window: WindowConfig,
    #[serde(default)]
    pub conflict_rule: ConflictRule,
    #[serde(default)]
    pub absent_dates:  AbsentDates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// When the npl date ties for earliest, classify as SOFF instead of
    /// falling through to PASTDUE.
    #[serde(default = "default_true")]
    pub soff_wins_ties: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSchemas {
    /// New positions extract (hadoop fposi).
    pub primary:   PositionSchema,
    /// Legacy positions extract (old fposi).
    pub legacy:    PositionSchema,
    /// Positions fed to the lifecycle classifier (fposi outdir).
    pub positions: PositionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_delimiter")]
    pub csv_delimiter:       char,
    /// Office tag (ufficio) written on every output row.
    pub office:              String,
    /// Reference date (data_a).
    pub as_of_date:          String,
    pub as_of_pattern:       String,
    /// Pattern every date is normalised into before joining.
    pub common_date_pattern: String,
    /// Pattern of the dates in the classifier detail output.
    pub report_date_pattern: String,
    /// End-date marker of a still-open default cycle, in the common pattern.
    pub open_sentinel:       String,
    #[serde(default)]
    pub tie_break:           TieBreak,
    pub reconciliation:      ReconciliationConfig,
    pub classification:      ClassificationConfig,
    pub streams:             StreamSchemas,
    /// Logical stream name → CSV path.
    #[serde(default)]
    pub paths:               BTreeMap<String, String>,
}

fn default_delimiter() -> char { ',' }
fn default_true() -> bool { true }

impl PipelineConfig {
    /// Load from a JSON file. In tests, use `PipelineConfig::default_test()`.
    ///
    /// An unreadable file, malformed JSON or a missing required key are all
    /// `Configuration` errors.
    pub fn load(path: &str) -> LgdResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LgdError::Configuration(format!("Cannot read {path}: {e}")))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| LgdError::Configuration(format!("Cannot parse {path}: {e}")))?;
        Ok(config)
    }

    pub fn with_office(mut self, office: impl Into<String>) -> Self {
        self.office = office.into();
        self
    }

    pub fn with_as_of_date(mut self, as_of_date: impl Into<String>) -> Self {
        self.as_of_date = as_of_date.into();
        self
    }

    /// Fail with `Configuration` on anything a step would trip over later.
    pub fn validate(&self) -> LgdResult<()> {
        if self.office.trim().is_empty() {
            return Err(LgdError::Configuration("office must not be empty".into()));
        }
        self.delimiter()?;
        self.common_pattern()?;
        self.report_pattern()?;
        self.as_of()?;
        self.open_sentinel_date()?;
        self.legacy_window()?;
        for schema in [&self.streams.primary, &self.streams.legacy, &self.streams.positions] {
            schema
                .compile_pattern()
                .map_err(|e| LgdError::Configuration(format!("{} date_pattern: {e}", schema.stream)))?;
        }
        Ok(())
    }

    /// Require a path for each stream in `streams`.
    pub fn validate_paths(&self, streams: &[&str]) -> LgdResult<()> {
        for stream in streams {
            match self.paths.get(*stream) {
                Some(p) if !p.trim().is_empty() => {}
                _ => {
                    return Err(LgdError::Configuration(format!(
                        "no path configured for stream '{stream}'"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn delimiter(&self) -> LgdResult<u8> {
        u8::try_from(self.csv_delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                LgdError::Configuration(format!(
                    "csv_delimiter '{}' must be a single ASCII character",
                    self.csv_delimiter
                ))
            })
    }

    pub fn common_pattern(&self) -> LgdResult<DatePattern> {
        compile("common_date_pattern", &self.common_date_pattern)
    }

    pub fn report_pattern(&self) -> LgdResult<DatePattern> {
        compile("report_date_pattern", &self.report_date_pattern)
    }

    pub fn as_of_pattern(&self) -> LgdResult<DatePattern> {
        compile("as_of_pattern", &self.as_of_pattern)
    }

    pub fn as_of(&self) -> LgdResult<NaiveDate> {
        literal("as_of_date", &self.as_of_date, &self.as_of_pattern()?)
    }

    pub fn open_sentinel_date(&self) -> LgdResult<NaiveDate> {
        literal("open_sentinel", &self.open_sentinel, &self.common_pattern()?)
    }

    pub fn legacy_window(&self) -> LgdResult<DateWindow> {
        let w = &self.reconciliation.legacy_window;
        let pattern = compile("legacy_window.pattern", &w.pattern)?;
        let window = DateWindow {
            lower:       literal("legacy_window.lower", &w.lower, &pattern)?,
            upper:       literal("legacy_window.upper", &w.upper, &pattern)?,
            inclusivity: w.inclusivity,
        };
        if window.lower > window.upper {
            return Err(LgdError::Configuration(format!(
                "legacy_window lower bound {} is after upper bound {}",
                w.lower, w.upper
            )));
        }
        Ok(window)
    }

    pub fn csv_paths(&self) -> BTreeMap<String, PathBuf> {
        self.paths
            .iter()
            .map(|(k, v)| (k.clone(), PathBuf::from(v)))
            .collect()
    }

    /// An in-code configuration mirroring the production extracts.
    pub fn default_test() -> Self {
        Self {
            csv_delimiter:       ',',
            office:              "OFF_TEST".into(),
            as_of_date:          "20201231".into(),
            as_of_pattern:       "yyyyMMdd".into(),
            common_date_pattern: "yyyyMMdd".into(),
            report_date_pattern: "yyyy-MM-dd".into(),
            open_sentinel:       "99991231".into(),
            tie_break:           TieBreak::Second,
            reconciliation: ReconciliationConfig {
                legacy_window: WindowConfig {
                    lower:       "20070131".into(),
                    upper:       "20071231".into(),
                    pattern:     "yyyyMMdd".into(),
                    inclusivity: BoundInclusivity::Inclusive,
                },
                conflict_rule: ConflictRule::AnyDiffers,
                absent_dates:  AbsentDates::NeverDiffer,
            },
            classification: ClassificationConfig { soff_wins_ties: true },
            streams: StreamSchemas {
                primary:   primary_schema(),
                legacy:    legacy_schema(),
                positions: positions_schema(),
            },
            paths: BTreeMap::new(),
        }
    }
}

fn compile(what: &str, pattern: &str) -> LgdResult<DatePattern> {
    DatePattern::new(pattern).map_err(|e| LgdError::Configuration(format!("{what}: {e}")))
}

fn literal(what: &str, value: &str, pattern: &DatePattern) -> LgdResult<NaiveDate> {
    pattern
        .parse(value)
        .map_err(|e| LgdError::Configuration(format!("{what}: {e}")))
}

fn primary_schema() -> PositionSchema {
    PositionSchema {
        stream: "hadoop_fposi".into(),
        columns: PositionColumns {
            bank_code:              "codicebanca".into(),
            customer_id:            "ndgprincipale".into(),
            default_start_date:     "datainiziodef".into(),
            default_end_date:       Some("datafinedef".into()),
            past_due_start_date:    Some("datainiziopd".into()),
            workout_start_date:     Some("datainizioinc".into()),
            restructure_start_date: None,
            npl_start_date:         Some("datainiziosoff".into()),
            total_granted:          None,
            total_utilized:         None,
            legal_nature_segment:   None,
            segment:                None,
        },
        date_pattern:  "yyyyMMdd".into(),
        century_start: None,
        passthrough:   vec![],
    }
}

fn legacy_schema() -> PositionSchema {
    PositionSchema {
        stream: "old_fposi".into(),
        columns: PositionColumns {
            bank_code:              "codicebanca".into(),
            customer_id:            "ndgprincipale".into(),
            default_start_date:     "datainizioDEF".into(),
            default_end_date:       Some("dataFINEDEF".into()),
            past_due_start_date:    Some("dataINIZIOPD".into()),
            workout_start_date:     Some("datainizioinc".into()),
            restructure_start_date: None,
            npl_start_date:         Some("dataSOFFERENZA".into()),
            total_granted:          None,
            total_utilized:         None,
            legal_nature_segment:   None,
            segment:                None,
        },
        date_pattern:  "yy-MM-dd".into(),
        century_start: Some(1940),
        passthrough:   vec!["flagincristrut".into(), "cumulo".into()],
    }
}

fn positions_schema() -> PositionSchema {
    PositionSchema {
        stream: "fposi_outdir".into(),
        columns: PositionColumns {
            bank_code:              "codicebanca".into(),
            customer_id:            "ndgprincipale".into(),
            default_start_date:     "datainiziodef".into(),
            default_end_date:       Some("datafinedef".into()),
            past_due_start_date:    Some("datainiziopd".into()),
            workout_start_date:     Some("datainizioinc".into()),
            restructure_start_date: Some("datainizioristrutt".into()),
            npl_start_date:         Some("datasofferenza".into()),
            total_granted:          Some("totaccordatodatdef".into()),
            total_utilized:         Some("totutilizzdatdef".into()),
            legal_nature_segment:   Some("naturagiuridica_segm".into()),
            segment:                Some("segmento".into()),
        },
        date_pattern:  "yyyyMMdd".into(),
        century_start: None,
        passthrough:   vec![],
    }
}
