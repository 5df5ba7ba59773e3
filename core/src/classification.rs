//! Lifecycle classifier — derives segment, sofferenza cycle, anagraphic
//! status and open/closed flag for each position.
//!
//! A pure per-record function of the position and the reference date.
//! Safe to evaluate in any order, on any thread.
//!
//! STATUS CASCADE (fixed, never reordered):
//!   1. no distress date at all         → PASTDUE
//!   2. past-due start strictly earliest → PASTDUE
//!   3. workout start strictly earliest  → INCA
//!   4. restructure start strictly earliest → RISTR
//!   5. npl start earliest               → SOFF (ties go to SOFF when configured)
//!   6. otherwise                        → PASTDUE
//!
//! "Earliest" compares against the other three dates; an absent date
//! never wins, it ranks after every present one.

use crate::position::PositionRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegmentCalc {
    #[serde(rename = "IM")]
    Im,
    #[serde(rename = "PR")]
    Pr,
    #[serde(rename = "AL")]
    Al,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CicloSoff {
    S,
    N,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatoAnagrafico {
    PastDue,
    Inca,
    Ristr,
    Soff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlagAperto {
    A,
    C,
}

impl SegmentCalc {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Im => "IM",
            Self::Pr => "PR",
            Self::Al => "AL",
        }
    }
}

impl CicloSoff {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S => "S",
            Self::N => "N",
        }
    }
}

impl StatoAnagrafico {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PastDue => "PASTDUE",
            Self::Inca    => "INCA",
            Self::Ristr   => "RISTR",
            Self::Soff    => "SOFF",
        }
    }
}

impl FlagAperto {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::C => "C",
        }
    }
}

/// The four derived fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub segment_calc:     SegmentCalc,
    pub ciclo_soff:       CicloSoff,
    pub stato_anagrafico: StatoAnagrafico,
    pub flag_aperto:      FlagAperto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub position:  PositionRecord,
    pub lifecycle: Lifecycle,
}

const RETAIL_SEGMENTS: [&str; 4] = ["01", "02", "03", "21"];

pub struct LifecycleClassifier {
    as_of:          NaiveDate,
    soff_wins_ties: bool,
}

impl LifecycleClassifier {
    pub fn new(as_of: NaiveDate, soff_wins_ties: bool) -> Self {
        Self { as_of, soff_wins_ties }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn classify(&self, position: PositionRecord) -> ClassifiedRecord {
        let lifecycle = self.lifecycle(&position);
        ClassifiedRecord { position, lifecycle }
    }

    pub fn lifecycle(&self, p: &PositionRecord) -> Lifecycle {
        Lifecycle {
            segment_calc:     segment_calc(p.legal_nature_segment.as_deref(), p.segment.as_deref()),
            ciclo_soff:       ciclo_soff(p.npl_start_date),
            stato_anagrafico: stato_anagrafico(
                p.past_due_start_date,
                p.workout_start_date,
                p.restructure_start_date,
                p.npl_start_date,
                self.soff_wins_ties,
            ),
            flag_aperto:      flag_aperto(p.default_end_date, self.as_of),
        }
    }
}

/// An absent legal nature never qualifies for IM.
pub fn segment_calc(legal_nature_segment: Option<&str>, segment: Option<&str>) -> SegmentCalc {
    let not_co = legal_nature_segment.is_some_and(|n| n != "CO");
    match segment {
        Some(s) if not_co && RETAIL_SEGMENTS.contains(&s) => SegmentCalc::Im,
        Some("10") => SegmentCalc::Pr,
        _ => SegmentCalc::Al,
    }
}

pub fn ciclo_soff(npl_start_date: Option<NaiveDate>) -> CicloSoff {
    if npl_start_date.is_some() { CicloSoff::S } else { CicloSoff::N }
}

pub fn stato_anagrafico(
    past_due: Option<NaiveDate>,
    workout: Option<NaiveDate>,
    restructure: Option<NaiveDate>,
    npl: Option<NaiveDate>,
    soff_wins_ties: bool,
) -> StatoAnagrafico {
    if past_due.is_none() && workout.is_none() && restructure.is_none() && npl.is_none() {
        return StatoAnagrafico::PastDue;
    }
    if strictly_earliest(past_due, [workout, restructure, npl]) {
        return StatoAnagrafico::PastDue;
    }
    if strictly_earliest(workout, [past_due, restructure, npl]) {
        return StatoAnagrafico::Inca;
    }
    if strictly_earliest(restructure, [past_due, workout, npl]) {
        return StatoAnagrafico::Ristr;
    }
    let soff = if soff_wins_ties {
        earliest_or_tied(npl, [past_due, workout, restructure])
    } else {
        strictly_earliest(npl, [past_due, workout, restructure])
    };
    if soff {
        return StatoAnagrafico::Soff;
    }
    StatoAnagrafico::PastDue
}

/// `A` only when the default end is strictly after the reference date.
pub fn flag_aperto(default_end_date: Option<NaiveDate>, as_of: NaiveDate) -> FlagAperto {
    match default_end_date {
        Some(end) if end > as_of => FlagAperto::A,
        _ => FlagAperto::C,
    }
}

fn strictly_earliest(candidate: Option<NaiveDate>, others: [Option<NaiveDate>; 3]) -> bool {
    candidate.is_some_and(|c| others.iter().all(|o| rank(c, *o) == Ordering::Less))
}

fn earliest_or_tied(candidate: Option<NaiveDate>, others: [Option<NaiveDate>; 3]) -> bool {
    candidate.is_some_and(|c| others.iter().all(|o| rank(c, *o) != Ordering::Greater))
}

/// Compare a present date against a possibly absent one; absent ranks last.
fn rank(present: NaiveDate, other: Option<NaiveDate>) -> Ordering {
    match other {
        Some(o) => present.cmp(&o),
        None => Ordering::Less,
    }
}
