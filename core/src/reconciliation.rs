//! Reconciliator — full outer equi-join of a new and a legacy position
//! stream on (bank code, customer id, default-start date).
//!
//! Design:
//!   - Keys are extracted by caller-supplied functions, so stream column
//!     naming never leaks in here. A key date must already be rendered in
//!     the common pattern; equality is plain string equality.
//!   - A record without a complete key is excluded from the join and
//!     counted per side. It is never silently dropped.
//!   - Grouping uses an ordered map, so output order is a function of the
//!     keys alone and re-running on a permuted input gives the same result.
//!   - Duplicate keys within one stream pair up as a relational join would
//!     (every new row × every legacy row) and are counted.

use crate::position::PositionRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinKey {
    pub bank_code:          String,
    pub customer_id:        String,
    pub default_start_date: String,
}

/// One result of the join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationOutcome<R> {
    NewOnly(R),
    LegacyOnly(R),
    Matched { new: R, legacy: R },
}

impl<R> ReconciliationOutcome<R> {
    pub fn is_matched(&self) -> bool {
        matches!(self, ReconciliationOutcome::Matched { .. })
    }
}

/// Records excluded because a key component was missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnjoinableCounts {
    pub primary: u64,
    pub legacy:  u64,
}

impl UnjoinableCounts {
    pub fn total(&self) -> u64 {
        self.primary + self.legacy
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation<R> {
    pub outcomes:       Vec<ReconciliationOutcome<R>>,
    pub unjoinable:     UnjoinableCounts,
    /// Keys that appeared more than once within a single stream.
    pub duplicate_keys: u64,
}

impl<R> Reconciliation<R> {
    pub fn new_only(&self) -> impl Iterator<Item = &R> {
        self.outcomes.iter().filter_map(|o| match o {
            ReconciliationOutcome::NewOnly(r) => Some(r),
            _ => None,
        })
    }

    pub fn legacy_only(&self) -> impl Iterator<Item = &R> {
        self.outcomes.iter().filter_map(|o| match o {
            ReconciliationOutcome::LegacyOnly(r) => Some(r),
            _ => None,
        })
    }

    pub fn matched(&self) -> impl Iterator<Item = (&R, &R)> {
        self.outcomes.iter().filter_map(|o| match o {
            ReconciliationOutcome::Matched { new, legacy } => Some((new, legacy)),
            _ => None,
        })
    }

    /// Split the matched pairs into (ordinary, conflicting).
    pub fn partition_matched<F>(&self, is_conflicting: F) -> (Vec<(&R, &R)>, Vec<(&R, &R)>)
    where
        F: Fn(&R, &R) -> bool,
    {
        self.matched().partition(|&(n, l)| !is_conflicting(n, l))
    }
}

pub struct Reconciliator<P, L> {
    primary_key: P,
    legacy_key:  L,
}

impl<P, L> Reconciliator<P, L> {
    pub fn new(primary_key: P, legacy_key: L) -> Self {
        Self { primary_key, legacy_key }
    }

    pub fn reconcile<R>(&self, primary: Vec<R>, legacy: Vec<R>) -> Reconciliation<R>
    where
        R: Clone,
        P: Fn(&R) -> Option<JoinKey>,
        L: Fn(&R) -> Option<JoinKey>,
    {
        let mut groups: BTreeMap<JoinKey, (Vec<R>, Vec<R>)> = BTreeMap::new();
        let mut unjoinable = UnjoinableCounts::default();

        for record in primary {
            match (self.primary_key)(&record) {
                Some(key) => groups.entry(key).or_default().0.push(record),
                None => unjoinable.primary += 1,
            }
        }
        for record in legacy {
            match (self.legacy_key)(&record) {
                Some(key) => groups.entry(key).or_default().1.push(record),
                None => unjoinable.legacy += 1,
            }
        }

        let mut outcomes = Vec::with_capacity(groups.len());
        let mut duplicate_keys = 0;

        for (key, (news, legacies)) in groups {
            duplicate_keys += u64::from(news.len() > 1) + u64::from(legacies.len() > 1);
            if news.len() > 1 || legacies.len() > 1 {
                log::warn!(
                    "duplicate join key {}/{}/{}: {} new, {} legacy",
                    key.bank_code,
                    key.customer_id,
                    key.default_start_date,
                    news.len(),
                    legacies.len()
                );
            }

            match (news.is_empty(), legacies.is_empty()) {
                (false, true) => outcomes.extend(news.into_iter().map(ReconciliationOutcome::NewOnly)),
                (true, false) => outcomes.extend(legacies.into_iter().map(ReconciliationOutcome::LegacyOnly)),
                (false, false) => {
                    for new in &news {
                        for legacy in &legacies {
                            outcomes.push(ReconciliationOutcome::Matched {
                                new:    new.clone(),
                                legacy: legacy.clone(),
                            });
                        }
                    }
                }
                (true, true) => {}
            }
        }

        if unjoinable.total() > 0 {
            log::warn!(
                "excluded from join: {} new and {} legacy records without a complete key",
                unjoinable.primary,
                unjoinable.legacy
            );
        }

        Reconciliation { outcomes, unjoinable, duplicate_keys }
    }
}

// ── Conflicting matches ────────────────────────────────────────────

/// How many of the distress dates must differ for a match to conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    /// At least one of past-due / workout / npl start differs.
    #[default]
    AnyDiffers,
    /// All three differ.
    AllDiffer,
}

/// How a distress date present on one side and absent on the other is
/// compared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbsentDates {
    /// Relational `<>`: a comparison with an absent date is never true.
    #[default]
    NeverDiffer,
    /// Absent vs present counts as a difference. Two absent dates are equal.
    Differ,
}

/// Flags matched pairs whose new side is still open but whose distress
/// dates disagree with the legacy side.
pub struct ConflictDetector {
    open_sentinel: NaiveDate,
    rule:          ConflictRule,
    absent:        AbsentDates,
}

impl ConflictDetector {
    pub fn new(open_sentinel: NaiveDate, rule: ConflictRule) -> Self {
        Self { open_sentinel, rule, absent: AbsentDates::default() }
    }

    pub fn with_absent_dates(mut self, absent: AbsentDates) -> Self {
        self.absent = absent;
        self
    }

    pub fn is_conflicting(&self, new: &PositionRecord, legacy: &PositionRecord) -> bool {
        if new.bank_code.is_none() || legacy.bank_code.is_none() {
            return false;
        }
        if new.default_end_date != Some(self.open_sentinel) {
            return false;
        }

        let diffs = [
            self.differs(new.past_due_start_date, legacy.past_due_start_date),
            self.differs(new.workout_start_date, legacy.workout_start_date),
            self.differs(new.npl_start_date, legacy.npl_start_date),
        ];
        match self.rule {
            ConflictRule::AnyDiffers => diffs.iter().any(|d| *d),
            ConflictRule::AllDiffer  => diffs.iter().all(|d| *d),
        }
    }

    fn differs(&self, new: Option<NaiveDate>, legacy: Option<NaiveDate>) -> bool {
        match (new, legacy, self.absent) {
            (Some(n), Some(l), _)            => n != l,
            (None, None, _)                  => false,
            (_, _, AbsentDates::NeverDiffer) => false,
            (_, _, AbsentDates::Differ)      => true,
        }
    }
}
