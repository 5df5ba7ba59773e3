//! Windowed aggregator — partition-scoped sums of granted and utilized
//! amounts.
//!
//! Two modes:
//!   - `broadcast`: every row keeps its place and gains a shared handle to
//!     its partition's totals. Row count is preserved.
//!   - `summarize`: one summary row per partition, carrying the row count
//!     and the same sums.
//!
//! Sums follow relational SUM: absent amounts are skipped, a partition
//! with no present amount sums to absent. Values are sorted before being
//! added, so the result does not depend on input order or partitioning.

use crate::{classification::ClassifiedRecord, position::PositionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The two monetary measures of a row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Amounts {
    pub granted:  Option<f64>,
    pub utilized: Option<f64>,
}

pub trait Measured {
    fn amounts(&self) -> Amounts;
}

impl Measured for PositionRecord {
    fn amounts(&self) -> Amounts {
        Amounts {
            granted:  self.total_granted,
            utilized: self.total_utilized,
        }
    }
}

impl Measured for ClassifiedRecord {
    fn amounts(&self) -> Amounts {
        self.position.amounts()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionTotals {
    pub total_granted_sum:  Option<f64>,
    pub total_utilized_sum: Option<f64>,
    pub row_count:          u64,
}

#[derive(Debug, Default)]
struct Accumulator {
    granted:  Vec<f64>,
    utilized: Vec<f64>,
    rows:     u64,
}

impl Accumulator {
    fn add(&mut self, amounts: Amounts) {
        self.granted.extend(amounts.granted);
        self.utilized.extend(amounts.utilized);
        self.rows += 1;
    }

    fn finish(self) -> PartitionTotals {
        PartitionTotals {
            total_granted_sum:  ordered_sum(self.granted),
            total_utilized_sum: ordered_sum(self.utilized),
            row_count:          self.rows,
        }
    }
}

fn ordered_sum(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values.into_iter().sum())
}

/// A row with its partition's totals attached.
#[derive(Debug, Clone)]
pub struct AggregatedRecord<R> {
    pub record: R,
    pub totals: Arc<PartitionTotals>,
}

/// One row per partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow<K> {
    pub key:    K,
    pub totals: PartitionTotals,
}

fn reduce<'a, R, K, F>(records: impl IntoIterator<Item = &'a R>, key: F) -> BTreeMap<K, PartitionTotals>
where
    R: Measured + 'a,
    K: Ord,
    F: Fn(&R) -> K,
{
    let mut acc: BTreeMap<K, Accumulator> = BTreeMap::new();
    for record in records {
        acc.entry(key(record)).or_default().add(record.amounts());
    }
    acc.into_iter().map(|(k, a)| (k, a.finish())).collect()
}

/// Attach partition totals to every row, preserving input order.
pub fn broadcast<R, K, F>(records: Vec<R>, key: F) -> Vec<AggregatedRecord<R>>
where
    R: Measured,
    K: Ord,
    F: Fn(&R) -> K,
{
    let totals: BTreeMap<K, Arc<PartitionTotals>> = reduce(records.iter(), &key)
        .into_iter()
        .map(|(k, t)| (k, Arc::new(t)))
        .collect();

    records
        .into_iter()
        .filter_map(|record| {
            let totals = Arc::clone(totals.get(&key(&record))?);
            Some(AggregatedRecord { record, totals })
        })
        .collect()
}

/// Collapse each partition into one summary row, ordered by key.
pub fn summarize<R, K, F>(records: &[R], key: F) -> Vec<SummaryRow<K>>
where
    R: Measured,
    K: Ord,
    F: Fn(&R) -> K,
{
    reduce(records.iter(), key)
        .into_iter()
        .map(|(key, totals)| SummaryRow { key, totals })
        .collect()
}
