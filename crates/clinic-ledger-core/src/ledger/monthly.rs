//! Monthly paid-fee buckets for reporting.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::models::{SearchWindow, VisitRecord};

/// Compound `year * 12 + month` key; distinguishes the same month in
/// different years and sorts chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey(i32);

impl MonthKey {
    /// `month` is 1-based.
    pub fn new(year: i32, month: u32) -> Self {
        Self(year * 12 + month as i32)
    }

    pub fn of<D: Datelike>(date: &D) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Calendar month (1-12) for labels.
    pub fn month(self) -> u32 {
        ((self.0 - 1).rem_euclid(12) + 1) as u32
    }

    pub fn year(self) -> i32 {
        (self.0 - 1).div_euclid(12)
    }
}

/// Paid fees for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub key: MonthKey,
    /// Sum of paid fees
    pub total: f64,
    /// Number of visits in the bucket
    pub visits: usize,
}

/// Monthly buckets in ascending key order, plus the extremes used to scale
/// a chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub buckets: Vec<MonthlyBucket>,
    /// Smallest bucket total, `None` when there are no buckets
    pub min: Option<f64>,
    /// Largest bucket total, `None` when there are no buckets
    pub max: Option<f64>,
}

impl MonthlySummary {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Bucket active records by creation month.
///
/// Only the window's date range is used: a record counts when its month key
/// lies between the keys of `window.start` and `window.end`, both inclusive.
/// Months without visits are omitted.
pub fn monthly_totals<'a, I>(records: I, window: &SearchWindow) -> MonthlySummary
where
    I: IntoIterator<Item = &'a VisitRecord>,
{
    let first = MonthKey::of(&window.start);
    let last = MonthKey::of(&window.end);

    let mut sums: BTreeMap<MonthKey, (f64, usize)> = BTreeMap::new();
    for record in records.into_iter().filter(|r| r.is_active()) {
        let key = MonthKey::of(&record.created_at);
        if key < first || key > last {
            continue;
        }
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += record.fee_paid;
        entry.1 += 1;
    }

    let buckets: Vec<MonthlyBucket> = sums
        .into_iter()
        .map(|(key, (total, visits))| MonthlyBucket { key, total, visits })
        .collect();

    let min = buckets.iter().map(|b| b.total).reduce(f64::min);
    let max = buckets.iter().map(|b| b.total).reduce(f64::max);

    MonthlySummary { buckets, min, max }
}
