//! Running totals over the active record set.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::VisitRecord;

/// The three ledger totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    /// Sum of paid fees over all active records
    pub total: f64,
    /// Sum of paid fees for visits created in the current year and month
    pub month_to_date: f64,
    /// Sum of unpaid balances (actual fee above paid fee)
    pub shortfall: f64,
}

impl Aggregates {
    /// Recompute from scratch. Soft-deleted records are ignored.
    pub fn recompute<'a, I>(records: I, today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a VisitRecord>,
    {
        let mut totals = Self::default();

        for record in records.into_iter().filter(|r| r.is_active()) {
            totals.total += record.fee_paid;

            let created = record.created_at.date();
            if created.year() == today.year() && created.month() == today.month() {
                totals.month_to_date += record.fee_paid;
            }

            totals.shortfall += record.outstanding();
        }

        totals
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
