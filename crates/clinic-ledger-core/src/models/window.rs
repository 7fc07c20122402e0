//! Search window model.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Fixed start of the ledger's history, used as the default search start.
pub fn default_history_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 12, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Active query parameters for the visit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    /// Name substring (case-sensitive)
    pub name: String,
    /// Phone substring
    pub phone: String,
    /// Range start; the boundary itself is excluded
    pub start: NaiveDateTime,
    /// Range end; the boundary itself is excluded
    pub end: NaiveDateTime,
}

impl SearchWindow {
    /// Window spanning `history_start` through one day after `now`, so
    /// same-day visits are always included.
    pub fn spanning(history_start: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            name: String::new(),
            phone: String::new(),
            start: history_start,
            end: now.checked_add_signed(Duration::days(1)).unwrap_or(now),
        }
    }

    /// Default window as seen at `now`.
    pub fn default_at(now: NaiveDateTime) -> Self {
        Self::spanning(default_history_start(), now)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_range(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}
