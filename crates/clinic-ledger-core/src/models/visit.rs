//! Visit record models.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Timestamp layout shared by the ledger file and the date-range filter.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Patient sex as recorded at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[default]
    Male,
    Female,
}

impl Sex {
    /// Label written to the ledger file.
    pub fn label(self) -> &'static str {
        match self {
            Sex::Male => "男",
            Sex::Female => "女",
        }
    }

    /// Parse a persisted label. Accepts the file labels and English names.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw {
            "男" => return Some(Sex::Male),
            "女" => return Some(Sex::Female),
            _ => {}
        }
        match raw.to_ascii_uppercase().as_str() {
            "MALE" | "M" => Some(Sex::Male),
            "FEMALE" | "F" => Some(Sex::Female),
            _ => None,
        }
    }
}

/// One clinic visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitRecord {
    /// Patient name
    pub name: String,
    /// Contact phone
    pub phone: String,
    /// First commit time, never changed afterwards
    pub created_at: NaiveDateTime,
    /// Last commit time
    pub updated_at: NaiveDateTime,
    /// Diagnosis text
    pub diagnosis: String,
    /// Treatment plan text
    pub treatment_plan: String,
    /// Fee quoted for the visit
    pub fee_quoted: f64,
    /// Fee actually charged (defaults to the quoted fee at commit)
    pub fee_actual: f64,
    /// Amount paid so far
    pub fee_paid: f64,
    /// Patient address
    pub address: String,
    /// Age in years
    pub age: u32,
    pub sex: Sex,
    /// Insertion-order tag, stable for the lifetime of a loaded ledger
    pub sequence_index: usize,
    /// Row selection in the table; never persisted
    #[serde(skip)]
    pub is_checked: bool,
    /// Soft-delete flag
    pub is_deleted: bool,
}

impl VisitRecord {
    /// Create a draft record. Drafts are not part of the store until committed.
    pub fn draft(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            created_at: zero_time(),
            updated_at: zero_time(),
            diagnosis: String::new(),
            treatment_plan: String::new(),
            fee_quoted: 0.0,
            fee_actual: 0.0,
            fee_paid: 0.0,
            address: String::new(),
            age: 0,
            sex: Sex::default(),
            sequence_index: 0,
            is_checked: false,
            is_deleted: false,
        }
    }

    /// Builder-style fee setter, mostly for drafts.
    pub fn with_fees(mut self, quoted: f64, actual: f64, paid: f64) -> Self {
        self.fee_quoted = quoted;
        self.fee_actual = actual;
        self.fee_paid = paid;
        self
    }

    /// Check whether any fee field carries financial activity.
    pub fn has_fees(&self) -> bool {
        self.fee_quoted > 0.0 || self.fee_actual > 0.0 || self.fee_paid > 0.0
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Amount still owed on this visit; zero when fully paid or overpaid.
    pub fn outstanding(&self) -> f64 {
        if self.fee_actual > self.fee_paid {
            self.fee_actual - self.fee_paid
        } else {
            0.0
        }
    }

    /// Round fees to the one decimal the ledger file keeps, then default
    /// the actual fee to the quoted fee when it was left unset.
    pub fn normalize_fees(&mut self) {
        self.fee_quoted = round_fee(self.fee_quoted);
        self.fee_actual = round_fee(self.fee_actual);
        self.fee_paid = round_fee(self.fee_paid);
        if self.fee_actual == 0.0 {
            self.fee_actual = self.fee_quoted;
        }
    }

    /// The creation time in ledger-file layout.
    pub fn created_text(&self) -> String {
        format_timestamp(&self.created_at)
    }
}

/// Round a fee exactly as the `{:.1}` file layout does.
pub fn round_fee(fee: f64) -> f64 {
    format!("{:.1}", fee).parse().unwrap_or(fee)
}

/// Format a timestamp in ledger-file layout.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp in ledger-file layout.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// Placeholder for missing or unreadable timestamps (`0001-01-01 00:00:00`).
pub fn zero_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Drop sub-second precision; the ledger stores whole seconds.
pub fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}
