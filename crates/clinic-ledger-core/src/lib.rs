//! Clinic Ledger Core Library
//!
//! Record store and query engine for a clinic's visit ledger.
//!
//! # Architecture
//!
//! ```text
//!   Front end (table, dialogs, chart)
//!            │  search / commit / soft-delete / monthly totals
//!            ▼
//!   ┌──────────────────────────────────────────────┐
//!   │                LedgerService                 │
//!   │                                              │
//!   │  VisitStore ──► QueryEngine ──► Aggregates   │
//!   │      │                                       │
//!   │      ▼                                       │
//!   │  LedgerFile (CSV, write-temp-then-rename)    │
//!   └──────────────────────┬───────────────────────┘
//!                          │ PublishedView
//!                          ▼
//!                    ViewListeners
//! ```
//!
//! # Core Principle
//!
//! **Nothing is ever physically removed.** Soft-deleted visits stay in the
//! ledger file but never reach a query, a total, or a monthly bucket.
//!
//! # Modules
//!
//! - [`models`]: Domain types (VisitRecord, Sex, SearchWindow)
//! - [`codec`]: CSV ledger file encode/decode
//! - [`store`]: Record store with commit, soft-delete and rollback
//! - [`query`]: Search filter and stable multi-column sort
//! - [`ledger`]: Aggregate totals and monthly summary
//! - [`service`]: Owned service tying the pieces together
//! - [`config`]: Ledger configuration

pub mod clock;
pub mod codec;
pub mod config;
pub mod ledger;
pub mod models;
pub mod query;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{CodecError, CorruptRowPolicy, LedgerFile};
pub use config::{ConfigError, LedgerConfig};
pub use ledger::{Aggregates, MonthKey, MonthlyBucket, MonthlySummary};
pub use models::{SearchWindow, Sex, VisitRecord};
pub use query::{QueryEngine, SortColumn, SortDirection, SortOrder};
pub use service::{LedgerService, PublishedView, ViewListener};
pub use store::{LoadReport, StoreError, VisitStore};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use models::{format_timestamp, parse_timestamp, zero_time};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicLedgerError {
    #[error("File unavailable: {0}")]
    FileUnavailable(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CodecError> for ClinicLedgerError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::CorruptRecord { .. } => ClinicLedgerError::CorruptRecord(e.to_string()),
            CodecError::FileUnavailable { .. } | CodecError::Io(_) => {
                ClinicLedgerError::FileUnavailable(e.to_string())
            }
            CodecError::Csv(_) => ClinicLedgerError::CorruptRecord(e.to_string()),
        }
    }
}

impl From<StoreError> for ClinicLedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Codec(inner) => inner.into(),
            StoreError::ValidationFailed(msg) => ClinicLedgerError::ValidationFailed(msg),
            StoreError::NotFound(_) | StoreError::RowOutOfRange { .. } => {
                ClinicLedgerError::NotFound(e.to_string())
            }
        }
    }
}

impl From<ConfigError> for ClinicLedgerError {
    fn from(e: ConfigError) -> Self {
        ClinicLedgerError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicLedgerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicLedgerError::Internal(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open the ledger at `path`, creating an empty table if needed.
#[uniffi::export]
pub fn open_ledger(path: String) -> Result<Arc<ClinicLedgerCore>, ClinicLedgerError> {
    ClinicLedgerCore::open(LedgerConfig::at(path))
}

/// Open the ledger configured through `CLINIC_LEDGER_*` environment variables.
#[uniffi::export]
pub fn open_ledger_from_env() -> Result<Arc<ClinicLedgerCore>, ClinicLedgerError> {
    ClinicLedgerCore::open(LedgerConfig::from_env()?)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe service wrapper for FFI.
///
/// Every call takes the lock, so a reporting window never observes a
/// half-applied mutation.
#[derive(uniffi::Object)]
pub struct ClinicLedgerCore {
    service: Arc<Mutex<LedgerService>>,
}

impl ClinicLedgerCore {
    fn open(config: LedgerConfig) -> Result<Arc<Self>, ClinicLedgerError> {
        let mut service = LedgerService::new(config);
        service.load()?;
        Ok(Arc::new(Self {
            service: Arc::new(Mutex::new(service)),
        }))
    }
}

#[uniffi::export]
impl ClinicLedgerCore {
    // =========================================================================
    // View
    // =========================================================================

    /// Rows currently shown, top to bottom.
    pub fn rows(&self) -> Result<Vec<FfiVisitRecord>, ClinicLedgerError> {
        let service = self.service.lock()?;
        Ok(to_ffi_rows(service.rows()))
    }

    /// The window of the last search.
    pub fn current_window(&self) -> Result<FfiSearchWindow, ClinicLedgerError> {
        let service = self.service.lock()?;
        Ok(service.window().into())
    }

    /// History start through tomorrow, empty name and phone filters.
    pub fn default_window(&self) -> Result<FfiSearchWindow, ClinicLedgerError> {
        let service = self.service.lock()?;
        Ok((&service.default_window()).into())
    }

    /// Run a search and return the new view.
    pub fn search(
        &self,
        window: FfiSearchWindow,
    ) -> Result<Vec<FfiVisitRecord>, ClinicLedgerError> {
        let window = SearchWindow::try_from(window)?;
        let mut service = self.service.lock()?;
        Ok(to_ffi_rows(service.search(window)))
    }

    /// Sort the view by a column name such as `"fee_paid"`.
    pub fn sort_by(
        &self,
        column: String,
        ascending: bool,
    ) -> Result<Vec<FfiVisitRecord>, ClinicLedgerError> {
        let column: SortColumn = column.parse().map_err(ClinicLedgerError::InvalidInput)?;
        let direction = if ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        };
        let mut service = self.service.lock()?;
        Ok(to_ffi_rows(service.sort_by(column, direction)))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Commit a new or edited record and return the refreshed view.
    pub fn commit(
        &self,
        record: FfiVisitRecord,
        is_new: bool,
    ) -> Result<Vec<FfiVisitRecord>, ClinicLedgerError> {
        let record = VisitRecord::try_from(record)?;
        let mut service = self.service.lock()?;
        service.commit(record, is_new)?;
        Ok(to_ffi_rows(service.rows()))
    }

    /// Check or uncheck the row at `row`.
    pub fn set_checked(&self, row: u32, checked: bool) -> Result<(), ClinicLedgerError> {
        let mut service = self.service.lock()?;
        service.set_checked(row as usize, checked)?;
        Ok(())
    }

    /// Soft-delete all checked rows and return the refreshed view.
    pub fn soft_delete_checked(&self) -> Result<Vec<FfiVisitRecord>, ClinicLedgerError> {
        let mut service = self.service.lock()?;
        service.soft_delete_checked()?;
        Ok(to_ffi_rows(service.rows()))
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub fn current_aggregates(&self) -> Result<FfiAggregates, ClinicLedgerError> {
        let service = self.service.lock()?;
        Ok(service.current_aggregates().into())
    }

    pub fn monthly_totals(
        &self,
        window: FfiSearchWindow,
    ) -> Result<FfiMonthlySummary, ClinicLedgerError> {
        let window = SearchWindow::try_from(window)?;
        let service = self.service.lock()?;
        Ok(service.monthly_totals(&window).into())
    }
}

fn to_ffi_rows(rows: Vec<&VisitRecord>) -> Vec<FfiVisitRecord> {
    rows.into_iter().map(FfiVisitRecord::from).collect()
}

fn parse_ffi_timestamp(field: &str, raw: &str) -> Result<chrono::NaiveDateTime, ClinicLedgerError> {
    if raw.trim().is_empty() {
        return Ok(zero_time());
    }
    parse_timestamp(raw).ok_or_else(|| {
        ClinicLedgerError::InvalidInput(format!("{}: expected YYYY-MM-DD HH:MM:SS, got {:?}", field, raw))
    })
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe visit record. Timestamps use `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitRecord {
    pub name: String,
    pub phone: String,
    pub created_at: String,
    pub updated_at: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub fee_quoted: f64,
    pub fee_actual: f64,
    pub fee_paid: f64,
    pub address: String,
    pub age: u32,
    pub sex: String,
    pub sequence_index: u64,
    pub is_checked: bool,
    pub is_deleted: bool,
}

impl From<&VisitRecord> for FfiVisitRecord {
    fn from(record: &VisitRecord) -> Self {
        Self {
            name: record.name.clone(),
            phone: record.phone.clone(),
            created_at: format_timestamp(&record.created_at),
            updated_at: format_timestamp(&record.updated_at),
            diagnosis: record.diagnosis.clone(),
            treatment_plan: record.treatment_plan.clone(),
            fee_quoted: record.fee_quoted,
            fee_actual: record.fee_actual,
            fee_paid: record.fee_paid,
            address: record.address.clone(),
            age: record.age,
            sex: record.sex.label().to_string(),
            sequence_index: record.sequence_index as u64,
            is_checked: record.is_checked,
            is_deleted: record.is_deleted,
        }
    }
}

impl TryFrom<FfiVisitRecord> for VisitRecord {
    type Error = ClinicLedgerError;

    fn try_from(record: FfiVisitRecord) -> Result<Self, Self::Error> {
        let sex = Sex::parse(&record.sex)
            .ok_or_else(|| ClinicLedgerError::InvalidInput(format!("sex: {:?}", record.sex)))?;

        Ok(VisitRecord {
            created_at: parse_ffi_timestamp("created_at", &record.created_at)?,
            updated_at: parse_ffi_timestamp("updated_at", &record.updated_at)?,
            name: record.name,
            phone: record.phone,
            diagnosis: record.diagnosis,
            treatment_plan: record.treatment_plan,
            fee_quoted: record.fee_quoted,
            fee_actual: record.fee_actual,
            fee_paid: record.fee_paid,
            address: record.address,
            age: record.age,
            sex,
            sequence_index: record.sequence_index as usize,
            is_checked: record.is_checked,
            is_deleted: record.is_deleted,
        })
    }
}

/// FFI-safe search window.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSearchWindow {
    pub name: String,
    pub phone: String,
    pub start: String,
    pub end: String,
}

impl From<&SearchWindow> for FfiSearchWindow {
    fn from(window: &SearchWindow) -> Self {
        Self {
            name: window.name.clone(),
            phone: window.phone.clone(),
            start: format_timestamp(&window.start),
            end: format_timestamp(&window.end),
        }
    }
}

impl TryFrom<FfiSearchWindow> for SearchWindow {
    type Error = ClinicLedgerError;

    fn try_from(window: FfiSearchWindow) -> Result<Self, Self::Error> {
        let start = parse_timestamp(&window.start)
            .ok_or_else(|| ClinicLedgerError::InvalidInput(format!("start: {:?}", window.start)))?;
        let end = parse_timestamp(&window.end)
            .ok_or_else(|| ClinicLedgerError::InvalidInput(format!("end: {:?}", window.end)))?;

        Ok(SearchWindow {
            name: window.name,
            phone: window.phone,
            start,
            end,
        })
    }
}

/// FFI-safe ledger totals.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAggregates {
    pub total: f64,
    pub month_to_date: f64,
    pub shortfall: f64,
}

impl From<Aggregates> for FfiAggregates {
    fn from(totals: Aggregates) -> Self {
        Self {
            total: totals.total,
            month_to_date: totals.month_to_date,
            shortfall: totals.shortfall,
        }
    }
}

/// FFI-safe monthly bucket.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMonthlyBucket {
    pub key: i32,
    pub year: i32,
    pub month: u32,
    pub total: f64,
    pub visits: u32,
}

impl From<&MonthlyBucket> for FfiMonthlyBucket {
    fn from(bucket: &MonthlyBucket) -> Self {
        Self {
            key: bucket.key.value(),
            year: bucket.key.year(),
            month: bucket.key.month(),
            total: bucket.total,
            visits: bucket.visits as u32,
        }
    }
}

/// FFI-safe monthly summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMonthlySummary {
    pub buckets: Vec<FfiMonthlyBucket>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl From<MonthlySummary> for FfiMonthlySummary {
    fn from(summary: MonthlySummary) -> Self {
        Self {
            buckets: summary.buckets.iter().map(FfiMonthlyBucket::from).collect(),
            min: summary.min,
            max: summary.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_core_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let core = open_ledger(path.to_string_lossy().into_owned()).unwrap();
        assert!(core.rows().unwrap().is_empty());

        let mut draft = FfiVisitRecord::from(&VisitRecord::draft("张三", "138"));
        draft.fee_quoted = 200.0;
        draft.fee_paid = 50.0;
        let rows = core.commit(draft, true).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fee_actual, 200.0);
        assert_eq!(rows[0].sex, "男");

        let totals = core.current_aggregates().unwrap();
        assert_eq!(totals.total, 50.0);
        assert_eq!(totals.shortfall, 150.0);

        core.set_checked(0, true).unwrap();
        assert!(core.soft_delete_checked().unwrap().is_empty());
        assert_eq!(core.current_aggregates().unwrap().total, 0.0);
    }

    #[test]
    fn test_ffi_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let core = open_ledger(dir.path().join("data.csv").to_string_lossy().into_owned()).unwrap();

        assert!(matches!(
            core.sort_by("height".into(), true),
            Err(ClinicLedgerError::InvalidInput(_))
        ));

        let mut window = core.default_window().unwrap();
        window.start = "last week".into();
        assert!(matches!(core.search(window), Err(ClinicLedgerError::InvalidInput(_))));

        let draft = FfiVisitRecord::from(&VisitRecord::draft("a", "1"));
        assert!(matches!(
            core.commit(draft, true),
            Err(ClinicLedgerError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_ffi_monthly_totals() {
        let dir = tempfile::tempdir().unwrap();
        let core = open_ledger(dir.path().join("data.csv").to_string_lossy().into_owned()).unwrap();

        let mut draft = FfiVisitRecord::from(&VisitRecord::draft("a", "1"));
        draft.fee_paid = 30.0;
        core.commit(draft, true).unwrap();

        let summary = core.monthly_totals(core.default_window().unwrap()).unwrap();
        assert_eq!(summary.buckets.len(), 1);
        assert_eq!(summary.buckets[0].total, 30.0);
        assert_eq!(summary.min, Some(30.0));
        assert!((1..=12).contains(&summary.buckets[0].month));
    }
}
