//! Record store: the authoritative, ordered set of visit records.
//!
//! Every mutation ends with a full rewrite of the ledger file followed by an
//! aggregate recompute. If the rewrite fails the in-memory change is rolled
//! back, so memory and disk never disagree.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::codec::{CodecError, CorruptRow, CorruptRowPolicy, LedgerFile};
use crate::ledger::{monthly_totals, Aggregates, MonthlySummary};
use crate::models::{SearchWindow, VisitRecord};

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Record not found: sequence index {0}")]
    NotFound(usize),

    #[error("Row {row} out of range ({len} rows shown)")]
    RowOutOfRange { row: usize, len: usize },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of loading the ledger file.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Records kept, soft-deleted ones included
    pub loaded: usize,
    /// Of which soft-deleted
    pub deleted: usize,
    /// Rows dropped as corrupt
    pub skipped: Vec<CorruptRow>,
}

/// Visit records in display order (most recently registered first after
/// inserts), backed by a ledger file.
pub struct VisitStore {
    file: LedgerFile,
    policy: CorruptRowPolicy,
    clock: Arc<dyn Clock>,
    records: Vec<VisitRecord>,
    positions: HashMap<usize, usize>,
    next_index: usize,
    aggregates: Aggregates,
}

impl VisitStore {
    /// Create an empty store over `file`. Call [`VisitStore::load`] to read it.
    pub fn new(file: LedgerFile, policy: CorruptRowPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            file,
            policy,
            clock,
            records: Vec::new(),
            positions: HashMap::new(),
            next_index: 0,
            aggregates: Aggregates::default(),
        }
    }

    pub fn file(&self) -> &LedgerFile {
        &self.file
    }

    /// Replace the in-memory set with the file contents.
    pub fn load(&mut self) -> StoreResult<LoadReport> {
        let decoded = self.file.load(self.policy)?;

        self.records = decoded.records;
        self.next_index = self.records.len();
        self.reindex();
        self.recompute();

        let report = LoadReport {
            loaded: self.records.len(),
            deleted: self.records.iter().filter(|r| r.is_deleted).count(),
            skipped: decoded.skipped,
        };
        tracing::info!(
            path = %self.file.path().display(),
            loaded = report.loaded,
            deleted = report.deleted,
            skipped = report.skipped.len(),
            "ledger loaded"
        );
        Ok(report)
    }

    /// All records, soft-deleted included, in store order.
    pub fn records(&self) -> &[VisitRecord] {
        &self.records
    }

    /// Records that are not soft-deleted, in store order.
    pub fn active(&self) -> impl Iterator<Item = &VisitRecord> {
        self.records.iter().filter(|r| r.is_active())
    }

    pub fn get(&self, sequence_index: usize) -> Option<&VisitRecord> {
        self.positions
            .get(&sequence_index)
            .and_then(|&pos| self.records.get(pos))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active().count()
    }

    /// Totals as of the last save or load.
    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    /// Monthly paid-fee buckets over the active set.
    pub fn monthly_totals(&self, window: &SearchWindow) -> MonthlySummary {
        monthly_totals(&self.records, window)
    }

    /// Prepend a committed record and give it the next sequence index.
    ///
    /// The newest registration shows first regardless of its timestamps.
    pub fn insert_at_head(&mut self, mut record: VisitRecord) -> usize {
        let sequence_index = self.next_index;
        self.next_index += 1;

        record.sequence_index = sequence_index;
        self.records.insert(0, record);
        self.reindex();
        sequence_index
    }

    /// Commit a draft.
    ///
    /// New drafts get `created_at` and are inserted at the head; edits
    /// replace the record with the draft's `sequence_index`, keeping its
    /// creation time and delete flag. Returns the sequence index.
    pub fn commit(&mut self, mut draft: VisitRecord, is_new: bool) -> StoreResult<usize> {
        draft.normalize_fees();
        validate(&draft)?;

        let existing = if is_new {
            None
        } else {
            Some(self.position(draft.sequence_index)?)
        };

        draft.updated_at = self.clock.now();

        let snapshot = self.snapshot();
        let sequence_index = match existing {
            None => {
                draft.created_at = draft.updated_at;
                draft.is_deleted = false;
                draft.is_checked = false;
                self.insert_at_head(draft)
            }
            Some(pos) => {
                let sequence_index = draft.sequence_index;
                let current = &self.records[pos];
                draft.created_at = current.created_at;
                draft.is_deleted = current.is_deleted;
                draft.is_checked = current.is_checked;
                self.records[pos] = draft;
                sequence_index
            }
        };

        self.save_or_rollback(snapshot)?;
        tracing::info!(sequence_index, is_new, "visit committed");
        Ok(sequence_index)
    }

    /// Soft-delete the given records. Returns how many were newly deleted.
    pub fn soft_delete(&mut self, sequence_indexes: &[usize]) -> StoreResult<usize> {
        let positions = sequence_indexes
            .iter()
            .map(|&seq| self.position(seq))
            .collect::<StoreResult<Vec<usize>>>()?;

        let snapshot = self.snapshot();
        let mut deleted = 0;
        for pos in positions {
            let record = &mut self.records[pos];
            if !record.is_deleted {
                record.is_deleted = true;
                deleted += 1;
            }
            record.is_checked = false;
        }

        self.save_or_rollback(snapshot)?;
        tracing::info!(deleted, "visits soft-deleted");
        Ok(deleted)
    }

    /// Soft-delete every active record currently checked.
    pub fn soft_delete_checked(&mut self) -> StoreResult<usize> {
        let checked: Vec<usize> = self
            .active()
            .filter(|r| r.is_checked)
            .map(|r| r.sequence_index)
            .collect();
        self.soft_delete(&checked)
    }

    /// Toggle the transient selection flag. Not persisted.
    pub fn set_checked(&mut self, sequence_index: usize, checked: bool) -> StoreResult<()> {
        let pos = self.position(sequence_index)?;
        self.records[pos].is_checked = checked;
        Ok(())
    }

    /// Persist the full record set, then recompute the aggregates.
    pub fn save(&mut self) -> StoreResult<()> {
        self.file.save(&self.records)?;
        self.recompute();
        tracing::info!(records = self.records.len(), "ledger saved");
        Ok(())
    }

    fn save_or_rollback(&mut self, snapshot: Snapshot) -> StoreResult<()> {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "ledger save failed, rolling back");
            self.records = snapshot.records;
            self.next_index = snapshot.next_index;
            self.reindex();
            return Err(e);
        }
        Ok(())
    }

    fn position(&self, sequence_index: usize) -> StoreResult<usize> {
        self.positions
            .get(&sequence_index)
            .copied()
            .ok_or(StoreError::NotFound(sequence_index))
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records.clone(),
            next_index: self.next_index,
        }
    }

    fn reindex(&mut self) {
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.sequence_index, pos))
            .collect();
    }

    fn recompute(&mut self) {
        let today = self.clock.now().date();
        self.aggregates = Aggregates::recompute(&self.records, today);
    }
}

struct Snapshot {
    records: Vec<VisitRecord>,
    next_index: usize,
}

/// Reject drafts with no financial activity or with impossible fees.
pub fn validate(draft: &VisitRecord) -> StoreResult<()> {
    let fees = [draft.fee_quoted, draft.fee_actual, draft.fee_paid];
    if fees.iter().any(|f| !f.is_finite() || *f < 0.0) {
        return Err(StoreError::ValidationFailed(
            "fees must be non-negative numbers".into(),
        ));
    }
    if !draft.has_fees() {
        return Err(StoreError::ValidationFailed(
            "fee information cannot all be empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::parse_timestamp;
    use tempfile::TempDir;

    fn now() -> chrono::NaiveDateTime {
        parse_timestamp("2024-03-20 12:00:00").unwrap()
    }

    fn setup_store() -> (VisitStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let file = LedgerFile::new(dir.path().join("data.csv"));
        let mut store = VisitStore::new(file, CorruptRowPolicy::Abort, Arc::new(FixedClock(now())));
        store.load().unwrap();
        (store, dir)
    }

    fn make_draft(name: &str, quoted: f64, actual: f64, paid: f64) -> VisitRecord {
        VisitRecord::draft(name, "138").with_fees(quoted, actual, paid)
    }

    #[test]
    fn test_load_empty() {
        let (store, _dir) = setup_store();
        assert!(store.is_empty());
        assert_eq!(store.aggregates(), Aggregates::default());
        assert!(store.file().path().exists());
    }

    #[test]
    fn test_commit_new() {
        let (mut store, _dir) = setup_store();

        let seq = store.commit(make_draft("a", 200.0, 0.0, 50.0), true).unwrap();
        let record = store.get(seq).unwrap();

        assert_eq!(record.fee_actual, 200.0);
        assert_eq!(record.created_at, now());
        assert_eq!(record.updated_at, now());
        assert!((store.aggregates().total - 50.0).abs() < 1e-6);
        assert!((store.aggregates().shortfall - 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_commit_rounds_fees_like_the_file() {
        let (mut store, _dir) = setup_store();

        store.commit(make_draft("a", 10.26, 0.0, 10.26), true).unwrap();
        store.commit(make_draft("b", 10.24, 0.0, 10.24), true).unwrap();
        let before = store.aggregates();
        let paid: Vec<f64> = store.records().iter().map(|r| r.fee_paid).collect();
        assert_eq!(paid, vec![10.2, 10.3]);

        store.load().unwrap();
        let reloaded: Vec<f64> = store.records().iter().map(|r| r.fee_paid).collect();
        assert_eq!(reloaded, paid);
        assert_eq!(store.aggregates(), before);
    }

    #[test]
    fn test_insert_at_head_order() {
        let (mut store, _dir) = setup_store();

        let first = store.commit(make_draft("a", 1.0, 1.0, 1.0), true).unwrap();
        let second = store.commit(make_draft("b", 1.0, 1.0, 1.0), true).unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(store.records()[0].name, "b");
        assert_eq!(store.records()[1].name, "a");
    }

    #[test]
    fn test_commit_rejects_empty_fees() {
        let (mut store, _dir) = setup_store();
        store.commit(make_draft("a", 1.0, 1.0, 1.0), true).unwrap();
        let before = std::fs::read_to_string(store.file().path()).unwrap();

        let err = store.commit(make_draft("b", 0.0, 0.0, 0.0), true).unwrap_err();

        assert!(matches!(err, StoreError::ValidationFailed(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(std::fs::read_to_string(store.file().path()).unwrap(), before);
    }

    #[test]
    fn test_commit_rejects_negative_fee() {
        let (mut store, _dir) = setup_store();
        let err = store.commit(make_draft("a", 10.0, -1.0, 0.0), true).unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_edit_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let earlier = parse_timestamp("2024-01-02 03:04:05").unwrap();

        let mut store = VisitStore::new(
            LedgerFile::new(&path),
            CorruptRowPolicy::Abort,
            Arc::new(FixedClock(earlier)),
        );
        store.load().unwrap();
        let seq = store.commit(make_draft("a", 100.0, 100.0, 0.0), true).unwrap();

        let mut store = VisitStore::new(
            LedgerFile::new(&path),
            CorruptRowPolicy::Abort,
            Arc::new(FixedClock(now())),
        );
        store.load().unwrap();
        let mut edit = store.get(seq).unwrap().clone();
        edit.fee_paid = 100.0;
        edit.diagnosis = "复诊".into();
        store.commit(edit, false).unwrap();

        let record = store.get(seq).unwrap();
        assert_eq!(record.created_at, earlier);
        assert_eq!(record.updated_at, now());
        assert_eq!(record.diagnosis, "复诊");
        assert_eq!(store.aggregates().shortfall, 0.0);
    }

    #[test]
    fn test_edit_unknown_record() {
        let (mut store, _dir) = setup_store();
        let mut draft = make_draft("a", 1.0, 1.0, 1.0);
        draft.sequence_index = 42;
        assert!(matches!(store.commit(draft, false), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn test_soft_delete_checked_persists_flag() {
        let (mut store, _dir) = setup_store();
        let a = store.commit(make_draft("a", 10.0, 10.0, 10.0), true).unwrap();
        let b = store.commit(make_draft("b", 20.0, 20.0, 20.0), true).unwrap();

        store.set_checked(a, true).unwrap();
        assert_eq!(store.soft_delete_checked().unwrap(), 1);

        assert!(store.get(a).unwrap().is_deleted);
        assert!(!store.get(a).unwrap().is_checked);
        assert!(!store.get(b).unwrap().is_deleted);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_len(), 1);
        assert!((store.aggregates().total - 20.0).abs() < 1e-6);

        let contents = std::fs::read_to_string(store.file().path()).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().any(|l| l.starts_with("a,") && l.ends_with(",1")));
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let (mut store, dir) = setup_store();
        store.commit(make_draft("a", 10.0, 10.0, 10.0), true).unwrap();

        // Removing the directory makes the temp-file write fail.
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.exists());

        let err = store.commit(make_draft("b", 5.0, 5.0, 5.0), true).unwrap_err();
        assert!(matches!(err, StoreError::Codec(CodecError::FileUnavailable { .. })));
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].name, "a");
        assert!((store.aggregates().total - 10.0).abs() < 1e-6);

        // The sequence counter is restored too.
        let seq = store.insert_at_head(make_draft("c", 1.0, 1.0, 1.0));
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_set_checked_unknown() {
        let (mut store, _dir) = setup_store();
        assert!(matches!(store.set_checked(7, true), Err(StoreError::NotFound(7))));
    }

    #[test]
    fn test_reload_renumbers_by_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now()));

        let mut store = VisitStore::new(LedgerFile::new(&path), CorruptRowPolicy::Abort, clock.clone());
        store.load().unwrap();
        store.commit(make_draft("a", 1.0, 1.0, 1.0), true).unwrap();
        store.commit(make_draft("b", 1.0, 1.0, 1.0), true).unwrap();

        let mut reloaded = VisitStore::new(LedgerFile::new(&path), CorruptRowPolicy::Abort, clock);
        reloaded.load().unwrap();
        assert_eq!(reloaded.records()[0].name, "b");
        assert_eq!(reloaded.records()[0].sequence_index, 0);
        assert_eq!(reloaded.records()[1].sequence_index, 1);
    }
}
