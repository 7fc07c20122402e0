//! Ledger service: the single owner of the store and the visible view.
//!
//! Every operation runs store -> query -> aggregates -> file in that order
//! and then pushes the refreshed view to subscribed listeners. Collaborators
//! render from the published view instead of caching rows.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::codec::LedgerFile;
use crate::config::LedgerConfig;
use crate::ledger::{Aggregates, MonthlySummary};
use crate::models::{SearchWindow, VisitRecord};
use crate::query::{QueryEngine, SortColumn, SortDirection, SortOrder};
use crate::store::{LoadReport, StoreError, StoreResult, VisitStore};

/// Snapshot of what the table shows.
#[derive(Debug, Clone)]
pub struct PublishedView {
    /// Visible rows, top to bottom
    pub rows: Vec<VisitRecord>,
    /// Ledger totals after the last save
    pub aggregates: Aggregates,
    pub window: SearchWindow,
    pub order: SortOrder,
}

/// Receives the refreshed view after every operation.
pub trait ViewListener: Send {
    fn view_changed(&self, view: &PublishedView);
}

impl<F> ViewListener for F
where
    F: Fn(&PublishedView) + Send,
{
    fn view_changed(&self, view: &PublishedView) {
        self(view)
    }
}

/// Owned ledger service. Mutations take `&mut self`; share it across
/// threads behind a lock.
pub struct LedgerService {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    store: VisitStore,
    query: QueryEngine,
    listeners: Vec<Box<dyn ViewListener>>,
}

impl LedgerService {
    /// Create a service on the wall clock. Nothing is read until [`load`](Self::load).
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let store = VisitStore::new(
            LedgerFile::new(&config.data_path),
            config.corrupt_rows,
            clock.clone(),
        );
        let query = QueryEngine::new(SearchWindow::spanning(config.history_start, clock.now()));

        Self {
            config,
            clock,
            store,
            query,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &VisitStore {
        &self.store
    }

    /// Register a listener for view changes.
    pub fn subscribe<L: ViewListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    /// Read the ledger file and show the default window.
    pub fn load(&mut self) -> StoreResult<LoadReport> {
        let report = self.store.load()?;
        let window = self.default_window();
        self.query.search(&self.store, window);
        self.publish();
        Ok(report)
    }

    /// History start through one day after now.
    pub fn default_window(&self) -> SearchWindow {
        SearchWindow::spanning(self.config.history_start, self.clock.now())
    }

    pub fn window(&self) -> &SearchWindow {
        self.query.window()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.query.order()
    }

    /// Replace the view with the active records matching `window`.
    pub fn search(&mut self, window: SearchWindow) -> Vec<&VisitRecord> {
        self.query.search(&self.store, window);
        self.publish();
        self.rows()
    }

    /// Reorder the view.
    pub fn sort_by(&mut self, column: SortColumn, direction: SortDirection) -> Vec<&VisitRecord> {
        self.query
            .sort_by(&self.store, SortOrder::new(column, direction));
        self.publish();
        self.rows()
    }

    /// Header click: flip direction on the current column, otherwise sort
    /// the new column ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) -> Vec<&VisitRecord> {
        let current = self.query.order();
        let direction = if current.column == column {
            current.direction.toggled()
        } else {
            SortDirection::Ascending
        };
        self.sort_by(column, direction)
    }

    /// Blank draft for a new registration.
    pub fn draft(&self) -> VisitRecord {
        VisitRecord::draft("", "")
    }

    /// Editable copy of the record shown at `row`.
    pub fn edit_draft(&self, row: usize) -> StoreResult<VisitRecord> {
        let seq = self.sequence_at(row)?;
        self.store
            .get(seq)
            .cloned()
            .ok_or(StoreError::NotFound(seq))
    }

    /// Commit a draft. New records show as the first row; edits update in
    /// place. Returns the record's sequence index.
    pub fn commit(&mut self, draft: VisitRecord, is_new: bool) -> StoreResult<usize> {
        let seq = self.store.commit(draft, is_new)?;
        if is_new {
            self.query.prepend(seq);
        }
        self.publish();
        Ok(seq)
    }

    /// Toggle the selection flag of the record shown at `row`.
    pub fn set_checked(&mut self, row: usize, checked: bool) -> StoreResult<()> {
        let seq = self.sequence_at(row)?;
        self.store.set_checked(seq, checked)?;
        self.publish();
        Ok(())
    }

    /// Soft-delete every checked record and re-run the current search.
    pub fn soft_delete_checked(&mut self) -> StoreResult<usize> {
        let deleted = self.store.soft_delete_checked()?;
        self.query.refresh(&self.store);
        self.publish();
        Ok(deleted)
    }

    /// Monthly paid-fee buckets for `window`'s date range.
    pub fn monthly_totals(&self, window: &SearchWindow) -> MonthlySummary {
        self.store.monthly_totals(window)
    }

    pub fn current_aggregates(&self) -> Aggregates {
        self.store.aggregates()
    }

    /// Visible rows, top to bottom.
    pub fn rows(&self) -> Vec<&VisitRecord> {
        self.query.records(&self.store)
    }

    /// Owned copy of the visible state.
    pub fn view(&self) -> PublishedView {
        PublishedView {
            rows: self.rows().into_iter().cloned().collect(),
            aggregates: self.store.aggregates(),
            window: self.query.window().clone(),
            order: self.query.order(),
        }
    }

    fn sequence_at(&self, row: usize) -> StoreResult<usize> {
        self.query.row(row).ok_or(StoreError::RowOutOfRange {
            row,
            len: self.query.len(),
        })
    }

    fn publish(&self) {
        if self.listeners.is_empty() {
            return;
        }
        let view = self.view();
        for listener in &self.listeners {
            listener.view_changed(&view);
        }
    }
}
