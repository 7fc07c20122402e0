//! Query engine: the filtered, sorted view shown in the visit table.

mod sort;

pub use sort::*;

use crate::models::{format_timestamp, SearchWindow, VisitRecord};
use crate::store::VisitStore;

/// Check a record against the search window.
///
/// The date test compares formatted `YYYY-MM-DD HH:MM:SS` strings and
/// excludes both boundaries. Soft-deleted records never match.
pub fn matches(window: &SearchWindow, record: &VisitRecord) -> bool {
    if record.is_deleted {
        return false;
    }
    if !record.name.contains(window.name.as_str()) || !record.phone.contains(window.phone.as_str()) {
        return false;
    }

    let created = record.created_text();
    created > format_timestamp(&window.start) && created < format_timestamp(&window.end)
}

/// The visible view: a window, a sort order, and the sequence indexes of
/// the rows currently shown.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    window: SearchWindow,
    order: SortOrder,
    rows: Vec<usize>,
}

impl QueryEngine {
    pub fn new(window: SearchWindow) -> Self {
        Self {
            window,
            order: SortOrder::default(),
            rows: Vec::new(),
        }
    }

    pub fn window(&self) -> &SearchWindow {
        &self.window
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// Sequence indexes of the visible rows, top to bottom.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Sequence index shown at `row`.
    pub fn row(&self, row: usize) -> Option<usize> {
        self.rows.get(row).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace the view with the active records matching `window`, sorted by
    /// the last sort order.
    pub fn search(&mut self, store: &VisitStore, window: SearchWindow) -> &[usize] {
        self.window = window;
        self.refresh(store)
    }

    /// Re-run the current window against the store.
    pub fn refresh(&mut self, store: &VisitStore) -> &[usize] {
        let mut hits: Vec<&VisitRecord> = store
            .active()
            .filter(|record| matches(&self.window, record))
            .collect();
        self.order.sort(&mut hits);
        self.rows = hits.iter().map(|r| r.sequence_index).collect();

        tracing::debug!(rows = self.rows.len(), window = ?self.window, "search applied");
        &self.rows
    }

    /// Reorder the current view. Rows are not re-filtered.
    pub fn sort_by(&mut self, store: &VisitStore, order: SortOrder) -> &[usize] {
        self.order = order;
        let mut shown: Vec<&VisitRecord> = self.rows.iter().filter_map(|&seq| store.get(seq)).collect();
        self.order.sort(&mut shown);
        self.rows = shown.iter().map(|r| r.sequence_index).collect();

        tracing::debug!(column = %order.column, direction = ?order.direction, "view sorted");
        &self.rows
    }

    /// Show a freshly registered record as the first row.
    pub fn prepend(&mut self, sequence_index: usize) {
        self.rows.insert(0, sequence_index);
    }

    /// Resolve the visible rows against the store.
    pub fn records<'s>(&self, store: &'s VisitStore) -> Vec<&'s VisitRecord> {
        self.rows.iter().filter_map(|&seq| store.get(seq)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_timestamp;

    fn make_record(name: &str, phone: &str, created: &str) -> VisitRecord {
        let mut record = VisitRecord::draft(name, phone).with_fees(10.0, 10.0, 10.0);
        record.created_at = parse_timestamp(created).unwrap();
        record.updated_at = record.created_at;
        record
    }

    fn window(start: &str, end: &str) -> SearchWindow {
        let start = parse_timestamp(start).unwrap();
        let end = parse_timestamp(end).unwrap();
        SearchWindow::default_at(end).with_range(start, end)
    }

    #[test]
    fn test_matches_substrings() {
        let record = make_record("张三丰", "13812345678", "2024-03-05 08:00:00");
        let w = window("2024-01-01 00:00:00", "2024-12-31 00:00:00");

        assert!(matches(&w, &record));
        assert!(matches(&w.clone().with_name("三"), &record));
        assert!(matches(&w.clone().with_phone("1234"), &record));
        assert!(!matches(&w.clone().with_name("李"), &record));
        assert!(!matches(&w.clone().with_phone("999"), &record));
    }

    #[test]
    fn test_matches_is_case_sensitive() {
        let record = make_record("Alice", "1", "2024-03-05 08:00:00");
        let w = window("2024-01-01 00:00:00", "2024-12-31 00:00:00");
        assert!(matches(&w.clone().with_name("Ali"), &record));
        assert!(!matches(&w.with_name("ali"), &record));
    }

    #[test]
    fn test_matches_excludes_boundaries() {
        let at_start = make_record("a", "1", "2024-03-01 00:00:00");
        let inside = make_record("b", "1", "2024-03-01 00:00:01");
        let at_end = make_record("c", "1", "2024-03-31 00:00:00");
        let w = window("2024-03-01 00:00:00", "2024-03-31 00:00:00");

        assert!(!matches(&w, &at_start));
        assert!(matches(&w, &inside));
        assert!(!matches(&w, &at_end));
    }

    #[test]
    fn test_matches_rejects_deleted() {
        let mut record = make_record("a", "1", "2024-03-05 08:00:00");
        record.is_deleted = true;
        let w = window("2024-01-01 00:00:00", "2024-12-31 00:00:00");
        assert!(!matches(&w, &record));
    }
}
