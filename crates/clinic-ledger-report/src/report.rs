//! Ledger totals and monthly summary, rendered for the terminal or as JSON.

use std::str::FromStr;

use clinic_ledger_core::ledger::format_amount;
use clinic_ledger_core::models::format_timestamp;
use clinic_ledger_core::{Aggregates, LedgerService, MonthlySummary, SearchWindow};
use serde::Serialize;
use thiserror::Error;

pub const ENV_REPORT_FORMAT: &str = "CLINIC_LEDGER_REPORT_FORMAT";

/// Report errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown report format {0:?}, expected \"text\" or \"json\"")]
    UnknownFormat(String),
}

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(ReportError::UnknownFormat(s.to_string())),
        }
    }
}

/// Everything the report prints.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    /// Window the monthly buckets were drawn from
    pub window: SearchWindow,
    /// Records not soft-deleted
    pub active_records: usize,
    pub aggregates: Aggregates,
    pub monthly: MonthlySummary,
}

impl LedgerReport {
    /// Snapshot a loaded service over its current window.
    pub fn collect(service: &LedgerService) -> Self {
        let window = service.window().clone();
        Self {
            monthly: service.monthly_totals(&window),
            aggregates: service.current_aggregates(),
            active_records: service.store().active_len(),
            window,
        }
    }

    pub fn render(&self, format: ReportFormat) -> ReportResult<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> ReportResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_text(&self) -> String {
        let mut lines = vec![
            format!(
                "期间: {} 至 {}",
                format_timestamp(&self.window.start),
                format_timestamp(&self.window.end)
            ),
            format!("有效记录: {}", self.active_records),
            format!("总收入: {}", format_amount(self.aggregates.total)),
            format!("本月收入: {}", format_amount(self.aggregates.month_to_date)),
            format!("欠费: {}", format_amount(self.aggregates.shortfall)),
            String::new(),
            "月度收入:".to_string(),
        ];

        if self.monthly.is_empty() {
            lines.push("  (无)".to_string());
        }
        for bucket in &self.monthly.buckets {
            lines.push(format!(
                "  {}年{}月  {}  ({} 次)",
                bucket.key.year(),
                bucket.key.month(),
                format_amount(bucket.total),
                bucket.visits
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use clinic_ledger_core::{FixedClock, LedgerConfig, VisitRecord};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn setup_service(now: &str) -> (LedgerService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::at(dir.path().join("data.csv"));
        let mut service = LedgerService::with_clock(config, Arc::new(FixedClock(at(now))));
        service.load().unwrap();
        (service, dir)
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!(matches!(
            "yaml".parse::<ReportFormat>(),
            Err(ReportError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_empty_ledger_text() {
        let (service, _dir) = setup_service("2024-03-20 12:00:00");
        let text = LedgerReport::collect(&service).to_text();

        assert!(text.contains("期间: 2018-12-01 00:00:00 至 2024-03-21 12:00:00"));
        assert!(text.contains("总收入: 0.0 元"));
        assert!(text.contains("(无)"));
    }

    #[test]
    fn test_report_totals() {
        let (mut service, _dir) = setup_service("2024-03-20 12:00:00");
        service
            .commit(VisitRecord::draft("张三", "138").with_fees(200.0, 0.0, 50.0), true)
            .unwrap();
        service
            .commit(VisitRecord::draft("李四", "139").with_fees(80.0, 80.0, 80.0), true)
            .unwrap();

        let report = LedgerReport::collect(&service);
        assert_eq!(report.active_records, 2);
        assert_eq!(report.aggregates.total, 130.0);
        assert_eq!(report.aggregates.shortfall, 150.0);

        let text = report.to_text();
        assert!(text.contains("本月收入: 130.0 元"));
        assert!(text.contains("2024年3月  130.0 元  (2 次)"));
    }

    #[test]
    fn test_report_json() {
        let (mut service, _dir) = setup_service("2024-03-20 12:00:00");
        service
            .commit(VisitRecord::draft("a", "1").with_fees(10.0, 10.0, 10.0), true)
            .unwrap();

        let json = LedgerReport::collect(&service).render(ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["active_records"], 1);
        assert_eq!(value["aggregates"]["total"], 10.0);
        assert_eq!(value["monthly"]["buckets"].as_array().unwrap().len(), 1);
        assert_eq!(value["monthly"]["max"], 10.0);
    }
}
