//! Table sort keys.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::VisitRecord;

/// A sortable table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    SequenceIndex,
    Name,
    Phone,
    Sex,
    Age,
    FeeQuoted,
    FeeActual,
    FeePaid,
    CreatedAt,
    UpdatedAt,
    Diagnosis,
    TreatmentPlan,
    Address,
}

impl SortColumn {
    /// All columns, in table order.
    pub const ALL: [SortColumn; 13] = [
        SortColumn::SequenceIndex,
        SortColumn::Name,
        SortColumn::Phone,
        SortColumn::Sex,
        SortColumn::Age,
        SortColumn::FeeQuoted,
        SortColumn::FeeActual,
        SortColumn::FeePaid,
        SortColumn::CreatedAt,
        SortColumn::UpdatedAt,
        SortColumn::Diagnosis,
        SortColumn::TreatmentPlan,
        SortColumn::Address,
    ];

    /// Ascending comparison of two records on this column.
    ///
    /// Text compares bytewise, timestamps chronologically, fees by total order.
    pub fn compare(self, a: &VisitRecord, b: &VisitRecord) -> Ordering {
        match self {
            SortColumn::SequenceIndex => a.sequence_index.cmp(&b.sequence_index),
            SortColumn::Name => a.name.cmp(&b.name),
            SortColumn::Phone => a.phone.cmp(&b.phone),
            SortColumn::Sex => a.sex.label().cmp(b.sex.label()),
            SortColumn::Age => a.age.cmp(&b.age),
            SortColumn::FeeQuoted => a.fee_quoted.total_cmp(&b.fee_quoted),
            SortColumn::FeeActual => a.fee_actual.total_cmp(&b.fee_actual),
            SortColumn::FeePaid => a.fee_paid.total_cmp(&b.fee_paid),
            SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
            SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortColumn::Diagnosis => a.diagnosis.cmp(&b.diagnosis),
            SortColumn::TreatmentPlan => a.treatment_plan.cmp(&b.treatment_plan),
            SortColumn::Address => a.address.cmp(&b.address),
        }
    }

    /// Stable identifier, also accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            SortColumn::SequenceIndex => "sequence_index",
            SortColumn::Name => "name",
            SortColumn::Phone => "phone",
            SortColumn::Sex => "sex",
            SortColumn::Age => "age",
            SortColumn::FeeQuoted => "fee_quoted",
            SortColumn::FeeActual => "fee_actual",
            SortColumn::FeePaid => "fee_paid",
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
            SortColumn::Diagnosis => "diagnosis",
            SortColumn::TreatmentPlan => "treatment_plan",
            SortColumn::Address => "address",
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortColumn::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown sort column: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Column plus direction. Defaults to `updated_at` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    pub fn compare(&self, a: &VisitRecord, b: &VisitRecord) -> Ordering {
        let ord = self.column.compare(a, b);
        match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }

    /// Stable sort: rows with equal keys keep their relative order in
    /// either direction.
    pub fn sort(&self, rows: &mut [&VisitRecord]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::new(SortColumn::UpdatedAt, SortDirection::Ascending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sex;

    fn make_record(seq: usize, name: &str, paid: f64) -> VisitRecord {
        let mut record = VisitRecord::draft(name, "1").with_fees(paid, paid, paid);
        record.sequence_index = seq;
        record
    }

    fn names(rows: &[&VisitRecord]) -> Vec<String> {
        rows.iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_parse_columns() {
        for column in SortColumn::ALL {
            assert_eq!(column.as_str().parse::<SortColumn>().unwrap(), column);
        }
        assert!("nope".parse::<SortColumn>().is_err());
    }

    #[test]
    fn test_default_order() {
        let order = SortOrder::default();
        assert_eq!(order.column, SortColumn::UpdatedAt);
        assert_eq!(order.direction, SortDirection::Ascending);
    }

    #[test]
    fn test_descending_keeps_ties_in_place() {
        let a = make_record(0, "a", 10.0);
        let b = make_record(1, "b", 20.0);
        let c = make_record(2, "c", 10.0);
        let mut rows = vec![&a, &b, &c];

        SortOrder::new(SortColumn::FeePaid, SortDirection::Descending).sort(&mut rows);
        assert_eq!(names(&rows), vec!["b", "a", "c"]);

        SortOrder::new(SortColumn::FeePaid, SortDirection::Ascending).sort(&mut rows);
        assert_eq!(names(&rows), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_sex_orders_by_label() {
        let mut female = make_record(0, "f", 1.0);
        female.sex = Sex::Female;
        let male = make_record(1, "m", 1.0);
        let mut rows = vec![&male, &female];

        SortOrder::new(SortColumn::Sex, SortDirection::Ascending).sort(&mut rows);
        // "女" (U+5973) sorts before "男" (U+7537).
        assert_eq!(names(&rows), vec!["f", "m"]);
    }

    #[test]
    fn test_toggle() {
        assert_eq!(SortDirection::Ascending.toggled(), SortDirection::Descending);
        assert_eq!(SortDirection::Descending.toggled(), SortDirection::Ascending);
    }
}
