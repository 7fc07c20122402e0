//! Flat-file codec for the visit ledger.
//!
//! The ledger is a 13-column CSV file with a literal header row. Every save
//! rewrites the whole table, soft-deleted rows included.

mod file;

pub use file::*;

use std::io::{Read, Write};
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{format_timestamp, parse_timestamp, zero_time, Sex, VisitRecord};

/// Header row written at the top of every ledger file.
pub const HEADER: [&str; 13] = [
    "姓名", "电话", "登记时间", "最新时间", "病例诊断", "治疗方案", "就诊费用", "实收费用",
    "已付费用", "住址", "性别", "年龄", "是否删除",
];

/// Files written before soft-delete support carry only the first 12 columns.
const REQUIRED_COLUMNS: usize = 12;

mod col {
    pub const NAME: usize = 0;
    pub const PHONE: usize = 1;
    pub const CREATED_AT: usize = 2;
    pub const UPDATED_AT: usize = 3;
    pub const DIAGNOSIS: usize = 4;
    pub const TREATMENT_PLAN: usize = 5;
    pub const FEE_QUOTED: usize = 6;
    pub const FEE_ACTUAL: usize = 7;
    pub const FEE_PAID: usize = 8;
    pub const ADDRESS: usize = 9;
    pub const SEX: usize = 10;
    pub const AGE: usize = 11;
    pub const DELETED: usize = 12;
}

/// Codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Ledger file unavailable at {path}: {source}")]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at row {row}: invalid {field} value {value:?}")]
    CorruptRecord {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// What to do with a row that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptRowPolicy {
    /// Fail the whole decode on the first corrupt row
    Abort,
    /// Drop the row, log it and report it in [`Decoded::skipped`]
    #[default]
    Skip,
}

/// A row dropped during decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptRow {
    /// 0-based data row index (header excluded)
    pub row: usize,
    /// Offending column
    pub field: &'static str,
    /// Raw cell text
    pub value: String,
}

impl From<CorruptRow> for CodecError {
    fn from(row: CorruptRow) -> Self {
        CodecError::CorruptRecord {
            row: row.row,
            field: row.field,
            value: row.value,
        }
    }
}

/// Result of decoding a ledger file.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Records in file order, `sequence_index` assigned by position
    pub records: Vec<VisitRecord>,
    /// Rows dropped under [`CorruptRowPolicy::Skip`]
    pub skipped: Vec<CorruptRow>,
}

/// Write the header and every record, soft-deleted ones included.
pub fn encode<W: Write>(records: &[VisitRecord], writer: W) -> CodecResult<()> {
    let mut out = WriterBuilder::new().from_writer(writer);
    out.write_record(HEADER)?;

    for record in records {
        let created_at = format_timestamp(&record.created_at);
        let updated_at = format_timestamp(&record.updated_at);
        let fee_quoted = format_fee(record.fee_quoted);
        let fee_actual = format_fee(record.fee_actual);
        let fee_paid = format_fee(record.fee_paid);
        let age = record.age.to_string();

        out.write_record([
            record.name.as_str(),
            record.phone.as_str(),
            created_at.as_str(),
            updated_at.as_str(),
            record.diagnosis.as_str(),
            record.treatment_plan.as_str(),
            fee_quoted.as_str(),
            fee_actual.as_str(),
            fee_paid.as_str(),
            record.address.as_str(),
            record.sex.label(),
            age.as_str(),
            if record.is_deleted { "1" } else { "0" },
        ])?;
    }

    out.flush()?;
    Ok(())
}

/// Encode into an in-memory string.
pub fn encode_to_string(records: &[VisitRecord]) -> CodecResult<String> {
    let mut buf = Vec::new();
    encode(records, &mut buf)?;
    String::from_utf8(buf).map_err(|e| {
        CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Read a ledger table. `sequence_index` follows decode order of kept rows.
pub fn decode<R: Read>(reader: R, policy: CorruptRowPolicy) -> CodecResult<Decoded> {
    let mut input = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header = input.headers()?.clone();
    if !header.is_empty() && !header.iter().eq(HEADER.iter().copied()) {
        tracing::warn!(header = ?header, "ledger header does not match the expected columns");
    }

    let mut decoded = Decoded::default();
    for (row, result) in input.byte_records().enumerate() {
        let bytes = result?;
        let outcome = match StringRecord::from_byte_record(bytes) {
            Ok(cells) => decode_row(row, &cells),
            Err(e) => Err(undecodable_row(row, e)),
        };
        match outcome {
            Ok(mut record) => {
                record.sequence_index = decoded.records.len();
                decoded.records.push(record);
            }
            Err(corrupt) => match policy {
                CorruptRowPolicy::Abort => return Err(corrupt.into()),
                CorruptRowPolicy::Skip => {
                    tracing::warn!(
                        row = corrupt.row,
                        field = corrupt.field,
                        value = %corrupt.value,
                        "skipping corrupt ledger row"
                    );
                    decoded.skipped.push(corrupt);
                }
            },
        }
    }

    Ok(decoded)
}

/// Fees are written with exactly one decimal place.
pub fn format_fee(fee: f64) -> String {
    format!("{:.1}", fee)
}

fn decode_row(row: usize, cells: &StringRecord) -> Result<VisitRecord, CorruptRow> {
    if cells.len() < REQUIRED_COLUMNS {
        return Err(CorruptRow {
            row,
            field: "columns",
            value: cells.len().to_string(),
        });
    }

    let text = |idx: usize| cells.get(idx).unwrap_or_default().to_string();

    let sex_raw = cells.get(col::SEX).unwrap_or_default();
    let sex = Sex::parse(sex_raw).ok_or_else(|| CorruptRow {
        row,
        field: "sex",
        value: sex_raw.to_string(),
    })?;

    let age_raw = cells.get(col::AGE).unwrap_or_default();
    let age = age_raw.trim().parse::<u32>().map_err(|_| CorruptRow {
        row,
        field: "age",
        value: age_raw.to_string(),
    })?;

    Ok(VisitRecord {
        name: text(col::NAME),
        phone: text(col::PHONE),
        created_at: decode_timestamp(row, "created_at", cells.get(col::CREATED_AT)),
        updated_at: decode_timestamp(row, "updated_at", cells.get(col::UPDATED_AT)),
        diagnosis: text(col::DIAGNOSIS),
        treatment_plan: text(col::TREATMENT_PLAN),
        fee_quoted: decode_fee(row, "fee_quoted", cells.get(col::FEE_QUOTED))?,
        fee_actual: decode_fee(row, "fee_actual", cells.get(col::FEE_ACTUAL))?,
        fee_paid: decode_fee(row, "fee_paid", cells.get(col::FEE_PAID))?,
        address: text(col::ADDRESS),
        age,
        sex,
        sequence_index: 0,
        is_checked: false,
        is_deleted: cells.get(col::DELETED) == Some("1"),
    })
}

fn decode_fee(row: usize, field: &'static str, raw: Option<&str>) -> Result<f64, CorruptRow> {
    let raw = raw.unwrap_or_default();
    match raw.trim().parse::<f64>() {
        Ok(fee) if fee.is_finite() && fee >= 0.0 => Ok(fee),
        _ => Err(CorruptRow {
            row,
            field,
            value: raw.to_string(),
        }),
    }
}

// Rows that are not valid UTF-8, e.g. saved as GBK by a spreadsheet.
fn undecodable_row(row: usize, err: csv::FromUtf8Error) -> CorruptRow {
    let field = err.utf8_error().field();
    let raw = err.into_byte_record();
    CorruptRow {
        row,
        field: "encoding",
        value: raw
            .get(field)
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .unwrap_or_default(),
    }
}

// Unreadable timestamps fall back to the zero time instead of dropping the row.
fn decode_timestamp(row: usize, field: &'static str, raw: Option<&str>) -> chrono::NaiveDateTime {
    let raw = raw.unwrap_or_default();
    parse_timestamp(raw).unwrap_or_else(|| {
        tracing::warn!(row, field, value = %raw, "unparsable timestamp, using zero time");
        zero_time()
    })
}
