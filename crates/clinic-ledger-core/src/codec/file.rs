//! Ledger file access.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{decode, encode, CodecError, CodecResult, CorruptRowPolicy, Decoded};
use crate::models::VisitRecord;

/// Default ledger file name, relative to the working directory.
pub const DEFAULT_LEDGER_FILE: &str = "data.csv";

/// The backing CSV file of a ledger.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the ledger, writing an empty table first if the file is missing.
    pub fn load(&self, policy: CorruptRowPolicy) -> CodecResult<Decoded> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "ledger file missing, creating empty table");
            self.save(&[])?;
        }

        let file = File::open(&self.path).map_err(|source| self.unavailable(source))?;
        decode(BufReader::new(file), policy)
    }

    /// Replace the ledger with `records`.
    ///
    /// The table is written to a temporary file in the same directory and
    /// renamed over the target, so a failed write leaves the previous
    /// contents intact.
    pub fn save(&self, records: &[VisitRecord]) -> CodecResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| self.unavailable(source))?;
        encode(records, &mut tmp)?;
        // The temp file is created owner-only; keep the ledger's own mode.
        if let Ok(meta) = fs::metadata(&self.path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|source| self.unavailable(source))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.unavailable(source))?;
        tmp.persist(&self.path)
            .map_err(|e| self.unavailable(e.error))?;

        Ok(())
    }

    fn unavailable(&self, source: std::io::Error) -> CodecError {
        CodecError::FileUnavailable {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_FILE)
    }
}
