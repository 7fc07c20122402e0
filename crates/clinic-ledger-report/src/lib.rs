//! Terminal report for the clinic visit ledger.
//!
//! Loads the ledger the same way the desktop front end does and prints the
//! ledger totals plus the monthly paid-fee summary over the default window.

pub mod report;

pub use report::*;
