//! Financial aggregates and monthly reporting over active visit records.

mod aggregates;
mod monthly;

pub use aggregates::*;
pub use monthly::*;

/// Format an amount the way the ledger totals are displayed.
pub fn format_amount(amount: f64) -> String {
    format!("{:.1} 元", amount)
}
