//! Domain models for the clinic ledger.

mod visit;
mod window;

pub use visit::*;
pub use window::*;
