//! Volunteer aggregate: profile plus reputation ledger.

pub mod ledger;
pub mod state;

pub use ledger::{LedgerEntry, Settlement, SettlementOutcome, entries_for};
pub use state::*;
