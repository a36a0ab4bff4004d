//! File-backed repositories
//!
//! Everything lives under one data directory: snapshots as pretty JSON
//! replaced atomically, append-only logs as JSON lines.

pub mod automations;
mod file;
pub mod ledger;
pub mod positions;

pub use automations::FileAutomationStore;
pub use ledger::JsonlTradeLedger;
pub use positions::JsonPositionStore;
