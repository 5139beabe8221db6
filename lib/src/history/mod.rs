// lib/src/history/mod.rs

pub mod ledger;
pub mod polling;

pub use ledger::HistoryLedger;
pub use polling::PollingTaskList;
