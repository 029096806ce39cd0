//! Outcome history: append-only JSON-lines store with filtering,
//! pagination and retention pruning

mod store;

pub use store::{HistoryFilter, HistoryPage, HistoryRecord, HistoryStore, IntakeSource};
