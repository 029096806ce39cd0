//! docgate: operational front-end for per-client document processing
//!
//! Documents arrive over HTTP, from inbox folders, or via automation calls.
//! Each one is handed to the owning client's external transformation program
//! and the outcome lands in an append-only history log. All executions are
//! funneled through a bounded admission queue that serializes, rate-limits
//! and times out the external programs.

pub mod config;
pub mod error;
pub mod exec;
pub mod history;
pub mod intake;
pub mod processing;
pub mod scripts;
pub mod server;

pub use config::GateConfig;
pub use error::{Error, Result};
pub use exec::{AdmissionQueue, JobDispatcher, ProcessRunner, RunOutput};
pub use history::{HistoryRecord, HistoryStore};
