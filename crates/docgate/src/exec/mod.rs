//! Job execution core: process runner, admission queue, submission facade

pub mod dispatcher;
pub mod queue;
pub mod runner;

pub use dispatcher::JobDispatcher;
pub use queue::{AdmissionQueue, UnitOfWork};
pub use runner::{ProcessRunner, RunOutput};
