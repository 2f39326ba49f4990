//! The monitoring engine: probes, status transitions, notification latches,
//! the per-website check pipeline and the scheduler that drives it.

use sea_orm::DbErr;
use thiserror::Error;

pub mod gate;
pub mod pipeline;
pub mod probes;
pub mod scheduler;
pub mod transition;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{CheckOutcome, CheckPipeline, CommitLock};
pub use scheduler::TargetScheduler;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Website not found: {0}")]
    WebsiteNotFound(i32),
    #[error("Website {0} already has the maximum number of checks in flight")]
    Busy(i32),
}
