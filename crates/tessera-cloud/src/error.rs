//! Provider-neutral error types

use std::time::Duration;
use thiserror::Error;

use crate::poller::PollStatus;

/// Errors raised by the reconciliation core
#[derive(Error, Debug)]
pub enum CloudError {
    /// The awaited status was never observed before the deadline.
    #[error("Timed out after {elapsed:?} waiting for {operation} (last status: {last_status}, {attempts} probes)")]
    PollTimeout {
        operation: String,
        elapsed: Duration,
        attempts: u32,
        last_status: PollStatus,
    },

    /// The probe reported a status outside both the pending and target sets.
    #[error("Unexpected status '{status}' while waiting for {operation}")]
    UnexpectedStatus { operation: String, status: PollStatus },

    /// A probe reported a target status without the value it was waiting for.
    #[error("{operation} completed without a result")]
    MissingValue { operation: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// True for the "still pending remotely" outcome, as opposed to a rejection.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CloudError::PollTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
