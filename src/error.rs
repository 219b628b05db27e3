use thiserror::Error;

use crate::jobs::types::JobStatus;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Swarm file already exists: {0}")]
    Conflict(String),

    #[error("Hash of swarm file {0} is already set")]
    HashAlreadySet(String),

    #[error("Job {job_id}: {operation} is not allowed in status {from}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        operation: &'static str,
    },

    #[error("There is no primary node")]
    NoPrimary,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failover already in progress")]
    FailoverInProgress,

    #[error("Outdated secrets (revision {incoming} < {current})")]
    StaleSecrets { incoming: i64, current: i64 },

    #[error("Remote node {addr} failed: {message}")]
    Remote { addr: String, message: String },

    #[error("Expected {expected} response, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, SwarmError>;
