use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SwarmError};
use crate::membership::types::NodeId;

/// Default number of runs a job gets before it is marked failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteItem {
    /// Executable, relative to the job directory.
    pub exe: String,
    pub args: String,
}

/// Immutable description of what a job does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobDescription {
    pub id: String,
    /// Swarm files extracted into the job directory before execution.
    pub setup: Vec<String>,
    pub execute: Vec<ExecuteItem>,
    /// Paths relative to the job directory that go into the result archive.
    pub collect: Vec<String>,
    /// Logical name the result archive is stored under.
    pub result: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A job and its run history.
///
/// Per-run maps are keyed by run index (0-based). Transitions return a new
/// value; calling one from the wrong status is a programming error and
/// yields [`SwarmError::IllegalTransition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub config: JobDescription,
    pub status: JobStatus,
    pub max_retries: u32,
    pub runs: u32,
    pub started: BTreeMap<u32, DateTime<Utc>>,
    pub stopped: BTreeMap<u32, DateTime<Utc>>,
    pub worker_node_id: BTreeMap<u32, NodeId>,
    pub errors: BTreeMap<u32, String>,
}

impl Job {
    pub fn create(config: JobDescription) -> Self {
        Self {
            config,
            status: JobStatus::Pending,
            max_retries: DEFAULT_MAX_RETRIES,
            runs: 0,
            started: BTreeMap::new(),
            stopped: BTreeMap::new(),
            worker_node_id: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Worker of the current run, if the job is running.
    pub fn current_worker(&self) -> Option<&NodeId> {
        if self.status != JobStatus::Running || self.runs == 0 {
            return None;
        }
        self.worker_node_id.get(&(self.runs - 1))
    }

    pub fn is_running_on(&self, node_id: &NodeId) -> bool {
        self.current_worker() == Some(node_id)
    }

    fn require(&self, expected: JobStatus, operation: &'static str) -> Result<()> {
        if self.status != expected {
            return Err(SwarmError::IllegalTransition {
                job_id: self.config.id.clone(),
                from: self.status,
                operation,
            });
        }
        Ok(())
    }

    /// Pending -> Running on `worker`.
    pub fn with_start(&self, worker: &NodeId) -> Result<Job> {
        self.require(JobStatus::Pending, "WithStart")?;
        let i = self.runs;
        let mut job = self.clone();
        job.status = JobStatus::Running;
        job.runs = i + 1;
        job.started.insert(i, Utc::now());
        job.worker_node_id.insert(i, worker.clone());
        Ok(job)
    }

    /// Running -> Pending or Failed after the worker vanished.
    ///
    /// The status is decided against the current budget, exactly like a
    /// failed run; the budget then grows by one so a later run can make up
    /// for the lost one.
    pub fn with_lost_node(&self, lost: &NodeId) -> Result<Job> {
        self.require(JobStatus::Running, "WithLostNode")?;
        let i = self.runs - 1;
        let mut job = self.clone();
        job.status = if self.runs < self.max_retries {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        job.max_retries = self.max_retries + 1;
        job.stopped.insert(i, Utc::now());
        job.errors.insert(i, format!("lost on node {}", lost));
        Ok(job)
    }

    /// Running -> Pending (retries left) or Failed.
    pub fn with_failed(&self, error: &str) -> Result<Job> {
        self.require(JobStatus::Running, "WithFailed")?;
        let i = self.runs - 1;
        let mut job = self.clone();
        job.status = if job.runs < job.max_retries {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        job.stopped.insert(i, Utc::now());
        job.errors.insert(i, error.to_string());
        Ok(job)
    }

    /// Running -> Succeeded.
    pub fn with_succeeded(&self) -> Result<Job> {
        self.require(JobStatus::Running, "WithSucceeded")?;
        let i = self.runs - 1;
        let mut job = self.clone();
        job.status = JobStatus::Succeeded;
        job.stopped.insert(i, Utc::now());
        Ok(job)
    }
}
