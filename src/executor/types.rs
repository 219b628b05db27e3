use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::jobs::types::Job;
use crate::membership::types::{Node, NodeId};

/// Unique identifier of a queued task, prefixed with the task kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(kind: &str) -> Self {
        Self(format!("{}-{}", kind, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Background work item. The set of variants is closed; execution is a
/// `match` in [`TaskExecutor`](super::executor::TaskExecutor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "task")]
pub enum SwarmTask {
    IngestFile(IngestFileTask),
    RunJob(RunJobTask),
    ScheduleJob(ScheduleJobTask),
    SyncSwarmFiles(SyncSwarmFilesTask),
    JobFinished(JobFinishedTask),
    Log(LogTask),
}

impl SwarmTask {
    pub fn id(&self) -> &str {
        match self {
            SwarmTask::IngestFile(t) => t.id.as_str(),
            SwarmTask::RunJob(t) => t.id.as_str(),
            SwarmTask::ScheduleJob(t) => t.id.as_str(),
            SwarmTask::SyncSwarmFiles(t) => t.id.as_str(),
            SwarmTask::JobFinished(t) => t.id.as_str(),
            SwarmTask::Log(t) => t.id.as_str(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SwarmTask::IngestFile(_) => "IngestFile",
            SwarmTask::RunJob(_) => "RunJob",
            SwarmTask::ScheduleJob(_) => "ScheduleJob",
            SwarmTask::SyncSwarmFiles(_) => "SyncSwarmFiles",
            SwarmTask::JobFinished(_) => "JobFinished",
            SwarmTask::Log(_) => "Log",
        }
    }
}

/// Copies a file from this node's filesystem into the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileTask {
    pub id: TaskId,
    pub local_path: PathBuf,
    pub name: String,
}

impl IngestFileTask {
    pub fn create(local_path: PathBuf, name: &str) -> Self {
        Self {
            id: TaskId::new("IngestFileTask"),
            local_path,
            name: name.to_string(),
        }
    }
}

/// Executes one run of a job on the node that accepted it. `job` is already
/// in `Running` state with this node as the current worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobTask {
    pub id: TaskId,
    pub job: Job,
}

impl RunJobTask {
    pub fn create(job: Job) -> Self {
        Self {
            id: TaskId::new("RunJobTask"),
            job,
        }
    }
}

/// Offers a pending job to idle workers. Primary only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJobTask {
    pub id: TaskId,
    pub job: Job,
}

impl ScheduleJobTask {
    pub fn create(job: Job) -> Self {
        Self {
            id: TaskId::new("ScheduleJobTask"),
            job,
        }
    }
}

/// Pulls every file `other` advertises that is missing or different locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSwarmFilesTask {
    pub id: TaskId,
    pub other: Node,
}

impl SyncSwarmFilesTask {
    pub fn create(other: Node) -> Self {
        Self {
            id: TaskId::new("SyncSwarmFilesTask"),
            other,
        }
    }
}

/// Outcome of a job run, reported by the worker to the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFinishedTask {
    pub id: TaskId,
    /// The job as the worker ran it.
    pub job: Job,
    pub worker: NodeId,
    /// `None` on success.
    pub error: Option<String>,
}

impl JobFinishedTask {
    pub fn create(job: Job, worker: NodeId, error: Option<String>) -> Self {
        Self {
            id: TaskId::new("JobFinishedTask"),
            job,
            worker,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTask {
    pub id: TaskId,
    pub message: String,
}

impl LogTask {
    pub fn create(message: &str) -> Self {
        Self {
            id: TaskId::new("LogTask"),
            message: message.to_string(),
        }
    }
}
