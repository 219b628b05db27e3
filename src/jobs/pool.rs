use dashmap::DashMap;

use super::types::Job;
use crate::membership::types::NodeId;

/// Jobs known to this node, keyed by job id. Authoritative on the primary.
#[derive(Default)]
pub struct JobPool {
    jobs: DashMap<String, Job>,
}

impl JobPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, job: Job) {
        self.jobs.insert(job.id().to_string(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    pub fn remove(&self, job_id: &str) -> Option<Job> {
        self.jobs.remove(job_id).map(|(_, j)| j)
    }

    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| a.id().cmp(b.id()));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs whose current run is on `worker`.
    pub fn lost_jobs_for_worker(&self, worker: &NodeId) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|e| e.value().is_running_on(worker))
            .map(|e| e.value().clone())
            .collect()
    }
}
