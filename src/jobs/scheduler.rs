//! Job scheduling and execution.
//!
//! The primary owns the [`JobPool`](super::pool::JobPool) and offers pending
//! jobs to idle workers. A worker claims a job by flipping itself to Busy,
//! runs it in a scratch directory and reports the outcome back.

use anyhow::{Result, anyhow, bail};
use rand::seq::SliceRandom;
use std::path::Path;
use std::sync::Arc;

use super::types::{Job, JobStatus};
use crate::error::SwarmError;
use crate::executor::types::{JobFinishedTask, RunJobTask, ScheduleJobTask, SwarmTask};
use crate::jobs::parser::parse_job;
use crate::membership::types::{Node, NodeId, NodeRole, NodeStatus};
use crate::swarm::Swarm;

const RUN_LOG: &str = "job.log";

impl Swarm {
    /// Parses and registers a job, then queues it for scheduling. Forwarded
    /// to the primary when called elsewhere.
    pub async fn handle_submit_job(&self, text: &str) -> Result<String> {
        if !self.directory.is_primary() {
            let primary = self.directory.primary_node().ok_or(SwarmError::NoPrimary)?;
            return self.client_for(&primary).submit_job(text).await;
        }

        let secrets = self.secrets().await;
        let job = Job::create(parse_job(text, &secrets)?);
        let job_id = job.id().to_string();
        tracing::info!(job_id = %job_id, result = %job.config.result, "Job submitted");

        self.jobs.upsert(job.clone());
        self.queue
            .enqueue(SwarmTask::ScheduleJob(ScheduleJobTask::create(job)));
        Ok(job_id)
    }

    /// Accepts a job run if this node is an idle worker. Acceptance marks self
    /// Busy under the directory lock, so concurrent offers are rejected.
    pub fn handle_run_job(&self, task: RunJobTask) -> bool {
        let claimed = self.directory.try_update_self(|me| {
            (me.role == NodeRole::Worker && me.status == NodeStatus::Idle)
                .then(|| me.clone().with_status(NodeStatus::Busy))
        });

        if claimed.is_none() {
            tracing::info!(job_id = task.job.id(), "Rejected job, node is not an idle worker");
            return false;
        }

        tracing::info!(job_id = task.job.id(), task_id = %task.id, "Accepted job");
        self.queue.enqueue(SwarmTask::RunJob(task));
        true
    }

    /// Offers a pending job to idle workers, re-enqueueing itself after a
    /// delay if nobody accepts.
    pub(crate) async fn schedule_job(self: &Arc<Self>, task: ScheduleJobTask) -> Result<()> {
        if !self.directory.is_primary() {
            let primary = self.directory.primary_node().ok_or(SwarmError::NoPrimary)?;
            tracing::info!(job_id = task.job.id(), primary = %primary.id, "Handing scheduling to primary");
            return self
                .client_for(&primary)
                .submit_task(SwarmTask::ScheduleJob(task))
                .await;
        }

        let job = match self.jobs.get(task.job.id()) {
            Some(job) => job,
            None => {
                self.jobs.upsert(task.job.clone());
                task.job.clone()
            }
        };
        if job.status != JobStatus::Pending {
            tracing::debug!(job_id = job.id(), status = %job.status, "Job no longer pending, not scheduling");
            return Ok(());
        }

        for node in self.idle_workers() {
            let started = job.with_start(&node.id)?;
            self.jobs.upsert(started.clone());
            let run = RunJobTask::create(started.clone());

            let accepted = if &node.id == self.self_id() {
                self.handle_run_job(run)
            } else {
                match self.client_for(&node).run_job(run).await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(job_id = job.id(), node_id = %node.id, error = %e, "Offering job failed");
                        false
                    }
                }
            };

            if accepted {
                tracing::info!(job_id = job.id(), node_id = %node.id, run = started.runs, "Job scheduled");
                return Ok(());
            }
            self.jobs.upsert(job.clone());
        }

        tracing::info!(
            job_id = job.id(),
            retry_in_ms = self.config.schedule_retry_delay.as_millis() as u64,
            "No idle worker accepted job"
        );
        self.enqueue_after(
            SwarmTask::ScheduleJob(ScheduleJobTask::create(job)),
            self.config.schedule_retry_delay,
        );
        Ok(())
    }

    /// Idle worker nodes in random order, the primary last.
    fn idle_workers(&self) -> Vec<Node> {
        let mut candidates: Vec<Node> = self
            .directory
            .all()
            .into_iter()
            .filter(|n| n.role == NodeRole::Worker && n.status == NodeStatus::Idle)
            .collect();
        candidates.shuffle(&mut rand::thread_rng());

        let primary = self.directory.primary_id();
        candidates.sort_by_key(|n| Some(&n.id) == primary.as_ref());
        candidates
    }

    /// Starts a claimed run. The execution itself is detached so the task
    /// queue keeps draining; its completion always reports back.
    pub(crate) async fn run_job(self: &Arc<Self>, task: RunJobTask) -> Result<()> {
        if let Err(e) = self.announce_self().await {
            tracing::warn!(job_id = task.job.id(), error = %e, "Failed to announce busy state");
        }

        let swarm = self.clone();
        tokio::spawn(async move {
            let execution = {
                let swarm = swarm.clone();
                let task = task.clone();
                tokio::spawn(async move { swarm.execute_job(&task).await })
            };
            let outcome = match execution.await {
                Ok(outcome) => outcome,
                Err(e) => Err(anyhow!("job run aborted: {}", e)),
            };
            swarm.finish_job(&task, outcome).await;
        });
        Ok(())
    }

    async fn execute_job(&self, task: &RunJobTask) -> Result<()> {
        let dir = self.config.scratch_dir().join(task.id.as_str());
        if tokio::fs::try_exists(&dir).await? {
            tracing::warn!(dir = %dir.display(), "Job directory already exists");
        }
        tokio::fs::create_dir_all(&dir).await?;

        let outcome = self.execute_in(task, &dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove job directory");
        }
        outcome
    }

    async fn execute_in(&self, task: &RunJobTask, dir: &Path) -> Result<()> {
        let config = &task.job.config;
        let mut log = String::new();

        for name in &config.setup {
            let file = self
                .store
                .read(name)
                .await?
                .ok_or_else(|| SwarmError::NotFound(format!("swarm file {}", name)))?;
            tracing::info!(job_id = %config.id, name = %name, "Extracting setup file");
            self.sandbox
                .extract(&self.store.content_path(&file)?, dir)
                .await?;
        }

        let steps = config.execute.len();
        let mut failed = 0usize;
        for (i, item) in config.execute.iter().enumerate() {
            tracing::info!(job_id = %config.id, step = i + 1, steps, exe = %item.exe, args = %item.args, "Executing");
            log.push_str(&format!("[{}/{}] {} {}\n", i + 1, steps, item.exe, item.args));
            match self.sandbox.run(&item.exe, &item.args, dir).await {
                Ok(output) => {
                    log.push_str(&output.stdout);
                    log.push_str(&output.stderr);
                    log.push_str(&format!("exit {}\n", output.exit_code));
                    if !output.success() {
                        failed += 1;
                    }
                }
                Err(e) => {
                    log.push_str(&format!("error: {:#}\n", e));
                    failed += 1;
                }
            }
        }
        tokio::fs::write(dir.join(RUN_LOG), &log).await?;

        let mut collect = config.collect.clone();
        collect.push(RUN_LOG.to_string());
        let archive = self
            .config
            .scratch_dir()
            .join(format!("{}.zip", task.id.as_str()));
        self.sandbox.zip(dir, &collect, &archive).await?;

        let ingested = self.store.ingest(&archive, &config.result).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            tracing::warn!(archive = %archive.display(), error = %e, "Failed to remove result archive");
        }
        if let Some(file) = ingested? {
            self.directory.update_self(|me| me.with_file(file));
        }

        if failed > 0 {
            bail!("{} of {} steps failed", failed, steps);
        }
        Ok(())
    }

    /// Marks self idle again and reports the run's outcome to the primary.
    async fn finish_job(self: &Arc<Self>, task: &RunJobTask, outcome: Result<()>) {
        let error = outcome.err().map(|e| format!("{:#}", e));
        match &error {
            None => tracing::info!(job_id = task.job.id(), "Job run succeeded"),
            Some(e) => tracing::warn!(job_id = task.job.id(), error = %e, "Job run failed"),
        }

        self.directory
            .update_self(|me| me.with_status(NodeStatus::Idle));
        if let Err(e) = self.announce_self().await {
            tracing::warn!(error = %e, "Failed to announce idle state");
        }

        let report = SwarmTask::JobFinished(JobFinishedTask::create(
            task.job.clone(),
            self.self_id().clone(),
            error,
        ));

        if self.directory.is_primary() {
            self.queue.enqueue(report);
            return;
        }
        let Some(primary) = self.directory.primary_node() else {
            tracing::warn!(job_id = task.job.id(), "No primary to report job outcome to");
            return;
        };
        if let Err(e) = self.client_for(&primary).submit_task(report).await {
            tracing::warn!(job_id = task.job.id(), error = %e, "Failed to report job outcome");
        }
    }

    /// Applies a worker's report to the pool and reschedules if retries remain.
    pub(crate) async fn apply_job_finished(&self, report: JobFinishedTask) -> Result<()> {
        if !self.directory.is_primary() {
            let primary = self.directory.primary_node().ok_or(SwarmError::NoPrimary)?;
            return self
                .client_for(&primary)
                .submit_task(SwarmTask::JobFinished(report))
                .await;
        }

        let current = self
            .jobs
            .get(report.job.id())
            .unwrap_or_else(|| report.job.clone());
        if !current.is_running_on(&report.worker) {
            tracing::warn!(
                job_id = current.id(),
                worker = %report.worker,
                status = %current.status,
                "Ignoring outcome from a worker that no longer owns the job"
            );
            return Ok(());
        }

        let updated = match &report.error {
            None => current.with_succeeded()?,
            Some(error) => current.with_failed(error)?,
        };
        tracing::info!(job_id = updated.id(), status = %updated.status, runs = updated.runs, "Job run finished");
        self.reschedule_if_pending(updated);
        Ok(())
    }

    /// Returns jobs running on vanished workers to the pool.
    pub async fn handle_lost_workers(&self, lost: &[NodeId]) {
        for node_id in lost {
            let jobs = self.jobs.lost_jobs_for_worker(node_id);
            if jobs.is_empty() {
                continue;
            }
            tracing::warn!(node_id = %node_id, jobs = jobs.len(), "Lost active jobs on node");

            for job in jobs {
                match job.with_lost_node(node_id) {
                    Ok(updated) => self.reschedule_if_pending(updated),
                    Err(e) => tracing::error!(job_id = job.id(), error = %e, "Cannot release job"),
                }
            }
        }
    }

    fn reschedule_if_pending(&self, job: Job) {
        self.jobs.upsert(job.clone());
        if job.status == JobStatus::Pending {
            tracing::info!(job_id = job.id(), "Rescheduling job");
            self.queue
                .enqueue(SwarmTask::ScheduleJob(ScheduleJobTask::create(job)));
        }
    }
}
