//! Task Drain Loop
//!
//! Pulls tasks off the local [`TaskQueue`](super::queue::TaskQueue) and runs
//! them one at a time against the shared [`Swarm`] context.
//!
//! ## Responsibilities
//! - **Sequencing**: exactly one task runs at a time per node.
//! - **Isolation**: a failing task is logged and never stops the loop.
//! - **Idling**: an empty queue puts the loop to sleep for a fixed interval.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use super::types::*;
use crate::storage::sync::download_to_local;
use crate::swarm::Swarm;

/// The engine that drives task execution.
pub struct TaskExecutor {
    swarm: Arc<Swarm>,
}

impl TaskExecutor {
    pub fn new(swarm: Arc<Swarm>) -> Arc<Self> {
        Arc::new(Self { swarm })
    }

    /// Spawns the drain loop and returns immediately.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.worker_loop().await })
    }

    async fn worker_loop(&self) {
        tracing::info!("Task executor started");
        let token = self.swarm.shutdown_token();

        while !token.is_cancelled() {
            let Some(task) = self.swarm.queue.try_dequeue() else {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.swarm.config.queue_idle_poll) => {}
                }
                continue;
            };

            let task_id = task.id().to_string();
            let kind = task.kind();
            let started = Instant::now();
            match self.execute_task(task).await {
                Ok(()) => tracing::debug!(
                    task_id = %task_id,
                    kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                ),
                Err(e) => tracing::warn!(task_id = %task_id, kind, error = %format!("{:#}", e), "Task failed"),
            }
        }

        tracing::info!("Task executor stopped");
    }

    async fn execute_task(&self, task: SwarmTask) -> Result<()> {
        self.swarm.run_task(task).await
    }
}

impl Swarm {
    /// Executes one task in the calling context.
    pub async fn run_task(self: &Arc<Self>, task: SwarmTask) -> Result<()> {
        match task {
            SwarmTask::IngestFile(t) => self.run_ingest_file(t).await,
            SwarmTask::RunJob(t) => self.run_job(t).await,
            SwarmTask::ScheduleJob(t) => self.schedule_job(t).await,
            SwarmTask::SyncSwarmFiles(t) => self.sync_swarm_files(t).await,
            SwarmTask::JobFinished(t) => self.apply_job_finished(t).await,
            SwarmTask::Log(t) => {
                tracing::info!(task_id = %t.id, "{}", t.message);
                Ok(())
            }
        }
    }

    async fn run_ingest_file(&self, task: IngestFileTask) -> Result<()> {
        let Some(file) = self.store.ingest(&task.local_path, &task.name).await? else {
            return Ok(());
        };
        self.directory.update_self(|me| me.with_file(file.clone()));
        self.announce_self().await?;
        tracing::info!(name = %file.logical_name, "Registered swarm file");
        Ok(())
    }

    async fn sync_swarm_files(&self, task: SyncSwarmFilesTask) -> Result<()> {
        let other = task.other;
        // Ephemeral nodes disappear too quickly to pull from.
        if other.is_ephemeral() {
            return Ok(());
        }

        let mut downloaded = 0usize;
        for remote in other.files.values() {
            match self.store.read(&remote.logical_name).await {
                Ok(Some(local)) if !local.differs_from(remote) => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        name = %remote.logical_name,
                        error = %e,
                        "Unreadable local swarm file, deleting"
                    );
                    self.store.delete_metadata(&remote.logical_name).await?;
                }
            }

            tracing::info!(name = %remote.logical_name, from = %other.id, "Detected new swarm file");
            match download_to_local(&self.store, remote, &other, self.fetcher()).await {
                Ok(file) => {
                    self.directory.update_self(|me| me.with_file(file));
                    downloaded += 1;
                }
                Err(e) => tracing::warn!(
                    name = %remote.logical_name,
                    from = %other.id,
                    error = %format!("{:#}", e),
                    "Download failed"
                ),
            }
        }

        if downloaded > 0 {
            self.announce_self().await?;
        }
        Ok(())
    }
}
