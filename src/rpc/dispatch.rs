//! Inbound request dispatch.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use super::protocol::*;
use crate::executor::types::{IngestFileTask, SwarmTask};
use crate::swarm::Swarm;

impl Swarm {
    /// Runs the handler for `request`. Handler failures become an
    /// [`SwarmResponse::Error`] envelope; slow handlers are logged.
    pub async fn dispatch(self: &Arc<Self>, request: SwarmRequest) -> SwarmResponse {
        let kind = request.kind();
        let started = Instant::now();

        let response = match self.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(request = kind, error = %message, "Request failed");
                SwarmResponse::Error(ErrorResponse { message })
            }
        };

        let elapsed = started.elapsed();
        if elapsed > self.config.slow_handler_threshold {
            tracing::warn!(
                request = kind,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow request handler"
            );
        }
        response
    }

    async fn handle(self: &Arc<Self>, request: SwarmRequest) -> Result<SwarmResponse> {
        let response = match request {
            SwarmRequest::JoinSwarm(r) => SwarmResponse::JoinSwarm(self.handle_join_swarm(r.node).await?),
            SwarmRequest::LeaveSwarm(r) => {
                self.handle_leave_swarm(r.node).await?;
                SwarmResponse::LeaveSwarm
            }
            SwarmRequest::Heartbeat(r) => {
                self.handle_heartbeat(&r.node_id);
                SwarmResponse::Heartbeat
            }
            SwarmRequest::Ping(r) => SwarmResponse::Ping(PingResponse {
                node: self.handle_ping(r.sender),
            }),
            SwarmRequest::UpdateNode(r) => {
                self.handle_update_node(r.node, r.sender).await?;
                SwarmResponse::UpdateNode
            }
            SwarmRequest::RemoveNodes(r) => {
                self.handle_remove_nodes(r.sender, r.node_ids).await?;
                SwarmResponse::RemoveNodes
            }
            SwarmRequest::GetFailoverNominee(r) => {
                SwarmResponse::GetFailoverNominee(GetFailoverNomineeResponse {
                    nominee: self.handle_get_failover_nominee(r.sender).await,
                })
            }
            SwarmRequest::IngestFile(r) => {
                let task = IngestFileTask::create(r.local_path, &r.name);
                let task_id = task.id.to_string();
                self.queue.enqueue(SwarmTask::IngestFile(task));
                SwarmResponse::IngestFile(IngestFileResponse { task_id })
            }
            SwarmRequest::SubmitJob(r) => SwarmResponse::SubmitJob(SubmitJobResponse {
                job_id: self.handle_submit_job(&r.job).await?,
            }),
            SwarmRequest::RunJob(r) => SwarmResponse::RunJob(RunJobResponse {
                accepted: self.handle_run_job(r.task),
            }),
            SwarmRequest::SubmitTask(r) => {
                self.queue.enqueue(r.task);
                SwarmResponse::SubmitTask
            }
            SwarmRequest::SetSecret(r) => {
                self.handle_set_secret(&r.key, &r.value).await?;
                SwarmResponse::SetSecret
            }
            SwarmRequest::RemoveSecret(r) => {
                self.handle_remove_secret(&r.key).await?;
                SwarmResponse::RemoveSecret
            }
            SwarmRequest::ListSecrets(_) => SwarmResponse::ListSecrets(ListSecretsResponse {
                keys: self.handle_list_secrets().await,
            }),
            SwarmRequest::UpdateSecrets(r) => {
                self.handle_update_secrets(&r.secrets).await?;
                SwarmResponse::UpdateSecrets
            }
        };
        Ok(response)
    }
}
