//! Typed wrappers around [`Transport::send`], one per request type.

use anyhow::Result;

use super::protocol::*;
use super::transport::Transport;
use crate::error::SwarmError;
use crate::executor::types::{RunJobTask, SwarmTask};
use crate::membership::types::{Node, NodeId};

pub struct NodeClient<'a> {
    transport: &'a dyn Transport,
    addr: String,
}

impl<'a> NodeClient<'a> {
    pub fn new(transport: &'a dyn Transport, addr: impl Into<String>) -> Self {
        Self {
            transport,
            addr: addr.into(),
        }
    }

    async fn call(&self, request: SwarmRequest) -> Result<SwarmResponse> {
        match self.transport.send(&self.addr, request).await? {
            SwarmResponse::Error(ErrorResponse { message }) => Err(SwarmError::Remote {
                addr: self.addr.clone(),
                message,
            }
            .into()),
            response => Ok(response),
        }
    }

    pub async fn join_swarm(&self, node: Node) -> Result<SwarmSnapshot> {
        match self
            .call(SwarmRequest::JoinSwarm(JoinSwarmRequest { node }))
            .await?
        {
            SwarmResponse::JoinSwarm(snapshot) => Ok(snapshot),
            other => Err(unexpected("JoinSwarm", &other)),
        }
    }

    pub async fn leave_swarm(&self, node: Node) -> Result<()> {
        match self
            .call(SwarmRequest::LeaveSwarm(LeaveSwarmRequest { node }))
            .await?
        {
            SwarmResponse::LeaveSwarm => Ok(()),
            other => Err(unexpected("LeaveSwarm", &other)),
        }
    }

    pub async fn heartbeat(&self, node_id: NodeId) -> Result<()> {
        match self
            .call(SwarmRequest::Heartbeat(HeartbeatRequest { node_id }))
            .await?
        {
            SwarmResponse::Heartbeat => Ok(()),
            other => Err(unexpected("Heartbeat", &other)),
        }
    }

    /// Liveness probe. Returns the remote node's current view of itself.
    pub async fn ping(&self, sender: Option<Node>) -> Result<Node> {
        match self.call(SwarmRequest::Ping(PingRequest { sender })).await? {
            SwarmResponse::Ping(PingResponse { node }) => Ok(node),
            other => Err(unexpected("Ping", &other)),
        }
    }

    pub async fn update_node(&self, node: Node, sender: Option<NodeId>) -> Result<()> {
        match self
            .call(SwarmRequest::UpdateNode(UpdateNodeRequest { node, sender }))
            .await?
        {
            SwarmResponse::UpdateNode => Ok(()),
            other => Err(unexpected("UpdateNode", &other)),
        }
    }

    pub async fn remove_nodes(&self, sender: Option<NodeId>, node_ids: Vec<NodeId>) -> Result<()> {
        match self
            .call(SwarmRequest::RemoveNodes(RemoveNodesRequest { sender, node_ids }))
            .await?
        {
            SwarmResponse::RemoveNodes => Ok(()),
            other => Err(unexpected("RemoveNodes", &other)),
        }
    }

    pub async fn get_failover_nominee(&self, sender: Node) -> Result<Node> {
        match self
            .call(SwarmRequest::GetFailoverNominee(GetFailoverNomineeRequest {
                sender,
            }))
            .await?
        {
            SwarmResponse::GetFailoverNominee(r) => Ok(r.nominee),
            other => Err(unexpected("GetFailoverNominee", &other)),
        }
    }

    pub async fn ingest_file(&self, local_path: std::path::PathBuf, name: &str) -> Result<String> {
        match self
            .call(SwarmRequest::IngestFile(IngestFileRequest {
                local_path,
                name: name.to_string(),
            }))
            .await?
        {
            SwarmResponse::IngestFile(r) => Ok(r.task_id),
            other => Err(unexpected("IngestFile", &other)),
        }
    }

    pub async fn submit_job(&self, job: &str) -> Result<String> {
        match self
            .call(SwarmRequest::SubmitJob(SubmitJobRequest {
                job: job.to_string(),
            }))
            .await?
        {
            SwarmResponse::SubmitJob(r) => Ok(r.job_id),
            other => Err(unexpected("SubmitJob", &other)),
        }
    }

    /// Offers a job run to the remote node. `false` means the node declined.
    pub async fn run_job(&self, task: RunJobTask) -> Result<bool> {
        match self.call(SwarmRequest::RunJob(RunJobRequest { task })).await? {
            SwarmResponse::RunJob(r) => Ok(r.accepted),
            other => Err(unexpected("RunJob", &other)),
        }
    }

    pub async fn submit_task(&self, task: SwarmTask) -> Result<()> {
        match self
            .call(SwarmRequest::SubmitTask(SubmitTaskRequest { task }))
            .await?
        {
            SwarmResponse::SubmitTask => Ok(()),
            other => Err(unexpected("SubmitTask", &other)),
        }
    }

    pub async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        match self
            .call(SwarmRequest::SetSecret(SetSecretRequest {
                key: key.to_string(),
                value: value.to_string(),
            }))
            .await?
        {
            SwarmResponse::SetSecret => Ok(()),
            other => Err(unexpected("SetSecret", &other)),
        }
    }

    pub async fn remove_secret(&self, key: &str) -> Result<()> {
        match self
            .call(SwarmRequest::RemoveSecret(RemoveSecretRequest {
                key: key.to_string(),
            }))
            .await?
        {
            SwarmResponse::RemoveSecret => Ok(()),
            other => Err(unexpected("RemoveSecret", &other)),
        }
    }

    pub async fn list_secrets(&self) -> Result<Vec<String>> {
        match self
            .call(SwarmRequest::ListSecrets(ListSecretsRequest {}))
            .await?
        {
            SwarmResponse::ListSecrets(r) => Ok(r.keys),
            other => Err(unexpected("ListSecrets", &other)),
        }
    }

    pub async fn update_secrets(&self, secrets: String) -> Result<()> {
        match self
            .call(SwarmRequest::UpdateSecrets(UpdateSecretsRequest { secrets }))
            .await?
        {
            SwarmResponse::UpdateSecrets => Ok(()),
            other => Err(unexpected("UpdateSecrets", &other)),
        }
    }
}

fn unexpected(expected: &'static str, actual: &SwarmResponse) -> anyhow::Error {
    SwarmError::UnexpectedResponse {
        expected,
        actual: actual.kind().to_string(),
    }
    .into()
}
