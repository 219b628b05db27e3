//! Network Protocol Definitions
//!
//! Every inter-node call is one JSON envelope `{"type": ..., "payload": ...}`
//! posted to [`ENDPOINT_API`]. The set of request types is closed; dispatch is a
//! plain `match` over [`SwarmRequest`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::executor::types::{RunJobTask, SwarmTask};
use crate::membership::types::{Node, NodeId};

pub const ENDPOINT_API: &str = "/api";
pub const ENDPOINT_VERSION: &str = "/version";
/// Prefix under which a node serves files from its working directory.
pub const ENDPOINT_STATIC: &str = "/static";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SwarmRequest {
    JoinSwarm(JoinSwarmRequest),
    LeaveSwarm(LeaveSwarmRequest),
    Heartbeat(HeartbeatRequest),
    Ping(PingRequest),
    UpdateNode(UpdateNodeRequest),
    RemoveNodes(RemoveNodesRequest),
    GetFailoverNominee(GetFailoverNomineeRequest),
    IngestFile(IngestFileRequest),
    SubmitJob(SubmitJobRequest),
    RunJob(RunJobRequest),
    SubmitTask(SubmitTaskRequest),
    SetSecret(SetSecretRequest),
    RemoveSecret(RemoveSecretRequest),
    ListSecrets(ListSecretsRequest),
    UpdateSecrets(UpdateSecretsRequest),
}

impl SwarmRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            SwarmRequest::JoinSwarm(_) => "JoinSwarm",
            SwarmRequest::LeaveSwarm(_) => "LeaveSwarm",
            SwarmRequest::Heartbeat(_) => "Heartbeat",
            SwarmRequest::Ping(_) => "Ping",
            SwarmRequest::UpdateNode(_) => "UpdateNode",
            SwarmRequest::RemoveNodes(_) => "RemoveNodes",
            SwarmRequest::GetFailoverNominee(_) => "GetFailoverNominee",
            SwarmRequest::IngestFile(_) => "IngestFile",
            SwarmRequest::SubmitJob(_) => "SubmitJob",
            SwarmRequest::RunJob(_) => "RunJob",
            SwarmRequest::SubmitTask(_) => "SubmitTask",
            SwarmRequest::SetSecret(_) => "SetSecret",
            SwarmRequest::RemoveSecret(_) => "RemoveSecret",
            SwarmRequest::ListSecrets(_) => "ListSecrets",
            SwarmRequest::UpdateSecrets(_) => "UpdateSecrets",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SwarmResponse {
    JoinSwarm(SwarmSnapshot),
    LeaveSwarm,
    Heartbeat,
    Ping(PingResponse),
    UpdateNode,
    RemoveNodes,
    GetFailoverNominee(GetFailoverNomineeResponse),
    IngestFile(IngestFileResponse),
    SubmitJob(SubmitJobResponse),
    RunJob(RunJobResponse),
    SubmitTask,
    SetSecret,
    RemoveSecret,
    ListSecrets(ListSecretsResponse),
    UpdateSecrets,
    /// The handler failed; `message` carries the error chain.
    Error(ErrorResponse),
}

impl SwarmResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            SwarmResponse::JoinSwarm(_) => "JoinSwarm",
            SwarmResponse::LeaveSwarm => "LeaveSwarm",
            SwarmResponse::Heartbeat => "Heartbeat",
            SwarmResponse::Ping(_) => "Ping",
            SwarmResponse::UpdateNode => "UpdateNode",
            SwarmResponse::RemoveNodes => "RemoveNodes",
            SwarmResponse::GetFailoverNominee(_) => "GetFailoverNominee",
            SwarmResponse::IngestFile(_) => "IngestFile",
            SwarmResponse::SubmitJob(_) => "SubmitJob",
            SwarmResponse::RunJob(_) => "RunJob",
            SwarmResponse::SubmitTask => "SubmitTask",
            SwarmResponse::SetSecret => "SetSecret",
            SwarmResponse::RemoveSecret => "RemoveSecret",
            SwarmResponse::ListSecrets(_) => "ListSecrets",
            SwarmResponse::UpdateSecrets => "UpdateSecrets",
            SwarmResponse::Error(_) => "Error",
        }
    }
}

// --- Membership ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSwarmRequest {
    pub node: Node,
}

/// Everything a joining node needs to build its own view of the swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    pub primary: Option<NodeId>,
    pub nodes: Vec<Node>,
    /// Encoded secrets blob, opaque to the membership layer.
    pub secrets: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveSwarmRequest {
    pub node: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub sender: Option<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub node: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNodeRequest {
    pub node: Node,
    #[serde(default)]
    pub sender: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveNodesRequest {
    pub sender: Option<NodeId>,
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFailoverNomineeRequest {
    pub sender: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFailoverNomineeResponse {
    pub nominee: Node,
}

// --- Swarm files ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileRequest {
    /// Path on the receiving node's filesystem.
    pub local_path: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileResponse {
    pub task_id: String,
}

// --- Jobs and tasks ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    /// Job description text.
    pub job: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobRequest {
    pub task: RunJobTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub task: SwarmTask,
}

// --- Secrets ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSecretRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveSecretRequest {
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSecretsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSecretsResponse {
    /// Key names only; values never leave the node through this call.
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSecretsRequest {
    pub secrets: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
