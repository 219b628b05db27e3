//! RPC Module Tests
//!
//! ## Test Scopes
//! - **Envelope**: JSON shape of requests and responses.
//! - **Dispatch**: handler errors become error envelopes.
//! - **Client**: error envelopes surface as typed errors.
//! - **HTTP handlers**: status codes and static file access.
//! - **Transport**: timed out requests are not resent, call timeout cap.

#[cfg(test)]
mod tests {
    use crate::error::SwarmError;
    use crate::membership::types::NodeId;
    use crate::config::NodeConfig;
    use crate::rpc::handlers::{handle_api, handle_static};
    use crate::rpc::transport::{HttpTransport, Transport};
    use crate::rpc::protocol::*;
    use crate::testing::{LocalNetwork, create_node, join_node, test_config};
    use axum::body::to_bytes;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    // ============================================================
    // ENVELOPE TESTS
    // ============================================================

    #[test]
    fn test_request_envelope_shape() {
        let request = SwarmRequest::SetSecret(SetSecretRequest {
            key: "K".to_string(),
            value: "V".to_string(),
        });

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({"type": "SetSecret", "payload": {"key": "K", "value": "V"}})
        );
    }

    #[test]
    fn test_unit_response_has_no_payload() {
        let value = serde_json::to_value(SwarmResponse::Heartbeat).unwrap();
        assert_eq!(value, json!({"type": "Heartbeat"}));

        let parsed: SwarmResponse = serde_json::from_value(json!({"type": "UpdateSecrets"})).unwrap();
        assert_eq!(parsed.kind(), "UpdateSecrets");
    }

    #[test]
    fn test_unknown_request_type_is_rejected() {
        let parsed = serde_json::from_value::<SwarmRequest>(json!({"type": "Reboot", "payload": {}}));
        assert!(parsed.is_err());
    }

    // ============================================================
    // DISPATCH TESTS
    // ============================================================

    #[tokio::test]
    async fn test_handler_error_becomes_error_envelope() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;

        let response = a
            .dispatch(SwarmRequest::SubmitJob(SubmitJobRequest {
                job: "SETUP only.zip".to_string(),
            }))
            .await;

        match response {
            SwarmResponse::Error(e) => assert!(e.message.contains("RESULT")),
            other => panic!("expected error, got {}", other.kind()),
        }
        assert!(a.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_request_is_queued() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;

        let response = a
            .dispatch(SwarmRequest::IngestFile(IngestFileRequest {
                local_path: dir.path().join("input.bin"),
                name: "inputs/input".to_string(),
            }))
            .await;

        let SwarmResponse::IngestFile(IngestFileResponse { task_id }) = response else {
            panic!("expected IngestFile response");
        };
        assert!(task_id.starts_with("IngestFile-"));
        assert_eq!(a.queue.pending_ids(), vec![task_id]);
    }

    // ============================================================
    // CLIENT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_client_maps_error_envelope() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;

        let err = a.client("localhost:7001").submit_job("nonsense").await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SwarmError>(),
            Some(SwarmError::Remote { addr, .. }) if addr == "localhost:7001"
        ));
    }

    #[tokio::test]
    async fn test_client_calls_round_trip() {
        let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir_a.path())).await;
        let b = join_node(&net, test_config("node-b", "localhost", 7002, dir_b.path()), &a).await;
        let client = b.client("localhost:7001");

        let pong = client.ping(None).await.unwrap();
        client.heartbeat(b.self_id().clone()).await.unwrap();
        let nominee = client.get_failover_nominee(b.directory.self_node()).await.unwrap();
        client.set_secret("K", "V").await.unwrap();
        let keys = client.list_secrets().await.unwrap();

        assert_eq!(pong.id, NodeId::from("node-a"));
        assert_eq!(nominee.id, NodeId::from("node-a"));
        assert_eq!(keys, vec!["K".to_string()]);
    }

    #[tokio::test]
    async fn test_client_to_unknown_address_fails() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;

        assert!(a.client("localhost:9999").ping(None).await.is_err());
    }

    // ============================================================
    // HTTP HANDLER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_api_status_codes() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;

        let (ok, Json(pong)) = handle_api(
            Extension(a.clone()),
            Json(SwarmRequest::Ping(PingRequest { sender: None })),
        )
        .await;
        let (failed, _) = handle_api(
            Extension(a.clone()),
            Json(SwarmRequest::SubmitJob(SubmitJobRequest { job: String::new() })),
        )
        .await;

        assert_eq!(ok, StatusCode::OK);
        assert_eq!(pong.kind(), "Ping");
        assert_eq!(failed, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_static_serves_content_store_only() {
        // ARRANGE
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;
        let source = dir.path().join("data.txt");
        tokio::fs::write(&source, b"hello").await.unwrap();
        let file = a.store.ingest(&source, "data").await.unwrap().unwrap();
        a.handle_set_secret("K", "V").await.unwrap();

        // ACT
        let content = handle_static(
            Extension(a.clone()),
            Path(format!("files/data/{}", file.file_name)),
        )
        .await;
        let secrets = handle_static(Extension(a.clone()), Path("secrets.json".to_string())).await;
        let escape = handle_static(Extension(a.clone()), Path("files/../secrets.json".to_string())).await;
        let missing = handle_static(Extension(a.clone()), Path("files/none/file.json".to_string())).await;

        // ASSERT
        assert_eq!(content.status(), StatusCode::OK);
        let body = to_bytes(content.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(secrets.status(), StatusCode::NOT_FOUND);
        assert_eq!(escape.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    // ============================================================
    // TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_timed_out_request_is_not_resent() {
        // ARRANGE: a peer that accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        let transport = HttpTransport::new(Duration::from_millis(200));

        // ACT
        let result = transport
            .send(&addr, SwarmRequest::SubmitJob(SubmitJobRequest { job: "RESULT r.zip".to_string() }))
            .await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        // ASSERT
        assert!(result.is_err());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refused_connection_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let transport = HttpTransport::new(Duration::from_millis(500));

        let result = transport.send(&addr, SwarmRequest::Ping(PingRequest { sender: None })).await;

        assert!(result.is_err());
    }

    #[test]
    fn test_call_timeout_stays_below_node_timeout() {
        let defaults = NodeConfig::default();
        assert!(defaults.call_timeout() * 3 <= defaults.node_timeout);

        let slow = NodeConfig {
            rpc_timeout: Duration::from_secs(60),
            node_timeout: Duration::from_secs(15),
            ..NodeConfig::default()
        };
        assert_eq!(slow.call_timeout(), Duration::from_secs(5));
    }
}
