//! HTTP surface of a node.
//!
//! - `POST /api`: one [`SwarmRequest`] envelope in, one [`SwarmResponse`] out.
//! - `GET /version`: crate version.
//! - `GET /static/files/*path`: the content store, used by peers to pull
//!   swarm file content and metadata.

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::path::Component;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::protocol::{ENDPOINT_API, ENDPOINT_VERSION, SwarmRequest, SwarmResponse};
use crate::config::{FILES_DIR, VERSION};
use crate::swarm::Swarm;

pub fn router(swarm: Arc<Swarm>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route(ENDPOINT_API, post(handle_api))
        .route(ENDPOINT_VERSION, get(handle_version))
        .route("/static/*path", get(handle_static))
        .layer(Extension(swarm))
}

async fn handle_root(Extension(swarm): Extension<Arc<Swarm>>) -> String {
    format!("swarm node {} (v{})", swarm.self_id(), VERSION)
}

async fn handle_version() -> &'static str {
    VERSION
}

pub async fn handle_api(
    Extension(swarm): Extension<Arc<Swarm>>,
    Json(request): Json<SwarmRequest>,
) -> (StatusCode, Json<SwarmResponse>) {
    let response = swarm.dispatch(request).await;
    let status = match response {
        SwarmResponse::Error(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(response))
}

pub async fn handle_static(
    Extension(swarm): Extension<Arc<Swarm>>,
    Path(path): Path<String>,
) -> Response {
    let relative = std::path::Path::new(&path);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return StatusCode::BAD_REQUEST.into_response();
    }
    // Only the content store is public; secrets live next to it.
    if !relative.starts_with(FILES_DIR) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let full = swarm.config.workdir.join(relative);
    match tokio::fs::File::open(&full).await {
        Ok(file) => {
            let body = Body::from_stream(ReaderStream::new(file));
            ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to serve static file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
