//! Stream handlers: swarm resolution, cloud proxy and swarm file delivery

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{Json, Response};
use serde::{Deserialize, Serialize};
use tracing::info;
use undertow_core::{LinkError, LinkKind, UndertowError};

use crate::ApiError;
use crate::server::AppState;
use crate::streaming::{serve_cloud_file, serve_range};

/// Body of `POST /stream`
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub link: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub stream_url: String,
}

/// Query of `GET /stream`
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub link: Option<String>,
}

/// Resolves a swarm link to a stream URL once its metadata is known.
///
/// An unreadable body counts as a missing link.
///
/// # Errors
/// - 400 - Link missing or not a swarm identifier, or no media file in the resource
/// - 500 - Swarm engine failure or readiness timeout
pub async fn create_stream(
    State(state): State<AppState>,
    payload: Result<Json<StreamRequest>, JsonRejection>,
) -> Result<Json<StreamResponse>, ApiError> {
    let link = payload.ok().and_then(|Json(request)| request.link);
    let identifier = link.as_deref();

    match state.classifier.classify_required(identifier)? {
        LinkKind::Swarm => {}
        _ => return Err(LinkError::SwarmOnly.into()),
    }
    let identifier = identifier.unwrap_or_default();

    info!("Detected swarm link: {}", identifier);
    let media = state
        .swarm
        .prepare_stream(identifier, state.config.swarm.ready_timeout)
        .await?;

    let stream_url = format!(
        "{}/stream/torrent/{}",
        state.public_url,
        urlencoding::encode(media.name())
    );
    Ok(Json(StreamResponse { stream_url }))
}

/// Proxies a cloud-hosted file named by the `link` query parameter.
///
/// # Errors
/// - 400 - Link missing, unsupported or without a file id
/// - 500 - Remote fetch failed
pub async fn proxy_cloud_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    match state.classifier.classify_required(query.link.as_deref())? {
        LinkKind::CloudFile { file_id } => {
            serve_cloud_file(&state.http, &state.config.cloud, &file_id).await
        }
        LinkKind::Unsupported { reason } => Err(LinkError::from(reason).into()),
        LinkKind::Swarm => Err(LinkError::Unsupported.into()),
    }
}

/// Streams a file from a ready swarm job, honouring `Range`.
///
/// # Errors
/// - 404 - No ready job lists a file with this name
/// - 416 - Unusable range
/// - 500 - The read failed before the first byte
pub async fn stream_torrent(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let media = state
        .swarm
        .find_file(&filename)
        .ok_or(UndertowError::FileNotFound { name: filename })?;

    serve_range(&media, headers.get(header::RANGE), &state.config.streaming).await
}
