//! Byte-range streaming of swarm files
//!
//! Serves one [`MediaFile`] as a 200 full response or a 206 partial response.
//! The first chunk is read before headers are built so an early read failure
//! can still become a proper error response. After that the body is owned by
//! [`GuardedBody`], which drops the backend read the moment the client goes
//! away.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, error, info};
use undertow_core::UndertowError;
use undertow_core::config::StreamingConfig;
use undertow_core::streaming::{ByteRange, ByteStream, RangeError, parse_range_header};
use undertow_core::swarm::MediaFile;

use crate::ApiError;

/// Resolves the optional `Range` header against `file_length`.
///
/// # Errors
/// - `ApiError::RangeNotSatisfiable` - Header present but unusable
pub fn requested_range(
    header: Option<&HeaderValue>,
    file_length: u64,
) -> Result<Option<ByteRange>, ApiError> {
    let Some(value) = header else {
        return Ok(None);
    };

    let parsed = match value.to_str() {
        Ok(text) => parse_range_header(text, file_length),
        Err(_) => Err(RangeError::Malformed {
            header: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        }),
    };

    parsed
        .map(Some)
        .map_err(|reason| ApiError::RangeNotSatisfiable {
            reason,
            file_length,
        })
}

/// Streams `media`, honouring an optional `Range` header.
///
/// # Errors
/// - `ApiError::RangeNotSatisfiable` - Malformed or out-of-bounds range
/// - `ApiError::Undertow` - The read could not be opened or failed before
///   the first byte
pub async fn serve_range(
    media: &MediaFile,
    range_header: Option<&HeaderValue>,
    config: &StreamingConfig,
) -> Result<Response, ApiError> {
    let file_length = media.length();
    let range = requested_range(range_header, file_length)?;

    let mut stream = media.file.open(range)?;
    let first_chunk = match stream.next().await {
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(e)) => {
            error!("Streaming error before headers for {}: {}", media.name(), e);
            return Err(UndertowError::Io(e).into());
        }
        None => None,
    };

    let content_length = range.map_or(file_length, |range| range.len());
    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, config.content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::ACCEPT_RANGES, "bytes");

    response = match range {
        Some(range) => {
            debug!("Serving {} bytes {} of {}", media.name(), range, file_length);
            response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, range.content_range(file_length))
        }
        None => {
            debug!("Serving full {} ({} bytes)", media.name(), file_length);
            response.status(StatusCode::OK)
        }
    };

    let body = GuardedBody::new(media.name(), first_chunk, stream, content_length);
    Ok(response.body(Body::from_stream(body))?)
}

/// Response body that owns the backend read stream.
///
/// Ends after exactly `remaining` bytes. Dropping it early means the client
/// disconnected; the backend stream is dropped with it.
pub struct GuardedBody {
    file_name: String,
    pending: Option<Bytes>,
    inner: Option<ByteStream>,
    remaining: u64,
    delivered: u64,
}

impl GuardedBody {
    pub fn new(
        file_name: impl Into<String>,
        first_chunk: Option<Bytes>,
        inner: ByteStream,
        length: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            pending: first_chunk,
            inner: Some(inner),
            remaining: length,
            delivered: 0,
        }
    }

    fn emit(&mut self, mut chunk: Bytes) -> Bytes {
        if chunk.len() as u64 > self.remaining {
            chunk.truncate(self.remaining as usize);
        }
        self.remaining -= chunk.len() as u64;
        self.delivered += chunk.len() as u64;
        if self.remaining == 0 {
            self.finish();
        }
        chunk
    }

    fn finish(&mut self) {
        if self.inner.take().is_some() {
            debug!(
                "Finished streaming {} ({} bytes)",
                self.file_name, self.delivered
            );
        }
    }
}

impl Stream for GuardedBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.pending.take() {
            return Poll::Ready(Some(Ok(this.emit(chunk))));
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(this.emit(chunk)))),
            Poll::Ready(Some(Err(e))) => {
                // Headers are out; the connection is torn down instead of
                // writing an error body.
                error!(
                    "Streaming error for {} after {} bytes: {}",
                    this.file_name, this.delivered, e
                );
                this.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if this.remaining > 0 {
                    error!(
                        "Stream for {} ended {} bytes short",
                        this.file_name, this.remaining
                    );
                }
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GuardedBody {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            info!(
                "Client disconnected, stream destroyed: {} after {} bytes",
                self.file_name, self.delivered
            );
        }
    }
}
