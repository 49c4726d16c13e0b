//! Pass-through proxy for cloud-hosted files.

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use futures::TryStreamExt;
use tracing::{info, warn};
use undertow_core::UndertowError;
use undertow_core::config::CloudConfig;
use url::Url;

use crate::ApiError;

/// Direct-download URL for `file_id` under `base`.
///
/// # Errors
/// - `url::ParseError` - `base` is not an absolute URL
pub fn direct_download_url(base: &str, file_id: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("id", file_id)
        .append_pair("export", "download");
    Ok(url)
}

/// Fetches the cloud file and pipes its body through with inline disposition.
///
/// # Errors
/// - `UndertowError::Configuration` - Download base URL is invalid
/// - `UndertowError::CloudFetch` - Remote fetch failed or returned a non-success status
pub async fn serve_cloud_file(
    client: &reqwest::Client,
    config: &CloudConfig,
    file_id: &str,
) -> Result<Response, ApiError> {
    let url = direct_download_url(&config.download_base_url, file_id).map_err(|e| {
        UndertowError::Configuration {
            reason: format!("invalid cloud download base URL: {e}"),
        }
    })?;

    info!("Proxying cloud file {} from {}", file_id, url);

    let upstream = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| UndertowError::CloudFetch {
            reason: e.to_string(),
        })?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    let file_id = file_id.to_string();
    let body = upstream.bytes_stream().inspect_err(move |e| {
        warn!("Cloud stream for {} interrupted: {}", file_id, e);
    });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, "inline")
        .body(Body::from_stream(body))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_download_url() {
        let url = direct_download_url("https://drive.google.com/uc", "XYZ").unwrap();
        assert_eq!(
            url.as_str(),
            "https://drive.google.com/uc?id=XYZ&export=download"
        );
    }

    #[test]
    fn test_invalid_base_rejected() {
        assert!(direct_download_url("not a url", "XYZ").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_500() {
        let config = CloudConfig {
            // Port 9 (discard) is closed on test hosts
            download_base_url: "http://127.0.0.1:9/uc".to_string(),
            ..CloudConfig::default()
        };

        let error = serve_cloud_file(&reqwest::Client::new(), &config, "XYZ")
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
