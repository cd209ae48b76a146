// src/api/client.rs
//! HTTP client for the catalog API.
//!
//! A thin wrapper around reqwest that adds authentication, request pacing and
//! retry classification. It does not parse payloads beyond "is this JSON".

use super::pacing::RequestPacer;
use super::{CatalogApi, Endpoint};
use crate::constants::{API_ORIGIN, API_USER_AGENT, ERROR_BODY_PREVIEW_LENGTH};
use crate::error::{AppError, FetchError, FetchErrorKind};
use crate::error_recovery::{retry_with_backoff, AttemptFailure, RetryPolicy};
use crate::types::{ApiBaseUrl, ApiToken};
use reqwest::{header, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything the client needs besides the token.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: ApiBaseUrl,
    pub retry: RetryPolicy,
    /// Zero disables pacing.
    pub requests_per_second: u32,
    pub timeout: Duration,
}

/// Authenticated, retrying catalog client. Cheap to clone; clones share the
/// connection pool and the pacer.
#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    base_url: ApiBaseUrl,
    retry: RetryPolicy,
    pacer: Option<Arc<RequestPacer>>,
}

impl HttpCatalogClient {
    pub fn new(token: &ApiToken, settings: ClientSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .default_headers(Self::create_headers(token)?)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url,
            retry: settings.retry,
            pacer: RequestPacer::per_second(settings.requests_per_second).map(Arc::new),
        })
    }

    /// Creates the default headers for catalog API requests.
    fn create_headers(token: &ApiToken) -> Result<header::HeaderMap, AppError> {
        let mut headers = header::HeaderMap::new();

        let auth_header = format!("Token {}", token.as_str());
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&auth_header).map_err(|e| {
                AppError::MissingConfiguration(format!("Invalid API token format: {}", e))
            })?,
        );
        headers.insert(header::ORIGIN, header::HeaderValue::from_static(API_ORIGIN));
        headers.insert(
            header::REFERER,
            header::HeaderValue::from_str(&format!("{}/", API_ORIGIN)).map_err(|e| {
                AppError::MissingConfiguration(format!("Invalid referer: {}", e))
            })?,
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(API_USER_AGENT),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        Ok(headers)
    }

    fn endpoint_url(&self, endpoint: &Endpoint) -> Result<Url, FetchError> {
        let mut url = self.base_url.url().clone();
        url.path_segments_mut()
            .map_err(|_| {
                FetchError::rejected(endpoint.to_string(), None, "API base URL cannot be a base")
            })?
            .pop_if_empty()
            .extend(endpoint.segments())
            .push("");

        let query = endpoint.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// One request, classified.
    async fn attempt(&self, url: &Url) -> Result<serde_json::Value, AttemptFailure> {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(classify_transport_error)?;
            return serde_json::from_str(&body).map_err(|e| AttemptFailure::Permanent {
                status: Some(status.as_u16()),
                message: format!("response body is not JSON ({}): {}", e, preview(&body)),
            });
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = format!("{}: {}", status, preview(&body));

        if is_transient_status(status) {
            Err(AttemptFailure::Transient {
                status: Some(status.as_u16()),
                message,
                retry_after,
            })
        } else {
            Err(AttemptFailure::Permanent {
                status: Some(status.as_u16()),
                message,
            })
        }
    }
}

#[async_trait::async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<serde_json::Value, FetchError> {
        let url = self.endpoint_url(endpoint)?;
        log::debug!("GET {}", url);

        retry_with_backoff(&self.retry, |_| self.attempt(&url))
            .await
            .map_err(|failure| {
                let kind = match failure.last {
                    AttemptFailure::Permanent { .. } => FetchErrorKind::Rejected,
                    AttemptFailure::Transient { .. } => FetchErrorKind::Exhausted,
                };
                FetchError {
                    kind,
                    endpoint: endpoint.to_string(),
                    status: failure.last.status(),
                    attempts: failure.attempts,
                    message: failure.last.message().to_string(),
                }
            })
    }
}

/// 429, 408 and every 5xx are worth another try.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn classify_transport_error(err: reqwest::Error) -> AttemptFailure {
    if err.is_builder() || err.is_redirect() {
        AttemptFailure::Permanent {
            status: None,
            message: err.to_string(),
        }
    } else {
        // Connect failures, timeouts, resets and truncated bodies.
        AttemptFailure::Transient {
            status: None,
            message: err.to_string(),
            retry_after: None,
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn preview(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_PREVIEW_LENGTH {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(ERROR_BODY_PREVIEW_LENGTH).collect();
        format!("{}...", truncated)
    }
}
