//! Client for the sundhed.dk labsvar API.
//!
//! The caller's session headers are forwarded opaquely; this server never
//! logs in on its own.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use dhroxy_core::RawHeaders;
use std::time::Duration;
use thiserror::Error;

/// Session headers labsvar needs, in the order they are sent.
pub const AUTH_HEADERS: &[&str] = &["cookie", "x-xsrf-token", "conversation-uuid", "user-agent"];

/// Callers behind a proxy that rewrites these headers can send them with this
/// prefix instead. The prefixed form wins when both are present.
pub const FORWARDED_PREFIX: &str = "x-sundhed-";

/// Raw upstream reply. The body is not interpreted here.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("labsvar did not answer in time: {0}")]
    Timeout(String),

    #[error("labsvar request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetch the result overview for `terms`, authenticated with the
    /// session headers found in `headers`.
    async fn fetch(
        &self,
        headers: &RawHeaders,
        terms: &[(&'static str, String)],
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Pick the session headers to send upstream.
///
/// Multiple cookie values are joined the way a browser would send them; for
/// the other headers only the first value is used.
pub fn session_headers(headers: &RawHeaders) -> Vec<(&'static str, String)> {
    AUTH_HEADERS
        .iter()
        .filter_map(|&name| {
            let values = headers
                .get(&format!("{}{}", FORWARDED_PREFIX, name))
                .or_else(|| headers.get(name))
                .filter(|values| !values.is_empty())?;
            let value = if name == "cookie" {
                values.join("; ")
            } else {
                values[0].clone()
            };
            Some((name, value))
        })
        .collect()
}

/// reqwest-backed [`UpstreamClient`].
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    url: String,
}

impl HttpUpstreamClient {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch(
        &self,
        headers: &RawHeaders,
        terms: &[(&'static str, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let session = session_headers(headers);
        if session.is_empty() {
            tracing::debug!("No session headers on request, labsvar will likely refuse it");
        }

        let mut request = self
            .client
            .get(&self.url)
            .query(terms)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in session {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!(
            url = %self.url,
            status = status.as_u16(),
            bytes = body.len(),
            "labsvar responded"
        );

        Ok(UpstreamResponse { status, body })
    }
}
