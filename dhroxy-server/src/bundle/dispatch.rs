//! Sub-request dispatch for transaction entries.
//!
//! Each entry becomes a synthetic GET against this server's own resource
//! router, executed in memory. A failing entry yields an OperationOutcome in
//! its slot and never affects its siblings.

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Method, Request, StatusCode},
};
use dhroxy_core::{OperationOutcome, RawHeaders, Resource, parse_query_pairs};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use thiserror::Error;
use tower::ServiceExt;

use crate::FHIR_BASE;

/// Request headers never copied onto sub-requests.
pub const EXCLUDED_HEADERS: &[&str] = &[
    "accept-encoding",
    "content-length",
    "content-type",
    "host",
    "connection",
];

/// One `entry.request` of an incoming transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEntry {
    pub method: Option<String>,
    pub url: Option<String>,
}

/// Outcome of one entry, in the position of its entry.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub resource: Value,
    pub status: StatusCode,
}

impl BatchResult {
    /// `"<code> <reason>"`, as written into `entry.response.status`.
    pub fn status_line(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_u16(), reason),
            None => self.status.as_u16().to_string(),
        }
    }
}

/// Status and body of a nested response, fully buffered.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("entry has no request method")]
    MissingMethod,

    #[error("method {0} is not supported, only GET")]
    UnsupportedMethod(String),

    #[error("entry has no request url")]
    MissingUrl,

    #[error("request url names no resource type")]
    MissingResourceType,

    #[error("could not build request: {0}")]
    InvalidRequest(String),

    #[error("could not read response body: {0}")]
    Body(String),

    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("response is not a FHIR resource: {0}")]
    InvalidResource(#[source] serde_json::Error),
}

/// Where synthetic requests are sent.
#[async_trait]
pub trait InternalEntryPoint: Send + Sync {
    async fn dispatch(&self, request: Request<Body>) -> Result<CapturedResponse, DispatchError>;
}

/// The resource router, driven in memory without a socket.
#[derive(Clone)]
pub struct ServingPipeline {
    router: Router,
}

impl ServingPipeline {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl InternalEntryPoint for ServingPipeline {
    async fn dispatch(&self, request: Request<Body>) -> Result<CapturedResponse, DispatchError> {
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| DispatchError::Body(e.to_string()))?
            .to_bytes();
        Ok(CapturedResponse {
            status: parts.status,
            body,
        })
    }
}

/// What a relative entry URL asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Read {
        resource_type: String,
        id: String,
    },
    Search {
        resource_type: String,
        params: Vec<(String, String)>,
    },
}

impl Interaction {
    /// `Observation/lab-1` is a read; `Observation`, `Observation?date=..`
    /// and an id with a query are searches. Query pairs are decoded here so
    /// raw characters such as spaces never reach the request line.
    pub fn parse(url: &str) -> Result<Self, DispatchError> {
        let url = url.trim_start_matches('/');
        let (path, params) = match url.split_once('?') {
            Some((path, query)) => (path, parse_query_pairs(query)),
            None => (url, Vec::new()),
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let resource_type = segments
            .next()
            .ok_or(DispatchError::MissingResourceType)?
            .to_string();

        Ok(match segments.next() {
            Some(id) if params.is_empty() => Interaction::Read {
                resource_type,
                id: id.to_string(),
            },
            _ => Interaction::Search {
                resource_type,
                params,
            },
        })
    }

    /// Path and query on the internal router, percent-encoded.
    pub fn uri(&self) -> String {
        match self {
            Interaction::Read { resource_type, id } => format!(
                "{}/{}/{}",
                FHIR_BASE,
                urlencoding::encode(resource_type),
                urlencoding::encode(id)
            ),
            Interaction::Search {
                resource_type,
                params,
            } => {
                let path = format!("{}/{}", FHIR_BASE, urlencoding::encode(resource_type));
                if params.is_empty() {
                    return path;
                }
                let query = params
                    .iter()
                    .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&");
                format!("{}?{}", path, query)
            }
        }
    }
}

/// Headers of the outer request that sub-requests inherit, flattened in
/// arrival order.
pub fn forwardable_headers(headers: &RawHeaders) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !EXCLUDED_HEADERS.contains(&name.as_str()))
        .flat_map(|(name, values)| values.iter().map(move |v| (name.clone(), v.clone())))
        .collect()
}

pub struct SubRequestDispatcher<E> {
    entry_point: E,
}

impl<E: InternalEntryPoint> SubRequestDispatcher<E> {
    pub fn new(entry_point: E) -> Self {
        Self { entry_point }
    }

    /// Run every entry in order. The result list has one element per entry.
    pub async fn execute(&self, entries: &[BatchEntry], headers: &RawHeaders) -> Vec<BatchResult> {
        let forwarded = forwardable_headers(headers);
        let mut results = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let result = match self.execute_entry(entry, &forwarded).await {
                Ok((resource, status)) => BatchResult { resource, status },
                Err(err) => {
                    let url = entry.url.as_deref().unwrap_or("");
                    tracing::warn!(index, url, error = %err, "Transaction entry failed");
                    BatchResult {
                        resource: json!(OperationOutcome::exception(format!(
                            "Failed to fetch {}: {}",
                            url, err
                        ))),
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                    }
                }
            };
            results.push(result);
        }

        results
    }

    async fn execute_entry(
        &self,
        entry: &BatchEntry,
        forwarded: &[(String, String)],
    ) -> Result<(Value, StatusCode), DispatchError> {
        let method = entry.method.as_deref().ok_or(DispatchError::MissingMethod)?;
        if !method.eq_ignore_ascii_case("GET") {
            return Err(DispatchError::UnsupportedMethod(method.to_string()));
        }
        let url = entry.url.as_deref().ok_or(DispatchError::MissingUrl)?;
        let interaction = Interaction::parse(url)?;

        let uri = interaction.uri();
        let mut builder = Request::builder().method(Method::GET).uri(uri.as_str());
        for (name, value) in forwarded {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(Body::empty())
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;

        tracing::debug!(uri = %uri, "Dispatching transaction entry");
        let captured = self.entry_point.dispatch(request).await?;

        if !captured.status.is_success() {
            return Err(DispatchError::Status {
                status: captured.status,
                body: String::from_utf8_lossy(&captured.body).into_owned(),
            });
        }

        let resource = Resource::from_slice(&captured.body).map_err(DispatchError::InvalidResource)?;
        Ok((resource.into_value(), captured.status))
    }
}
