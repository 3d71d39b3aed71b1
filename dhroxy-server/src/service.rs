//! Observation search and read on top of the labsvar upstream.

use axum::{Json, http::StatusCode};
use dhroxy_core::{
    Bundle, DhroxyError, IssueType, LabMapper, LabResponse, OperationOutcome, RawHeaders,
    SearchQuery,
};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

use crate::upstream::{UpstreamClient, UpstreamError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("labsvar rejected the session ({status})")]
    Unauthorized { status: StatusCode },

    #[error("labsvar answered {status}: {body}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("labsvar payload could not be mapped: {0}")]
    Mapping(#[from] DhroxyError),

    #[error("Resource not found: Observation/{id}")]
    NotFound { id: String },
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Upstream(UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Upstream(UpstreamError::Transport(_)) => StatusCode::BAD_GATEWAY,
            ServiceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ServiceError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Mapping(_) => StatusCode::BAD_GATEWAY,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn outcome(&self) -> OperationOutcome {
        match self {
            ServiceError::Upstream(UpstreamError::Timeout(_)) => {
                OperationOutcome::error(IssueType::Timeout, self.to_string())
            }
            ServiceError::Upstream(UpstreamError::Transport(_))
            | ServiceError::UpstreamStatus { .. } => OperationOutcome::exception(self.to_string()),
            ServiceError::Unauthorized { .. } => OperationOutcome::unauthorized(self.to_string()),
            ServiceError::Mapping(_) => OperationOutcome::error(IssueType::Invalid, self.to_string()),
            ServiceError::NotFound { id } => OperationOutcome::not_found("Observation", id),
        }
    }
}

impl From<ServiceError> for (StatusCode, Json<Value>) {
    fn from(err: ServiceError) -> Self {
        (err.status(), Json(json!(err.outcome())))
    }
}

/// Stateless apart from the upstream client and the column layout.
pub struct ObservationService {
    upstream: Arc<dyn UpstreamClient>,
    mapper: LabMapper,
}

impl ObservationService {
    pub fn new(upstream: Arc<dyn UpstreamClient>, mapper: LabMapper) -> Self {
        Self { upstream, mapper }
    }

    /// Run `query` against labsvar and map the answer into a searchset.
    pub async fn search(&self, query: &SearchQuery, self_url: &str) -> Result<Bundle, ServiceError> {
        let payload = self.fetch(query).await?;
        let bundle = self.mapper.to_search_bundle(&payload, self_url)?;
        tracing::info!(
            area = query.area().code(),
            total = bundle.entry.len(),
            "Observation search"
        );
        Ok(bundle)
    }

    /// labsvar has no lookup by id, so a read is an unfiltered search that
    /// keeps the one matching observation.
    pub async fn read(&self, id: &str, headers: RawHeaders) -> Result<Value, ServiceError> {
        let query = SearchQuery::default().with_headers(headers);
        let payload = self.fetch(&query).await?;
        let bundle = self.mapper.to_search_bundle(&payload, "")?;
        bundle
            .entry
            .into_iter()
            .map(|entry| entry.resource)
            .find(|resource| resource.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<LabResponse, ServiceError> {
        let terms = query.upstream_terms();
        let response = self.upstream.fetch(&query.headers, &terms).await?;

        match response.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(status = response.status.as_u16(), "labsvar rejected the session");
                return Err(ServiceError::Unauthorized {
                    status: response.status,
                });
            }
            status if !status.is_success() => {
                let body = String::from_utf8_lossy(&response.body).into_owned();
                tracing::warn!(status = status.as_u16(), "labsvar returned an error status");
                return Err(ServiceError::UpstreamStatus { status, body });
            }
            _ => {}
        }

        LabResponse::from_slice(&response.body).map_err(|e| DhroxyError::from(e).into())
    }
}
