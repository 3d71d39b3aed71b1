pub mod metadata;
pub mod observation;

use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use dhroxy_core::{OperationOutcome, RawHeaders};
use serde_json::{Value, json};

pub const FHIR_JSON: &str = "application/fhir+json; charset=utf-8";

/// Resource types served under the FHIR base
pub const SUPPORTED_RESOURCE_TYPES: &[&str] = &["Observation"];

/// Build a FHIR JSON response
pub fn fhir_json(status: StatusCode, body: Value) -> Response {
    (status, [(header::CONTENT_TYPE, FHIR_JSON)], Json(body)).into_response()
}

/// Error tuple carrying an OperationOutcome
pub fn outcome(status: StatusCode, outcome: OperationOutcome) -> (StatusCode, Json<Value>) {
    (status, Json(json!(outcome)))
}

/// Reject resource types this server does not serve
pub fn ensure_supported(resource_type: &str) -> Result<(), (StatusCode, Json<Value>)> {
    if SUPPORTED_RESOURCE_TYPES.contains(&resource_type) {
        Ok(())
    } else {
        Err(outcome(
            StatusCode::NOT_FOUND,
            OperationOutcome::unsupported_type(resource_type),
        ))
    }
}

/// Copy request headers into the lower-cased multimap the core works with.
/// Values that are not visible ASCII are dropped.
pub fn raw_headers(headers: &HeaderMap) -> RawHeaders {
    let mut raw = RawHeaders::new();
    for (name, value) in headers {
        match value.to_str() {
            Ok(value) => raw
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string()),
            Err(_) => tracing::debug!(header = %name, "Skipping non-text header value"),
        }
    }
    raw
}
