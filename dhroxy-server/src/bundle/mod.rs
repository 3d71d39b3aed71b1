//! Transaction Bundle processing
//!
//! POST /fhir accepts a Bundle of type "transaction" whose entries are
//! read or search requests, and answers with a "transaction-response" whose
//! entries line up with the request entries.

pub mod dispatch;

use crate::AppState;
use crate::handlers::{fhir_json, outcome, raw_headers};

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use dhroxy_core::{Bundle, IssueType, OperationOutcome};
use dispatch::{BatchEntry, SubRequestDispatcher};
use serde_json::{Value, json};
use std::sync::Arc;

/// Check the envelope and pull out each `entry.request`.
///
/// A missing `entry` list is an empty transaction. Malformed entries are
/// kept so they fail in their own slot.
fn parse_entries(bundle: &Value) -> Result<Vec<BatchEntry>, OperationOutcome> {
    let rt = bundle.get("resourceType").and_then(|v| v.as_str());
    if rt != Some("Bundle") {
        return Err(OperationOutcome::error(
            IssueType::Invalid,
            "resourceType must be 'Bundle'",
        ));
    }

    if bundle.get("type").and_then(|v| v.as_str()) != Some("transaction") {
        return Err(OperationOutcome::error(
            IssueType::Invalid,
            "Bundle.type must be 'transaction'",
        ));
    }

    let Some(entries) = bundle.get("entry").and_then(|e| e.as_array()) else {
        return Ok(Vec::new());
    };

    Ok(entries
        .iter()
        .map(|entry| {
            let request = entry.get("request");
            let field = |name: &str| {
                request
                    .and_then(|r| r.get(name))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            };
            BatchEntry {
                method: field("method"),
                url: field("url"),
            }
        })
        .collect())
}

/// POST /fhir: process a transaction Bundle
pub async fn process_bundle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(bundle): Json<Value>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let entries = parse_entries(&bundle).map_err(|o| outcome(StatusCode::BAD_REQUEST, o))?;

    let dispatcher = SubRequestDispatcher::new(state.pipeline.clone());
    let results = dispatcher.execute(&entries, &raw_headers(&headers)).await;

    let failed = results.iter().filter(|r| !r.status.is_success()).count();
    tracing::info!(entries = results.len(), failed, "Transaction processed");

    let response = Bundle::transaction_response(
        results
            .into_iter()
            .map(|result| {
                let status = result.status_line();
                (result.resource, status)
            }),
    );
    Ok(fhir_json(StatusCode::OK, json!(response)))
}
