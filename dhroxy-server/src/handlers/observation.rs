use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
};
use dhroxy_core::{SearchQuery, parse_query_pairs};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{ensure_supported, fhir_json, raw_headers};
use crate::{FHIR_BASE, ResourceState};

/// Search (GET /fhir/{resource_type}?date=..&category=..)
///
/// `date` may repeat; every other parameter besides `category` is ignored.
pub async fn search(
    State(state): State<Arc<ResourceState>>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<Value>)> {
    ensure_supported(&resource_type)?;

    let pairs = parse_query_pairs(query.as_deref().unwrap_or(""));
    let dates: Vec<&str> = pairs
        .iter()
        .filter(|(name, _)| name == "date")
        .map(|(_, value)| value.as_str())
        .collect();
    let category = pairs
        .iter()
        .find(|(name, _)| name == "category")
        .map(|(_, value)| value.as_str());

    let search = SearchQuery::translate(&dates, category).with_headers(raw_headers(&headers));

    let self_url = match query.as_deref().filter(|q| !q.is_empty()) {
        Some(q) => format!("{}/{}?{}", FHIR_BASE, resource_type, q),
        None => format!("{}/{}", FHIR_BASE, resource_type),
    };

    let bundle = state.service.search(&search, &self_url).await?;
    Ok(fhir_json(StatusCode::OK, json!(bundle)))
}

/// Read (GET /fhir/{resource_type}/{id})
pub async fn read(
    State(state): State<Arc<ResourceState>>,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<Value>)> {
    ensure_supported(&resource_type)?;

    let resource = state.service.read(&id, raw_headers(&headers)).await?;
    Ok(fhir_json(StatusCode::OK, resource))
}
