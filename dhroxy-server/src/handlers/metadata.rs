use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SUPPORTED_RESOURCE_TYPES;
use crate::{FHIR_BASE, ResourceState};

/// Health check (GET /health)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "fhirVersion": "4.0.1"
    }))
}

/// CapabilityStatement (GET /fhir/metadata)
pub async fn capability_statement(State(state): State<Arc<ResourceState>>) -> Json<Value> {
    let resources: Vec<Value> = SUPPORTED_RESOURCE_TYPES
        .iter()
        .map(|rt| {
            json!({
                "type": rt,
                "versioning": "no-version",
                "readHistory": false,
                "interaction": [
                    {"code": "read"},
                    {"code": "search-type"},
                ],
                "searchParam": [
                    {
                        "name": "date",
                        "type": "date",
                        "documentation": "Result date range, ge/gt/le/lt/eq prefixes"
                    },
                    {
                        "name": "category",
                        "type": "token",
                        "documentation": "Laboratory area: microbiology, pathology or clinical biochemistry"
                    },
                ],
            })
        })
        .collect();

    Json(json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "kind": "instance",
        "fhirVersion": "4.0.1",
        "format": ["json"],
        "software": {
            "name": "dhroxy",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "implementation": {
            "description": "dhroxy - FHIR R4 facade for sundhed.dk laboratory results",
            "url": format!(
                "http://{}:{}{}",
                state.config.server.host, state.config.server.port, FHIR_BASE
            ),
        },
        "rest": [{
            "mode": "server",
            "resource": resources,
            "interaction": [
                {"code": "transaction"},
            ],
        }]
    }))
}
