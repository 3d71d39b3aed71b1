//! dhroxy - FHIR R4 facade for sundhed.dk laboratory results
//!
//! Serves Observation read/search and read-only transaction Bundles on top
//! of the labsvar API, forwarding the caller's sundhed.dk session.

pub mod bundle;
pub mod config;
pub mod handlers;
pub mod service;
pub mod upstream;

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use dhroxy_core::LabMapper;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use bundle::dispatch::ServingPipeline;
use service::ObservationService;
use upstream::UpstreamClient;

/// Path prefix of the FHIR endpoints, also used for in-memory sub-requests.
pub const FHIR_BASE: &str = "/fhir";

/// State of the resource routes
pub struct ResourceState {
    pub service: ObservationService,
    pub config: config::ServerConfig,
}

/// Application state
pub struct AppState {
    pub resources: Arc<ResourceState>,
    /// Resource routes, for transaction entries
    pub pipeline: ServingPipeline,
}

impl AppState {
    pub fn new(config: config::ServerConfig, upstream: Arc<dyn UpstreamClient>) -> Arc<Self> {
        let mapper = LabMapper::with_columns(config.mapping.columns);
        let resources = Arc::new(ResourceState {
            service: ObservationService::new(upstream, mapper),
            config,
        });
        let pipeline = ServingPipeline::new(resource_router(resources.clone()));
        Arc::new(Self {
            resources,
            pipeline,
        })
    }
}

/// Read/search routes under [`FHIR_BASE`], without middleware.
pub fn resource_router(state: Arc<ResourceState>) -> Router {
    Router::new()
        .route(
            &format!("{}/metadata", FHIR_BASE),
            get(handlers::metadata::capability_statement),
        )
        .route(
            &format!("{}/{{resource_type}}", FHIR_BASE),
            get(handlers::observation::search),
        )
        .route(
            &format!("{}/{{resource_type}}/{{id}}", FHIR_BASE),
            get(handlers::observation::read),
        )
        .with_state(state)
}

/// Build the application router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::metadata::health_check))
        // Transaction
        .route(FHIR_BASE, post(bundle::process_bundle))
        .with_state(state.clone())
        .merge(resource_router(state.resources.clone()))
        // Middleware
        .layer(RequestBodyLimitLayer::new(4 * 1024 * 1024)) // 4MB
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
