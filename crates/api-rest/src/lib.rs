//! # API REST
//!
//! REST API for the VPR document signing pipeline.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (raw callback bodies, status codes, CORS, presigned reads)
//!
//! All signing semantics live in `vpr-core`; handlers translate between HTTP and
//! [`SigningService`].

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod handlers;
pub mod settings;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use vpr_core::SigningService;
use vpr_files::ObjectStore;

pub use error::ApiError;
pub use settings::Settings;

/// Shared state of the REST server.
#[derive(Clone)]
pub struct AppState {
    service: SigningService,
    files: Arc<ObjectStore>,
}

impl AppState {
    pub fn new(service: SigningService, files: Arc<ObjectStore>) -> Self {
        Self { service, files }
    }

    pub fn service(&self) -> &SigningService {
        &self.service
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::request_signature,
        handlers::signature_callback,
        handlers::signed_url,
        handlers::signature_status,
        handlers::audit_trail,
        handlers::revalidate,
        handlers::read_object,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorRes,
        dto::SigningRequestRes,
        dto::CallbackReq,
        dto::CallbackAckRes,
        dto::SignedUrlRes,
        dto::SignatureStatusRes,
        dto::RevalidateRes,
        dto::AuditEventRes,
        dto::AuditTrailRes,
    ))
)]
pub struct ApiDoc;

/// Builds the application router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/signatures/:id", get(handlers::signature_status))
        .route("/signatures/:id/request", post(handlers::request_signature))
        .route("/signatures/:id/callback", post(handlers::signature_callback))
        .route("/signatures/:id/url", get(handlers::signed_url))
        .route("/signatures/:id/audit", get(handlers::audit_trail))
        .route("/signatures/:id/revalidate", post(handlers::revalidate))
        .route("/files/*key", get(handlers::read_object))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
