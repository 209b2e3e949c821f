//! HTTP route definitions

use crate::api::handlers;
use crate::api::models::*;
use crate::backend::{BackendInfo, BackendListing, ConnectivityReport, StatsSnapshot};
use crate::gateway::{RetryNotice, StreamOutcome};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Text Generation Gateway API",
        description = "One runtime-switchable interface over several streaming text-generation backends.",
        license(name = "MIT"),
    ),
    paths(
        handlers::generate,
        handlers::test_connection,
        handlers::backend_info,
        handlers::list_backends,
        handlers::switch_backend,
        handlers::update_credentials,
        handlers::health_check,
    ),
    components(schemas(
        GenerateRequest,
        GenerateResponse,
        TestConnectionRequest,
        SwitchBackendRequest,
        UpdateCredentialsRequest,
        BackendListResponse,
        BackendListing,
        HealthResponse,
        SuccessResponse,
        ConnectivityReport,
        BackendInfo,
        StatsSnapshot,
        StreamOutcome,
        RetryNotice,
    )),
    tags(
        (name = "Generation", description = "Streamed text generation"),
        (name = "Backends", description = "Backend selection, probing and statistics"),
        (name = "Health", description = "Health endpoints"),
    )
)]
pub struct ApiDoc;

/// Create the main application router
pub fn create_router(state: Arc<crate::AppState>) -> Router {
    let api_routes = Router::new()
        .route("/generate", post(handlers::generate))
        .route("/backends", get(handlers::list_backends))
        .route("/backends/:name", get(handlers::backend_info))
        .route("/backends/:name/test", post(handlers::test_connection))
        .route("/backends/:name/credentials", put(handlers::update_credentials))
        .route("/active-backend", put(handlers::switch_backend));

    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health_check))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // API routes under /v1 prefix
        .nest("/v1", api_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
