pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod middleware;
pub mod utils;
pub mod workflow;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::auth::AuthDoc;
use crate::app_state::AppState;
use crate::db::queries::approval_templates::ApprovalTemplateDoc;
use crate::db::queries::material_request_items::MaterialRequestItemDoc;
use crate::db::queries::material_requests::MaterialRequestDoc;
use crate::middleware::auth::{jwt_middleware, rbac_middleware};

/// Merged OpenAPI document served by Swagger UI and RapiDoc.
pub fn openapi() -> utoipa::openapi::OpenApi {
    AuthDoc::openapi()
        .merge_from(MaterialRequestDoc::openapi())
        .merge_from(MaterialRequestItemDoc::openapi())
        .merge_from(ApprovalTemplateDoc::openapi())
}

/// Full HTTP surface. Health and docs are public; everything else needs a
/// bearer token and resolved permissions.
pub fn app(state: AppState) -> Router {
    let merged_doc = openapi();

    let private_routes = Router::new()
        .merge(api::material_requests::material_request_routes())
        .merge(api::material_requests::material_request_item_routes())
        .merge(api::approval_templates::approval_template_routes())
        .route_layer(from_fn_with_state(state.clone(), rbac_middleware))
        .route_layer(from_fn(jwt_middleware));

    Router::new()
        .merge(api::health::health_routes())
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", merged_doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", merged_doc).path("/rapidoc"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
