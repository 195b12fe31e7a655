use crate::app_state::AppState;
use crate::db::queries::material_request_items::{
    approve_item, cancel_item, change_item_status, restore_item, update_actual_quantity,
    update_availability, update_item,
};
use crate::db::queries::material_requests::{
    create_material_request, get_material_request, get_request_approvals,
    list_project_material_requests,
};
use axum::{
    routing::{get, patch, post},
    Router,
};

pub fn material_request_routes() -> Router<AppState> {
    Router::new()
        .route("/material-requests", post(create_material_request))
        .route("/material-requests/{id}", get(get_material_request))
        .route("/material-requests/{id}/approvals", get(get_request_approvals))
        .route(
            "/projects/{project_id}/material-requests",
            get(list_project_material_requests),
        )
}

pub fn material_request_item_routes() -> Router<AppState> {
    Router::new()
        .route("/material-request-items/{id}", patch(update_item))
        .route(
            "/material-request-items/{id}/change_item_status",
            patch(change_item_status),
        )
        .route("/material-request-items/{id}/approve_item", patch(approve_item))
        .route("/material-request-items/{id}/cancel_item", patch(cancel_item))
        .route("/material-request-items/{id}/restore_item", patch(restore_item))
        .route(
            "/material-request-items/{id}/update_actual_quantity",
            patch(update_actual_quantity),
        )
        .route(
            "/material-request-items/{id}/availability",
            patch(update_availability),
        )
}
