use crate::app_state::AppState;
use crate::db::queries::approval_templates::{get_approval_template, save_approval_template};
use axum::{routing::get, Router};

pub fn approval_template_routes() -> Router<AppState> {
    Router::new().route(
        "/approval-flow-templates",
        get(get_approval_template).post(save_approval_template),
    )
}
