use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::NaiveDateTime;
use sqlx::PgConnection;

use crate::app_state::AppState;
use crate::db::models::approval::{
    ApprovalTemplate, SaveApprovalTemplate, TemplateStep, TemplateStepInput,
};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::{db_error, ApiResponse};
use crate::workflow::error::WorkflowError;
use crate::workflow::registry;

/// Loads the saved template of a company, `None` when nothing was saved yet.
pub async fn fetch_template(
    conn: &mut PgConnection,
    company_id: i32,
) -> Result<Option<ApprovalTemplate>, sqlx::Error> {
    let header: Option<(Option<i32>, NaiveDateTime)> = sqlx::query_as(
        "SELECT updated_by, updated_at FROM approval_flow_templates WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((updated_by, updated_at)) = header else {
        return Ok(None);
    };

    let steps = sqlx::query_as::<_, TemplateStep>(
        r#"
        SELECT position, step_order, role, enabled, is_mandatory, skip_if_empty, description
        FROM approval_flow_template_steps
        WHERE company_id = $1
        ORDER BY position
        "#,
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(ApprovalTemplate {
        company_id,
        steps,
        updated_by,
        updated_at: Some(updated_at),
    }))
}

#[utoipa::path(
    get,
    path = "/approval-flow-templates",
    responses(
        (status = 200, description = "Active approval template of the caller's company", body = ApprovalTemplate),
        (status = 404, description = "Company has not saved a template"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Approval Templates",
    security(("bearerAuth" = []))
)]
pub async fn get_approval_template(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
) -> Result<ApiResponse<ApprovalTemplate>, ApiResponse<()>> {
    let company_id = user_permissions.company_id;
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(db_error("Failed to acquire connection"))?;

    let template = fetch_template(&mut conn, company_id)
        .await
        .map_err(db_error("Failed to load approval template"))?;

    let template = registry::require_active(company_id, template.as_ref())?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Approval template retrieved",
        template.clone(),
    ))
}

#[utoipa::path(
    post,
    path = "/approval-flow-templates",
    request_body = SaveApprovalTemplate,
    responses(
        (status = 200, description = "Template saved; orders reassigned from list position", body = ApprovalTemplate),
        (status = 403, description = "Caller may not manage approval templates"),
        (status = 422, description = "No enabled steps, unknown role or disabled mandatory step"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Approval Templates",
    security(("bearerAuth" = []))
)]
pub async fn save_approval_template(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Json(payload): Json<SaveApprovalTemplate>,
) -> Result<ApiResponse<ApprovalTemplate>, ApiResponse<()>> {
    user_permissions.require_capability("approval_templates", "manage")?;
    let company_id = user_permissions.company_id;

    let steps = registry::normalize_steps(&payload.steps)?;

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    replace_template(&mut tx, company_id, user_permissions.user_id, &steps)
        .await
        .map_err(db_error("Failed to save approval template"))?;

    let saved = fetch_template(&mut tx, company_id)
        .await
        .map_err(db_error("Failed to reload approval template"))?
        .ok_or_else(|| ApiResponse::from(WorkflowError::not_found("template vanished while saving")))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit transaction"))?;

    tracing::info!(
        company_id,
        steps = saved.enabled_steps().len(),
        "Approval template saved"
    );
    Ok(ApiResponse::success(StatusCode::OK, "Approval template saved", saved))
}

/// Swaps the stored steps. Approval records already snapshotted are not touched.
async fn replace_template(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
    steps: &[TemplateStep],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO approval_flow_templates (company_id, updated_by, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (company_id) DO UPDATE
        SET updated_by = EXCLUDED.updated_by, updated_at = NOW()
        "#,
    )
    .bind(company_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM approval_flow_template_steps WHERE company_id = $1")
        .bind(company_id)
        .execute(&mut *conn)
        .await?;

    for step in steps {
        sqlx::query(
            r#"
            INSERT INTO approval_flow_template_steps
                (company_id, position, step_order, role, enabled, is_mandatory, skip_if_empty, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(company_id)
        .bind(step.position)
        .bind(step.step_order)
        .bind(step.role)
        .bind(step.enabled)
        .bind(step.is_mandatory)
        .bind(step.skip_if_empty)
        .bind(&step.description)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(get_approval_template, save_approval_template),
    components(schemas(ApprovalTemplate, TemplateStep, TemplateStepInput, SaveApprovalTemplate)),
    tags(
        (name = "Approval Templates", description = "Per-company approval step configuration")
    )
)]
pub struct ApprovalTemplateDoc;
