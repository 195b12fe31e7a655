use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sqlx::PgConnection;

use crate::app_state::AppState;
use crate::db::models::approval::{ApprovalTemplate, MaterialRequestApproval};
use crate::db::models::material_request::{
    ApproveItem, CancelItem, ChangeItemStatus, ItemWorkflowResponse, MaterialRequest,
    MaterialRequestItem, UpdateActualQuantity, UpdateAvailability, UpdateMaterialRequestItem,
};
use crate::db::queries::approval_templates::fetch_template;
use crate::db::queries::directory::load_staffed_roles;
use crate::db::queries::material_requests::{
    load_request_for, lock_request_of_item, refresh_request_step,
};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::{db_error, ApiResponse};
use crate::utils::notification::dispatch;
use crate::workflow::{Actor, Transition, Workflow, WorkflowError, WorkflowResult};

pub(crate) const ITEM_COLUMNS: &str = r#"
    id, request_id, material_name, quantity, unit, specifications,
    item_status, approval_status, availability_status, status,
    previous_item_status, actual_quantity, current_step, approval_cycle,
    rejection_reason, cancel_reason, cancelled_by, cancelled_at,
    version, created_at, updated_at
"#;

const APPROVAL_COLUMNS: &str = r#"
    request_id, item_id, cycle, step_order, role, is_mandatory, skip_if_empty,
    description, status, approver_id, comment, approved_at
"#;

pub async fn fetch_item(
    conn: &mut PgConnection,
    item_id: i32,
) -> Result<Option<MaterialRequestItem>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRequestItem>(&format!(
        "SELECT {} FROM material_request_items WHERE id = $1",
        ITEM_COLUMNS
    ))
    .bind(item_id)
    .fetch_optional(conn)
    .await
}

/// Approval records of one cycle, in step order.
pub async fn fetch_approvals(
    conn: &mut PgConnection,
    item_id: i32,
    cycle: i32,
) -> Result<Vec<MaterialRequestApproval>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRequestApproval>(&format!(
        "SELECT {} FROM material_request_approvals WHERE item_id = $1 AND cycle = $2 ORDER BY step_order",
        APPROVAL_COLUMNS
    ))
    .bind(item_id)
    .bind(cycle)
    .fetch_all(conn)
    .await
}

/// Every cycle of every item of a request.
pub async fn fetch_request_approvals(
    conn: &mut PgConnection,
    request_id: i32,
) -> Result<Vec<MaterialRequestApproval>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRequestApproval>(&format!(
        "SELECT {} FROM material_request_approvals WHERE request_id = $1 ORDER BY item_id, cycle, step_order",
        APPROVAL_COLUMNS
    ))
    .bind(request_id)
    .fetch_all(conn)
    .await
}

async fn insert_approvals(
    conn: &mut PgConnection,
    records: &[MaterialRequestApproval],
) -> Result<(), sqlx::Error> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO material_request_approvals
                (request_id, item_id, cycle, step_order, role, is_mandatory, skip_if_empty,
                 description, status, approver_id, comment, approved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.request_id)
        .bind(record.item_id)
        .bind(record.cycle)
        .bind(record.step_order)
        .bind(record.role)
        .bind(record.is_mandatory)
        .bind(record.skip_if_empty)
        .bind(&record.description)
        .bind(record.status)
        .bind(record.approver_id)
        .bind(&record.comment)
        .bind(record.approved_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Writes back the records an operation decided on.
async fn update_changed_approvals(
    conn: &mut PgConnection,
    before: &[MaterialRequestApproval],
    after: &[MaterialRequestApproval],
) -> Result<(), sqlx::Error> {
    for (old, new) in before.iter().zip(after) {
        if old == new {
            continue;
        }
        sqlx::query(
            r#"
            UPDATE material_request_approvals
            SET status = $1, approver_id = $2, comment = $3, approved_at = $4
            WHERE item_id = $5 AND cycle = $6 AND step_order = $7
            "#,
        )
        .bind(new.status)
        .bind(new.approver_id)
        .bind(&new.comment)
        .bind(new.approved_at)
        .bind(new.item_id)
        .bind(new.cycle)
        .bind(new.step_order)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Persists the item guarded by the version it was read at.
async fn save_item(
    conn: &mut PgConnection,
    item: &MaterialRequestItem,
) -> Result<Option<MaterialRequestItem>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRequestItem>(&format!(
        r#"
        UPDATE material_request_items
        SET material_name = $1, quantity = $2, unit = $3, specifications = $4,
            item_status = $5, approval_status = $6, availability_status = $7, status = $8,
            previous_item_status = $9, actual_quantity = $10, current_step = $11,
            approval_cycle = $12, rejection_reason = $13, cancel_reason = $14,
            cancelled_by = $15, cancelled_at = $16,
            version = version + 1, updated_at = NOW()
        WHERE id = $17 AND version = $18
        RETURNING {}
        "#,
        ITEM_COLUMNS
    ))
    .bind(&item.material_name)
    .bind(&item.quantity)
    .bind(&item.unit)
    .bind(&item.specifications)
    .bind(item.item_status)
    .bind(item.approval_status)
    .bind(item.availability_status)
    .bind(item.status)
    .bind(item.previous_item_status)
    .bind(&item.actual_quantity)
    .bind(item.current_step)
    .bind(item.approval_cycle)
    .bind(&item.rejection_reason)
    .bind(&item.cancel_reason)
    .bind(item.cancelled_by)
    .bind(item.cancelled_at)
    .bind(item.id)
    .bind(item.version)
    .fetch_optional(conn)
    .await
}

/// Everything one item operation may look at or change.
pub struct ItemContext {
    pub request: MaterialRequest,
    pub item: MaterialRequestItem,
    /// Records of the item's current cycle.
    pub approvals: Vec<MaterialRequestApproval>,
    pub template: Option<ApprovalTemplate>,
}

/// Load, run one workflow operation, persist, commit, then notify.
async fn mutate_item<F>(
    state: &AppState,
    user_permissions: &UserPermissions,
    item_id: i32,
    operation: F,
) -> Result<ItemWorkflowResponse, ApiResponse<()>>
where
    F: FnOnce(&Workflow<'_>, &Actor, &mut ItemContext) -> WorkflowResult<Transition>,
{
    let actor = user_permissions.actor();
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    // header first, so the step summary is computed from settled sibling items
    lock_request_of_item(&mut tx, item_id)
        .await
        .map_err(db_error("Failed to lock material request"))?
        .ok_or_else(|| WorkflowError::not_found(format!("item {} not found", item_id)))?;
    let item = fetch_item(&mut tx, item_id)
        .await
        .map_err(db_error("Failed to load item"))?
        .ok_or_else(|| WorkflowError::not_found(format!("item {} not found", item_id)))?;
    let request = load_request_for(&mut tx, item.request_id, &actor).await?;
    let approvals = fetch_approvals(&mut tx, item.id, item.approval_cycle)
        .await
        .map_err(db_error("Failed to load approvals"))?;
    let template = fetch_template(&mut tx, request.company_id)
        .await
        .map_err(db_error("Failed to load approval template"))?;
    let directory = load_staffed_roles(&mut tx, request.company_id)
        .await
        .map_err(db_error("Failed to load role holders"))?;

    let original = approvals.clone();
    let mut ctx = ItemContext {
        request,
        item,
        approvals,
        template,
    };

    let outcome = {
        let workflow = Workflow::new(&directory, &state.policy, Utc::now().naive_utc());
        operation(&workflow, &actor, &mut ctx)
    };
    let transition = outcome.map_err(|e| {
        tracing::info!(item_id, user = %actor.username, "Workflow operation refused: {}", e);
        e
    })?;

    let saved = save_item(&mut tx, &ctx.item)
        .await
        .map_err(db_error("Failed to save item"))?
        .ok_or_else(|| {
            WorkflowError::Conflict("item was modified concurrently, reload and retry".to_string())
        })?;

    update_changed_approvals(&mut tx, &original, &ctx.approvals)
        .await
        .map_err(db_error("Failed to update approvals"))?;
    insert_approvals(&mut tx, &transition.new_approvals)
        .await
        .map_err(db_error("Failed to record approval cycle"))?;
    refresh_request_step(&mut tx, saved.request_id)
        .await
        .map_err(db_error("Failed to update request step"))?;

    let approvals = fetch_approvals(&mut tx, saved.id, saved.approval_cycle)
        .await
        .map_err(db_error("Failed to reload approvals"))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit transaction"))?;

    tracing::info!(
        item_id,
        user = %actor.username,
        status = %saved.item_status,
        version = saved.version,
        "Item updated"
    );

    if !transition.events.is_empty() {
        dispatch(state.notifier.clone(), transition.events);
    }

    Ok(ItemWorkflowResponse {
        item: saved,
        approvals,
        auto_completed: transition.auto_completed,
    })
}

fn respond(message: &str, body: ItemWorkflowResponse) -> ApiResponse<ItemWorkflowResponse> {
    ApiResponse::success(StatusCode::OK, message, body)
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}",
    request_body = UpdateMaterialRequestItem,
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item updated", body = ItemWorkflowResponse),
        (status = 403, description = "Only the author can edit"),
        (status = 409, description = "Item is not editable or was modified concurrently"),
        (status = 422, description = "Invalid field values")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn update_item(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateMaterialRequestItem>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        wf.edit_item(actor, &ctx.request, &mut ctx.item, payload)
    })
    .await?;
    Ok(respond("Item updated", body))
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}/change_item_status",
    request_body = ChangeItemStatus,
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Status changed", body = ItemWorkflowResponse),
        (status = 403, description = "Role may not perform this step"),
        (status = 404, description = "Item not found or no active template"),
        (status = 409, description = "Transition not allowed from the current status")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn change_item_status(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<ChangeItemStatus>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        wf.change_item_status(
            actor,
            &ctx.request,
            &mut ctx.item,
            &mut ctx.approvals,
            ctx.template.as_ref(),
            payload.new_status,
            payload.comment,
        )
    })
    .await?;
    Ok(respond("Item status changed", body))
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}/approve_item",
    request_body = ApproveItem,
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Decision recorded", body = ItemWorkflowResponse),
        (status = 403, description = "Caller does not hold the current step's role"),
        (status = 409, description = "Item is not awaiting approval"),
        (status = 422, description = "Missing rejection comment or invalid decision")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn approve_item(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<ApproveItem>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        wf.decide(
            actor,
            &ctx.request,
            &mut ctx.item,
            &mut ctx.approvals,
            payload.approval_status,
            payload.comment,
        )
    })
    .await?;
    Ok(respond("Approval decision recorded", body))
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}/cancel_item",
    request_body = CancelItem,
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item cancelled", body = ItemWorkflowResponse),
        (status = 403, description = "Neither the author nor allowed to cancel"),
        (status = 409, description = "Item already cancelled or completed")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn cancel_item(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
    payload: Option<Json<CancelItem>>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let reason = payload.map(|Json(p)| p).unwrap_or_default().reason;
    let may_cancel = user_permissions.has_capability("material_request_items", "cancel");
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        ensure_author_or(actor, &ctx.request, may_cancel, "cancel this item")?;
        wf.cancel_item(actor, &ctx.request, &mut ctx.item, reason)
    })
    .await?;
    Ok(respond("Item cancelled", body))
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}/restore_item",
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item restored to its previous status", body = ItemWorkflowResponse),
        (status = 403, description = "Neither the author nor allowed to restore"),
        (status = 409, description = "Item is not cancelled")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn restore_item(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let may_restore = user_permissions.has_capability("material_request_items", "restore");
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        ensure_author_or(actor, &ctx.request, may_restore, "restore this item")?;
        wf.restore_item(actor, &ctx.request, &mut ctx.item)
    })
    .await?;
    Ok(respond("Item restored", body))
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}/update_actual_quantity",
    request_body = UpdateActualQuantity,
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Quantity recorded; `auto_completed` tells whether the item completed", body = ItemWorkflowResponse),
        (status = 403, description = "Role may not record deliveries"),
        (status = 409, description = "Item is not in delivery"),
        (status = 422, description = "Negative quantity")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn update_actual_quantity(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateActualQuantity>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        wf.update_actual_quantity(actor, &ctx.request, &mut ctx.item, payload.actual_quantity)
    })
    .await?;
    Ok(respond("Actual quantity recorded", body))
}

#[utoipa::path(
    patch,
    path = "/material-request-items/{id}/availability",
    request_body = UpdateAvailability,
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Availability recorded", body = ItemWorkflowResponse),
        (status = 403, description = "Role may not report stock")
    ),
    tag = "Material Request Items",
    security(("bearerAuth" = []))
)]
pub async fn update_availability(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateAvailability>,
) -> Result<ApiResponse<ItemWorkflowResponse>, ApiResponse<()>> {
    let body = mutate_item(&state, &user_permissions, id, |wf, actor, ctx| {
        wf.set_availability(actor, &mut ctx.item, payload.availability_status)
    })
    .await?;
    Ok(respond("Availability recorded", body))
}

/// Cancel and restore are open to the author and to capability holders.
fn ensure_author_or(
    actor: &Actor,
    request: &MaterialRequest,
    has_capability: bool,
    action: &str,
) -> WorkflowResult<()> {
    if has_capability || actor.user_id == request.author_id {
        return Ok(());
    }
    Err(WorkflowError::unauthorized(format!(
        "only the request author or an authorized role can {}",
        action
    )))
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(
        update_item,
        change_item_status,
        approve_item,
        cancel_item,
        restore_item,
        update_actual_quantity,
        update_availability
    ),
    components(schemas(
        MaterialRequestItem,
        MaterialRequestApproval,
        ItemWorkflowResponse,
        UpdateMaterialRequestItem,
        ChangeItemStatus,
        ApproveItem,
        CancelItem,
        UpdateActualQuantity,
        UpdateAvailability
    )),
    tags(
        (name = "Material Request Items", description = "Item lifecycle and approval decisions")
    )
)]
pub struct MaterialRequestItemDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::fixtures::{actor, author, request, AUTHOR};
    use crate::workflow::Role;

    #[test]
    fn author_may_cancel_without_capability() {
        let request = request();
        assert!(ensure_author_or(&author(), &request, false, "cancel this item").is_ok());
        assert_eq!(request.author_id, AUTHOR);
    }

    #[test]
    fn others_need_the_capability() {
        let request = request();
        let supply = actor(42, Role::Supply);
        let err = ensure_author_or(&supply, &request, false, "cancel this item").unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
        assert!(ensure_author_or(&supply, &request, true, "cancel this item").is_ok());
    }
}
