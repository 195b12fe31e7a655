use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use sqlx::PgConnection;

use crate::app_state::AppState;
use crate::db::models::approval::{
    ApprovalRecordView, ItemApprovals, MaterialRequestApproval, RequestApprovals,
};
use crate::db::models::material_request::{
    MaterialRequest, MaterialRequestDetail, MaterialRequestItem, NewMaterialRequest,
    NewMaterialRequestItem,
};
use crate::db::queries::material_request_items::{fetch_request_approvals, ITEM_COLUMNS};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::{db_error, ApiResponse};
use crate::workflow::aggregate::validate_new_request;
use crate::workflow::{Actor, WorkflowError};

const REQUEST_COLUMNS: &str = r#"
    mr.id, mr.number, mr.project_id, p.company_id, mr.author_id,
    mr.drawing_reference, mr.work_type, mr.notes, mr.current_step,
    mr.created_at, mr.updated_at
"#;

pub async fn fetch_request(
    conn: &mut PgConnection,
    request_id: i32,
) -> Result<Option<MaterialRequest>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRequest>(&format!(
        r#"
        SELECT {}
        FROM material_requests mr
        JOIN projects p ON p.id = mr.project_id
        WHERE mr.id = $1 AND mr.deleted_at IS NULL
        "#,
        REQUEST_COLUMNS
    ))
    .bind(request_id)
    .fetch_optional(conn)
    .await
}

/// Requests of other companies look exactly like missing ones.
pub async fn load_request_for(
    conn: &mut PgConnection,
    request_id: i32,
    actor: &Actor,
) -> Result<MaterialRequest, ApiResponse<()>> {
    fetch_request(conn, request_id)
        .await
        .map_err(db_error("Failed to load material request"))?
        .filter(|request| request.company_id == actor.company_id)
        .ok_or_else(|| {
            WorkflowError::not_found(format!("material request {} not found", request_id)).into()
        })
}

const LOCK_REQUEST_OF_ITEM: &str = r#"
    SELECT mr.id
    FROM material_requests mr
    JOIN material_request_items i ON i.request_id = mr.id
    WHERE i.id = $1
    FOR UPDATE OF mr
"#;

/// Row-locks the header owning an item so writers to sibling items queue up
/// behind each other until commit. Returns the header id.
pub async fn lock_request_of_item(
    conn: &mut PgConnection,
    item_id: i32,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(LOCK_REQUEST_OF_ITEM)
        .bind(item_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_items(
    conn: &mut PgConnection,
    request_id: i32,
) -> Result<Vec<MaterialRequestItem>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRequestItem>(&format!(
        "SELECT {} FROM material_request_items WHERE request_id = $1 ORDER BY id",
        ITEM_COLUMNS
    ))
    .bind(request_id)
    .fetch_all(conn)
    .await
}

/// The header shows the least advanced step among items still in approval.
pub async fn refresh_request_step(
    conn: &mut PgConnection,
    request_id: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE material_requests
        SET current_step = (
                SELECT MIN(current_step)
                FROM material_request_items
                WHERE request_id = $1
                  AND status = 'active'
                  AND item_status = 'in_approval'
            ),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(request_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn project_company(
    conn: &mut PgConnection,
    project_id: i32,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar("SELECT company_id FROM projects WHERE id = $1 AND deleted_at IS NULL")
        .bind(project_id)
        .fetch_optional(conn)
        .await
}

async fn insert_item(
    conn: &mut PgConnection,
    request_id: i32,
    item: &NewMaterialRequestItem,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO material_request_items (request_id, material_name, quantity, unit, specifications)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(request_id)
    .bind(item.material_name.trim())
    .bind(&item.quantity)
    .bind(item.unit.trim())
    .bind(item.specifications.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .execute(conn)
    .await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/material-requests",
    request_body = NewMaterialRequest,
    responses(
        (status = 201, description = "Material request created with DRAFT items", body = MaterialRequestDetail),
        (status = 403, description = "Caller may not create material requests"),
        (status = 404, description = "Project not found"),
        (status = 422, description = "No items, empty names or non-positive quantities"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Material Requests",
    security(("bearerAuth" = []))
)]
pub async fn create_material_request(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Json(payload): Json<NewMaterialRequest>,
) -> Result<ApiResponse<MaterialRequestDetail>, ApiResponse<()>> {
    user_permissions.require_capability("material_requests", "create")?;
    validate_new_request(&payload)?;

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(db_error("Failed to start transaction"))?;

    let company_id = project_company(&mut tx, payload.project_id)
        .await
        .map_err(db_error("Failed to load project"))?
        .filter(|company_id| *company_id == user_permissions.company_id)
        .ok_or_else(|| {
            WorkflowError::not_found(format!("project {} not found", payload.project_id))
        })?;

    let request_id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO material_requests (number, project_id, author_id, drawing_reference, work_type, notes)
        VALUES ('', $1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(payload.project_id)
    .bind(user_permissions.user_id)
    .bind(&payload.drawing_reference)
    .bind(&payload.work_type)
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error("Failed to create material request"))?;

    sqlx::query("UPDATE material_requests SET number = $1 WHERE id = $2")
        .bind(format!("MR-{:06}", request_id))
        .bind(request_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to number material request"))?;

    for item in &payload.items {
        insert_item(&mut tx, request_id, item)
            .await
            .map_err(db_error("Failed to create material request item"))?;
    }

    let request = fetch_request(&mut tx, request_id)
        .await
        .map_err(db_error("Failed to reload material request"))?
        .ok_or_else(|| WorkflowError::not_found("material request vanished while saving"))?;
    let items = fetch_items(&mut tx, request_id)
        .await
        .map_err(db_error("Failed to reload items"))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit transaction"))?;

    tracing::info!(
        request_id,
        company_id,
        items = items.len(),
        user = %user_permissions.username,
        "Material request created"
    );
    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Material request created",
        MaterialRequestDetail { request, items },
    ))
}

#[utoipa::path(
    get,
    path = "/material-requests/{id}",
    params(("id" = i32, Path, description = "Material request ID")),
    responses(
        (status = 200, description = "Material request with its items", body = MaterialRequestDetail),
        (status = 404, description = "Material request not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Material Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_material_request(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<MaterialRequestDetail>, ApiResponse<()>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(db_error("Failed to acquire connection"))?;

    let request = load_request_for(&mut conn, id, &user_permissions.actor()).await?;
    let items = fetch_items(&mut conn, id)
        .await
        .map_err(db_error("Failed to load items"))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Material request retrieved",
        MaterialRequestDetail { request, items },
    ))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/material-requests",
    params(("project_id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Material requests of the project, newest first", body = [MaterialRequest]),
        (status = 404, description = "Project not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Material Requests",
    security(("bearerAuth" = []))
)]
pub async fn list_project_material_requests(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(project_id): Path<i32>,
) -> Result<ApiResponse<Vec<MaterialRequest>>, ApiResponse<()>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(db_error("Failed to acquire connection"))?;

    project_company(&mut conn, project_id)
        .await
        .map_err(db_error("Failed to load project"))?
        .filter(|company_id| *company_id == user_permissions.company_id)
        .ok_or_else(|| WorkflowError::not_found(format!("project {} not found", project_id)))?;

    let requests = sqlx::query_as::<_, MaterialRequest>(&format!(
        r#"
        SELECT {}
        FROM material_requests mr
        JOIN projects p ON p.id = mr.project_id
        WHERE mr.project_id = $1 AND mr.deleted_at IS NULL
        ORDER BY mr.created_at DESC, mr.id DESC
        "#,
        REQUEST_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error("Failed to list material requests"))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Material requests retrieved",
        requests,
    ))
}

#[utoipa::path(
    get,
    path = "/material-requests/{id}/approvals",
    params(("id" = i32, Path, description = "Material request ID")),
    responses(
        (status = 200, description = "Approval records per item, earlier cycles marked superseded", body = RequestApprovals),
        (status = 404, description = "Material request not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Material Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_request_approvals(
    State(state): State<AppState>,
    Extension(user_permissions): Extension<UserPermissions>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<RequestApprovals>, ApiResponse<()>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(db_error("Failed to acquire connection"))?;

    let request = load_request_for(&mut conn, id, &user_permissions.actor()).await?;
    let items = fetch_items(&mut conn, id)
        .await
        .map_err(db_error("Failed to load items"))?;
    let records = fetch_request_approvals(&mut conn, id)
        .await
        .map_err(db_error("Failed to load approvals"))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Approvals retrieved",
        group_approvals(&request, &items, records),
    ))
}

/// Groups records under their items; cycles before the item's latest are history.
pub fn group_approvals(
    request: &MaterialRequest,
    items: &[MaterialRequestItem],
    records: Vec<MaterialRequestApproval>,
) -> RequestApprovals {
    let mut grouped: Vec<ItemApprovals> = items
        .iter()
        .map(|item| ItemApprovals {
            item_id: item.id,
            approval_cycle: item.approval_cycle,
            current_step: item.current_step,
            approvals: Vec::new(),
        })
        .collect();

    for record in records {
        if let Some(entry) = grouped.iter_mut().find(|g| g.item_id == record.item_id) {
            let superseded = record.cycle < entry.approval_cycle;
            entry.approvals.push(ApprovalRecordView { record, superseded });
        }
    }

    RequestApprovals {
        request_id: request.id,
        current_step: request.current_step,
        items: grouped,
    }
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(
        create_material_request,
        get_material_request,
        list_project_material_requests,
        get_request_approvals
    ),
    components(schemas(
        MaterialRequest,
        MaterialRequestDetail,
        NewMaterialRequest,
        NewMaterialRequestItem,
        RequestApprovals,
        ItemApprovals,
        ApprovalRecordView
    )),
    tags(
        (name = "Material Requests", description = "Material request headers and approval history")
    )
)]
pub struct MaterialRequestDoc;
