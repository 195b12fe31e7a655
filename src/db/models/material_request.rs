// src/db/models/material_request.rs
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::db::models::approval::MaterialRequestApproval;
use crate::workflow::status::{
    AvailabilityStatus, ItemApprovalStatus, ItemStatus, RecordStatus,
};

/// Request header. `company_id` is joined in from the owning project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaterialRequest {
    pub id: i32,
    pub number: String,
    pub project_id: i32,
    pub company_id: i32,
    pub author_id: i32,
    pub drawing_reference: Option<String>,
    pub work_type: Option<String>,
    pub notes: Option<String>,
    pub current_step: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaterialRequestItem {
    pub id: i32,
    pub request_id: i32,
    pub material_name: String,
    #[schema(value_type = String)]
    pub quantity: BigDecimal,
    pub unit: String,
    pub specifications: Option<String>,
    pub item_status: ItemStatus,
    pub approval_status: ItemApprovalStatus,
    pub availability_status: AvailabilityStatus,
    pub status: RecordStatus,
    pub previous_item_status: Option<ItemStatus>,
    #[schema(value_type = Option<String>)]
    pub actual_quantity: Option<BigDecimal>,
    pub current_step: Option<i32>,
    pub approval_cycle: i32,
    pub rejection_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<i32>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub version: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl MaterialRequestItem {
    pub fn is_cancelled(&self) -> bool {
        self.status == RecordStatus::Cancelled
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewMaterialRequest {
    pub project_id: i32,
    pub drawing_reference: Option<String>,
    pub work_type: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewMaterialRequestItem>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewMaterialRequestItem {
    pub material_name: String,
    #[schema(value_type = String)]
    pub quantity: BigDecimal,
    pub unit: String,
    pub specifications: Option<String>,
}

/// Author edits while an item is DRAFT or RETURNED_FOR_REVISION.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateMaterialRequestItem {
    pub material_name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub quantity: Option<BigDecimal>,
    pub unit: Option<String>,
    pub specifications: Option<String>,
}

impl UpdateMaterialRequestItem {
    pub fn is_empty(&self) -> bool {
        self.material_name.is_none()
            && self.quantity.is_none()
            && self.unit.is_none()
            && self.specifications.is_none()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeItemStatus {
    pub new_status: ItemStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveItem {
    pub approval_status: ItemApprovalStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelItem {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateActualQuantity {
    #[schema(value_type = String)]
    pub actual_quantity: BigDecimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAvailability {
    pub availability_status: AvailabilityStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MaterialRequestDetail {
    pub request: MaterialRequest,
    pub items: Vec<MaterialRequestItem>,
}

/// Item state after a workflow operation, with its current approval cycle.
#[derive(Debug, Serialize, ToSchema)]
pub struct ItemWorkflowResponse {
    pub item: MaterialRequestItem,
    pub approvals: Vec<MaterialRequestApproval>,
    pub auto_completed: bool,
}
