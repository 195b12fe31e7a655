// src/db/models/approval.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::workflow::roles::Role;
use crate::workflow::status::StepStatus;

/// One configured step of a company's approval template.
///
/// `step_order` is dense 1..N over enabled steps and `None` for disabled ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TemplateStep {
    pub position: i32,
    pub step_order: Option<i32>,
    pub role: Role,
    pub enabled: bool,
    pub is_mandatory: bool,
    pub skip_if_empty: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalTemplate {
    pub company_id: i32,
    pub steps: Vec<TemplateStep>,
    pub updated_by: Option<i32>,
    pub updated_at: Option<NaiveDateTime>,
}

impl ApprovalTemplate {
    /// Enabled steps in execution order.
    pub fn enabled_steps(&self) -> Vec<&TemplateStep> {
        let mut steps: Vec<&TemplateStep> = self
            .steps
            .iter()
            .filter(|step| step.enabled && step.step_order.is_some())
            .collect();
        steps.sort_by_key(|step| step.step_order);
        steps
    }
}

/// Step as sent by the administrator. List position decides the order;
/// any client-sent `order` is ignored.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TemplateStepInput {
    pub role: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub skip_if_empty: bool,
    pub description: Option<String>,
    pub order: Option<i32>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveApprovalTemplate {
    pub steps: Vec<TemplateStepInput>,
}

/// Snapshot of one template step for one item's approval cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaterialRequestApproval {
    pub request_id: i32,
    pub item_id: i32,
    pub cycle: i32,
    pub step_order: i32,
    pub role: Role,
    pub is_mandatory: bool,
    pub skip_if_empty: bool,
    pub description: Option<String>,
    pub status: StepStatus,
    pub approver_id: Option<i32>,
    pub comment: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalRecordView {
    #[serde(flatten)]
    pub record: MaterialRequestApproval,
    /// Record belongs to an earlier cycle that a resubmission replaced.
    pub superseded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemApprovals {
    pub item_id: i32,
    pub approval_cycle: i32,
    pub current_step: Option<i32>,
    pub approvals: Vec<ApprovalRecordView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestApprovals {
    pub request_id: i32,
    pub current_step: Option<i32>,
    pub items: Vec<ItemApprovals>,
}
