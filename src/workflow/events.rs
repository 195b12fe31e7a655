use serde::Serialize;

use super::roles::Role;
use super::status::{ItemApprovalStatus, ItemStatus};

/// Something worth telling people about after a transition committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEventKind {
    /// Chain started; `role` is the first approver that must act.
    Submitted { step_order: i32, role: Role },
    StepApproved {
        step_order: i32,
        next_step: Option<i32>,
        next_role: Option<Role>,
    },
    ChainApproved,
    Rejected {
        step_order: i32,
        outcome: ItemApprovalStatus,
        reason: String,
    },
    StatusChanged { from: ItemStatus, to: ItemStatus },
    Completed { auto: bool },
    Cancelled { reason: Option<String> },
    Restored { status: ItemStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowEvent {
    pub company_id: i32,
    pub request_id: i32,
    pub item_id: i32,
    pub author_id: i32,
    pub actor_id: i32,
    pub kind: WorkflowEventKind,
}
