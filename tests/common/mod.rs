#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};

use sitecontrol_backend::db::models::approval::{
    ApprovalTemplate, MaterialRequestApproval, TemplateStep,
};
use sitecontrol_backend::db::models::material_request::{MaterialRequest, MaterialRequestItem};
use sitecontrol_backend::workflow::status::{
    AvailabilityStatus, ItemApprovalStatus, ItemStatus, RecordStatus,
};
use sitecontrol_backend::workflow::{Actor, Role, StaffedRoles, Transition, TransitionPolicy};

pub const COMPANY: i32 = 7;
pub const AUTHOR: i32 = 70;

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, 2)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap()
}

pub fn actor(user_id: i32, role: Role) -> Actor {
    Actor {
        user_id,
        company_id: COMPANY,
        role,
        username: format!("user{}", user_id),
    }
}

pub fn author() -> Actor {
    actor(AUTHOR, Role::Engineer)
}

pub fn policy() -> TransitionPolicy {
    TransitionPolicy {
        payment: vec![Role::Accountant, Role::Director],
        delivery: vec![Role::Supply],
        warehouse: vec![Role::Warehouse, Role::Supply],
        acceptance: vec![Role::Foreman, Role::SiteManager, Role::ProjectManager],
    }
}

pub fn staffed(roles: &[Role]) -> StaffedRoles {
    StaffedRoles::new(COMPANY, roles.iter().copied())
}

pub fn template(steps: &[(Role, bool)]) -> ApprovalTemplate {
    ApprovalTemplate {
        company_id: COMPANY,
        steps: steps
            .iter()
            .enumerate()
            .map(|(i, (role, skip_if_empty))| TemplateStep {
                position: i as i32 + 1,
                step_order: Some(i as i32 + 1),
                role: *role,
                enabled: true,
                is_mandatory: false,
                skip_if_empty: *skip_if_empty,
                description: None,
            })
            .collect(),
        updated_by: None,
        updated_at: None,
    }
}

/// A request with one item and the approval records stored for it so far.
pub struct Case {
    pub request: MaterialRequest,
    pub item: MaterialRequestItem,
    pub records: Vec<MaterialRequestApproval>,
}

impl Case {
    pub fn new(status: ItemStatus) -> Self {
        Self {
            request: MaterialRequest {
                id: 1,
                number: "MR-000001".to_string(),
                project_id: 3,
                company_id: COMPANY,
                author_id: AUTHOR,
                drawing_reference: None,
                work_type: Some("masonry".to_string()),
                notes: None,
                current_step: None,
                created_at: now(),
                updated_at: now(),
            },
            item: MaterialRequestItem {
                id: 11,
                request_id: 1,
                material_name: "Cement M500".to_string(),
                quantity: BigDecimal::from(10),
                unit: "bag".to_string(),
                specifications: None,
                item_status: status,
                approval_status: ItemApprovalStatus::Pending,
                availability_status: AvailabilityStatus::NotChecked,
                status: RecordStatus::Active,
                previous_item_status: None,
                actual_quantity: None,
                current_step: None,
                approval_cycle: 0,
                rejection_reason: None,
                cancel_reason: None,
                cancelled_by: None,
                cancelled_at: None,
                version: 1,
                created_at: now(),
                updated_at: now(),
            },
            records: Vec::new(),
        }
    }

    /// Stores what a transition snapshotted, like the item handlers do.
    pub fn keep(&mut self, transition: &Transition) {
        self.records.extend(transition.new_approvals.iter().cloned());
    }

    pub fn cycle(&self, cycle: i32) -> Vec<&MaterialRequestApproval> {
        self.records.iter().filter(|r| r.cycle == cycle).collect()
    }
}
