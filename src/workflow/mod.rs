//! Material-request approval and item lifecycle.
//!
//! Everything in here is synchronous and storage-free: callers load the
//! request, item and approval records, run one operation on a [`Workflow`],
//! then persist what changed and hand the returned events to a notifier.

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod roles;
pub mod status;

use chrono::NaiveDateTime;

use crate::db::models::approval::MaterialRequestApproval;
use crate::db::models::material_request::{MaterialRequest, MaterialRequestItem};

pub use error::{WorkflowError, WorkflowResult};
pub use events::{WorkflowEvent, WorkflowEventKind};
pub use roles::{Actor, Role, RoleDirectory, StaffedRoles, TransitionPolicy};

/// Comment stamped on steps bypassed because nobody holds the role.
pub const NO_HOLDER_COMMENT: &str = "skipped: no user holds this role";

pub struct Workflow<'a> {
    directory: &'a dyn RoleDirectory,
    policy: &'a TransitionPolicy,
    now: NaiveDateTime,
}

/// Result of one workflow operation.
#[derive(Debug, Default)]
pub struct Transition {
    /// Approval records of a freshly snapshotted cycle, to be inserted.
    pub new_approvals: Vec<MaterialRequestApproval>,
    pub events: Vec<WorkflowEvent>,
    pub auto_completed: bool,
}

impl<'a> Workflow<'a> {
    pub fn new(
        directory: &'a dyn RoleDirectory,
        policy: &'a TransitionPolicy,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            directory,
            policy,
            now,
        }
    }

    fn event(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &MaterialRequestItem,
        kind: WorkflowEventKind,
    ) -> WorkflowEvent {
        WorkflowEvent {
            company_id: request.company_id,
            request_id: request.id,
            item_id: item.id,
            author_id: request.author_id,
            actor_id: actor.user_id,
            kind,
        }
    }
}

fn ensure_active(item: &MaterialRequestItem) -> WorkflowResult<()> {
    if item.is_cancelled() {
        return Err(WorkflowError::guard("item is cancelled"));
    }
    Ok(())
}

fn ensure_author(actor: &Actor, request: &MaterialRequest, action: &str) -> WorkflowResult<()> {
    if actor.user_id != request.author_id {
        return Err(WorkflowError::unauthorized(format!(
            "only the request author can {}",
            action
        )));
    }
    Ok(())
}

fn clean_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
