//! Approval chain for a single item.
//!
//! A submission snapshots the enabled template steps into one record per
//! step, tagged with a cycle number. Decisions only ever touch records of the
//! item's current cycle; older cycles stay as they were for audit.

use super::error::{WorkflowError, WorkflowResult};
use super::events::WorkflowEventKind;
use super::registry;
use super::roles::Actor;
use super::status::{ItemApprovalStatus, ItemEvent, ItemStatus, StepStatus};
use super::{
    clean_comment, ensure_active, ensure_author, Transition, Workflow, NO_HOLDER_COMMENT,
};
use crate::db::models::approval::{ApprovalTemplate, MaterialRequestApproval};
use crate::db::models::material_request::{MaterialRequest, MaterialRequestItem};

impl<'a> Workflow<'a> {
    /// Starts a new approval cycle from the company's current template.
    ///
    /// Works from DRAFT and from RETURNED_FOR_REVISION; the latter opens a
    /// fresh cycle restarting at step 1.
    pub fn submit(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        template: Option<&ApprovalTemplate>,
    ) -> WorkflowResult<Transition> {
        ensure_active(item)?;
        ensure_author(actor, request, "submit an item")?;

        let event = match item.item_status {
            ItemStatus::ReturnedForRevision => ItemEvent::Resubmit,
            _ => ItemEvent::Submit,
        };
        let next_status = item.item_status.apply(event)?;
        let template = registry::require_active(request.company_id, template)?;

        let cycle = item.approval_cycle + 1;
        let approvals: Vec<MaterialRequestApproval> = template
            .enabled_steps()
            .into_iter()
            .filter_map(|step| {
                let order = step.step_order?;
                let skipped = step.skip_if_empty
                    && !self.directory.has_holders(request.company_id, step.role);
                Some(MaterialRequestApproval {
                    request_id: request.id,
                    item_id: item.id,
                    cycle,
                    step_order: order,
                    role: step.role,
                    is_mandatory: step.is_mandatory,
                    skip_if_empty: step.skip_if_empty,
                    description: step.description.clone(),
                    status: if skipped {
                        StepStatus::Skipped
                    } else {
                        StepStatus::Pending
                    },
                    approver_id: None,
                    comment: skipped.then(|| NO_HOLDER_COMMENT.to_string()),
                    approved_at: None,
                })
            })
            .collect();

        item.item_status = next_status;
        item.approval_cycle = cycle;
        item.approval_status = ItemApprovalStatus::Pending;
        item.rejection_reason = None;

        let mut transition = Transition::default();
        let first_pending = approvals
            .iter()
            .find(|a| a.status == StepStatus::Pending)
            .map(|a| (a.step_order, a.role));

        match first_pending {
            Some((step_order, role)) => {
                item.current_step = Some(step_order);
                transition.events.push(self.event(
                    actor,
                    request,
                    item,
                    WorkflowEventKind::Submitted { step_order, role },
                ));
            }
            None => {
                tracing::info!(item_id = item.id, "every approval step skipped, chain complete");
                self.complete_chain(item)?;
                transition
                    .events
                    .push(self.event(actor, request, item, WorkflowEventKind::ChainApproved));
            }
        }

        transition.new_approvals = approvals;
        Ok(transition)
    }

    /// Routes an `approve_item` decision.
    pub fn decide(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        approvals: &mut [MaterialRequestApproval],
        decision: ItemApprovalStatus,
        comment: Option<String>,
    ) -> WorkflowResult<Transition> {
        match decision {
            ItemApprovalStatus::Approved => self.approve(actor, request, item, approvals, comment),
            ItemApprovalStatus::Rejected | ItemApprovalStatus::Rework => {
                self.reject(actor, request, item, approvals, decision, comment)
            }
            ItemApprovalStatus::Pending => Err(WorkflowError::validation(
                "approval_status must be APPROVED, REJECTED or REWORK",
            )),
        }
    }

    /// Approves the current step and moves to the next one that still needs a decision.
    pub fn approve(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        approvals: &mut [MaterialRequestApproval],
        comment: Option<String>,
    ) -> WorkflowResult<Transition> {
        let index = current_record(actor, item, approvals)?;
        let step_order = approvals[index].step_order;

        let record = &mut approvals[index];
        record.status = StepStatus::Approved;
        record.approver_id = Some(actor.user_id);
        record.comment = clean_comment(comment);
        record.approved_at = Some(self.now);

        let mut later: Vec<usize> = approvals
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.cycle == item.approval_cycle
                    && a.step_order > step_order
                    && a.status == StepStatus::Pending
            })
            .map(|(i, _)| i)
            .collect();
        later.sort_by_key(|&i| approvals[i].step_order);

        let mut next = None;
        for i in later {
            let record = &mut approvals[i];
            if record.skip_if_empty && !self.directory.has_holders(request.company_id, record.role)
            {
                record.status = StepStatus::Skipped;
                record.comment = Some(NO_HOLDER_COMMENT.to_string());
                continue;
            }
            next = Some((record.step_order, record.role));
            break;
        }

        let mut transition = Transition::default();
        transition.events.push(self.event(
            actor,
            request,
            item,
            WorkflowEventKind::StepApproved {
                step_order,
                next_step: next.map(|(order, _)| order),
                next_role: next.map(|(_, role)| role),
            },
        ));

        match next {
            Some((order, _)) => item.current_step = Some(order),
            None => {
                self.complete_chain(item)?;
                transition
                    .events
                    .push(self.event(actor, request, item, WorkflowEventKind::ChainApproved));
            }
        }

        Ok(transition)
    }

    /// Rejects the current step and returns the item to its author.
    ///
    /// Later records of the cycle are left PENDING; the next submission
    /// opens a new cycle and these become history.
    pub fn reject(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        approvals: &mut [MaterialRequestApproval],
        outcome: ItemApprovalStatus,
        comment: Option<String>,
    ) -> WorkflowResult<Transition> {
        if !matches!(
            outcome,
            ItemApprovalStatus::Rejected | ItemApprovalStatus::Rework
        ) {
            return Err(WorkflowError::validation(
                "rejection outcome must be REJECTED or REWORK",
            ));
        }
        let reason = clean_comment(comment)
            .ok_or_else(|| WorkflowError::validation("a comment is required when rejecting"))?;

        let index = current_record(actor, item, approvals)?;
        let next_status = item.item_status.apply(ItemEvent::ChainRejected)?;

        let record = &mut approvals[index];
        record.status = StepStatus::Rejected;
        record.approver_id = Some(actor.user_id);
        record.comment = Some(reason.clone());
        record.approved_at = Some(self.now);
        let step_order = record.step_order;

        item.item_status = next_status;
        item.approval_status = outcome;
        item.rejection_reason = Some(reason.clone());
        item.current_step = None;

        let mut transition = Transition::default();
        transition.events.push(self.event(
            actor,
            request,
            item,
            WorkflowEventKind::Rejected {
                step_order,
                outcome,
                reason,
            },
        ));
        Ok(transition)
    }

    /// Guard for IN_APPROVAL → PAYMENT.
    pub fn ensure_chain_complete(
        &self,
        item: &MaterialRequestItem,
        approvals: &[MaterialRequestApproval],
    ) -> WorkflowResult<()> {
        let mut cycle = approvals
            .iter()
            .filter(|a| a.cycle == item.approval_cycle)
            .peekable();
        if cycle.peek().is_none() || !cycle.all(|a| a.status.is_settled_ok()) {
            return Err(WorkflowError::guard("not all steps approved"));
        }
        Ok(())
    }

    fn complete_chain(&self, item: &mut MaterialRequestItem) -> WorkflowResult<()> {
        item.item_status = item.item_status.apply(ItemEvent::ChainApproved)?;
        item.approval_status = ItemApprovalStatus::Approved;
        item.current_step = None;
        Ok(())
    }
}

/// Index of the record the actor is allowed to decide on.
fn current_record(
    actor: &Actor,
    item: &MaterialRequestItem,
    approvals: &[MaterialRequestApproval],
) -> WorkflowResult<usize> {
    ensure_active(item)?;
    if item.item_status != ItemStatus::InApproval {
        return Err(WorkflowError::guard(format!(
            "item is not awaiting approval (status {})",
            item.item_status
        )));
    }
    let step = item
        .current_step
        .ok_or_else(|| WorkflowError::guard("item has no current approval step"))?;

    let index = approvals
        .iter()
        .position(|a| {
            a.cycle == item.approval_cycle
                && a.step_order == step
                && a.status == StepStatus::Pending
        })
        .ok_or_else(|| WorkflowError::not_found(format!("no pending approval at step {}", step)))?;

    let required = approvals[index].role;
    if required != actor.role {
        // the actor's own step exists but was passed over for lack of staff
        if let Some(skipped) = approvals.iter().find(|a| {
            a.cycle == item.approval_cycle
                && a.role == actor.role
                && a.status == StepStatus::Skipped
        }) {
            return Err(WorkflowError::guard(format!(
                "step {} was skipped",
                skipped.step_order
            )));
        }
        return Err(WorkflowError::unauthorized(format!(
            "step {} must be decided by {}, not {}",
            step, required, actor.role
        )));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::fixtures::*;
    use crate::workflow::roles::{Role, StaffedRoles};

    fn staffed(roles: &[Role]) -> StaffedRoles {
        StaffedRoles::new(COMPANY, roles.iter().copied())
    }

    #[test]
    fn submit_snapshots_every_enabled_step_in_order() {
        let directory = staffed(&[Role::Foreman, Role::ChiefEngineer, Role::Director]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[
            (Role::Foreman, false),
            (Role::ChiefEngineer, true),
            (Role::Director, false),
        ]);
        let mut item = item(ItemStatus::Draft);

        let t = wf.submit(&author(), &request(), &mut item, Some(&template)).unwrap();

        let orders: Vec<i32> = t.new_approvals.iter().map(|a| a.step_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(t.new_approvals.iter().all(|a| a.status == StepStatus::Pending));
        assert!(t.new_approvals.iter().all(|a| a.cycle == 1));
        assert_eq!(item.item_status, ItemStatus::InApproval);
        assert_eq!(item.current_step, Some(1));
    }

    #[test]
    fn unstaffed_skippable_step_is_skipped_at_submission() {
        let directory = staffed(&[Role::Director]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[(Role::Foreman, true), (Role::Director, false)]);
        let mut item = item(ItemStatus::Draft);

        let t = wf.submit(&author(), &request(), &mut item, Some(&template)).unwrap();

        assert_eq!(t.new_approvals[0].status, StepStatus::Skipped);
        assert_eq!(t.new_approvals[1].status, StepStatus::Pending);
        assert_eq!(item.current_step, Some(2));
    }

    #[test]
    fn unstaffed_step_without_skip_flag_stays_pending() {
        let directory = staffed(&[]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[(Role::Foreman, false)]);
        let mut item = item(ItemStatus::Draft);

        let t = wf.submit(&author(), &request(), &mut item, Some(&template)).unwrap();
        assert_eq!(t.new_approvals[0].status, StepStatus::Pending);
    }

    #[test]
    fn fully_skipped_chain_goes_straight_to_payment() {
        let directory = staffed(&[]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[(Role::Foreman, true), (Role::Director, true)]);
        let mut item = item(ItemStatus::Draft);

        let t = wf.submit(&author(), &request(), &mut item, Some(&template)).unwrap();

        assert_eq!(item.item_status, ItemStatus::Payment);
        assert_eq!(item.approval_status, ItemApprovalStatus::Approved);
        assert_eq!(item.current_step, None);
        assert_eq!(t.events.last().map(|e| &e.kind), Some(&WorkflowEventKind::ChainApproved));
    }

    #[test]
    fn only_the_author_submits() {
        let directory = staffed(&[Role::Foreman]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[(Role::Foreman, false)]);
        let mut item = item(ItemStatus::Draft);

        let err = wf
            .submit(&actor(99, Role::Foreman), &request(), &mut item, Some(&template))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization(_)));
        assert_eq!(item.item_status, ItemStatus::Draft);
    }

    #[test]
    fn submit_without_template_is_not_found() {
        let directory = staffed(&[]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let mut item = item(ItemStatus::Draft);

        let err = wf.submit(&author(), &request(), &mut item, None).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        assert_eq!(item.approval_cycle, 0);
    }

    #[test]
    fn approval_skips_steps_that_lost_their_holders() {
        let mut directory = staffed(&[Role::Foreman, Role::ChiefEngineer, Role::Director]);
        let policy = policy();
        let template = template(&[
            (Role::Foreman, false),
            (Role::ChiefEngineer, true),
            (Role::Director, false),
        ]);
        let mut item = item(ItemStatus::Draft);
        let mut approvals = Workflow::new(&directory, &policy, now())
            .submit(&author(), &request(), &mut item, Some(&template))
            .unwrap()
            .new_approvals;

        directory.roles.remove(&Role::ChiefEngineer);
        let wf = Workflow::new(&directory, &policy, now());
        wf.approve(&actor(1, Role::Foreman), &request(), &mut item, &mut approvals, None)
            .unwrap();

        assert_eq!(approvals[1].status, StepStatus::Skipped);
        assert_eq!(item.current_step, Some(3));
    }

    #[test]
    fn reject_requires_a_comment() {
        let directory = staffed(&[Role::Foreman]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[(Role::Foreman, false)]);
        let mut item = item(ItemStatus::Draft);
        let mut approvals = wf
            .submit(&author(), &request(), &mut item, Some(&template))
            .unwrap()
            .new_approvals;

        let err = wf
            .reject(
                &actor(1, Role::Foreman),
                &request(),
                &mut item,
                &mut approvals,
                ItemApprovalStatus::Rejected,
                Some("   ".to_string()),
            )
            .unwrap_err();
        assert_eq!(err, WorkflowError::validation("a comment is required when rejecting"));
        assert_eq!(item.item_status, ItemStatus::InApproval);
    }

    #[test]
    fn pending_is_not_a_decision() {
        let directory = staffed(&[Role::Foreman]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let mut item = item(ItemStatus::InApproval);
        let err = wf
            .decide(
                &actor(1, Role::Foreman),
                &request(),
                &mut item,
                &mut [],
                ItemApprovalStatus::Pending,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn chain_completion_guard_reports_pending_steps() {
        let directory = staffed(&[Role::Foreman]);
        let policy = policy();
        let wf = Workflow::new(&directory, &policy, now());
        let template = template(&[(Role::Foreman, false)]);
        let mut item = item(ItemStatus::Draft);
        let approvals = wf
            .submit(&author(), &request(), &mut item, Some(&template))
            .unwrap()
            .new_approvals;

        assert_eq!(
            wf.ensure_chain_complete(&item, &approvals).unwrap_err(),
            WorkflowError::guard("not all steps approved")
        );
    }
}
