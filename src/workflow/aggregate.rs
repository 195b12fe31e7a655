//! Item-level operations that live outside the approval chain.

use bigdecimal::BigDecimal;

use super::error::{WorkflowError, WorkflowResult};
use super::events::WorkflowEventKind;
use super::roles::{Actor, Gate};
use super::status::{
    AvailabilityStatus, ItemApprovalStatus, ItemEvent, ItemStatus, RecordStatus,
};
use super::{clean_comment, ensure_active, ensure_author, Transition, Workflow};
use crate::db::models::approval::{ApprovalTemplate, MaterialRequestApproval};
use crate::db::models::material_request::{
    MaterialRequest, MaterialRequestItem, NewMaterialRequest, NewMaterialRequestItem,
    UpdateMaterialRequestItem,
};

impl<'a> Workflow<'a> {
    /// Generic `change_item_status` entry point.
    ///
    /// Approval-driven targets are routed through the chain so its guards
    /// apply; every other edge is checked against the transition policy.
    #[allow(clippy::too_many_arguments)]
    pub fn change_item_status(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        approvals: &mut [MaterialRequestApproval],
        template: Option<&ApprovalTemplate>,
        target: ItemStatus,
        comment: Option<String>,
    ) -> WorkflowResult<Transition> {
        ensure_active(item)?;
        let from = item.item_status;
        if from == target {
            return Err(WorkflowError::guard(format!("item is already {}", from)));
        }
        let event = from.event_towards(target).ok_or_else(|| {
            WorkflowError::guard(format!("no transition from {} to {}", from, target))
        })?;

        match event {
            ItemEvent::Submit | ItemEvent::Resubmit => {
                return self.submit(actor, request, item, template);
            }
            ItemEvent::ChainRejected => {
                return self.reject(
                    actor,
                    request,
                    item,
                    approvals,
                    ItemApprovalStatus::Rework,
                    comment,
                );
            }
            ItemEvent::ChainApproved => {
                self.ensure_chain_complete(item, approvals)?;
            }
            _ => {}
        }

        if let Some(gate) = event.gate() {
            self.policy.check(gate, actor)?;
        }
        let to = from.apply(event)?;
        item.item_status = to;
        if event == ItemEvent::ChainApproved {
            item.approval_status = ItemApprovalStatus::Approved;
            item.current_step = None;
        }

        let mut transition = Transition::default();
        transition.events.push(self.event(
            actor,
            request,
            item,
            WorkflowEventKind::StatusChanged { from, to },
        ));
        if to == ItemStatus::Completed {
            transition.events.push(self.event(
                actor,
                request,
                item,
                WorkflowEventKind::Completed { auto: false },
            ));
        }
        Ok(transition)
    }

    /// Puts the item aside without touching its lifecycle state or siblings.
    pub fn cancel_item(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        reason: Option<String>,
    ) -> WorkflowResult<Transition> {
        if item.is_cancelled() {
            return Err(WorkflowError::guard("item is already cancelled"));
        }
        if item.item_status.is_terminal() {
            return Err(WorkflowError::guard(format!(
                "a {} item cannot be cancelled",
                item.item_status
            )));
        }

        let reason = clean_comment(reason);
        item.status = RecordStatus::Cancelled;
        item.previous_item_status = Some(item.item_status);
        item.cancel_reason = reason.clone();
        item.cancelled_by = Some(actor.user_id);
        item.cancelled_at = Some(self.now);

        let mut transition = Transition::default();
        transition.events.push(self.event(
            actor,
            request,
            item,
            WorkflowEventKind::Cancelled { reason },
        ));
        Ok(transition)
    }

    /// Brings a cancelled item back exactly where it was.
    pub fn restore_item(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
    ) -> WorkflowResult<Transition> {
        if !item.is_cancelled() {
            return Err(WorkflowError::guard("item is not cancelled"));
        }
        let previous = item
            .previous_item_status
            .ok_or_else(|| WorkflowError::guard("no recorded state to restore"))?;

        item.item_status = previous;
        item.status = RecordStatus::Active;
        item.previous_item_status = None;
        item.cancel_reason = None;
        item.cancelled_by = None;
        item.cancelled_at = None;

        let mut transition = Transition::default();
        transition.events.push(self.event(
            actor,
            request,
            item,
            WorkflowEventKind::Restored { status: previous },
        ));
        Ok(transition)
    }

    /// Records the delivered amount and completes the item once it covers the request.
    pub fn update_actual_quantity(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        actual_quantity: BigDecimal,
    ) -> WorkflowResult<Transition> {
        ensure_active(item)?;
        if actual_quantity < BigDecimal::from(0) {
            return Err(WorkflowError::validation(
                "actual_quantity must not be negative",
            ));
        }
        if item.item_status != ItemStatus::Delivery {
            return Err(WorkflowError::guard(format!(
                "actual quantity can only be recorded during DELIVERY (status {})",
                item.item_status
            )));
        }
        self.policy.check(Gate::Delivery, actor)?;

        let fulfilled = actual_quantity >= item.quantity;
        item.actual_quantity = Some(actual_quantity);

        let mut transition = Transition::default();
        if fulfilled {
            item.item_status = item.item_status.apply(ItemEvent::QuantityFulfilled)?;
            transition.auto_completed = true;
            transition.events.push(self.event(
                actor,
                request,
                item,
                WorkflowEventKind::Completed { auto: true },
            ));
        }
        Ok(transition)
    }

    /// Author edits before (re)submission.
    pub fn edit_item(
        &self,
        actor: &Actor,
        request: &MaterialRequest,
        item: &mut MaterialRequestItem,
        changes: UpdateMaterialRequestItem,
    ) -> WorkflowResult<Transition> {
        ensure_active(item)?;
        ensure_author(actor, request, "edit an item")?;
        if !item.item_status.is_editable() {
            return Err(WorkflowError::guard(format!(
                "a {} item cannot be edited",
                item.item_status
            )));
        }
        if changes.is_empty() {
            return Err(WorkflowError::validation("no fields to update"));
        }

        if let Some(name) = changes.material_name {
            item.material_name = required_text("material_name", &name)?;
        }
        if let Some(quantity) = changes.quantity {
            ensure_positive(&quantity)?;
            item.quantity = quantity;
        }
        if let Some(unit) = changes.unit {
            item.unit = required_text("unit", &unit)?;
        }
        if let Some(spec) = changes.specifications {
            item.specifications = Some(spec.trim().to_string()).filter(|s| !s.is_empty());
        }
        Ok(Transition::default())
    }

    /// Stock information from the warehouse. Never drives `item_status`.
    pub fn set_availability(
        &self,
        actor: &Actor,
        item: &mut MaterialRequestItem,
        availability: AvailabilityStatus,
    ) -> WorkflowResult<Transition> {
        ensure_active(item)?;
        self.policy.check(Gate::Warehouse, actor)?;
        item.availability_status = availability;
        Ok(Transition::default())
    }
}

/// Checks a new request before anything is written.
pub fn validate_new_request(request: &NewMaterialRequest) -> WorkflowResult<()> {
    if request.items.is_empty() {
        return Err(WorkflowError::validation(
            "a material request needs at least one item",
        ));
    }
    request.items.iter().try_for_each(validate_new_item)
}

pub fn validate_new_item(item: &NewMaterialRequestItem) -> WorkflowResult<()> {
    required_text("material_name", &item.material_name)?;
    required_text("unit", &item.unit)?;
    ensure_positive(&item.quantity)
}

fn required_text(field: &str, value: &str) -> WorkflowResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn ensure_positive(quantity: &BigDecimal) -> WorkflowResult<()> {
    if *quantity <= BigDecimal::from(0) {
        return Err(WorkflowError::validation("quantity must be positive"));
    }
    Ok(())
}
