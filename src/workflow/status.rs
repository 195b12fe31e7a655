use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{WorkflowError, WorkflowResult};
use super::roles::Gate;

/// Authoritative lifecycle of a single request item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Draft,
    InApproval,
    ReturnedForRevision,
    Payment,
    Paid,
    Delivery,
    WarehouseShipping,
    SentToSite,
    Completed,
}

/// Outcome of the approval sub-flow for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_approval_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Rework,
}

/// Warehouse-reported stock state. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "availability_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    NotChecked,
    InStock,
    PartiallyInStock,
    OutOfStock,
}

/// Cancellation overlay, orthogonal to [`ItemStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_record_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Active,
    Cancelled,
}

/// State of one instantiated approval step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "step_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn is_settled_ok(&self) -> bool {
        matches!(self, StepStatus::Approved | StepStatus::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    Submit,
    Resubmit,
    ChainApproved,
    ChainRejected,
    ConfirmPayment,
    MarkPaid,
    StartDelivery,
    ShipFromWarehouse,
    SendToSite,
    AcceptOnSite,
    QuantityFulfilled,
}

impl ItemEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemEvent::Submit => "submit",
            ItemEvent::Resubmit => "resubmit",
            ItemEvent::ChainApproved => "complete approval",
            ItemEvent::ChainRejected => "reject",
            ItemEvent::ConfirmPayment => "confirm payment",
            ItemEvent::MarkPaid => "mark paid",
            ItemEvent::StartDelivery => "start delivery",
            ItemEvent::ShipFromWarehouse => "ship from warehouse",
            ItemEvent::SendToSite => "send to site",
            ItemEvent::AcceptOnSite => "accept on site",
            ItemEvent::QuantityFulfilled => "record delivered quantity",
        }
    }

    /// Role gate guarding the event, if it is not driven by the approval chain or the author.
    pub fn gate(&self) -> Option<Gate> {
        match self {
            ItemEvent::MarkPaid => Some(Gate::Payment),
            // handing a paid-for item to delivery is a supply action
            ItemEvent::ConfirmPayment
            | ItemEvent::StartDelivery
            | ItemEvent::QuantityFulfilled => Some(Gate::Delivery),
            ItemEvent::ShipFromWarehouse | ItemEvent::SendToSite => Some(Gate::Warehouse),
            ItemEvent::AcceptOnSite => Some(Gate::Acceptance),
            ItemEvent::Submit
            | ItemEvent::Resubmit
            | ItemEvent::ChainApproved
            | ItemEvent::ChainRejected => None,
        }
    }

    /// Events only the workflow itself may raise.
    fn is_internal(&self) -> bool {
        matches!(self, ItemEvent::QuantityFulfilled)
    }
}

use ItemEvent as E;
use ItemStatus as S;

const TRANSITIONS: &[(ItemStatus, ItemEvent, ItemStatus)] = &[
    (S::Draft, E::Submit, S::InApproval),
    (S::ReturnedForRevision, E::Resubmit, S::InApproval),
    (S::InApproval, E::ChainApproved, S::Payment),
    (S::InApproval, E::ChainRejected, S::ReturnedForRevision),
    (S::Payment, E::ConfirmPayment, S::Delivery),
    (S::Payment, E::MarkPaid, S::Paid),
    (S::Paid, E::StartDelivery, S::Delivery),
    (S::Delivery, E::ShipFromWarehouse, S::WarehouseShipping),
    (S::WarehouseShipping, E::SendToSite, S::SentToSite),
    (S::Delivery, E::AcceptOnSite, S::Completed),
    (S::WarehouseShipping, E::AcceptOnSite, S::Completed),
    (S::SentToSite, E::AcceptOnSite, S::Completed),
    (S::Delivery, E::QuantityFulfilled, S::Completed),
];

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            S::Draft => "DRAFT",
            S::InApproval => "IN_APPROVAL",
            S::ReturnedForRevision => "RETURNED_FOR_REVISION",
            S::Payment => "PAYMENT",
            S::Paid => "PAID",
            S::Delivery => "DELIVERY",
            S::WarehouseShipping => "WAREHOUSE_SHIPPING",
            S::SentToSite => "SENT_TO_SITE",
            S::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, S::Completed)
    }

    /// Author may still change the item contents.
    pub fn is_editable(&self) -> bool {
        matches!(self, S::Draft | S::ReturnedForRevision)
    }

    /// Applies `event`, failing with a guard violation when the table has no such edge.
    pub fn apply(self, event: ItemEvent) -> WorkflowResult<ItemStatus> {
        TRANSITIONS
            .iter()
            .find(|(from, ev, _)| *from == self && *ev == event)
            .map(|(_, _, to)| *to)
            .ok_or_else(|| {
                WorkflowError::guard(format!(
                    "'{}' is not allowed while the item is {}",
                    event.as_str(),
                    self.as_str()
                ))
            })
    }

    /// Externally requestable event that moves `self` to `target`.
    pub fn event_towards(self, target: ItemStatus) -> Option<ItemEvent> {
        TRANSITIONS
            .iter()
            .find(|(from, ev, to)| *from == self && *to == target && !ev.is_internal())
            .map(|(_, ev, _)| *ev)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_line_reaches_completion() {
        let mut status = S::Draft;
        for event in [E::Submit, E::ChainApproved, E::ConfirmPayment, E::QuantityFulfilled] {
            status = status.apply(event).unwrap();
        }
        assert_eq!(status, S::Completed);
    }

    #[test]
    fn extended_flow_passes_through_warehouse() {
        let status = S::Payment
            .apply(E::MarkPaid)
            .and_then(|s| s.apply(E::StartDelivery))
            .and_then(|s| s.apply(E::ShipFromWarehouse))
            .and_then(|s| s.apply(E::SendToSite))
            .and_then(|s| s.apply(E::AcceptOnSite))
            .unwrap();
        assert_eq!(status, S::Completed);
    }

    #[test]
    fn illegal_edge_names_the_guard() {
        let err = S::Draft.apply(E::ConfirmPayment).unwrap_err();
        assert_eq!(err, WorkflowError::guard("'confirm payment' is not allowed while the item is DRAFT"));
    }

    #[test]
    fn completed_is_terminal() {
        assert!(S::Completed.is_terminal());
        assert!(S::Completed.apply(E::Submit).is_err());
    }

    #[test]
    fn generic_lookup_prefers_site_acceptance_over_quantity_path() {
        assert_eq!(S::Delivery.event_towards(S::Completed), Some(E::AcceptOnSite));
        assert_eq!(S::Payment.event_towards(S::Delivery), Some(E::ConfirmPayment));
        assert_eq!(S::Draft.event_towards(S::Completed), None);
    }

    #[test]
    fn moving_payment_into_delivery_is_gated_on_delivery() {
        assert_eq!(E::ConfirmPayment.gate(), Some(Gate::Delivery));
        assert_eq!(E::MarkPaid.gate(), Some(Gate::Payment));
    }

    #[test]
    fn serde_uses_upper_snake_case() {
        let json = serde_json::to_string(&S::ReturnedForRevision).unwrap();
        assert_eq!(json, "\"RETURNED_FOR_REVISION\"");
    }
}
