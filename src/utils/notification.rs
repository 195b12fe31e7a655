use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::workflow::events::{WorkflowEvent, WorkflowEventKind};
use crate::workflow::roles::Role;

/// Result type for notification operations
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in notification operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid target provided: {0}")]
    InvalidTarget(String),

    #[error("Failed to serialize notification data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound side of the workflow. Delivery is best effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &WorkflowEvent) -> NotificationResult<()>;
}

/// Sends `events` on a detached task. Failures are logged and dropped so a
/// committed transition never depends on delivery.
pub fn dispatch(sink: Arc<dyn NotificationSink>, events: Vec<WorkflowEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for event in &events {
            if let Err(e) = sink.deliver(event).await {
                tracing::warn!(
                    request_id = event.request_id,
                    item_id = event.item_id,
                    "Failed to deliver workflow notification: {}",
                    e
                );
            }
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    User(i32),
    /// Every active holder of `role` in the company.
    CompanyRole { company_id: i32, role: Role },
}

impl NotificationTarget {
    fn scope(&self) -> &'static str {
        match self {
            NotificationTarget::User(_) => "user",
            NotificationTarget::CompanyRole { .. } => "company_role",
        }
    }

    fn target_id(&self) -> i32 {
        match self {
            NotificationTarget::User(user_id) => *user_id,
            NotificationTarget::CompanyRole { company_id, .. } => *company_id,
        }
    }

    fn role(&self) -> Option<Role> {
        match self {
            NotificationTarget::User(_) => None,
            NotificationTarget::CompanyRole { role, .. } => Some(*role),
        }
    }
}

/// Notification builder for creating workflow notifications
pub struct NotificationBuilder {
    title: String,
    body: Option<String>,
    notification_type: String,
    targets: Vec<NotificationTarget>,
    action_type: Option<String>,
    action_data: Option<Value>,
    dismissible: bool,
    expires_in_days: Option<i64>,
}

impl NotificationBuilder {
    /// Create a new notification builder with required fields
    pub fn new(title: impl Into<String>, notification_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            notification_type: notification_type.into(),
            targets: Vec::new(),
            action_type: None,
            action_data: None,
            dismissible: true,
            expires_in_days: Some(14), // Default to 14 days
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn target_user(mut self, user_id: i32) -> Self {
        self.targets.push(NotificationTarget::User(user_id));
        self
    }

    pub fn target_role(mut self, company_id: i32, role: Role) -> Self {
        self.targets
            .push(NotificationTarget::CompanyRole { company_id, role });
        self
    }

    /// Set the action type and data for when notification is clicked
    pub fn action(mut self, action_type: impl Into<String>, action_data: Value) -> Self {
        self.action_type = Some(action_type.into());
        self.action_data = Some(action_data);
        self
    }

    pub fn dismissible(mut self, dismissible: bool) -> Self {
        self.dismissible = dismissible;
        self
    }

    #[cfg(test)]
    pub(crate) fn targets(&self) -> &[NotificationTarget] {
        &self.targets
    }

    #[cfg(test)]
    pub(crate) fn title(&self) -> &str {
        &self.title
    }

    /// Build and send the notification
    pub async fn send(self, pool: &PgPool) -> NotificationResult<i32> {
        if self.targets.is_empty() {
            return Err(NotificationError::InvalidTarget(
                "At least one target is required".to_string(),
            ));
        }

        let expires_at = self
            .expires_in_days
            .map(|days| (Utc::now() + chrono::Duration::days(days)).naive_utc());

        let mut tx = pool.begin().await?;

        let notification_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (title, body, type, action_type, action_data, dismissible, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&self.title)
        .bind(&self.body)
        .bind(&self.notification_type)
        .bind(&self.action_type)
        .bind(&self.action_data)
        .bind(self.dismissible)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for target in &self.targets {
            sqlx::query(
                "INSERT INTO notification_targets (notification_id, scope, target_id, role) VALUES ($1, $2, $3, $4)",
            )
            .bind(notification_id)
            .bind(target.scope())
            .bind(target.target_id())
            .bind(target.role())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(notification_id)
    }
}

/// Common notification types for workflow usage
pub mod notification_types {
    pub const APPROVAL_REQUIRED: &str = "approval_required";
    pub const ITEM_APPROVED: &str = "item_approved";
    pub const ITEM_REJECTED: &str = "item_rejected";
    pub const ITEM_STATUS_CHANGE: &str = "item_status_change";
    pub const ITEM_COMPLETED: &str = "item_completed";
}

/// Who hears about `event`, and what they are told.
pub fn notification_for(event: &WorkflowEvent) -> NotificationBuilder {
    use notification_types as types;

    let action = json!({
        "request_id": event.request_id,
        "item_id": event.item_id,
    });

    let builder = match &event.kind {
        WorkflowEventKind::Submitted { step_order, role } => NotificationBuilder::new(
            "Material request awaiting approval",
            types::APPROVAL_REQUIRED,
        )
        .body(format!("Step {} needs a decision from {}", step_order, role))
        .target_role(event.company_id, *role)
        .dismissible(false),
        WorkflowEventKind::StepApproved {
            step_order,
            next_step: Some(next),
            next_role: Some(role),
        } => NotificationBuilder::new(
            "Material request awaiting approval",
            types::APPROVAL_REQUIRED,
        )
        .body(format!("Step {} approved, step {} needs {}", step_order, next, role))
        .target_role(event.company_id, *role)
        .dismissible(false),
        WorkflowEventKind::StepApproved { step_order, .. } => {
            NotificationBuilder::new("Approval step passed", types::ITEM_APPROVED)
                .body(format!("Step {} approved", step_order))
                .target_user(event.author_id)
        }
        WorkflowEventKind::ChainApproved => {
            NotificationBuilder::new("Material request item approved", types::ITEM_APPROVED)
                .body("All approval steps passed, the item moved to payment")
                .target_user(event.author_id)
        }
        WorkflowEventKind::Rejected {
            step_order,
            outcome,
            reason,
        } => NotificationBuilder::new("Material request item returned", types::ITEM_REJECTED)
            .body(format!(
                "Step {} returned the item ({:?}): {}",
                step_order, outcome, reason
            ))
            .target_user(event.author_id),
        WorkflowEventKind::StatusChanged { from, to } => {
            NotificationBuilder::new(format!("Status Update: {} → {}", from, to), types::ITEM_STATUS_CHANGE)
                .target_user(event.author_id)
        }
        WorkflowEventKind::Completed { auto } => {
            NotificationBuilder::new("Material request item completed", types::ITEM_COMPLETED)
                .body(if *auto {
                    "Delivered quantity covers the request"
                } else {
                    "Accepted on site"
                })
                .target_user(event.author_id)
        }
        WorkflowEventKind::Cancelled { reason } => {
            NotificationBuilder::new("Material request item cancelled", types::ITEM_STATUS_CHANGE)
                .body(reason.clone().unwrap_or_default())
                .target_user(event.author_id)
        }
        WorkflowEventKind::Restored { status } => {
            NotificationBuilder::new("Material request item restored", types::ITEM_STATUS_CHANGE)
                .body(format!("Item resumed at {}", status))
                .target_user(event.author_id)
        }
    };

    builder.action("view_material_request", action)
}

/// Writes notification rows read by the web client.
pub struct DbNotificationSink {
    pool: PgPool,
}

impl DbNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for DbNotificationSink {
    async fn deliver(&self, event: &WorkflowEvent) -> NotificationResult<()> {
        // nobody needs to hear about their own action
        if event.actor_id == event.author_id
            && matches!(
                event.kind,
                WorkflowEventKind::Cancelled { .. } | WorkflowEventKind::Restored { .. }
            )
        {
            return Ok(());
        }
        let id = notification_for(event).send(&self.pool).await?;
        tracing::debug!(notification_id = id, item_id = event.item_id, "Workflow notification stored");
        Ok(())
    }
}
