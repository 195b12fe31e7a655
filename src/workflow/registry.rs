//! Per-company approval step configuration.
//!
//! The registry only stores what an administrator saved. Templates carry no
//! version: each submission snapshots the steps into approval records, so
//! saving never reaches into chains that are already running.

use super::error::{WorkflowError, WorkflowResult};
use super::roles::Role;
use crate::db::models::approval::{ApprovalTemplate, TemplateStep, TemplateStepInput};

/// Validates a client step list and assigns dense orders from list position.
pub fn normalize_steps(steps: &[TemplateStepInput]) -> WorkflowResult<Vec<TemplateStep>> {
    let mut normalized = Vec::with_capacity(steps.len());
    let mut next_order = 1;

    for (index, input) in steps.iter().enumerate() {
        let role: Role = input.role.parse().map_err(|_| {
            WorkflowError::validation(format!(
                "unknown role '{}' at position {}",
                input.role.trim(),
                index + 1
            ))
        })?;

        if input.is_mandatory && !input.enabled {
            return Err(WorkflowError::validation(format!(
                "mandatory step {} cannot be disabled",
                role
            )));
        }

        let step_order = if input.enabled {
            let order = next_order;
            next_order += 1;
            Some(order)
        } else {
            None
        };

        normalized.push(TemplateStep {
            position: index as i32 + 1,
            step_order,
            role,
            enabled: input.enabled,
            is_mandatory: input.is_mandatory,
            skip_if_empty: input.skip_if_empty,
            description: input
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        });
    }

    if next_order == 1 {
        return Err(WorkflowError::validation("no enabled steps"));
    }

    Ok(normalized)
}

/// Guard used by submission: a company must have saved a template first.
pub fn require_active(
    company_id: i32,
    template: Option<&ApprovalTemplate>,
) -> WorkflowResult<&ApprovalTemplate> {
    template
        .filter(|t| !t.enabled_steps().is_empty())
        .ok_or_else(|| {
            WorkflowError::not_found(format!(
                "no active approval template for company {}",
                company_id
            ))
        })
}
