mod common;

use std::str::FromStr;

use bigdecimal::BigDecimal;

use common::{actor, author, now, policy, staffed, template, Case};
use sitecontrol_backend::workflow::status::{ItemApprovalStatus, ItemStatus, StepStatus};
use sitecontrol_backend::workflow::{Role, Workflow, WorkflowError, WorkflowEventKind};

const FOREMAN: i32 = 71;
const DIRECTOR: i32 = 72;

#[test]
fn two_step_chain_reaches_payment() {
    let policy = policy();
    let directory = staffed(&[Role::Foreman, Role::Director]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[(Role::Foreman, false), (Role::Director, false)]);
    let mut case = Case::new(ItemStatus::Draft);

    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);
    assert_eq!(case.item.item_status, ItemStatus::InApproval);
    assert_eq!(case.item.current_step, Some(1));

    wf.approve(
        &actor(FOREMAN, Role::Foreman),
        &case.request,
        &mut case.item,
        &mut case.records,
        Some("ok".into()),
    )
    .unwrap();
    assert_eq!(case.item.current_step, Some(2));
    assert_eq!(case.records[0].status, StepStatus::Approved);
    assert_eq!(case.records[0].approver_id, Some(FOREMAN));

    let last = wf
        .approve(
            &actor(DIRECTOR, Role::Director),
            &case.request,
            &mut case.item,
            &mut case.records,
            None,
        )
        .unwrap();
    assert_eq!(case.item.item_status, ItemStatus::Payment);
    assert_eq!(case.item.approval_status, ItemApprovalStatus::Approved);
    assert_eq!(case.item.current_step, None);
    assert!(last
        .events
        .iter()
        .any(|e| e.kind == WorkflowEventKind::ChainApproved));
}

#[test]
fn wrong_approver_is_refused_and_nothing_changes() {
    let policy = policy();
    let directory = staffed(&[Role::Foreman, Role::Director]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[(Role::Foreman, false), (Role::Director, false)]);
    let mut case = Case::new(ItemStatus::Draft);
    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);

    let err = wf
        .approve(
            &actor(DIRECTOR, Role::Director),
            &case.request,
            &mut case.item,
            &mut case.records,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    assert_eq!(case.item.current_step, Some(1));
    assert!(case.records.iter().all(|r| r.status == StepStatus::Pending));
}

#[test]
fn rejection_then_resubmission_opens_a_fresh_cycle() {
    let policy = policy();
    let directory = staffed(&[Role::Foreman, Role::Director]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[(Role::Foreman, false), (Role::Director, false)]);
    let mut case = Case::new(ItemStatus::Draft);
    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);

    wf.reject(
        &actor(FOREMAN, Role::Foreman),
        &case.request,
        &mut case.item,
        &mut case.records,
        ItemApprovalStatus::Rework,
        Some("missing spec".into()),
    )
    .unwrap();
    assert_eq!(case.item.item_status, ItemStatus::ReturnedForRevision);
    assert_eq!(case.item.rejection_reason.as_deref(), Some("missing spec"));
    assert_eq!(case.item.current_step, None);

    let resubmitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&resubmitted);

    assert_eq!(case.item.item_status, ItemStatus::InApproval);
    assert_eq!(case.item.approval_cycle, 2);
    assert_eq!(case.item.current_step, Some(1));
    let fresh = case.cycle(2);
    assert_eq!(fresh.len(), 2);
    assert!(fresh.iter().all(|r| r.status == StepStatus::Pending));

    // the rejected cycle is history and keeps its outcome
    let old = case.cycle(1);
    assert_eq!(old[0].status, StepStatus::Rejected);
    assert_eq!(old[1].status, StepStatus::Pending);
}

#[test]
fn submission_snapshots_n_steps_in_order() {
    let policy = policy();
    let candidates = [
        Role::Foreman,
        Role::SiteManager,
        Role::ChiefEngineer,
        Role::ProjectManager,
        Role::Director,
        Role::Accountant,
    ];
    for n in 1..=candidates.len() {
        let roles = &candidates[..n];
        let directory = staffed(roles);
        let wf = Workflow::new(&directory, &policy, now());
        let steps: Vec<(Role, bool)> = roles.iter().map(|r| (*r, n % 2 == 0)).collect();
        let tpl = template(&steps);
        let mut case = Case::new(ItemStatus::Draft);

        let submitted = wf
            .submit(&author(), &case.request, &mut case.item, Some(&tpl))
            .unwrap();

        let orders: Vec<i32> = submitted.new_approvals.iter().map(|r| r.step_order).collect();
        assert_eq!(orders, (1..=n as i32).collect::<Vec<_>>());
        assert!(submitted
            .new_approvals
            .iter()
            .all(|r| r.status == StepStatus::Pending));
        assert_eq!(case.item.current_step, Some(1));
    }
}

#[test]
fn unstaffed_steps_are_skipped_as_the_chain_advances() {
    let policy = policy();
    let directory = staffed(&[Role::Foreman, Role::Director]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[
        (Role::Foreman, false),
        (Role::ChiefEngineer, true),
        (Role::Director, false),
    ]);
    let mut case = Case::new(ItemStatus::Draft);
    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);

    let statuses: Vec<StepStatus> = case.records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Pending, StepStatus::Skipped, StepStatus::Pending]
    );

    wf.approve(
        &actor(FOREMAN, Role::Foreman),
        &case.request,
        &mut case.item,
        &mut case.records,
        None,
    )
    .unwrap();
    assert_eq!(case.item.current_step, Some(3));
}

#[test]
fn deciding_a_skipped_step_is_a_guard_violation() {
    let policy = policy();
    let directory = staffed(&[Role::Director]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[(Role::Foreman, true), (Role::Director, false)]);
    let mut case = Case::new(ItemStatus::Draft);
    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);
    assert_eq!(case.records[0].status, StepStatus::Skipped);
    assert_eq!(case.item.current_step, Some(2));

    let foreman = actor(FOREMAN, Role::Foreman);
    let err = wf
        .approve(&foreman, &case.request, &mut case.item, &mut case.records, None)
        .unwrap_err();
    assert_eq!(err, WorkflowError::guard("step 1 was skipped"));

    let err = wf
        .reject(
            &foreman,
            &case.request,
            &mut case.item,
            &mut case.records,
            ItemApprovalStatus::Rejected,
            Some("late".into()),
        )
        .unwrap_err();
    assert_eq!(err, WorkflowError::guard("step 1 was skipped"));

    assert_eq!(case.records[0].status, StepStatus::Skipped);
    assert_eq!(case.records[1].status, StepStatus::Pending);
    assert_eq!(case.item.current_step, Some(2));
}

#[test]
fn fully_skipped_chain_leaves_nothing_to_decide() {
    let policy = policy();
    let directory = staffed(&[]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[(Role::Foreman, true), (Role::Director, true)]);
    let mut case = Case::new(ItemStatus::Draft);
    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);
    assert_eq!(case.item.item_status, ItemStatus::Payment);
    assert!(case.records.iter().all(|r| r.status == StepStatus::Skipped));

    let err = wf
        .approve(
            &actor(FOREMAN, Role::Foreman),
            &case.request,
            &mut case.item,
            &mut case.records,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::GuardViolation(_)));

    let err = wf
        .reject(
            &actor(DIRECTOR, Role::Director),
            &case.request,
            &mut case.item,
            &mut case.records,
            ItemApprovalStatus::Rework,
            Some("too late".into()),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::GuardViolation(_)));
    assert_eq!(case.item.item_status, ItemStatus::Payment);
}

#[test]
fn cancel_and_restore_round_trip_keeps_the_approval_position() {
    let policy = policy();
    let directory = staffed(&[Role::Foreman, Role::Director]);
    let wf = Workflow::new(&directory, &policy, now());
    let tpl = template(&[(Role::Foreman, false), (Role::Director, false)]);
    let mut case = Case::new(ItemStatus::Draft);
    let submitted = wf
        .submit(&author(), &case.request, &mut case.item, Some(&tpl))
        .unwrap();
    case.keep(&submitted);
    wf.approve(
        &actor(FOREMAN, Role::Foreman),
        &case.request,
        &mut case.item,
        &mut case.records,
        None,
    )
    .unwrap();

    wf.cancel_item(&author(), &case.request, &mut case.item, Some("duplicate".into()))
        .unwrap();
    assert!(case.item.is_cancelled());
    assert_eq!(case.item.item_status, ItemStatus::InApproval);

    // decisions are refused while cancelled
    let err = wf
        .approve(
            &actor(DIRECTOR, Role::Director),
            &case.request,
            &mut case.item,
            &mut case.records,
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), "guard_violation");

    wf.restore_item(&author(), &case.request, &mut case.item)
        .unwrap();
    assert!(!case.item.is_cancelled());
    assert_eq!(case.item.item_status, ItemStatus::InApproval);
    assert_eq!(case.item.current_step, Some(2));

    let again = wf.restore_item(&author(), &case.request, &mut case.item);
    assert!(matches!(again, Err(WorkflowError::GuardViolation(_))));
}

#[test]
fn delivered_quantity_completes_the_item() {
    let policy = policy();
    let directory = staffed(&[Role::Supply]);
    let wf = Workflow::new(&directory, &policy, now());
    let supply = actor(73, Role::Supply);
    let mut case = Case::new(ItemStatus::Delivery);

    let partial = wf
        .update_actual_quantity(&supply, &case.request, &mut case.item, BigDecimal::from(4))
        .unwrap();
    assert!(!partial.auto_completed);
    assert_eq!(case.item.item_status, ItemStatus::Delivery);

    let full = wf
        .update_actual_quantity(&supply, &case.request, &mut case.item, BigDecimal::from(12))
        .unwrap();
    assert!(full.auto_completed);
    assert_eq!(case.item.item_status, ItemStatus::Completed);
    assert_eq!(case.item.actual_quantity, Some(BigDecimal::from(12)));
}

#[test]
fn delivered_quantity_equal_to_the_order_completes_the_item() {
    let policy = policy();
    let directory = staffed(&[Role::Supply]);
    let wf = Workflow::new(&directory, &policy, now());
    let supply = actor(73, Role::Supply);

    for delivered in [BigDecimal::from(10), BigDecimal::from_str("10.000").unwrap()] {
        let mut case = Case::new(ItemStatus::Delivery);
        let outcome = wf
            .update_actual_quantity(&supply, &case.request, &mut case.item, delivered.clone())
            .unwrap();
        assert!(outcome.auto_completed, "{} should complete an order of 10", delivered);
        assert_eq!(case.item.item_status, ItemStatus::Completed);
    }

    let mut case = Case::new(ItemStatus::Delivery);
    let short = wf
        .update_actual_quantity(
            &supply,
            &case.request,
            &mut case.item,
            BigDecimal::from_str("9.999").unwrap(),
        )
        .unwrap();
    assert!(!short.auto_completed);
    assert_eq!(case.item.item_status, ItemStatus::Delivery);
}

#[test]
fn generic_status_change_walks_the_extended_flow() {
    let policy = policy();
    let directory = staffed(&[]);
    let wf = Workflow::new(&directory, &policy, now());
    let mut case = Case::new(ItemStatus::Payment);
    let accountant = actor(74, Role::Accountant);
    let supply = actor(73, Role::Supply);
    let warehouse = actor(75, Role::Warehouse);
    let foreman = actor(FOREMAN, Role::Foreman);

    let steps = [
        (&accountant, ItemStatus::Paid),
        (&supply, ItemStatus::Delivery),
        (&warehouse, ItemStatus::WarehouseShipping),
        (&warehouse, ItemStatus::SentToSite),
        (&foreman, ItemStatus::Completed),
    ];
    for (who, target) in steps {
        wf.change_item_status(
            who,
            &case.request,
            &mut case.item,
            &mut case.records,
            None,
            target,
            None,
        )
        .unwrap();
        assert_eq!(case.item.item_status, target);
    }
}
