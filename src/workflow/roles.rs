use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::WorkflowError;

/// Fixed set of company roles that can appear in an approval chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "app_role", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Director,
    ChiefEngineer,
    ProjectManager,
    SiteManager,
    Foreman,
    Engineer,
    Supply,
    Warehouse,
    Accountant,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::Admin,
        Role::Director,
        Role::ChiefEngineer,
        Role::ProjectManager,
        Role::SiteManager,
        Role::Foreman,
        Role::Engineer,
        Role::Supply,
        Role::Warehouse,
        Role::Accountant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Director => "DIRECTOR",
            Role::ChiefEngineer => "CHIEF_ENGINEER",
            Role::ProjectManager => "PROJECT_MANAGER",
            Role::SiteManager => "SITE_MANAGER",
            Role::Foreman => "FOREMAN",
            Role::Engineer => "ENGINEER",
            Role::Supply => "SUPPLY",
            Role::Warehouse => "WAREHOUSE",
            Role::Accountant => "ACCOUNTANT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts both `SITE_MANAGER` and `site_manager` spellings.
impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == wanted)
            .ok_or_else(|| WorkflowError::validation(format!("unknown role '{}'", s.trim())))
    }
}

/// Request-scoped identity of whoever is driving a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub company_id: i32,
    pub role: Role,
    pub username: String,
}

/// Answers "does anyone in company C hold role R".
pub trait RoleDirectory {
    fn has_holders(&self, company_id: i32, role: Role) -> bool;
}

/// Snapshot of the roles held by active users of one company.
#[derive(Debug, Clone, Default)]
pub struct StaffedRoles {
    pub company_id: i32,
    pub roles: HashSet<Role>,
}

impl StaffedRoles {
    pub fn new(company_id: i32, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            company_id,
            roles: roles.into_iter().collect(),
        }
    }
}

impl RoleDirectory for StaffedRoles {
    fn has_holders(&self, company_id: i32, role: Role) -> bool {
        self.company_id == company_id && self.roles.contains(&role)
    }
}

/// Role-gated checkpoints outside the approval chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Payment,
    Delivery,
    Warehouse,
    Acceptance,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Payment => "payment",
            Gate::Delivery => "delivery",
            Gate::Warehouse => "warehouse",
            Gate::Acceptance => "site acceptance",
        }
    }
}

/// Which roles may pass each gate. Loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub payment: Vec<Role>,
    pub delivery: Vec<Role>,
    pub warehouse: Vec<Role>,
    pub acceptance: Vec<Role>,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            payment: vec![Role::Accountant, Role::Director],
            delivery: vec![Role::Supply],
            warehouse: vec![Role::Warehouse, Role::Supply],
            acceptance: vec![Role::Foreman, Role::SiteManager, Role::ProjectManager],
        }
    }
}

impl TransitionPolicy {
    pub fn roles_for(&self, gate: Gate) -> &[Role] {
        match gate {
            Gate::Payment => &self.payment,
            Gate::Delivery => &self.delivery,
            Gate::Warehouse => &self.warehouse,
            Gate::Acceptance => &self.acceptance,
        }
    }

    pub fn allows(&self, gate: Gate, role: Role) -> bool {
        self.roles_for(gate).contains(&role)
    }

    pub fn check(&self, gate: Gate, actor: &Actor) -> Result<(), WorkflowError> {
        if self.allows(gate, actor.role) {
            return Ok(());
        }
        Err(WorkflowError::unauthorized(format!(
            "role {} may not perform the {} step",
            actor.role,
            gate.as_str()
        )))
    }
}

/// Parses a comma separated role list such as `SUPPLY,accountant`.
pub fn parse_role_list(raw: &str) -> Result<Vec<Role>, WorkflowError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Role::from_str)
        .collect()
}
