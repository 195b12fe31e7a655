pub mod approval_templates;
pub mod auth;
pub mod health;
pub mod material_requests;
