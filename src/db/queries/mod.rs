pub mod approval_templates;
pub mod directory;
pub mod material_request_items;
pub mod material_requests;
