pub mod approval;
pub mod material_request;
