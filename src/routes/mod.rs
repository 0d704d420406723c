//! HTTP routes for Doctrack

pub mod admin;
pub mod audit_logs;
pub mod documents;
pub mod health;
pub mod helpers;
pub mod users;

pub use admin::handle_backfill;
pub use audit_logs::handle_audit_logs;
pub use documents::handle_documents_request;
pub use health::health_check;
pub use helpers::{authenticate, error_response, json_response, FullBody};
pub use users::handle_users_request;
