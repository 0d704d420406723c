//! Service layer
//!
//! Each service takes an authenticated `Actor` and returns rendered views.
//! Routes translate HTTP into these calls and nothing else.

pub mod bulk;
pub mod documents;
pub mod export;
pub mod users;
pub mod views;

pub use bulk::{BulkAction, BulkItemResult, BulkRequest, BulkResponse};
pub use documents::{
    BackfillReport, CreateDocumentRequest, DocumentService, FilterParams, ForwardRequest,
    UpdateDocumentRequest,
};
pub use export::ExportRequest;
pub use users::{CreateUserRequest, ListUsersParams, UpdateUserRequest, UserDirectory};
pub use views::{AuditLogView, DocumentPage, DocumentView, UserPage, UserView};
