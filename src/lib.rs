//! Doctrack - document tracking service
//!
//! Documents move through a small open/closed workflow while every mutation
//! lands in an embedded, append-only history ledger.
//!
//! ## Modules
//!
//! - **workflow**: visibility predicate, state machine, history events, short references
//! - **services**: request orchestration for documents, bulk actions, export, users
//! - **audit**: best-effort administrative audit trail behind a bounded queue
//! - **store** / **db**: storage traits with in-memory and MongoDB backends
//! - **routes** / **server**: hyper HTTP surface

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;
pub mod workflow;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{DoctrackError, Result};
