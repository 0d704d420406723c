//! HTTP server for Doctrack

mod http;

pub use http::{run, AppState};
