//! Shared types for Doctrack

mod error;

pub use error::{DoctrackError, Result};
