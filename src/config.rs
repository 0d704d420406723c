//! Configuration for Doctrack
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// MongoDB (production)
    Mongo,
    /// Process-local maps, lost on restart
    Memory,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Doctrack - document tracking service
#[derive(Parser, Debug, Clone)]
#[command(name = "doctrack")]
#[command(about = "Document tracking service with role-scoped visibility and audit trail")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Enable development mode (insecure JWT secret fallback, memory storage allowed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Storage backend
    #[arg(long, env = "STORAGE", value_enum, default_value = "mongo")]
    pub storage: StorageBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "doctrack")]
    pub mongodb_db: String,

    /// JWT secret for token verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Prefix for short document references (PREFIX-000001)
    #[arg(long, env = "DOC_REF_PREFIX", default_value = "DOC")]
    pub doc_ref_prefix: String,

    /// Maximum queued audit entries before new ones are dropped
    #[arg(long, env = "AUDIT_QUEUE_CAPACITY", default_value = "1024")]
    pub audit_queue_capacity: usize,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if !self.dev_mode && self.storage == StorageBackend::Memory {
            return Err("STORAGE=memory is only allowed in development mode".to_string());
        }

        if self.audit_queue_capacity == 0 {
            return Err("AUDIT_QUEUE_CAPACITY must be greater than zero".to_string());
        }

        if self.doc_ref_prefix.trim().is_empty() {
            return Err("DOC_REF_PREFIX must not be empty".to_string());
        }

        Ok(())
    }
}
