//! Doctrack - document tracking service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use doctrack::{
    audit::AuditTrail,
    auth::JwtValidator,
    config::{Args, LogFormat, StorageBackend},
    db::{mongo_stores, MongoClient},
    server::{self, AppState},
    store::Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("doctrack={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Doctrack - document tracking");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Storage: {:?}", args.storage);
    info!("Reference prefix: {}", args.doc_ref_prefix);
    info!("======================================");

    let jwt = match &args.jwt_secret {
        Some(secret) => JwtValidator::new(secret.clone(), args.jwt_expiry_seconds)?,
        None => JwtValidator::new_dev(),
    };

    let stores = match args.storage {
        StorageBackend::Mongo => {
            let client = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
                Ok(client) => client,
                Err(e) => {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            };
            mongo_stores(&client).await?
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            Stores::memory()
        }
    };

    let audit = AuditTrail::spawn(stores.audit.clone(), args.audit_queue_capacity);
    let state = Arc::new(AppState::new(args, jwt, stores, audit));

    server::run(state).await?;
    Ok(())
}
