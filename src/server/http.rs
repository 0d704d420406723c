//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection, manual routing on
//! `(method, path)`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::audit::AuditTrail;
use crate::auth::JwtValidator;
use crate::config::Args;
use crate::routes::{self, helpers::not_found_response};
use crate::services::{DocumentService, UserDirectory};
use crate::store::Stores;
use crate::types::DoctrackError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub jwt: JwtValidator,
    /// Raw storage, used for identity lookups
    pub stores: Stores,
    pub documents: DocumentService,
    pub users: UserDirectory,
    pub audit: AuditTrail,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, jwt: JwtValidator, stores: Stores, audit: AuditTrail) -> Self {
        let documents = DocumentService::new(stores.clone(), audit.clone(), args.doc_ref_prefix.clone());
        let users = UserDirectory::new(stores.users.clone(), audit.clone());
        Self {
            args,
            jwt,
            stores,
            documents,
            users,
            audit,
            started_at: Instant::now(),
        }
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), DoctrackError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Doctrack listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - insecure JWT secret fallback in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method.clone(), path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        (Method::OPTIONS, _) => preflight_response(),

        (_, p) if p == "/documents" || p.starts_with("/documents/") => {
            routes::handle_documents_request(req, Arc::clone(&state), p).await
        }

        (_, p) if p == "/users" || p.starts_with("/users/") => {
            routes::handle_users_request(req, Arc::clone(&state), p).await
        }

        (Method::GET, "/auditlogs") => routes::handle_audit_logs(req, Arc::clone(&state)).await,

        (Method::POST, "/admin/backfill") => routes::handle_backfill(req, Arc::clone(&state)).await,

        _ => not_found_response(&path),
    };

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}
