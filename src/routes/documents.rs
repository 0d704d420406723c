//! Document endpoints
//!
//! - `GET /documents` - List visible documents (filters + pagination)
//! - `POST /documents` - Create
//! - `POST /documents/export` - CSV export
//! - `POST /documents/bulk` - Bulk delete/close/assign
//! - `GET|PUT|DELETE /documents/{id}` - Read, update, delete
//! - `POST /documents/{id}/forward` - Forward to another user

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::routes::helpers::{
    authenticate, json_response, message_response, not_found_response, page_from_query,
    parse_id, parse_query, read_json, respond, FullBody,
};
use crate::server::AppState;
use crate::services::{
    BulkRequest, CreateDocumentRequest, ExportRequest, FilterParams, ForwardRequest,
    UpdateDocumentRequest,
};
use crate::types::Result;

/// Main handler for /documents/* routes
pub async fn handle_documents_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/documents").unwrap_or("");

    let result = match (method, subpath) {
        (Method::GET, "" | "/") => handle_list(req, state).await,
        (Method::POST, "" | "/") => handle_create(req, state).await,
        (Method::POST, "/export") => handle_export(req, state).await,
        (Method::POST, "/bulk") => handle_bulk(req, state).await,

        (Method::POST, p) if p.ends_with("/forward") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/forward"))
                .unwrap_or("");
            handle_forward(req, state, id).await
        }

        (method, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            match method {
                Method::GET => handle_get(req, state, id).await,
                Method::PUT => handle_update(req, state, id).await,
                Method::DELETE => handle_delete(req, state, id).await,
                _ => Ok(not_found_response(path)),
            }
        }

        _ => Ok(not_found_response(path)),
    };

    respond(result)
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let query = parse_query(req.uri().query());
    let filter = FilterParams::from_query(&query).into_filter()?;

    let page = state
        .documents
        .list(&actor, filter, page_from_query(&query))
        .await?;
    Ok(json_response(StatusCode::OK, &page))
}

async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let body: CreateDocumentRequest = read_json(req).await?;

    let view = state.documents.create(&actor, body.into_draft()?).await?;
    Ok(json_response(StatusCode::CREATED, &view))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let view = state.documents.get(&actor, &parse_id(id)?).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let id = parse_id(id)?;
    let body: UpdateDocumentRequest = read_json(req).await?;

    let view = state.documents.update(&actor, &id, body.into_patch()?).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    state.documents.delete(&actor, &parse_id(id)?).await?;
    Ok(message_response(StatusCode::OK, "Document removed"))
}

async fn handle_forward(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let id = parse_id(id)?;
    let body: ForwardRequest = read_json(req).await?;

    let view = state.documents.forward(&actor, &id, body).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_bulk(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let body: BulkRequest = read_json(req).await?;

    let response = state.documents.bulk(&actor, body).await?;
    Ok(json_response(StatusCode::OK, &response))
}

async fn handle_export(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let body: ExportRequest = read_json(req).await?;

    let csv = state.documents.export(&actor, body).await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/csv; charset=utf-8")
        .header("Content-Disposition", "attachment; filename=\"documents.csv\"")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(csv)))
        .unwrap())
}
