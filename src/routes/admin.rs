//! `POST /admin/backfill` - fill references and event fields missing from
//! legacy documents

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use crate::routes::helpers::{authenticate, json_response, respond, FullBody};
use crate::server::AppState;
use crate::types::Result;

pub async fn handle_backfill(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    respond(backfill(req, state).await)
}

async fn backfill(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let report = state.documents.backfill(&actor).await?;
    Ok(json_response(StatusCode::OK, &report))
}
