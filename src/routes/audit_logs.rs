//! `GET /auditlogs` - admin listing of the audit trail
//!
//! Query: `targetId`, `limit` (default 50, max 100), `skip`.

use bson::oid::ObjectId;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use crate::routes::helpers::{authenticate, json_response, parse_id, parse_query, respond, FullBody};
use crate::server::AppState;
use crate::services::AuditLogView;
use crate::types::Result;

pub async fn handle_audit_logs(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    respond(list(req, state).await)
}

async fn list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let query = parse_query(req.uri().query());

    let target: Option<ObjectId> = query
        .get("targetId")
        .filter(|t| !t.trim().is_empty())
        .map(|t| parse_id(t))
        .transpose()?;
    let number = |key: &str| query.get(key).and_then(|v| v.trim().parse::<u64>().ok());

    let entries = state
        .audit
        .list(&actor, target, number("limit"), number("skip"))
        .await?;
    let views = AuditLogView::render_all(state.stores.users.as_ref(), &entries).await?;
    Ok(json_response(StatusCode::OK, &views))
}
