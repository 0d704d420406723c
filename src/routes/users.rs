//! User directory endpoints
//!
//! - `GET /users` - List users the caller may see (`search`, `role`, `page`, `limit`)
//! - `POST /users` - Create an account
//! - `GET /users/heads` - Peer-group members
//! - `GET|PUT|DELETE /users/{id}` - Read, update, delete

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::auth::Role;
use crate::routes::helpers::{
    authenticate, json_response, message_response, not_found_response, page_from_query,
    parse_id, parse_query, read_json, respond, FullBody,
};
use crate::server::AppState;
use crate::services::{CreateUserRequest, ListUsersParams, UpdateUserRequest};
use crate::types::{DoctrackError, Result};

/// Main handler for /users/* routes
pub async fn handle_users_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/users").unwrap_or("");

    let result = match (method, subpath) {
        (Method::GET, "" | "/") => handle_list(req, state).await,
        (Method::POST, "" | "/") => handle_create(req, state).await,
        (Method::GET, "/heads") => handle_heads(req, state).await,

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

fn list_params(query: Option<&str>) -> Result<ListUsersParams> {
    let query = parse_query(query);
    let role = match query.get("role").map(|r| r.trim()).filter(|r| !r.is_empty()) {
        Some(raw) => Some(raw.parse::<Role>().map_err(DoctrackError::Validation)?),
        None => None,
    };
    Ok(ListUsersParams {
        search: query.get("search").cloned(),
        role,
        page: page_from_query(&query),
    })
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let params = list_params(req.uri().query())?;

    let page = state.users.list_users(&actor, params).await?;
    Ok(json_response(StatusCode::OK, &page))
}

async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let body: CreateUserRequest = read_json(req).await?;

    let view = state.users.create_user(&actor, body).await?;
    Ok(json_response(StatusCode::CREATED, &view))
}

async fn handle_heads(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<FullBody>> {
    authenticate(req.headers(), &state).await?;
    let heads = state.users.list_heads().await?;
    Ok(json_response(StatusCode::OK, &heads))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let view = state.users.get_user(&actor, &parse_id(id)?).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    let id = parse_id(id)?;
    let body: UpdateUserRequest = read_json(req).await?;

    let view = state.users.update_user(&actor, &id, body).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<FullBody>> {
    let actor = authenticate(req.headers(), &state).await?;
    state.users.delete_user(&actor, &parse_id(id)?).await?;
    Ok(message_response(StatusCode::OK, "User removed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params() {
        let params = list_params(Some("search=ann&role=employee&page=2")).unwrap();
        assert_eq!(params.search.as_deref(), Some("ann"));
        assert_eq!(params.role, Some(Role::Employee));
        assert_eq!(params.page.page, 2);

        assert!(list_params(Some("role=janitor")).is_err());
        assert!(list_params(None).unwrap().role.is_none());
    }
}
