//! Shared request and response plumbing for route handlers

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::{Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tracing::{error, warn};

use crate::auth::{extract_token_from_header, Actor};
use crate::server::AppState;
use crate::types::{DoctrackError, Result};
use crate::workflow::PageRequest;

pub type FullBody = Full<Bytes>;

/// Header carrying a raw token when no Authorization header is sent
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub msg: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub msg: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn message_response(status: StatusCode, msg: impl Into<String>) -> Response<FullBody> {
    json_response(status, &MessageBody { msg: msg.into() })
}

pub fn error_response(err: &DoctrackError) -> Response<FullBody> {
    let status = err.status_code();
    if err.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "Request rejected");
    }
    json_response(
        status,
        &ErrorBody {
            msg: err.public_message(),
            code: err.code(),
        },
    )
}

/// Render a handler result, mapping errors onto their status
pub fn respond(result: Result<Response<FullBody>>) -> Response<FullBody> {
    result.unwrap_or_else(|e| error_response(&e))
}

pub fn not_found_response(path: &str) -> Response<FullBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorBody {
            msg: format!("No route for {path}"),
            code: "NOT_FOUND",
        },
    )
}

/// Read the whole body as JSON. An empty body reads as `{}`.
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| DoctrackError::BadRequest(format!("Failed to read body: {e}")))?
        .to_bytes();
    parse_json(&body)
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| DoctrackError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Decode a query string into a map. Later keys win.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(q) = query else {
        return params;
    };
    for pair in q.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decode = |s: &str| {
            let s = s.replace('+', " ");
            let decoded = urlencoding::decode(&s).map(|v| v.into_owned());
            decoded.unwrap_or(s)
        };
        params.insert(decode(key), decode(value));
    }
    params
}

pub fn page_from_query(query: &HashMap<String, String>) -> PageRequest {
    let number = |key: &str| query.get(key).and_then(|v| v.trim().parse::<u64>().ok());
    PageRequest::new(number("page"), number("limit"))
}

pub fn parse_id(raw: &str) -> Result<ObjectId> {
    Ok(ObjectId::parse_str(raw.trim())?)
}

fn header<'a>(headers: &'a HeaderMap, name: impl hyper::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Resolve the caller. The user is re-read so role changes and deletions
/// take effect on the next request.
pub async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<Actor> {
    let token = extract_token_from_header(header(headers, AUTHORIZATION))
        .or_else(|| extract_token_from_header(header(headers, AUTH_TOKEN_HEADER)))
        .ok_or_else(|| {
            DoctrackError::AuthenticationRequired("No token, authorization denied".into())
        })?;

    let claims = state.jwt.verify_token(token).into_result()?;
    let id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| DoctrackError::AuthenticationRequired("Token is not valid".into()))?;
    let user = state
        .stores
        .users
        .get(&id)
        .await?
        .ok_or_else(|| DoctrackError::AuthenticationRequired("User no longer exists".into()))?;

    Ok(Actor::new(user.id, user.username, user.role))
}
