//! REST adapter: stateless CRUD over the same tree the WebSocket surface
//! shares.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::error::Error;
use crate::path::Ref;
use crate::query::{LimitOrder, QueryDescriptor};
use crate::session::Dispatcher;

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/{*path}", get(get_handler).put(put_handler).patch(patch_handler).delete(delete_handler))
        .route("/", get(get_handler).put(put_handler).patch(patch_handler).delete(delete_handler))
        .with_state(dispatcher)
}

fn strip_json_suffix(path: &str) -> Result<&str, RestError> {
    path.strip_suffix(".json").ok_or(RestError(Error::Decode(format!(
        "REST path {path:?} must end in .json"
    ))))
}

async fn get_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    path: Option<Path<String>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, RestError> {
    let raw = path.map(|Path(p)| p).unwrap_or_default();
    let ref_ = resolve_ref(&raw)?;
    let query = parse_query(&params)?;
    let value = dispatcher.tree().get(&ref_, &query).await.map_err(RestError)?;
    Ok(Json(value).into_response())
}

async fn put_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    path: Option<Path<String>>,
    Json(body): Json<Value>,
) -> Result<Response, RestError> {
    let raw = path.map(|Path(p)| p).unwrap_or_default();
    let ref_ = resolve_ref(&raw)?;
    dispatcher.handle_set(&ref_, body).await.map_err(RestError)?;
    Ok(StatusCode::OK.into_response())
}

async fn patch_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    path: Option<Path<String>>,
    Json(body): Json<Value>,
) -> Result<Response, RestError> {
    let raw = path.map(|Path(p)| p).unwrap_or_default();
    let ref_ = resolve_ref(&raw)?;
    dispatcher.handle_update(&ref_, body).await.map_err(RestError)?;
    Ok(StatusCode::OK.into_response())
}

async fn delete_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    path: Option<Path<String>>,
) -> Result<Response, RestError> {
    let raw = path.map(|Path(p)| p).unwrap_or_default();
    let ref_ = resolve_ref(&raw)?;
    dispatcher.handle_set(&ref_, Value::Null).await.map_err(RestError)?;
    Ok(StatusCode::OK.into_response())
}

fn resolve_ref(raw_path: &str) -> Result<Ref, RestError> {
    let stripped = strip_json_suffix(raw_path)?;
    Ref::parse(stripped).map_err(RestError)
}

/// Parses the REST query-string parameters into a [`QueryDescriptor`],
/// mirroring `examples/original_source/pkg/net/restful.go::ParseQuery`
/// exactly, including the mutual-exclusion checks.
pub fn parse_query(params: &HashMap<String, String>) -> Result<QueryDescriptor, RestError> {
    let mut query = QueryDescriptor {
        start_key: params.get("startKey").cloned(),
        end_key: params.get("endKey").cloned(),
        ..Default::default()
    };

    let limit_to_first = params.get("limitToFirst");
    let limit_to_last = params.get("limitToLast");
    match (limit_to_first, limit_to_last) {
        (Some(_), Some(_)) => {
            return Err(RestError(Error::ConflictingQuery(
                "limitToFirst and limitToLast both present",
            )))
        }
        (Some(n), None) => {
            query.limit = parse_u32(n)?;
            query.limit_order = LimitOrder::First;
        }
        (None, Some(n)) => {
            query.limit = parse_u32(n)?;
            query.limit_order = LimitOrder::Last;
        }
        (None, None) => {}
    }

    if let Some(order_by) = params.get("orderBy") {
        query.order_by = json_or_raw_string(order_by);
    }

    let equal_to = params.get("equalTo");
    let start_at = params.get("startAt");
    let end_at = params.get("endAt");
    if let Some(equal_to) = equal_to {
        if start_at.is_some() || end_at.is_some() {
            return Err(RestError(Error::ConflictingQuery(
                "equalTo cannot be combined with startAt or endAt",
            )));
        }
        query.start_at = Some(json_or_raw_value(equal_to));
        query.end_at = Some(json_or_raw_value(equal_to));
    } else {
        if let Some(v) = start_at {
            query.start_at = Some(json_or_raw_value(v));
        }
        if let Some(v) = end_at {
            query.end_at = Some(json_or_raw_value(v));
        }
    }

    query.shallow = params.get("shallow").map(|s| s == "true").unwrap_or(false);

    Ok(query)
}

fn parse_u32(raw: &str) -> Result<u32, RestError> {
    raw.parse::<u32>()
        .map_err(|_| RestError(Error::Decode(format!("invalid limit: {raw:?}"))))
}

fn json_or_raw_string(raw: &str) -> String {
    serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string())
}

fn json_or_raw_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Wraps [`Error`] so it can be used as an `axum` rejection: every decode
/// failure becomes a 500 with a plain-text body.
pub struct RestError(Error);

impl From<Error> for RestError {
    fn from(e: Error) -> Self {
        RestError(e)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}
