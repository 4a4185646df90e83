//! Top-level HTTP server: a single listener dispatches to the WebSocket
//! handler or the REST router depending on the `Upgrade` header, mirroring
//! `examples/original_source/pkg/net/handler.go`'s `ServeHTTP`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::session::Dispatcher;
use crate::ws;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    host: String,
    rest_router: Router,
}

/// Builds the combined router, bound to `host` so the WebSocket handshake
/// can echo it back to clients.
pub fn router(dispatcher: Arc<Dispatcher>, host: String) -> Router {
    let rest_router = rest::router(Arc::clone(&dispatcher));
    let state = AppState { dispatcher, host, rest_router };

    Router::new()
        .fallback(root_handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler(State(state): State<AppState>, req: Request) -> Response {
    if !upgradable(req.headers()) {
        return state
            .rest_router
            .oneshot(req)
            .await
            .expect("axum routers are infallible");
    }

    let (mut parts, _body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => {
            let dispatcher = Arc::clone(&state.dispatcher);
            let host = state.host.clone();
            upgrade.on_upgrade(move |socket| ws::run(socket, dispatcher, host))
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// Mirrors the original's `upgradable` check byte-for-byte: the `Upgrade`
/// header must be present and one of its values must equal `"websocket"`.
fn upgradable(headers: &HeaderMap) -> bool {
    headers.get_all(header::UPGRADE).iter().any(|v| v.as_bytes() == b"websocket")
}
