//! Routes and handlers
//!
//! The single event endpoint negotiates on `Accept`: a live SSE stream, a
//! JSON snapshot from the replay ring, or the HTML demo page. Frames on the
//! live stream are produced by the hub; this layer only bridges the
//! per-client frame channel into the response body, which is what makes the
//! hub's pending-byte accounting reflect real socket backpressure.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use zrx_hub::{SseHub, SseReceiver};
use zrx_protocol::{Family, frame};

use crate::state::AppState;

/// Embedded demo page
const DEMO_PAGE: &str = include_str!("../static/demo.html");

/// Embedded OpenAPI document
const OPENAPI_JSON: &str = include_str!("../static/openapi.json");

/// Build the router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/events/zabbix/", get(events))
        .route("/v1/events/zabbix/openapi.json", get(openapi))
        .route("/", get(root_redirect))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Snapshot query parameters
#[derive(Debug, Default, Deserialize)]
struct SnapshotParams {
    family: Option<String>,
    limit: Option<usize>,
    #[serde(rename = "sinceId")]
    since_id: Option<u64>,
}

/// The negotiated endpoint: stream, snapshot, or demo page by `Accept`.
async fn events(
    State(state): State<AppState>,
    Query(params): Query<SnapshotParams>,
    headers: HeaderMap,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if accept.contains("text/event-stream") {
        live_stream(&state)
    } else if accept.contains("application/json") {
        snapshot(&state, params)
    } else {
        Html(DEMO_PAGE).into_response()
    }
}

/// A client's frame stream, tied to its hub registration.
///
/// When the connection closes the response body is dropped, and dropping
/// this stream unregisters the sink right then, not at the next broadcast
/// or heartbeat sweep.
struct ClientStream {
    client: u64,
    hub: Arc<SseHub>,
    receiver: SseReceiver,
}

impl Stream for ClientStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        self.hub.unregister(self.client);
        debug!(client = self.client, "live stream disconnected");
    }
}

/// Register a hub sink and bridge its frames into the response body.
fn live_stream(state: &AppState) -> Response {
    let (client, receiver) = state.hub.register();
    debug!(client, "live stream connected");

    let frames = ClientStream {
        client,
        hub: Arc::clone(&state.hub),
        receiver,
    };
    let stream = tokio_stream::once(frame::connected_frame())
        .chain(frames)
        .map(Ok::<Bytes, Infallible>);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Recent-history snapshot from the replay ring.
fn snapshot(state: &AppState, params: SnapshotParams) -> Response {
    let family = match params.family.as_deref() {
        Some(raw) => match raw.parse::<Family>() {
            Ok(family) => Some(family),
            Err(e) => {
                return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
            }
        },
        None => None,
    };

    let query = zrx_hub::Query {
        family,
        limit: params.limit,
        since_id: params.since_id.unwrap_or(0),
    };
    let items = state.ring.query(&query);

    axum::Json(json!({
        "latestId": state.ring.latest_id(),
        "items": items,
    }))
    .into_response()
}

/// The OpenAPI document.
async fn openapi() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], OPENAPI_JSON)
}

/// Root redirect to the endpoint.
async fn root_redirect() -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [(header::LOCATION, "/v1/events/zabbix/")],
    )
}

/// Plain-text 404 for everything else.
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
