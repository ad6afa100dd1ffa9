//! HTTP surface of a sketch session.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use pi_sketch_core::session::Resolution;
use pi_sketch_core::settle::Settle;

/// State shared by the request handlers of one session.
pub(crate) struct SharedState {
    pub session_id: String,
    pub resolution: Arc<Settle<Resolution>>,
    pub shutdown: CancellationToken,
}

impl SharedState {
    /// Settle the session and stop the listener. Returns `false` if it was already settled.
    fn resolve(&self, resolution: Resolution) -> bool {
        if !self.resolution.settle(resolution) {
            return false;
        }
        self.shutdown.cancel();
        true
    }
}

pub(crate) fn router(state: Arc<SharedState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/submit", post(submit_handler).fallback(pi_sketch_web::not_found))
        .route("/cancel", post(cancel_handler).fallback(pi_sketch_web::not_found))
        .with_state(state)
        .merge(pi_sketch_web::page_router())
        .fallback(pi_sketch_web::not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
}

async fn submit_handler(State(state): State<Arc<SharedState>>, body: Bytes) -> Response {
    let bytes = body.len();
    let payload = String::from_utf8_lossy(&body).into_owned();
    if state.resolve(Resolution::Submitted(payload)) {
        info!(session_id = %state.session_id, bytes, "Sketch submitted");
    } else {
        debug!(session_id = %state.session_id, "Submit after session settled, ignoring");
    }
    ok()
}

async fn cancel_handler(State(state): State<Arc<SharedState>>) -> Response {
    if state.resolve(Resolution::Cancelled) {
        info!(session_id = %state.session_id, "Sketch cancelled from browser");
    } else {
        debug!(session_id = %state.session_id, "Cancel after session settled, ignoring");
    }
    ok()
}

fn ok() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "OK",
    )
        .into_response()
}

/// Every response allows any origin; `OPTIONS` on any path is a 204 preflight.
async fn cors(req: Request, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    resp
}
