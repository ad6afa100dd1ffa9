//! Drawing canvas page, embedded into the binary.
//!
//! Uses `rust-embed` to bake the `ui/` directory into the binary. The page is
//! read once on first use and never changes for the life of the process.

use std::borrow::Cow;
use std::sync::LazyLock;

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "ui/"]
struct UiAssets;

const PAGE_FILE: &str = "sketch.html";

const FALLBACK_PAGE: &str = "<!DOCTYPE html><title>Sketch</title><h1>Sketch page missing</h1>";

static PAGE: LazyLock<Cow<'static, [u8]>> = LazyLock::new(|| match UiAssets::get(PAGE_FILE) {
    Some(asset) => asset.data,
    None => {
        tracing::warn!(file = PAGE_FILE, "Embedded sketch page not found");
        Cow::Borrowed(FALLBACK_PAGE.as_bytes())
    }
});

/// The canvas page body.
pub fn sketch_page() -> &'static [u8] {
    &PAGE
}

/// Routes serving the canvas page at `/` and `/sketch`.
pub fn page_router() -> Router {
    Router::new()
        .route("/", get(page_handler).fallback(not_found))
        .route("/sketch", get(page_handler).fallback(not_found))
}

async fn page_handler() -> Response {
    let mime = mime_guess::from_path(PAGE_FILE).first_or(mime_guess::mime::TEXT_HTML);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        sketch_page(),
    )
        .into_response()
}

/// Plain 404 used for every unknown route.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html("<h1>404</h1>"))
}
