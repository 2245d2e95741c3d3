//! HTTP request handlers.

use crate::error::{AppError, Result};
use crate::html;
use crate::library::{CatalogEntry, Order, parse_count};
use crate::negotiate::ClientCapability;
use crate::opds;
use crate::routes::{self, DeliveryTag};
use crate::server::AppState;
use crate::server::deliver::{self, NO_CACHE};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

const HTML_MIME: &str = "text/html; charset=utf-8";

/// Build a listing response with the no-cache headers readers need.
fn build_response(content_type: &str, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, NO_CACHE)
        .header(header::PRAGMA, "no-cache")
        .header(header::LAST_MODIFIED, deliver::http_date_now())
        .body(body.into())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal error"))
                .unwrap_or_default()
        })
}

/// Render entries for the client: feed or HTML, same data either way.
fn render_listing(
    state: &AppState,
    client: ClientCapability,
    id: &str,
    heading: &str,
    self_path: &str,
    parent: Option<&str>,
    entries: &[CatalogEntry],
) -> Response<Body> {
    match client {
        ClientCapability::BrowserClient => build_response(
            HTML_MIME,
            html::listing_page(heading, parent, entries, state.formats()),
        ),
        ClientCapability::OpdsFeedClient => build_response(
            opds::ACQUISITION_MIME,
            opds::listing_feed(
                id,
                heading,
                self_path,
                state.base_url(),
                entries,
                state.formats(),
            ),
        ),
    }
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
}

// ============================================================================
// ROOT
// ============================================================================

/// Top-level index.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response<Body> {
    match ClientCapability::from_headers(&headers) {
        ClientCapability::BrowserClient => build_response(
            HTML_MIME,
            html::root_page(state.title(), state.recent_count()),
        ),
        ClientCapability::OpdsFeedClient => build_response(
            opds::NAVIGATION_MIME,
            opds::root_feed(state.title(), state.base_url(), state.recent_count()),
        ),
    }
}

/// OpenSearch description.
pub async fn opensearch(State(state): State<AppState>) -> impl IntoResponse {
    let xml = opds::generate_opensearch(state.title(), state.base_url());
    build_response(opds::OPENSEARCH_MIME, xml)
}

// ============================================================================
// SEARCH AND RECENT
// ============================================================================

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

async fn search(state: &AppState, params: SearchParams) -> Result<(String, Vec<CatalogEntry>)> {
    let term = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::NotFound("empty search".to_string()))?;

    let library = state.library.clone();
    let needle = term.clone();
    let hits = blocking(move || Ok(library.search(&needle))).await?;
    Ok((term, hits))
}

/// Search feed for e-readers.
pub async fn opds_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response<Body>> {
    let (term, hits) = search(&state, params).await?;
    let self_path = format!("{}?q={}", routes::FEED_SEARCH, urlencoding::encode(&term));

    Ok(render_listing(
        &state,
        ClientCapability::OpdsFeedClient,
        &format!("search:{}", term),
        &format!("Search: {}", term),
        &self_path,
        None,
        &hits,
    ))
}

/// Search page for browsers.
pub async fn html_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response<Body>> {
    let (term, hits) = search(&state, params).await?;

    Ok(render_listing(
        &state,
        ClientCapability::BrowserClient,
        "",
        &format!("Search: {}", term),
        routes::BROWSER_SEARCH,
        Some("/"),
        &hits,
    ))
}

/// Recent listing parameters. Kept as a string so bad input falls back to the default.
#[derive(Debug, Deserialize)]
pub struct RecentParams {
    n: Option<String>,
}

/// Most recently modified files, newest first.
pub async fn recent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecentParams>,
) -> Result<Response<Body>> {
    let count = parse_count(params.n.as_deref(), state.recent_count());
    let library = state.library.clone();
    let entries = blocking(move || library.recent(count, Order::Descending)).await?;

    tracing::info!(count, found = entries.len(), "Recent listing");

    Ok(render_listing(
        &state,
        ClientCapability::from_headers(&headers),
        "recent",
        "Recent",
        routes::RECENT,
        Some("/"),
        &entries,
    ))
}

// ============================================================================
// BROWSE AND DELIVERY
// ============================================================================

/// `/<tag>/<path>`: browse a directory or deliver a file.
///
/// Mounted as the router fallback, so anything that is not a known tag or
/// does not resolve under the root ends up as not found.
pub async fn catalog_path(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    let raw_path = uri.path();
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::NotFound(raw_path.to_string()));
    }

    let (tag, rest) = routes::split_delivery_path(raw_path)
        .ok_or_else(|| AppError::NotFound(raw_path.to_string()))?;
    let tag = DeliveryTag::parse(tag, state.formats())
        .ok_or_else(|| AppError::NotFound(raw_path.to_string()))?;
    let decoded =
        urlencoding::decode(rest).map_err(|_| AppError::NotFound(raw_path.to_string()))?;
    let path = state.library.resolve(&decoded)?;

    let metadata = tokio::fs::metadata(&path.absolute)
        .await
        .map_err(|_| AppError::NotFound(path.relative.clone()))?;

    if metadata.is_dir() {
        let library = state.library.clone();
        let dir = path.clone();
        let entries = blocking(move || library.list(&dir)).await?;
        tracing::info!(path = %path.relative, entries = entries.len(), "Browsing directory");

        let heading = format!("Index of /{}", path.relative);
        let parent = (!path.relative.is_empty()).then(|| {
            let up = path.relative.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            routes::browse_href(up)
        });

        return Ok(render_listing(
            &state,
            ClientCapability::from_headers(&headers),
            &format!("/{}", path.relative),
            &heading,
            &routes::browse_href(&path.relative),
            parent.as_deref().or(Some("/")),
            &entries,
        ));
    }

    deliver::deliver(&state, &path, &tag).await
}
