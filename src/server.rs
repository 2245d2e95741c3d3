//! HTTP server and routes.

mod deliver;
mod handlers;
mod state;

pub use deliver::{Plan, content_disposition, converted_name, plan};
pub use state::AppState;

use crate::routes;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
///
/// Fixed paths are matched first; everything else goes to the
/// `/<tag>/<path>` browse and delivery handler.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(routes::SEARCH_METADATA, get(handlers::opensearch))
        .route(routes::FEED_SEARCH, get(handlers::opds_search))
        .route(routes::BROWSER_SEARCH, get(handlers::html_search))
        .route(routes::RECENT, get(handlers::recent))
        .fallback(handlers::catalog_path)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
