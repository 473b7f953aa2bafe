mod admin;
mod middleware;
mod public;

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

pub use admin::require_admin;
pub use middleware::{REQUEST_ID_HEADER, RequestContext, log_responses, set_request_context};
pub use public::{StaticRoots, dispatch, has_file_extension};

use crate::{
    application::{admin::AdminService, pages::PageService, themes::ThemeRegistry},
    cache::StaticFileCache,
};

/// Per-generation state shared by every handler. Rebuilt on each restart.
#[derive(Clone)]
pub struct HttpState {
    pub pages: Arc<PageService>,
    pub admin: Arc<AdminService>,
    pub themes: Arc<ThemeRegistry>,
    pub static_files: Arc<StaticFileCache>,
    pub static_roots: Arc<StaticRoots>,
    pub admin_token: Option<Arc<str>>,
}

pub fn build_router(state: HttpState) -> Router {
    let admin_routes = Router::new()
        .route("/cache/clear", post(admin::clear_cache))
        .route("/cache/stats", get(admin::cache_stats))
        .route("/set-thema", post(admin::set_theme))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/themas", get(public::list_themes))
        .merge(admin_routes)
        .fallback(dispatch)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}
