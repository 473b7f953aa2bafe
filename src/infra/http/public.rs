//! Public surface: static files, theme listing and the document fallback.

use std::path::Path;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, header},
    response::{IntoResponse, Response},
};

use super::HttpState;
use crate::{
    application::pages::PageRequest,
    cache::{CacheConfig, StaticRoot},
    domain::themes::ThemeDescriptor,
};

/// Theme files a browser may fetch. Manifests and sources stay private.
const THEME_ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "css", "js", "woff", "woff2",
    "ttf", "otf",
];

/// Static roots tried before the render path.
#[derive(Debug, Clone)]
pub struct StaticRoots {
    /// Prefix-matched roots (`/assets/`, `/themes/`).
    pub prefixed: Vec<StaticRoot>,
    /// Build output, consulted for any extension-suffixed path.
    pub build_output: StaticRoot,
}

impl StaticRoots {
    pub fn new(client_dir: &Path, themes_dir: &Path, cache: &CacheConfig) -> Self {
        Self {
            prefixed: vec![
                StaticRoot::new(
                    "/assets/",
                    client_dir.join("assets"),
                    cache.asset_cache_control.clone(),
                ),
                StaticRoot::new("/themes/", themes_dir, cache.asset_cache_control.clone())
                    .with_extensions(THEME_ASSET_EXTENSIONS),
            ],
            build_output: StaticRoot::new("/", client_dir, cache.static_cache_control.clone()),
        }
    }
}

/// Whether the last path segment looks like `name.ext`.
pub fn has_file_extension(path: &str) -> bool {
    if path == "/" {
        return false;
    }
    let segment = path.rsplit('/').next().unwrap_or_default();
    segment
        .rfind('.')
        .is_some_and(|dot| dot > 0 && dot + 1 < segment.len())
}

pub(super) async fn list_themes(State(state): State<HttpState>) -> Json<Vec<ThemeDescriptor>> {
    Json(state.themes.list().to_vec())
}

/// Fallback for every request no explicit route claimed: static roots first,
/// then the cache-or-render path.
pub async fn dispatch(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers();

    if method == Method::GET || method == Method::HEAD {
        let if_none_match = header_str(headers, header::IF_NONE_MATCH);
        let accept_encoding = header_str(headers, header::ACCEPT_ENCODING);

        for root in state.static_roots.prefixed.iter().filter(|root| root.matches(&path)) {
            if let Some(served) = state
                .static_files
                .serve(root, &path, if_none_match, accept_encoding)
                .await
            {
                return served.into_response();
            }
        }

        if has_file_extension(&path)
            && let Some(served) = state
                .static_files
                .serve(
                    &state.static_roots.build_output,
                    &path,
                    if_none_match,
                    accept_encoding,
                )
                .await
        {
            return served.into_response();
        }
    }

    let route = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or(path);
    let page_request = PageRequest {
        method,
        route,
        user_agent: header_str(headers, header::USER_AGENT).map(str::to_string),
        accept_encoding: header_str(headers, header::ACCEPT_ENCODING).map(str::to_string),
    };

    match state.pages.serve(&page_request).await {
        Ok(dispatched) => {
            state.pages.apply(dispatched.effects);
            dispatched.response
        }
        Err(err) => err.into_response(),
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection() {
        assert!(has_file_extension("/favicon.ico"));
        assert!(has_file_extension("/js/app.min.js"));
        assert!(!has_file_extension("/"));
        assert!(!has_file_extension("/posts/hello"));
        assert!(!has_file_extension("/.well-known/thing"));
        assert!(!has_file_extension("/.env"));
        assert!(!has_file_extension("/trailing."));
    }

    #[test]
    fn roots_follow_directory_layout() {
        let roots = StaticRoots::new(
            Path::new("dist/client"),
            Path::new("themes"),
            &CacheConfig::default(),
        );
        assert_eq!(
            roots.prefixed[0].resolve("/assets/app.js"),
            Some(Path::new("dist/client/assets/app.js").to_path_buf())
        );
        assert_eq!(
            roots.prefixed[1].resolve("/themes/theme-dark/preview.png"),
            Some(Path::new("themes/theme-dark/preview.png").to_path_buf())
        );
        assert_eq!(
            roots.build_output.resolve("/robots.txt"),
            Some(Path::new("dist/client/robots.txt").to_path_buf())
        );
    }
}
