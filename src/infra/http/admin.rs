use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::HttpState;
use crate::{
    application::{
        admin::ClearOutcome,
        error::{AppError, HttpError},
    },
    cache::CacheStats,
};

/// Reject admin requests whose bearer token does not match the configured
/// secret. With no secret configured every request is rejected.
pub async fn require_admin(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = extract_token(request.headers().get(header::AUTHORIZATION));
    let authorized = match (state.admin_token.as_deref(), presented) {
        (Some(expected), Some(presented)) => {
            bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
        }
        _ => false,
    };

    if !authorized {
        return AppError::Unauthorized.into_response();
    }

    next.run(request).await
}

fn extract_token(value: Option<&HeaderValue>) -> Option<&str> {
    let raw = value?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub(super) async fn clear_cache(State(state): State<HttpState>) -> Json<ClearOutcome> {
    Json(state.admin.clear_cache())
}

pub(super) async fn cache_stats(State(state): State<HttpState>) -> Json<CacheStats> {
    Json(state.admin.cache_stats())
}

#[derive(Debug, Deserialize)]
struct SetThemeRequest {
    theme: Option<String>,
}

pub(super) async fn set_theme(State(state): State<HttpState>, body: Bytes) -> Response {
    let request: SetThemeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return HttpError::new(
                "infra::http::admin::set_theme",
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                err.to_string(),
            )
            .into_response();
        }
    };

    let Some(theme) = request.theme.filter(|theme| !theme.trim().is_empty()) else {
        return HttpError::new(
            "infra::http::admin::set_theme",
            StatusCode::BAD_REQUEST,
            "Missing theme",
            "request body has no `theme` field",
        )
        .into_response();
    };

    match state.admin.set_theme(&theme) {
        // The switch completes in the background; the response does not wait.
        Ok(_task) => (
            StatusCode::OK,
            format!("Theme set to {}; restarting", theme.trim()),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_requires_bearer_prefix() {
        let bearer = HeaderValue::from_static("Bearer s3cret");
        assert_eq!(extract_token(Some(&bearer)), Some("s3cret"));

        let basic = HeaderValue::from_static("Basic s3cret");
        assert_eq!(extract_token(Some(&basic)), None);

        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(extract_token(Some(&empty)), None);
        assert_eq!(extract_token(None), None);
    }
}
