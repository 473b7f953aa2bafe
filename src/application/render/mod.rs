//! Render-engine boundary.
//!
//! The rendering engine is an external collaborator that turns a route into
//! markup, head metadata and application state. Two bridges implement
//! [`RenderEngine`]: [`SidecarRenderer`] talks to a long-lived precompiled
//! render server, [`ProcessRenderer`] spawns the development renderer per
//! call so source edits are visible on the next request.

use std::{collections::BTreeMap, sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::{RenderMode, RenderSettings};

mod process;
mod sidecar;

pub use process::ProcessRenderer;
pub use sidecar::SidecarRenderer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderRequest {
    pub route: String,
    pub theme: String,
}

impl RenderRequest {
    pub fn new(route: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            theme: theme.into(),
        }
    }
}

/// Everything the engine returns for one route.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOutput {
    pub markup: String,
    pub head_metadata: String,
    /// Placeholder literal → replacement value.
    pub page_metadata: BTreeMap<String, String>,
    pub redirect: Option<String>,
    pub application_state: Value,
    pub site_settings: BTreeMap<String, Value>,
    pub entity_data: Value,
    pub prefetch_data: Value,
}

impl RenderOutput {
    /// String-valued site setting, empty when absent or not a string.
    pub fn site_setting(&self, key: &str) -> &str {
        self.site_settings
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{message}")]
    Engine { message: String },
    #[error("render bridge unavailable: {0}")]
    Transport(String),
    #[error("render engine returned an invalid response: {0}")]
    Protocol(String),
    #[error("render timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("failed to assemble document: {0}")]
    Document(String),
}

impl RenderError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;

    fn name(&self) -> &'static str;
}

/// Wraps an engine with latency metrics and the optional call deadline.
pub struct MeteredRenderer {
    inner: Arc<dyn RenderEngine>,
    timeout: Option<Duration>,
}

impl MeteredRenderer {
    pub fn new(inner: Arc<dyn RenderEngine>, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl RenderEngine for MeteredRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let started_at = Instant::now();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.render(request)).await {
                Ok(result) => result,
                Err(_) => Err(RenderError::Timeout(limit)),
            },
            None => self.inner.render(request).await,
        };

        let elapsed = started_at.elapsed();
        histogram!("frontgate_render_ms").record(elapsed.as_secs_f64() * 1000.0);
        if let Err(err) = &result {
            counter!("frontgate_render_failure_total").increment(1);
            warn!(
                target = "frontgate::application::render",
                engine = self.inner.name(),
                route = %request.route,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "render failed"
            );
        }
        result
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Select the bridge for the configured mode.
pub fn build_engine(settings: &RenderSettings) -> Result<Arc<dyn RenderEngine>, RenderError> {
    let engine: Arc<dyn RenderEngine> = match settings.mode {
        RenderMode::Production => Arc::new(SidecarRenderer::new(settings.sidecar_url.clone())?),
        RenderMode::Development => Arc::new(ProcessRenderer::new(
            settings.dev_command.clone(),
            settings.dev_args.clone(),
        )),
    };
    Ok(Arc::new(MeteredRenderer::new(engine, settings.timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl RenderEngine for Slow {
        async fn render(&self, _request: &RenderRequest) -> Result<RenderOutput, RenderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(RenderOutput::default())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn output_deserializes_camel_case_with_defaults() {
        let output: RenderOutput = serde_json::from_str(
            r#"{"markup":"<p>hi</p>","headMetadata":"<title>x</title>","siteSettings":{"analytics":"<script></script>","theme":"theme-dark","count":3}}"#,
        )
        .expect("valid output");
        assert_eq!(output.markup, "<p>hi</p>");
        assert_eq!(output.head_metadata, "<title>x</title>");
        assert!(output.redirect.is_none());
        assert_eq!(output.site_setting("analytics"), "<script></script>");
        assert_eq!(output.site_setting("count"), "");
        assert_eq!(output.site_setting("customStyle"), "");
    }

    #[test]
    fn engine_error_displays_bare_message() {
        let err = RenderError::engine("post not found in store");
        assert_eq!(err.to_string(), "post not found in store");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_timeout_error() {
        let renderer = MeteredRenderer::new(Arc::new(Slow), Some(Duration::from_millis(50)));
        let err = renderer
            .render(&RenderRequest::new("/", "theme-default"))
            .await
            .expect_err("times out");
        assert!(matches!(err, RenderError::Timeout(_)));
    }
}
