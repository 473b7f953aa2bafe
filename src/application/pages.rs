//! Cache-or-render path for document requests.
//!
//! [`PageService::serve`] maps a request descriptor to a response plus the
//! cache writes it implies; [`PageService::apply`] performs those writes. The
//! HTTP layer calls both, tests can inspect the effects in between.

use std::{path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use tracing::{debug, info};

use crate::{
    application::{
        document,
        error::AppError,
        render::{RenderEngine, RenderRequest},
    },
    cache::{ContentEncoding, PageCache, PageCacheEntry, PageKey},
    domain::device::DeviceClass,
    infra::error::InfraError,
};

/// Response header reporting whether the page came from the cache.
pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-frontgate-cache");
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: Method,
    /// Path plus query string, as passed to the renderer.
    pub route: String,
    pub user_agent: Option<String>,
    pub accept_encoding: Option<String>,
}

impl PageRequest {
    pub fn get(route: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            route: route.into(),
            user_agent: None,
            accept_encoding: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_accept_encoding(mut self, accept_encoding: impl Into<String>) -> Self {
        self.accept_encoding = Some(accept_encoding.into());
        self
    }

    pub fn cache_key(&self) -> PageKey {
        PageKey::new(
            self.route.clone(),
            DeviceClass::from_user_agent(self.user_agent.as_deref()),
        )
    }
}

/// Side effects requested by [`PageService::serve`].
#[derive(Debug)]
pub enum Effect {
    StorePage(Arc<PageCacheEntry>),
}

#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub effects: Vec<Effect>,
}

/// Where the base HTML document comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Build output, used in production.
    Built(PathBuf),
    /// Unbuilt source template, used in development.
    Source(PathBuf),
    Inline(Arc<str>),
}

impl TemplateSource {
    pub async fn load(&self) -> Result<String, AppError> {
        match self {
            Self::Built(path) | Self::Source(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|err| AppError::from(InfraError::from(err))),
            Self::Inline(template) => Ok(template.to_string()),
        }
    }
}

pub struct PageService {
    cache: Arc<PageCache>,
    engine: Arc<dyn RenderEngine>,
    template: TemplateSource,
    theme: String,
    cache_control: HeaderValue,
    strip_dev_scripts: bool,
}

impl PageService {
    pub fn new(
        cache: Arc<PageCache>,
        engine: Arc<dyn RenderEngine>,
        template: TemplateSource,
        theme: impl Into<String>,
        cache_control: HeaderValue,
        strip_dev_scripts: bool,
    ) -> Self {
        Self {
            cache,
            engine,
            template,
            theme: theme.into(),
            cache_control,
            strip_dev_scripts,
        }
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    /// Active theme passed to every render call.
    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub async fn serve(&self, request: &PageRequest) -> Result<Dispatched, AppError> {
        if request.method != Method::GET && request.method != Method::HEAD {
            return Err(AppError::MethodNotAllowed);
        }

        self.cache.sweep_expired();

        let key = request.cache_key();
        let encoding = ContentEncoding::negotiate(request.accept_encoding.as_deref());

        if let Some(entry) = self.cache.lookup(&key) {
            debug!(key = %key, "page cache hit");
            return Ok(Dispatched {
                response: entry_response(&entry, encoding, "HIT"),
                effects: Vec::new(),
            });
        }

        let template = self.template.load().await?;
        let output = self
            .engine
            .render(&RenderRequest::new(request.route.clone(), self.theme.clone()))
            .await?;

        if let Some(location) = output
            .redirect
            .as_deref()
            .filter(|location| !location.is_empty())
        {
            info!(route = %request.route, location, "renderer requested redirect");
            return Ok(Dispatched {
                response: redirect_response(location)?,
                effects: Vec::new(),
            });
        }

        let html = document::assemble(&template, &output, self.strip_dev_scripts)?;
        let headers = vec![
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(HTML_CONTENT_TYPE),
            ),
            (header::CACHE_CONTROL, self.cache_control.clone()),
        ];
        let entry = Arc::new(self.cache.prepare(key, Bytes::from(html), headers));

        Ok(Dispatched {
            response: entry_response(&entry, encoding, "MISS"),
            effects: vec![Effect::StorePage(entry)],
        })
    }

    pub fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StorePage(entry) => self.cache.insert(entry),
            }
        }
    }
}

fn entry_response(
    entry: &PageCacheEntry,
    wanted: ContentEncoding,
    cache_status: &'static str,
) -> Response {
    let (encoding, body) = entry.variants.select(wanted);
    let mut response = Response::new(Body::from(body.clone()));

    let headers = response.headers_mut();
    for (name, value) in &entry.headers {
        headers.insert(name.clone(), value.clone());
    }
    if let Some(token) = encoding.header_value() {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(token));
    }
    headers.insert(header::VARY, HeaderValue::from_static("accept-encoding"));
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
    response
}

fn redirect_response(location: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| AppError::unexpected(format!("renderer returned invalid redirect `{location}`")))?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    response.headers_mut().insert(header::LOCATION, value);
    Ok(response)
}
