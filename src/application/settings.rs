//! Client for the external site settings API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header::AUTHORIZATION};
use serde_json::{Map, Value};
use thiserror::Error;

/// Settings key holding the active theme namespace.
pub const THEME_SETTING_KEY: &str = "theme";

pub type SiteSettingsMap = Map<String, Value>;

#[derive(Debug, Error)]
pub enum SettingsApiError {
    #[error("settings API request failed: {0}")]
    Http(String),
    #[error("settings API responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("settings API returned an invalid body: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SiteSettingsApi: Send + Sync {
    async fn fetch(&self) -> Result<SiteSettingsMap, SettingsApiError>;

    async fn persist(&self, settings: &SiteSettingsMap) -> Result<(), SettingsApiError>;
}

/// Return `settings` with the theme key replaced.
pub fn merge_theme(mut settings: SiteSettingsMap, theme: &str) -> SiteSettingsMap {
    settings.insert(
        THEME_SETTING_KEY.to_string(),
        Value::String(theme.to_string()),
    );
    settings
}

/// `GET`/`PUT <base>/settings`, authenticated with the admin bearer secret.
#[derive(Debug, Clone)]
pub struct HttpSettingsApi {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpSettingsApi {
    pub fn new(
        base: &Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SettingsApiError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("settings")
            .map_err(|err| SettingsApiError::Http(format!("invalid settings URL: {err}")))?;
        let client = Client::builder()
            .user_agent(concat!("frontgate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| SettingsApiError::Http(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.endpoint.clone());
        match self.token.as_deref() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SettingsApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SettingsApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SiteSettingsApi for HttpSettingsApi {
    async fn fetch(&self) -> Result<SiteSettingsMap, SettingsApiError> {
        let response = self
            .request(reqwest::Method::GET)
            .send()
            .await
            .map_err(|err| SettingsApiError::Http(err.to_string()))?;
        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|err| SettingsApiError::Http(err.to_string()))?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(SettingsApiError::Decode(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(err) => Err(SettingsApiError::Decode(err.to_string())),
        }
    }

    async fn persist(&self, settings: &SiteSettingsMap) -> Result<(), SettingsApiError> {
        let response = self
            .request(reqwest::Method::PUT)
            .json(settings)
            .send()
            .await
            .map_err(|err| SettingsApiError::Http(err.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}
