use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{RenderEngine, RenderError, RenderOutput, RenderRequest};

/// Production bridge: `POST <base>/render` on the precompiled render server.
#[derive(Debug, Clone)]
pub struct SidecarRenderer {
    client: Client,
    endpoint: Url,
}

impl SidecarRenderer {
    pub fn new(base: Url) -> Result<Self, RenderError> {
        let endpoint = render_endpoint(&base)?;
        // The sidecar runs next to this process; proxies never apply.
        let client = Client::builder()
            .user_agent(concat!("frontgate/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .map_err(|err| RenderError::Transport(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn render_endpoint(base: &Url) -> Result<Url, RenderError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("render")
        .map_err(|err| RenderError::Transport(format!("invalid sidecar URL: {err}")))
}

#[async_trait]
impl RenderEngine for SidecarRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| RenderError::Transport(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RenderError::Transport(err.to_string()))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            let message = if text.is_empty() {
                format!("render server responded with {status}")
            } else {
                text
            };
            return Err(RenderError::engine(message));
        }

        serde_json::from_slice(&bytes).map_err(|err| RenderError::Protocol(err.to_string()))
    }

    fn name(&self) -> &'static str {
        "sidecar"
    }
}
