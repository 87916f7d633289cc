//! Headless render collaborator.
//!
//! # Responsibilities
//! - Define the `Renderer` seam used by the render endpoints
//! - Talk to an external render service over HTTP (JSON in/out)
//!
//! # Design Decisions
//! - The browser itself lives outside this process
//! - Every call is bounded by the configured timeout
//! - Screenshots travel base64-encoded and are decoded here

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{RenderConfig, WaitCondition};
use crate::error::{ProxyError, ProxyResult};

/// One page to render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: Url,
    pub wait: WaitCondition,
    pub timeout: Duration,
    pub screenshot: bool,
}

/// The collaborator's answer.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub screenshot: Option<Vec<u8>>,
    pub final_url: Url,
    pub title: Option<String>,
}

/// Renders pages in a headless browser.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> ProxyResult<RenderedPage>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderCall<'a> {
    url: &'a str,
    wait_until: &'static str,
    timeout_ms: u64,
    screenshot: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderReply {
    html: String,
    #[serde(default)]
    final_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    screenshot: Option<String>,
}

/// [`Renderer`] backed by an HTTP render service.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRenderer {
    pub fn new(config: &RenderConfig) -> ProxyResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ProxyError::Internal(format!("invalid render endpoint: {e}")))?;
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build render client: {e}")))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, request: RenderRequest) -> ProxyResult<RenderedPage> {
        let target = request.url.to_string();
        let failed = |message: String| ProxyError::Render {
            url: target.clone(),
            message,
        };

        let call = RenderCall {
            url: &target,
            wait_until: request.wait.as_str(),
            timeout_ms: request.timeout.as_millis() as u64,
            screenshot: request.screenshot,
        };

        tracing::debug!(url = %target, wait = request.wait.as_str(), "Requesting render");

        let exchange = async {
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&call)
                .send()
                .await
                .map_err(|e| failed(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(failed(format!("render service answered {status}: {detail}")));
            }
            response
                .json::<RenderReply>()
                .await
                .map_err(|e| failed(format!("malformed render reply: {e}")))
        };

        let reply = tokio::time::timeout(request.timeout, exchange)
            .await
            .map_err(|_| failed(format!("timed out after {:?}", request.timeout)))??;

        let screenshot = reply
            .screenshot
            .map(|encoded| STANDARD.decode(encoded.as_bytes()))
            .transpose()
            .map_err(|e| failed(format!("invalid screenshot encoding: {e}")))?;

        let final_url = reply
            .final_url
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or(request.url);

        Ok(RenderedPage {
            html: reply.html,
            screenshot,
            final_url,
            title: reply.title,
        })
    }
}
