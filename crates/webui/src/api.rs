//! REST API client for the Stable Diffusion WebUI HTTP endpoints.
//!
//! Wraps the `/sdapi/v1` endpoints (generation, upscaling, progress,
//! model and upscaler listings) using [`reqwest`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{
    ExtraSingleImageParams, Img2ImgParams, ProgressResponse, ProgressSnapshot, SdModel,
    Txt2ImgParams, Upscaler,
};
use crate::output::GenerationOutput;

/// Path prefix of every WebUI API endpoint.
const API_PREFIX: &str = "/sdapi/v1";

/// HTTP client for a single WebUI instance.
#[derive(Debug, Clone)]
pub struct WebUiApi {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the WebUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum WebUiApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("WebUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("Malformed WebUI response: {0}")]
    Decode(String),
}

impl WebUiApi {
    /// Create a new API client for a WebUI instance.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:7860`. A missing
    ///   scheme is treated as `http://`.
    /// * `timeout`  - Per-request timeout. `None` waits as long as the
    ///   service takes, which generation requests usually need.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, WebUiApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
        }
    }

    /// Base URL of the instance, without the API prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate images from a text prompt.
    pub async fn txt2img(&self, params: &Txt2ImgParams) -> Result<GenerationOutput, WebUiApiError> {
        let body: serde_json::Value = self.post("txt2img", params).await?;
        GenerationOutput::from_response(body)
    }

    /// Generate images from source images plus a prompt.
    pub async fn img2img(&self, params: &Img2ImgParams) -> Result<GenerationOutput, WebUiApiError> {
        let body: serde_json::Value = self.post("img2img", params).await?;
        GenerationOutput::from_response(body)
    }

    /// Run a single image through the extras (upscaling) pipeline.
    pub async fn extra_single_image(
        &self,
        params: &ExtraSingleImageParams,
    ) -> Result<GenerationOutput, WebUiApiError> {
        let body: serde_json::Value = self.post("extra-single-image", params).await?;
        GenerationOutput::from_response(body)
    }

    /// Progress of whatever the service is currently generating.
    pub async fn progress(&self) -> Result<ProgressSnapshot, WebUiApiError> {
        let raw: ProgressResponse = self.get("progress?skip_current_image=true").await?;
        Ok(raw.into())
    }

    /// Upscalers installed on the instance.
    pub async fn upscalers(&self) -> Result<Vec<Upscaler>, WebUiApiError> {
        self.get("upscalers").await
    }

    /// Checkpoints available on the instance.
    pub async fn sd_models(&self) -> Result<Vec<SdModel>, WebUiApiError> {
        self.get("sd-models").await
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}/{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, WebUiApiError> {
        tracing::debug!(path, "POST to WebUI");
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, WebUiApiError> {
        tracing::trace!(path, "GET from WebUI");
        let response = self.client.get(self.endpoint(path)).send().await?;

        Self::parse_response(response).await
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`WebUiApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WebUiApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WebUiApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WebUiApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| WebUiApiError::Decode(e.to_string()))
    }
}

/// Trim trailing slashes and default the scheme to `http://`.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
