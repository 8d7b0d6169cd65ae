//! The remote generation contract consumed by the job pipeline.
//!
//! [`RemoteGenerationClient`] is the only view the pipeline has of the
//! generation service. [`WebUiApi`] implements it over HTTP; tests
//! substitute an in-memory implementation.

use async_trait::async_trait;

use crate::api::{WebUiApi, WebUiApiError};
use crate::models::{
    ExtraSingleImageParams, Img2ImgParams, ProgressSnapshot, Txt2ImgParams, Upscaler,
};
use crate::output::GenerationOutput;

/// Asynchronous, fallible access to a remote image generation service.
#[async_trait]
pub trait RemoteGenerationClient: Send + Sync {
    /// Generate images from a text prompt.
    async fn txt2img(&self, params: &Txt2ImgParams) -> Result<GenerationOutput, WebUiApiError>;

    /// Generate images from source images plus a prompt.
    async fn img2img(&self, params: &Img2ImgParams) -> Result<GenerationOutput, WebUiApiError>;

    /// Upscale a single image.
    async fn upscale(
        &self,
        params: &ExtraSingleImageParams,
    ) -> Result<GenerationOutput, WebUiApiError>;

    /// Progress of the generation currently running on the service.
    async fn poll_progress(&self) -> Result<ProgressSnapshot, WebUiApiError>;

    /// Upscalers the service can use.
    async fn upscalers(&self) -> Result<Vec<Upscaler>, WebUiApiError>;
}

#[async_trait]
impl RemoteGenerationClient for WebUiApi {
    async fn txt2img(&self, params: &Txt2ImgParams) -> Result<GenerationOutput, WebUiApiError> {
        WebUiApi::txt2img(self, params).await
    }

    async fn img2img(&self, params: &Img2ImgParams) -> Result<GenerationOutput, WebUiApiError> {
        WebUiApi::img2img(self, params).await
    }

    async fn upscale(
        &self,
        params: &ExtraSingleImageParams,
    ) -> Result<GenerationOutput, WebUiApiError> {
        self.extra_single_image(params).await
    }

    async fn poll_progress(&self) -> Result<ProgressSnapshot, WebUiApiError> {
        self.progress().await
    }

    async fn upscalers(&self) -> Result<Vec<Upscaler>, WebUiApiError> {
        WebUiApi::upscalers(self).await
    }
}
