//! Generation jobs and how each one is executed against the remote service.
//!
//! A [`Job`] is fixed at construction and never changes after submission.
//! Chaining between remote calls (e.g. generate, then upscale every
//! output) happens inside [`Job::execute`]; the worker only sees a single
//! future producing one [`ExecutionResult`].

use std::fmt;

use sdbot_webui::models::{ExtraSingleImageParams, Img2ImgParams, Txt2ImgParams};
use sdbot_webui::output::encode_image;
use sdbot_webui::{GenerationOutput, RemoteGenerationClient};
use serde::Serialize;

use crate::error::PipelineError;
use crate::queue::ExecutionResult;

/// Default scale factor for upscaling jobs.
pub const DEFAULT_UPSCALE_FACTOR: f64 = 2.0;

/// Text-to-image generation followed by an upscale of every output image.
#[derive(Debug, Clone)]
pub struct Txt2ImgUpscaleParams {
    pub txt2img: Txt2ImgParams,
    /// Upscaler name; must match one reported by the service.
    pub upscaler: String,
    pub upscaling_resize: f64,
}

/// Upscale of an image the user already has.
#[derive(Debug, Clone)]
pub struct UpscaleParams {
    /// Raw image file bytes.
    pub image: Vec<u8>,
    pub upscaler: String,
    pub upscaling_resize: f64,
}

/// One generation request.
#[derive(Debug, Clone)]
pub enum Job {
    /// Plain text-to-image.
    Txt2Img(Txt2ImgParams),
    /// Text-to-image, then each image upscaled (composite).
    Txt2ImgUpscale(Txt2ImgUpscaleParams),
    /// Image-to-image.
    Img2Img(Img2ImgParams),
    /// Upscale of an existing image.
    Upscale(UpscaleParams),
}

/// Discriminant of [`Job`], for logs and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Txt2Img,
    Txt2ImgUpscale,
    Img2Img,
    Upscale,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Txt2Img => "txt2img",
            Self::Txt2ImgUpscale => "txt2img_upscale",
            Self::Img2Img => "img2img",
            Self::Upscale => "upscale",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Job {
    /// Re-run a prompt with a fresh random seed.
    pub fn resample(params: &Txt2ImgParams) -> Self {
        Self::Txt2Img(Txt2ImgParams {
            seed: -1,
            subseed: -1,
            ..params.clone()
        })
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Txt2Img(_) => JobKind::Txt2Img,
            Self::Txt2ImgUpscale(_) => JobKind::Txt2ImgUpscale,
            Self::Img2Img(_) => JobKind::Img2Img,
            Self::Upscale(_) => JobKind::Upscale,
        }
    }

    /// Issue the remote call(s) for this job.
    pub async fn execute(&self, client: &dyn RemoteGenerationClient) -> ExecutionResult {
        match self {
            Self::Txt2Img(params) => Ok(client.txt2img(params).await?),
            Self::Img2Img(params) => Ok(client.img2img(params).await?),
            Self::Txt2ImgUpscale(params) => execute_txt2img_upscale(client, params).await,
            Self::Upscale(params) => {
                let upscaler = resolve_upscaler(client, &params.upscaler).await?;
                let request = upscale_request(&params.image, &upscaler, params.upscaling_resize);
                Ok(client.upscale(&request).await?)
            }
        }
    }
}

/// Generate, then upscale every generated image in order.
///
/// The upscaler is resolved before any generation call, so a bad name
/// fails the job without touching the service's generation endpoints.
async fn execute_txt2img_upscale(
    client: &dyn RemoteGenerationClient,
    params: &Txt2ImgUpscaleParams,
) -> ExecutionResult {
    let upscaler = resolve_upscaler(client, &params.upscaler).await?;
    let primary = client.txt2img(&params.txt2img).await?;

    let mut combined = GenerationOutput {
        images: Vec::with_capacity(primary.images.len()),
        parameters: primary.parameters,
        info: primary.info,
    };
    for image in &primary.images {
        let request = upscale_request(image, &upscaler, params.upscaling_resize);
        combined.extend_images(client.upscale(&request).await?);
    }

    Ok(combined)
}

fn upscale_request(image: &[u8], upscaler: &str, resize: f64) -> ExtraSingleImageParams {
    ExtraSingleImageParams {
        image: encode_image(image),
        upscaler_1: upscaler.to_string(),
        upscaling_resize: resize,
        ..Default::default()
    }
}

/// Map a configured upscaler name to the name the service uses.
///
/// Exact matches win; otherwise a case-insensitive match is accepted.
pub async fn resolve_upscaler(
    client: &dyn RemoteGenerationClient,
    requested: &str,
) -> Result<String, PipelineError> {
    let available = client.upscalers().await?;
    available
        .iter()
        .find(|u| u.name == requested)
        .or_else(|| {
            available
                .iter()
                .find(|u| u.name.eq_ignore_ascii_case(requested))
        })
        .map(|u| u.name.clone())
        .ok_or_else(|| PipelineError::Configuration(format!("Unknown upscaler `{requested}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_resets_seed_only() {
        let params = Txt2ImgParams {
            prompt: "harbor".into(),
            seed: 1234,
            steps: 30,
            ..Default::default()
        };
        let Job::Txt2Img(resampled) = Job::resample(&params) else {
            panic!("resample must produce a txt2img job");
        };
        assert_eq!(resampled.seed, -1);
        assert_eq!(resampled.prompt, "harbor");
        assert_eq!(resampled.steps, 30);
    }

    #[test]
    fn kind_names() {
        assert_eq!(JobKind::Txt2ImgUpscale.to_string(), "txt2img_upscale");
        let job = Job::Img2Img(Img2ImgParams::default());
        assert_eq!(job.kind(), JobKind::Img2Img);
    }
}
