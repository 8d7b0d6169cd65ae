//! Shared fixtures for pipeline integration tests.
//!
//! [`MockClient`] is an in-memory [`RemoteGenerationClient`] that records
//! every call it receives, so tests can assert exactly which remote
//! operations a job issued.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sdbot_pipeline::QueueConfig;
use sdbot_webui::models::{
    ExtraSingleImageParams, Img2ImgParams, Txt2ImgParams, Upscaler,
};
use sdbot_webui::output::decode_image;
use sdbot_webui::{GenerationOutput, ProgressSnapshot, RemoteGenerationClient, WebUiApiError};

/// A remote operation observed by [`MockClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Txt2Img { prompt: String },
    Img2Img { prompt: String },
    Upscale { upscaler: String, image: Vec<u8> },
    Progress,
    Upscalers,
}

pub struct MockClient {
    calls: Mutex<Vec<Call>>,
    /// How long each generation call takes.
    delay: Duration,
    /// Images returned by each txt2img / img2img call.
    images_per_call: usize,
    upscalers: Vec<String>,
    /// Fractions returned by successive progress polls; the last repeats.
    progress: Mutex<VecDeque<f64>>,
    fail_generation: bool,
    fail_progress: bool,
}

impl Default for MockClient {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            images_per_call: 1,
            upscalers: vec!["None".to_string(), "R-ESRGAN 4x+".to_string()],
            progress: Mutex::new(VecDeque::from([0.5])),
            fail_generation: false,
            fail_progress: false,
        }
    }
}

impl MockClient {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_images(mut self, count: usize) -> Self {
        self.images_per_call = count;
        self
    }

    pub fn with_progress(self, fractions: &[f64]) -> Self {
        *self.progress.lock().unwrap() = fractions.iter().copied().collect();
        self
    }

    pub fn failing_generation(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    pub fn failing_progress(mut self) -> Self {
        self.fail_progress = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than progress polls.
    pub fn generation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Progress)
            .collect()
    }

    pub fn progress_polls(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Progress).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn generate(&self) -> Result<GenerationOutput, WebUiApiError> {
        tokio::time::sleep(self.delay).await;
        if self.fail_generation {
            return Err(WebUiApiError::ApiError {
                status: 500,
                body: "CUDA out of memory".to_string(),
            });
        }
        Ok(GenerationOutput {
            images: (0..self.images_per_call).map(|i| vec![i as u8]).collect(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl RemoteGenerationClient for MockClient {
    async fn txt2img(&self, params: &Txt2ImgParams) -> Result<GenerationOutput, WebUiApiError> {
        self.record(Call::Txt2Img {
            prompt: params.prompt.clone(),
        });
        self.generate().await
    }

    async fn img2img(&self, params: &Img2ImgParams) -> Result<GenerationOutput, WebUiApiError> {
        self.record(Call::Img2Img {
            prompt: params.prompt.clone(),
        });
        self.generate().await
    }

    async fn upscale(
        &self,
        params: &ExtraSingleImageParams,
    ) -> Result<GenerationOutput, WebUiApiError> {
        let image = decode_image(&params.image)?;
        self.record(Call::Upscale {
            upscaler: params.upscaler_1.clone(),
            image: image.clone(),
        });
        let mut upscaled = b"up".to_vec();
        upscaled.extend(image);
        Ok(GenerationOutput {
            images: vec![upscaled],
            ..Default::default()
        })
    }

    async fn poll_progress(&self) -> Result<ProgressSnapshot, WebUiApiError> {
        self.record(Call::Progress);
        if self.fail_progress {
            return Err(WebUiApiError::Decode("progress unavailable".to_string()));
        }
        let mut fractions = self.progress.lock().unwrap();
        let fraction = if fractions.len() > 1 {
            fractions.pop_front().unwrap_or_default()
        } else {
            fractions.front().copied().unwrap_or_default()
        };
        Ok(ProgressSnapshot {
            fraction,
            ..Default::default()
        })
    }

    async fn upscalers(&self) -> Result<Vec<Upscaler>, WebUiApiError> {
        self.record(Call::Upscalers);
        Ok(self
            .upscalers
            .iter()
            .map(|name| Upscaler {
                name: name.clone(),
                model_name: None,
                model_path: None,
                scale: None,
            })
            .collect())
    }
}

/// Queue settings with the given per-user limit and otherwise defaults.
pub fn config(limit: usize) -> QueueConfig {
    QueueConfig {
        default_limit: limit,
        ..Default::default()
    }
}
