//! Stable Diffusion WebUI REST client library.
//!
//! Provides typed request/response models, an HTTP wrapper over the
//! `/sdapi/v1` endpoints, image payload encoding, and the
//! [`RemoteGenerationClient`] trait through which the job pipeline
//! talks to the generation service.

pub mod api;
pub mod client;
pub mod models;
pub mod output;

pub use api::{WebUiApi, WebUiApiError};
pub use client::RemoteGenerationClient;
pub use models::ProgressSnapshot;
pub use output::GenerationOutput;
