//! Request and response models for the WebUI REST API.
//!
//! Request structs serialize with every field present, using the
//! service's own defaults, so a caller only has to set the fields it
//! cares about:
//!
//! ```ignore
//! let params = Txt2ImgParams {
//!     prompt: "a lighthouse at dusk".into(),
//!     steps: 28,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Sampler used when a request does not specify one.
pub const DEFAULT_SAMPLER: &str = "Euler a";

/// Parameters for `POST /sdapi/v1/txt2img`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Txt2ImgParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub styles: Vec<String>,
    /// `-1` lets the service pick a random seed.
    pub seed: i64,
    pub subseed: i64,
    pub subseed_strength: f64,
    pub sampler_name: String,
    pub batch_size: u32,
    pub n_iter: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub restore_faces: bool,
    pub tiling: bool,
    pub do_not_save_samples: bool,
    pub do_not_save_grid: bool,
    pub denoising_strength: f64,
    /// Hires-fix second pass.
    pub enable_hr: bool,
    pub hr_scale: f64,
    pub hr_upscaler: String,
    pub hr_second_pass_steps: u32,
    pub override_settings: serde_json::Map<String, serde_json::Value>,
    pub override_settings_restore_afterwards: bool,
    pub send_images: bool,
    pub save_images: bool,
}

impl Default for Txt2ImgParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            styles: Vec::new(),
            seed: -1,
            subseed: -1,
            subseed_strength: 0.0,
            sampler_name: DEFAULT_SAMPLER.to_string(),
            batch_size: 1,
            n_iter: 1,
            steps: 22,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            restore_faces: false,
            tiling: false,
            do_not_save_samples: true,
            do_not_save_grid: true,
            denoising_strength: 0.0,
            enable_hr: false,
            hr_scale: 2.0,
            hr_upscaler: String::new(),
            hr_second_pass_steps: 0,
            override_settings: serde_json::Map::new(),
            override_settings_restore_afterwards: true,
            send_images: true,
            save_images: false,
        }
    }
}

/// Parameters for `POST /sdapi/v1/img2img`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Img2ImgParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub styles: Vec<String>,
    pub seed: i64,
    pub sampler_name: String,
    pub batch_size: u32,
    pub n_iter: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub restore_faces: bool,
    pub do_not_save_samples: bool,
    pub do_not_save_grid: bool,
    pub denoising_strength: f64,
    /// Source images as `data:image/png;base64,...` strings
    /// (see [`encode_image`](crate::output::encode_image)).
    pub init_images: Vec<String>,
    pub resize_mode: u32,
    pub mask: Option<String>,
    pub mask_blur: u32,
    pub inpainting_fill: u32,
    pub inpaint_full_res: bool,
    pub include_init_images: bool,
    pub override_settings: serde_json::Map<String, serde_json::Value>,
    pub send_images: bool,
    pub save_images: bool,
}

impl Default for Img2ImgParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            styles: Vec::new(),
            seed: -1,
            sampler_name: DEFAULT_SAMPLER.to_string(),
            batch_size: 1,
            n_iter: 1,
            steps: 22,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            restore_faces: false,
            do_not_save_samples: true,
            do_not_save_grid: true,
            denoising_strength: 0.4,
            init_images: Vec::new(),
            resize_mode: 0,
            mask: None,
            mask_blur: 4,
            inpainting_fill: 0,
            inpaint_full_res: true,
            include_init_images: false,
            override_settings: serde_json::Map::new(),
            send_images: true,
            save_images: false,
        }
    }
}

/// Parameters for `POST /sdapi/v1/extra-single-image` (upscaling).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraSingleImageParams {
    /// Base64 image payload.
    pub image: String,
    /// Upscaler name as reported by `/sdapi/v1/upscalers`.
    pub upscaler_1: String,
    pub upscaler_2: String,
    pub extras_upscaler_2_visibility: f64,
    /// `0` scales by `upscaling_resize`.
    pub resize_mode: u32,
    pub upscaling_resize: f64,
}

impl Default for ExtraSingleImageParams {
    fn default() -> Self {
        Self {
            image: String::new(),
            upscaler_1: "None".to_string(),
            upscaler_2: "None".to_string(),
            extras_upscaler_2_visibility: 0.0,
            resize_mode: 0,
            upscaling_resize: 2.0,
        }
    }
}

/// Raw body of `GET /sdapi/v1/progress`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgressResponse {
    pub progress: f64,
    pub eta_relative: f64,
    pub state: Option<serde_json::Value>,
    pub current_image: Option<String>,
    #[serde(alias = "text_info")]
    pub textinfo: Option<String>,
}

/// Point-in-time status of the job currently running on the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion in `0.0..=1.0`.
    pub fraction: f64,
    /// Free-form status text from the service, if any.
    pub text: Option<String>,
    /// Estimated seconds remaining, as reported by the service.
    pub eta_relative: f64,
}

impl From<ProgressResponse> for ProgressSnapshot {
    fn from(raw: ProgressResponse) -> Self {
        let fraction = if raw.progress.is_finite() {
            raw.progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            fraction,
            text: raw.textinfo.filter(|t| !t.is_empty()),
            eta_relative: raw.eta_relative.max(0.0),
        }
    }
}

/// One entry of `GET /sdapi/v1/upscalers`.
#[derive(Debug, Clone, Deserialize)]
pub struct Upscaler {
    pub name: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// One entry of `GET /sdapi/v1/sd-models`.
#[derive(Debug, Clone, Deserialize)]
pub struct SdModel {
    pub title: String,
    pub model_name: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub config: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt2img_defaults_serialize_service_defaults() {
        let json = serde_json::to_value(Txt2ImgParams::default()).unwrap();
        assert_eq!(json["seed"], -1);
        assert_eq!(json["sampler_name"], "Euler a");
        assert_eq!(json["steps"], 22);
        assert_eq!(json["width"], 512);
        assert_eq!(json["send_images"], true);
    }

    #[test]
    fn img2img_defaults_use_partial_denoise() {
        let params = Img2ImgParams::default();
        assert!((params.denoising_strength - 0.4).abs() < f64::EPSILON);
        assert!(params.init_images.is_empty());
    }

    #[test]
    fn parse_progress_with_text_info() {
        let json = r#"{"progress":0.5,"eta_relative":3.2,"state":{"job_count":1},"current_image":null,"textinfo":"Sampling"}"#;
        let raw: ProgressResponse = serde_json::from_str(json).unwrap();
        let snapshot = ProgressSnapshot::from(raw);
        assert_eq!(snapshot.fraction, 0.5);
        assert_eq!(snapshot.text.as_deref(), Some("Sampling"));
    }

    #[test]
    fn progress_fraction_is_clamped() {
        let snapshot = ProgressSnapshot::from(ProgressResponse {
            progress: 1.7,
            eta_relative: -2.0,
            ..Default::default()
        });
        assert_eq!(snapshot.fraction, 1.0);
        assert_eq!(snapshot.eta_relative, 0.0);
    }

    #[test]
    fn progress_missing_fields_default_to_zero() {
        let raw: ProgressResponse = serde_json::from_str("{}").unwrap();
        let snapshot = ProgressSnapshot::from(raw);
        assert_eq!(snapshot.fraction, 0.0);
        assert!(snapshot.text.is_none());
    }

    #[test]
    fn parse_upscaler_list() {
        let json = r#"[{"name":"None","model_name":null,"model_path":null,"model_url":null,"scale":4},
                       {"name":"R-ESRGAN 4x+","model_name":"R-ESRGAN 4x+","model_path":null,"model_url":null,"scale":4}]"#;
        let upscalers: Vec<Upscaler> = serde_json::from_str(json).unwrap();
        assert_eq!(upscalers.len(), 2);
        assert_eq!(upscalers[1].name, "R-ESRGAN 4x+");
    }
}
