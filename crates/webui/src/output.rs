//! Decoding of generation responses and encoding of image payloads.
//!
//! The generation endpoints return images as base64 strings, either as
//! an `images` list (txt2img / img2img) or a single `image` field
//! (extra-single-image). Metadata arrives as `info` (usually a JSON
//! document serialized into a string) or `html_info`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::api::WebUiApiError;

/// Prefix used for image payloads sent to the service.
const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Images and metadata produced by one remote generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    /// Raw image file bytes (PNG as produced by the service).
    pub images: Vec<Vec<u8>>,
    /// Request parameters echoed back by the service.
    pub parameters: Value,
    /// Generation info; parsed JSON when possible, a string otherwise.
    pub info: Value,
}

impl GenerationOutput {
    /// Decode a generation response body.
    pub fn from_response(body: Value) -> Result<Self, WebUiApiError> {
        let images = match (body.get("images"), body.get("image")) {
            (Some(Value::Array(list)), _) => list
                .iter()
                .map(|item| match item {
                    Value::String(encoded) => decode_image(encoded),
                    other => Err(WebUiApiError::Decode(format!(
                        "image entry is not a string: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            (_, Some(Value::String(encoded))) => vec![decode_image(encoded)?],
            _ => Vec::new(),
        };

        let info = match (body.get("info"), body.get("html_info")) {
            (Some(Value::String(raw)), _) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
            (Some(other), _) => other.clone(),
            (None, Some(html)) => html.clone(),
            (None, None) => Value::Null,
        };

        let parameters = body.get("parameters").cloned().unwrap_or(Value::Null);

        Ok(Self {
            images,
            parameters,
            info,
        })
    }

    /// Seeds used for each image, when the service reported them.
    pub fn seeds(&self) -> Vec<i64> {
        self.info
            .get("all_seeds")
            .and_then(Value::as_array)
            .map(|seeds| seeds.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default()
    }

    /// Append another output's images, keeping this output's metadata.
    pub fn extend_images(&mut self, other: GenerationOutput) {
        self.images.extend(other.images);
    }
}

/// Decode a base64 image, accepting an optional `data:...;base64,` prefix.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, WebUiApiError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| WebUiApiError::Decode(format!("invalid base64 image: {e}")))
}

/// Encode image bytes as a PNG data URL suitable for request payloads.
pub fn encode_image(bytes: &[u8]) -> String {
    format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_image_list_and_json_info() {
        let body = json!({
            "images": [STANDARD.encode(b"one"), STANDARD.encode(b"two")],
            "parameters": {"prompt": "cat"},
            "info": "{\"all_seeds\": [11, 12]}",
        });
        let output = GenerationOutput::from_response(body).unwrap();
        assert_eq!(output.images, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(output.parameters["prompt"], "cat");
        assert_eq!(output.seeds(), vec![11, 12]);
    }

    #[test]
    fn single_image_with_html_info() {
        let body = json!({
            "image": encode_image(b"big"),
            "html_info": "<p>upscaled</p>",
        });
        let output = GenerationOutput::from_response(body).unwrap();
        assert_eq!(output.images, vec![b"big".to_vec()]);
        assert_eq!(output.info, json!("<p>upscaled</p>"));
        assert!(output.seeds().is_empty());
    }

    #[test]
    fn non_json_info_kept_as_string() {
        let body = json!({"images": [], "info": "plain text"});
        let output = GenerationOutput::from_response(body).unwrap();
        assert_eq!(output.info, json!("plain text"));
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        let body = json!({"images": ["***"]});
        assert_matches!(
            GenerationOutput::from_response(body),
            Err(WebUiApiError::Decode(_))
        );
    }

    #[test]
    fn missing_images_yield_empty_output() {
        let output = GenerationOutput::from_response(json!({})).unwrap();
        assert!(output.images.is_empty());
        assert_eq!(output.info, Value::Null);
    }

    #[test]
    fn encode_produces_png_data_url() {
        let encoded = encode_image(b"abc");
        assert!(encoded.starts_with("data:image/png;base64,"));
        assert_eq!(decode_image(&encoded).unwrap(), b"abc");
    }
}
