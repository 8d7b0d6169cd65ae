//! Prompt style templates.
//!
//! A style wraps the user's text in a fixed set of quality tags. User
//! text may carry a negative prompt after the [`NEGATIVE_SEPARATOR`];
//! each half is substituted into the matching template at the `{}`
//! placeholder.

use std::collections::HashMap;

use crate::error::CoreError;

/// Separates the positive and negative halves of user text.
pub const NEGATIVE_SEPARATOR: &str = "///";

/// Placeholder replaced by the user's text inside a template.
const PLACEHOLDER: &str = "{}";

/// Name of the style registered by [`StyleBook::with_defaults`].
pub const DEFAULT_STYLE: &str = "base";

const DEFAULT_POSITIVE: &str =
    "masterpiece, absurdres, highres, {}, award winning, ultra detailed, 8k, ultra resolution";

const DEFAULT_NEGATIVE: &str = "(disfigured:1.2), (worst quality, low quality:1.4), {}, (lowres), \
(deformed, distorted:1.3), bad hands, missing fingers, text, watermark, frame, poorly drawn, \
bad anatomy, wrong anatomy, extra limb, missing limb, (mutated hands and fingers:1.3), mutant, \
disconnected limbs, mutation, mutated, ugly, disgusting, blurry";

/// Positive and negative templates for one named style.
#[derive(Debug, Clone)]
pub struct StyleTemplate {
    pub positive: String,
    pub negative: String,
}

/// The result of applying a style to user text.
///
/// `positive` / `negative` are what gets sent to the generator; the
/// `_clear` variants are the user's own words without any style tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledPrompt {
    pub positive: String,
    pub negative: String,
    pub positive_clear: String,
    pub negative_clear: String,
}

impl StyledPrompt {
    /// Styled prompt rejoined with the separator (negative omitted when empty).
    pub fn full(&self) -> String {
        join_halves(&self.positive, &self.negative)
    }

    /// The user's original text, rejoined the same way.
    pub fn full_clear(&self) -> String {
        join_halves(&self.positive_clear, &self.negative_clear)
    }
}

fn join_halves(positive: &str, negative: &str) -> String {
    if negative.is_empty() {
        positive.to_string()
    } else {
        format!("{positive}{NEGATIVE_SEPARATOR}{negative}")
    }
}

/// Registry of named style templates.
#[derive(Debug, Clone, Default)]
pub struct StyleBook {
    styles: HashMap<String, StyleTemplate>,
}

impl StyleBook {
    /// An empty style book.
    pub fn new() -> Self {
        Self::default()
    }

    /// A style book with the [`DEFAULT_STYLE`] registered.
    pub fn with_defaults() -> Self {
        let mut book = Self::new();
        book.add(DEFAULT_STYLE, DEFAULT_POSITIVE, DEFAULT_NEGATIVE);
        book
    }

    /// Register (or replace) a style.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        positive: impl Into<String>,
        negative: impl Into<String>,
    ) {
        self.styles.insert(
            name.into(),
            StyleTemplate {
                positive: positive.into(),
                negative: negative.into(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&StyleTemplate> {
        self.styles.get(name)
    }

    /// Apply the named style to `text`.
    ///
    /// Only the first separator splits the text; anything after a second
    /// separator is dropped.
    pub fn stylize(&self, name: &str, text: &str) -> Result<StyledPrompt, CoreError> {
        let template = self
            .styles
            .get(name)
            .ok_or_else(|| CoreError::Configuration(format!("Unknown style: {name}")))?;

        let mut parts = text.split(NEGATIVE_SEPARATOR);
        let positive_clear = parts.next().unwrap_or_default().to_string();
        let negative_clear = parts.next().unwrap_or_default().to_string();

        Ok(StyledPrompt {
            positive: template.positive.replacen(PLACEHOLDER, &positive_clear, 1),
            negative: template.negative.replacen(PLACEHOLDER, &negative_clear, 1),
            positive_clear,
            negative_clear,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn book() -> StyleBook {
        let mut book = StyleBook::new();
        book.add("plain", "best, {}", "worst, {}");
        book
    }

    #[test]
    fn positive_only_text() {
        let styled = book().stylize("plain", "a cat").unwrap();
        assert_eq!(styled.positive, "best, a cat");
        assert_eq!(styled.negative, "worst, ");
        assert_eq!(styled.positive_clear, "a cat");
        assert!(styled.negative_clear.is_empty());
    }

    #[test]
    fn separator_splits_negative() {
        let styled = book().stylize("plain", "a cat///dogs").unwrap();
        assert_eq!(styled.positive, "best, a cat");
        assert_eq!(styled.negative, "worst, dogs");
        assert_eq!(styled.full_clear(), "a cat///dogs");
    }

    #[test]
    fn full_omits_empty_negative() {
        let mut book = StyleBook::new();
        book.add("bare", "{}", "");
        let styled = book.stylize("bare", "sunset").unwrap();
        assert_eq!(styled.full(), "sunset");
        assert_eq!(styled.full_clear(), "sunset");
    }

    #[test]
    fn unknown_style_is_configuration_error() {
        assert_matches!(
            book().stylize("missing", "x"),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn defaults_register_base_style() {
        let book = StyleBook::with_defaults();
        let styled = book.stylize(DEFAULT_STYLE, "castle").unwrap();
        assert!(styled.positive.starts_with("masterpiece"));
        assert!(styled.positive.contains("castle"));
        assert!(!styled.negative.contains(PLACEHOLDER));
    }
}
