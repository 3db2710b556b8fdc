//! services/api/src/adapters/illustration.rs
//!
//! Placeholder implementation of the `IllustrationService` port. It encodes the
//! prompt into a placeholder-image URL instead of calling an image model.

use async_trait::async_trait;
use reqwest::Url;
use storybook_core::ports::IllustrationService;

const DEFAULT_PLACEHOLDER_BASE: &str = "https://placehold.co/600x400";

#[derive(Clone, Debug)]
pub struct PlaceholderIllustrator {
    base_url: String,
}

impl PlaceholderIllustrator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Builds `<base>?text=<prompt>` with the prompt form-encoded.
    pub fn image_url(&self, prompt: &str) -> String {
        match Url::parse_with_params(&self.base_url, &[("text", prompt)]) {
            Ok(url) => url.to_string(),
            // An unparseable base still yields a usable, if unencoded, reference.
            Err(_) => format!("{}?text={}", self.base_url, prompt.replace(' ', "+")),
        }
    }
}

impl Default for PlaceholderIllustrator {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_BASE)
    }
}

#[async_trait]
impl IllustrationService for PlaceholderIllustrator {
    async fn illustrate(&self, prompt: &str) -> String {
        self.image_url(prompt)
    }
}
