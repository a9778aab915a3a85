//! Remote HTTP inference OCR provider.
//!
//! Posts the raw image bytes to a hosted inference endpoint with a bearer
//! token. The shared HTTP client carries the request timeout.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{text_from_response, ExtractionProvider};
use crate::config::OcrSettings;

pub struct HttpInferenceProvider {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpInferenceProvider {
    /// Only created when both the model id and the API token are configured.
    pub fn from_config(settings: &OcrSettings, client: reqwest::Client) -> Option<Self> {
        let model = settings.hf_model.as_deref()?;
        let token = settings.hf_token.clone()?;
        Some(Self {
            url: format!("https://api-inference.huggingface.co/models/{model}"),
            token,
            client,
        })
    }
}

#[async_trait::async_trait]
impl ExtractionProvider for HttpInferenceProvider {
    fn name(&self) -> &str {
        "hf_inference"
    }

    async fn try_extract(&self, image: &Path) -> Result<Option<String>> {
        let data = tokio::fs::read(image)
            .await
            .with_context(|| format!("failed to read {}", image.display()))?;

        debug!(
            "HttpInferenceProvider: posting {} bytes to {}",
            data.len(),
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("HttpInferenceProvider: inference API error ({status}): {text}");
            return Ok(None);
        }

        let raw = response.text().await?;
        let text = text_from_response(&raw);
        Ok((!text.trim().is_empty()).then_some(text))
    }
}
