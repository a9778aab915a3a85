//! Pluggable OCR extraction providers with ordered fallback.
//!
//! Defines the [`ExtractionProvider`] trait and the [`OcrChain`] that tries
//! each configured provider in order until one yields non-empty text. The
//! chain never mixes output from two providers for the same image and never
//! substitutes a method that was not configured: when every provider is
//! absent or fails, the capture is empty and intake proceeds with blank
//! fields.

pub mod cli;
pub mod http;
pub mod script;

use std::path::Path;

use tracing::{info, warn};

use crate::config::OcrSettings;
use cli::CliProvider;
use http::HttpInferenceProvider;
use script::ScriptProvider;

/// Result of running the chain on one label image.
#[derive(Debug, Clone, Default)]
pub struct OcrCapture {
    pub raw_text: String,
    /// Trimmed, non-empty lines of `raw_text`, in original order.
    pub lines: Vec<String>,
    pub provider_name: String,
}

/// Async trait implemented by each extraction backend.
///
/// `Ok(None)` and `Err(_)` both mean "provider unavailable" — the chain
/// moves on to the next provider without retrying in place.
#[async_trait::async_trait]
pub trait ExtractionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn try_extract(&self, image: &Path) -> anyhow::Result<Option<String>>;
}

/// Statically configured ordered provider list.
pub struct OcrChain {
    providers: Vec<Box<dyn ExtractionProvider>>,
}

impl OcrChain {
    /// Build the chain from configuration. Each provider is included only
    /// when its required variables are present, in fixed order: local
    /// command line, local script, remote HTTP inference.
    pub fn from_config(settings: &OcrSettings, client: reqwest::Client) -> Self {
        let mut providers: Vec<Box<dyn ExtractionProvider>> = Vec::new();
        if let Some(provider) = CliProvider::from_config(settings) {
            providers.push(Box::new(provider));
        }
        if let Some(provider) = ScriptProvider::from_config(settings) {
            providers.push(Box::new(provider));
        }
        if let Some(provider) = HttpInferenceProvider::from_config(settings, client) {
            providers.push(Box::new(provider));
        }
        if providers.is_empty() {
            warn!("no OCR provider configured; intake will record blank fields");
        }
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run the chain. The first provider producing non-empty text wins;
    /// an empty capture means no configured provider could extract.
    pub async fn extract(&self, image: &Path) -> OcrCapture {
        for provider in &self.providers {
            match provider.try_extract(image).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    let lines = split_lines(&text);
                    info!(
                        "provider {} extracted {} lines from {}",
                        provider.name(),
                        lines.len(),
                        image.display()
                    );
                    return OcrCapture {
                        raw_text: text,
                        lines,
                        provider_name: provider.name().to_string(),
                    };
                }
                Ok(_) => warn!(
                    "provider {} produced no text for {}",
                    provider.name(),
                    image.display()
                ),
                Err(e) => warn!("provider {} unavailable: {e:#}", provider.name()),
            }
        }
        warn!(
            "extraction failed for {}: no configured provider produced output",
            image.display()
        );
        OcrCapture::default()
    }
}

/// Split raw OCR output into trimmed, non-empty lines in original order.
fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Field-name synonyms probed when a provider answers with key-based data.
const TEXT_KEYS: [&str; 5] = ["text", "ocr_text", "result", "pred", "output"];

/// Interpret a provider response: structured (key-based) data first, raw
/// text fallback. A malformed or unexpected shape is never a hard failure.
pub(crate) fn text_from_response(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return trimmed.to_string();
    };
    match value {
        serde_json::Value::Object(map) => {
            for key in TEXT_KEYS {
                match map.get(key) {
                    Some(serde_json::Value::String(s)) => return s.clone(),
                    Some(other) => return other.to_string(),
                    None => {}
                }
            }
            trimmed.to_string()
        }
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.is_empty() {
                trimmed.to_string()
            } else {
                texts.join("\n")
            }
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_trims_and_drops_empty() {
        let lines = split_lines("  FLIPKART  \n\n 1234567890123 \n\t\n");
        assert_eq!(lines, vec!["FLIPKART", "1234567890123"]);
    }

    #[test]
    fn test_response_with_known_key() {
        assert_eq!(
            text_from_response(r#"{"ocr_text": "AWB 123\nJohn"}"#),
            "AWB 123\nJohn"
        );
        assert_eq!(text_from_response(r#"{"output": "hello"}"#), "hello");
    }

    #[test]
    fn test_response_object_without_known_key_kept_raw() {
        let raw = r#"{"something": "else"}"#;
        assert_eq!(text_from_response(raw), raw);
    }

    #[test]
    fn test_response_plain_text() {
        assert_eq!(text_from_response("just some text\n"), "just some text");
    }

    #[test]
    fn test_response_json_string() {
        assert_eq!(text_from_response(r#""quoted text""#), "quoted text");
    }

    #[test]
    fn test_response_array_of_text_parts() {
        assert_eq!(
            text_from_response(r#"[{"text": "line one"}, {"text": "line two"}]"#),
            "line one\nline two"
        );
    }

    #[test]
    fn test_response_malformed_json_kept_raw() {
        assert_eq!(text_from_response("{not json"), "{not json");
    }
}
