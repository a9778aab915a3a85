//! Label intake pipeline: extraction chain feeding the classifier.

use std::path::Path;

use tracing::{debug, info};

use crate::classify::{Classifier, FieldMap};
use crate::ocr::OcrChain;

pub struct IntakePipeline {
    chain: OcrChain,
    classifier: Classifier,
}

impl IntakePipeline {
    pub fn new(chain: OcrChain) -> Self {
        Self {
            chain,
            classifier: Classifier::new(),
        }
    }

    /// Extract and classify one stored label image. Never fails: when no
    /// provider yields text the mapping is all-blank and the caller records
    /// a mostly-blank entry.
    pub async fn process(&self, image: &Path) -> FieldMap {
        let capture = self.chain.extract(image).await;
        if capture.lines.is_empty() {
            info!(
                "no text extracted from {}; recording blank fields",
                image.display()
            );
            return FieldMap::default();
        }
        debug!(
            "classifying {} lines ({} chars) from provider {}",
            capture.lines.len(),
            capture.raw_text.len(),
            capture.provider_name
        );
        self.classifier.classify(&capture.lines)
    }
}
