//! Local command-line OCR provider.
//!
//! Runs a configured external process with the image path appended and a
//! bounded timeout. A non-zero exit, spawn failure, or timeout means the
//! provider is unavailable — the chain falls through without retrying.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{text_from_response, ExtractionProvider};
use crate::config::OcrSettings;

pub struct CliProvider {
    argv: Vec<String>,
    timeout: Duration,
}

impl CliProvider {
    /// Only created when `OCR_CMD` is configured.
    pub fn from_config(settings: &OcrSettings) -> Option<Self> {
        let argv: Vec<String> = settings
            .cli_cmd
            .as_deref()?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if argv.is_empty() {
            return None;
        }
        Some(Self {
            argv,
            timeout: settings.timeout,
        })
    }

    async fn run(&self, image: &Path) -> Result<Option<String>> {
        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .arg("--image")
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("CliProvider: running {} for {}", self.argv[0], image.display());

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "CliProvider: {} timed out after {:?}",
                    self.argv[0], self.timeout
                );
                return Ok(None);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "CliProvider: {} exited with {} ({})",
                self.argv[0],
                output.status,
                stderr.trim()
            );
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text_from_response(&stdout)))
    }
}

#[async_trait::async_trait]
impl ExtractionProvider for CliProvider {
    fn name(&self) -> &str {
        "cli"
    }

    async fn try_extract(&self, image: &Path) -> Result<Option<String>> {
        self.run(image).await
    }
}
