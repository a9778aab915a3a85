//! Local script OCR provider.
//!
//! Invokes a configured inference script through the `python` interpreter,
//! with the same bounded-timeout and fall-through semantics as the command
//! line provider.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{text_from_response, ExtractionProvider};
use crate::config::OcrSettings;

pub struct ScriptProvider {
    script: PathBuf,
    timeout: Duration,
}

impl ScriptProvider {
    /// Only created when `OCR_SCRIPT` is configured.
    pub fn from_config(settings: &OcrSettings) -> Option<Self> {
        settings.script.clone().map(|script| Self {
            script,
            timeout: settings.timeout,
        })
    }
}

#[async_trait::async_trait]
impl ExtractionProvider for ScriptProvider {
    fn name(&self) -> &str {
        "script"
    }

    async fn try_extract(&self, image: &Path) -> Result<Option<String>> {
        let mut command = Command::new("python");
        command
            .arg(&self.script)
            .arg("--image")
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "ScriptProvider: running {} for {}",
            self.script.display(),
            image.display()
        );

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "ScriptProvider: {} timed out after {:?}",
                    self.script.display(),
                    self.timeout
                );
                return Ok(None);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "ScriptProvider: {} exited with {} ({})",
                self.script.display(),
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
