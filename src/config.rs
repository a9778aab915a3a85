//! Environment-driven configuration.
//!
//! Everything is plain environment variables (a `.env` file is loaded at
//! startup when present). Optional subsystems — the individual OCR
//! providers and the SMTP transport — are enabled purely by the presence
//! of their variables.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub data_file: PathBuf,
    pub contact_file: PathBuf,
    pub marker_file: PathBuf,
    pub ocr: OcrSettings,
    pub smtp: Option<SmtpSettings>,
}

/// Settings shared by the extraction providers. A provider is configured
/// only when its variables are present.
#[derive(Debug)]
pub struct OcrSettings {
    /// Command line for a local OCR process, e.g. `ocr-infer --model /m`.
    pub cli_cmd: Option<String>,
    /// Path to a local inference script invoked via `python`.
    pub script: Option<PathBuf>,
    /// Hosted inference model id, e.g. `deepseek-ai/DeepSeek-OCR`.
    pub hf_model: Option<String>,
    pub hf_token: Option<String>,
    /// Upper bound for one provider attempt.
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct SmtpSettings {
    pub email: String,
    pub password: String,
    pub server: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_or("PORT", "3000");
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            upload_dir: env_or("UPLOAD_DIR", "uploads").into(),
            archive_dir: env_or("ARCHIVE_DIR", "archive").into(),
            data_file: env_or("DATA_FILE", "data.csv").into(),
            contact_file: env_or("CONTACT_FILE", "contact.csv").into(),
            marker_file: env_or("LAST_RUN_FILE", "last_run_date.txt").into(),
            ocr: OcrSettings::from_env(),
            smtp: SmtpSettings::from_env(),
        }
    }
}

impl OcrSettings {
    fn from_env() -> Self {
        let timeout_secs: u64 = env_or("OCR_TIMEOUT_SECS", "60").parse().unwrap_or(60);
        Self {
            cli_cmd: optional("OCR_CMD"),
            script: optional("OCR_SCRIPT").map(PathBuf::from),
            hf_model: optional("OCR_HF_MODEL"),
            hf_token: optional("HF_TOKEN"),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl SmtpSettings {
    /// The transport is disabled (not an error) unless both the account
    /// address and password are configured.
    fn from_env() -> Option<Self> {
        let email = optional("SMTP_EMAIL")?;
        let password = optional("SMTP_PASSWORD")?;
        let timeout_secs: u64 = env_or("SMTP_TIMEOUT_SECS", "30").parse().unwrap_or(30);
        Some(Self {
            email,
            password,
            server: env_or("SMTP_SERVER", "smtp.gmail.com"),
            port: env_or("SMTP_PORT", "587").parse().unwrap_or(587),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A set-but-empty variable counts as absent.
fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
