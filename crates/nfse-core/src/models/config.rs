//! Configuration structures for the extraction pipeline and server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the LLM credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main configuration for nfse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfseConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// LLM client configuration.
    pub llm: LlmConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Below this many alphanumeric characters the text layer is treated as absent.
    pub min_text_chars: usize,

    /// DPI for rendering the first page for vision mode.
    pub render_dpi: u32,

    /// Upper bound for one rasterization, in seconds.
    pub render_timeout_secs: u64,

    /// Which rasterizer implementation to build.
    pub rasterizer: RasterizerKind,

    /// Path or name of the pdftoppm binary.
    pub pdftoppm_path: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 30,
            render_dpi: 150,
            render_timeout_secs: 30,
            rasterizer: RasterizerKind::Subprocess,
            pdftoppm_path: "pdftoppm".to_string(),
        }
    }
}

impl PdfConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

/// Rasterizer implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterizerKind {
    /// Spawn pdftoppm (poppler-utils).
    Subprocess,
    /// Decode the page's embedded image in-process.
    Embedded,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Always ask the LLM for the richer field set.
    pub full_fields: bool,

    /// Check CNPJ check digits and warn on mismatch.
    pub validate_cnpj: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            full_fields: true,
            validate_cnpj: true,
        }
    }
}

/// LLM client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,

    /// Vision-capable model name.
    pub model: String,

    /// Completion token budget.
    pub max_tokens: u32,

    /// Upper bound for one call, in seconds.
    pub timeout_secs: u64,

    /// Image detail hint sent with vision requests.
    pub image_detail: String,

    /// Submission mode.
    pub mode: LlmMode,

    /// Text mode truncates the document to this many characters.
    pub max_text_chars: usize,

    /// API credential. Read from the environment, never written to disk.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 3000,
            timeout_secs: 60,
            image_detail: "high".to_string(),
            mode: LlmMode::Auto,
            max_text_chars: 12_000,
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How documents are submitted to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmMode {
    /// Text when the text layer is usable, vision otherwise.
    Auto,
    /// Always send extracted text.
    Text,
    /// Always send a rendered image of page 1.
    Vision,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Directory holding persisted PDF/JSON pairs.
    pub upload_dir: PathBuf,

    /// Request body limit for multipart uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 32 << 20,
        }
    }
}

impl NfseConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Overlay values from the process environment (`OPENAI_API_KEY`, `PORT`).
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key.trim().to_string());
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(dir) = lookup("NFSE_UPLOAD_DIR").filter(|d| !d.is_empty()) {
            self.server.upload_dir = PathBuf::from(dir);
        }
    }
}
