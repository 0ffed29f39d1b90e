pub mod batch;
pub mod config;
pub mod output;
pub mod process;
pub mod reconcile;
pub mod serve;

use std::path::{Path, PathBuf};

use nfse_core::NfseConfig;
use tracing::debug;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nfse")
        .join("config.json")
}

/// Explicit path, else the default file when present, else defaults.
/// Environment variables are applied last.
pub fn load_config(path: Option<&str>) -> anyhow::Result<NfseConfig> {
    let mut config = match path {
        Some(path) => NfseConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                debug!("Loading config from {}", default_path.display());
                NfseConfig::from_file(&default_path)?
            } else {
                NfseConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

/// Lowercased extension of `path`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// File name of `path` for logs and records.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
