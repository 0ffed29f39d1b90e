//! First-page rasterization for vision-mode extraction.

use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use super::{PdfExtractor, PdfProcessor};
use crate::error::RasterError;
use crate::models::config::{PdfConfig, RasterizerKind};

/// Renders page 1 of a PDF as PNG bytes.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Render the first page at `dpi`, giving up after `timeout`.
    async fn rasterize_first_page(
        &self,
        pdf: &[u8],
        dpi: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, RasterError>;
}

/// Build the rasterizer selected in the configuration.
pub fn create_rasterizer(config: &PdfConfig) -> Arc<dyn Rasterizer> {
    match config.rasterizer {
        RasterizerKind::Subprocess => Arc::new(PdftoppmRasterizer::new(&config.pdftoppm_path)),
        RasterizerKind::Embedded => Arc::new(EmbeddedImageRasterizer),
    }
}

/// Rasterizer that shells out to poppler's `pdftoppm`.
///
/// Scratch files live in a per-call temp directory that is removed on every
/// exit path. The child is killed if the timeout elapses.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// pdftoppm pads the page number according to the page count.
    fn find_page_image(dir: &Path) -> Option<PathBuf> {
        ["page-1.png", "page-01.png", "page-001.png", "page-0001.png"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    async fn rasterize_first_page(
        &self,
        pdf: &[u8],
        dpi: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, RasterError> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("input.pdf");
        let prefix = temp_dir.path().join("page");
        tokio::fs::write(&input, pdf).await?;

        let dpi = dpi.to_string();
        let output = Command::new(&self.binary)
            .args(["-png", "-r", &dpi, "-f", "1", "-l", "1"])
            .arg(&input)
            .arg(&prefix)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, output).await {
            Err(_) => return Err(RasterError::Timeout(timeout.as_secs())),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RasterError::Unavailable(format!(
                    "{} not found (install poppler-utils)",
                    self.binary.display()
                )));
            }
            Ok(result) => result?,
        };

        if !output.status.success() {
            return Err(RasterError::Failed(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let image_path = Self::find_page_image(temp_dir.path())
            .ok_or_else(|| RasterError::Failed("no image generated for page 1".to_string()))?;
        let png = tokio::fs::read(&image_path).await?;

        debug!("pdftoppm rendered page 1 at {} dpi ({} bytes)", dpi, png.len());
        Ok(png)
    }
}

/// In-library rasterizer: re-encodes the largest image embedded in page 1.
///
/// Works for scanned NFS-e where the page is a single image. `dpi` is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedImageRasterizer;

impl EmbeddedImageRasterizer {
    fn render(pdf: &[u8]) -> Result<Vec<u8>, RasterError> {
        let extractor =
            PdfExtractor::from_bytes(pdf).map_err(|e| RasterError::Failed(e.to_string()))?;
        let images = extractor
            .extract_images(1)
            .map_err(|e| RasterError::Failed(e.to_string()))?;

        let largest = images
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or_else(|| RasterError::Failed("page 1 has no decodable image".to_string()))?;

        let mut png = Vec::new();
        largest
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| RasterError::Failed(e.to_string()))?;
        Ok(png)
    }
}

#[async_trait]
impl Rasterizer for EmbeddedImageRasterizer {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn rasterize_first_page(
        &self,
        pdf: &[u8],
        _dpi: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, RasterError> {
        let pdf = pdf.to_vec();
        let task = tokio::task::spawn_blocking(move || Self::render(&pdf));

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(RasterError::Timeout(timeout.as_secs())),
            Ok(Err(join)) => Err(RasterError::Failed(join.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}
