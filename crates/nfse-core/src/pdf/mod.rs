//! PDF processing module.

mod extractor;
pub mod raster;
mod text;

pub use extractor::{decode_pdf_string, primary_page_texts, PdfExtractor};
pub use raster::{
    create_rasterizer, EmbeddedImageRasterizer, PdftoppmRasterizer, Rasterizer,
};
pub use text::{extract_text, TextExtraction, TextSource};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for PDF processing implementations.
pub trait PdfProcessor {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Layout-aware plain text, one entry per page.
    fn extract_page_texts(&self) -> Result<Vec<String>>;

    /// Raw glyph strings of one page in content-stream order, no reflow.
    fn extract_glyph_runs(&self, page: u32) -> Result<Vec<String>>;

    /// Extract embedded images from a page.
    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>>;
}
