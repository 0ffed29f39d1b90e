//! LLM-backed field extraction.

pub mod client;
pub mod prompt;
pub mod response;

pub use client::OpenAiExtractor;
pub use response::{parse_llm_content, strip_fences, LlmInvoice};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::LlmError;
use crate::models::invoice::PartialRecord;

/// What is submitted to the model.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionInput<'a> {
    /// Text pulled from the PDF.
    Text(&'a str),
    /// PNG rendering of page 1.
    Image(&'a [u8]),
}

impl ExtractionInput<'_> {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "vision",
        }
    }
}

/// Capability that turns a document into zero or more partial records.
///
/// Implementations never retry; the caller decides.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Extract fields from text or an image, bounded by `timeout`.
    async fn extract(
        &self,
        input: ExtractionInput<'_>,
        timeout: Duration,
    ) -> Result<Vec<PartialRecord>, LlmError>;
}
