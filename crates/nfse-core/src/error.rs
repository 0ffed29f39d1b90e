//! Error types for the nfse-core library.

use thiserror::Error;

/// Main error type for the nfse library.
#[derive(Error, Debug)]
pub enum NfseError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Page rasterization error.
    #[error("rasterization error: {0}")]
    Raster(#[from] RasterError),

    /// LLM extraction error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Spreadsheet import error.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] SpreadsheetError),

    /// Persistence error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reconciliation precondition not met.
    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Neither text extractor could open the container.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors raised while turning a PDF page into a PNG.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The external rasterizer binary is not installed.
    #[error("rasterizer not available: {0}")]
    Unavailable(String),

    /// The rasterizer ran but did not produce an image.
    #[error("rasterization failed: {0}")]
    Failed(String),

    /// The rasterizer exceeded its time budget.
    #[error("rasterization timed out after {0}s")]
    Timeout(u64),

    /// I/O error on the scratch files.
    #[error("rasterizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the external LLM call and its response.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API credential configured.
    #[error("LLM credential missing (set OPENAI_API_KEY)")]
    CredentialMissing,

    /// Network failure talking to the LLM.
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// The call exceeded its time budget.
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// The LLM answered with a non-2xx status.
    #[error("LLM returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The LLM signalled rate limiting.
    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    /// The payload carried a model-reported error.
    #[error("LLM API error: {0}")]
    Api(String),

    /// The payload had no choices.
    #[error("LLM response contained no choices")]
    EmptyChoices,

    /// The content was neither a JSON object nor a JSON array.
    #[error("failed to parse LLM response: {reason}. Content: {content}")]
    Parse { reason: String, content: String },
}

/// Errors related to spreadsheet ingestion.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// File extension is not a supported spreadsheet format.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The workbook could not be read.
    #[error("failed to read spreadsheet: {0}")]
    Read(String),

    /// The workbook has no sheets or no rows.
    #[error("spreadsheet is empty")]
    Empty,
}

/// Errors from the reconciliation engine.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    /// No invoices have been loaded.
    #[error("no invoices loaded")]
    NoInvoices,

    /// No reference spreadsheet has been loaded.
    #[error("no reference rows loaded")]
    NoReferences,
}

/// Errors from the local record store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for the nfse library.
pub type Result<T> = std::result::Result<T, NfseError>;
