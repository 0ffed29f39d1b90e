//! Core library for NFS-e (Brazilian service invoice) processing.
//!
//! This crate provides:
//! - PDF text extraction with a secondary glyph-run fallback
//! - First-page rasterization for vision extraction
//! - Regex mining of CNPJ, invoice number and gross value
//! - LLM-backed field extraction (text or vision)
//! - Field normalization and validation
//! - Reconciliation against a reference spreadsheet
//! - Flat-file persistence of uploaded invoices

pub mod error;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod pdf;
pub mod reconcile;
pub mod storage;

pub use error::{NfseError, Result};
pub use invoice::{
    BatchSummary, Cancellation, DocumentInput, DocumentOutcome, ExtractOptions, InvoicePipeline,
    RecordNormalizer, RegexMiner,
};
pub use llm::{ExtractionInput, FieldExtractor, OpenAiExtractor};
pub use models::config::{LlmMode, NfseConfig, RasterizerKind};
pub use models::invoice::{
    FieldWarning, InvoiceRecord, PartialRecord, ReconciliationResult, ReferenceRow,
};
pub use pdf::{extract_text, Rasterizer, TextExtraction, TextSource};
pub use reconcile::{read_reference_rows, reconcile, ReconciliationSession, ReferenceImport};
pub use storage::{FileStore, PersistSubmission, PersistedInvoice, RecordSink};
