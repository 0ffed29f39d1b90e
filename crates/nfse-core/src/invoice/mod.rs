//! Invoice field extraction: regex mining, normalization and the
//! end-to-end document pipeline.

pub mod miner;
pub mod normalizer;
pub mod pipeline;
pub mod rules;

pub use miner::RegexMiner;
pub use normalizer::{normalize, RecordNormalizer};
pub use pipeline::{
    BatchSummary, Cancellation, DocumentInput, DocumentOutcome, ExtractOptions, InvoicePipeline,
};
