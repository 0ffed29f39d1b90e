//! Rule-based field extraction for NFS-e documents.

pub mod amounts;
pub mod cnpj;
pub mod dates;
pub mod defrag;
pub mod number;
pub mod patterns;

pub use amounts::{
    decimal_from_f64, format_brazilian_amount, parse_amount_lenient, parse_brazilian_amount,
    GrossValueRule,
};
pub use cnpj::{canonical_cnpj, format_cnpj, validate_cnpj, CnpjRule};
pub use dates::{competence_of, normalize_competence, parse_issue_date};
pub use defrag::defragment;
pub use number::InvoiceNumberRule;

use regex::Regex;

/// Trait for deterministic field rules.
pub trait FieldRule {
    /// The type of value this rule produces.
    type Output;

    /// Extract the first occurrence of the field.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A rule match and the labelled text it was read from.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    pub value: T,
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
        }
    }
}

/// Matches of a label pattern whose first group is the value.
pub(crate) fn labelled_captures(pattern: &Regex, text: &str) -> Vec<ExtractionMatch<String>> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let (whole, value) = (caps.get(0)?, caps.get(1)?);
            Some(ExtractionMatch::new(value.as_str().to_string(), whole.as_str()))
        })
        .collect()
}
