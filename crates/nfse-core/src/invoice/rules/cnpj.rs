//! CNPJ (Brazilian legal-entity tax id) extraction, formatting and validation.

use super::patterns::{CNPJ_AFTER_INSC, CNPJ_FORMATTED};
use super::{labelled_captures, ExtractionMatch, FieldRule};

/// Issuer CNPJ rule, anchored on the municipal registration label.
pub struct CnpjRule;

impl FieldRule for CnpjRule {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        labelled_captures(&CNPJ_AFTER_INSC, text)
    }
}

/// Validate a CNPJ using the mod-11 check digit algorithm.
///
/// Punctuation is ignored. Fourteen identical digits are rejected.
pub fn validate_cnpj(cnpj: &str) -> bool {
    let digits: Vec<u32> = cnpj.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != 14 || digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let check = |len: usize| -> u32 {
        let weights = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
        let offset = weights.len() - len;
        let sum: u32 = digits
            .iter()
            .take(len)
            .zip(&weights[offset..])
            .map(|(d, w)| d * w)
            .sum();
        match sum % 11 {
            0 | 1 => 0,
            r => 11 - r,
        }
    };

    check(12) == digits[12] && check(13) == digits[13]
}

/// Format 14 digits as `NN.NNN.NNN/NNNN-NN`.
///
/// Returns the input unchanged when it does not carry exactly 14 digits.
pub fn format_cnpj(cnpj: &str) -> String {
    let digits: String = cnpj.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() != 14 {
        return cnpj.to_string();
    }

    format!(
        "{}.{}.{}/{}-{}",
        &digits[0..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12],
        &digits[12..14]
    )
}

/// Canonical form used for storage and comparison.
///
/// Already-punctuated values are kept, digits-only values (possibly with
/// stray separators) are punctuated, anything else is returned trimmed.
pub fn canonical_cnpj(cnpj: &str) -> String {
    let trimmed = cnpj.trim();
    if CNPJ_FORMATTED.is_match(trimmed) {
        return trimmed.to_string();
    }

    let only_separators = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '/' | '-' | ' '));
    if only_separators {
        let formatted = format_cnpj(trimmed);
        if CNPJ_FORMATTED.is_match(&formatted) {
            return formatted;
        }
    }

    trimmed.to_string()
}
