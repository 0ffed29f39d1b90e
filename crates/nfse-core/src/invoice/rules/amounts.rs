//! Amount parsing for Brazilian-formatted values.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{BRAZILIAN_AMOUNT, GROSS_VALUE, PLAIN_DECIMAL};
use super::{labelled_captures, ExtractionMatch, FieldRule};

/// Service value rule, anchored on the conditional discount label.
///
/// Layout-specific: only known templates print the service value right
/// after this label, so any LLM value takes precedence.
pub struct GrossValueRule;

impl FieldRule for GrossValueRule {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        labelled_captures(&GROSS_VALUE, text)
    }
}

/// Parse a Brazilian-formatted amount (`1.234,56`).
///
/// Exactly one comma is required; `.` must only group thousands.
/// Returns `None` for anything else, including `1,234.56`.
pub fn parse_brazilian_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if !BRAZILIAN_AMOUNT.is_match(&cleaned) {
        return None;
    }

    Decimal::from_str(&cleaned.replace('.', "").replace(',', ".")).ok()
}

/// Parse a numeric string the LLM or a spreadsheet cell may carry.
///
/// Exactly one comma means Brazilian format. Otherwise the value must be a
/// plain decimal with `.` as separator. Negative values are rejected.
pub fn parse_amount_lenient(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    if cleaned.matches(',').count() == 1 {
        return parse_brazilian_amount(&cleaned);
    }

    if PLAIN_DECIMAL.is_match(&cleaned) {
        return Decimal::from_str(&cleaned).ok();
    }

    None
}

/// Convert a float into a two-place decimal, rejecting non-finite and negative values.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Decimal::from_f64_retain(value).map(|d| d.round_dp(2).normalize())
}

/// Format an amount in Brazilian style (`1.234,56`).
pub fn format_brazilian_amount(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.round_dp(2));
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((&s, "00"));
    let (sign, integer_part) = match integer_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", integer_part),
    };

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*c);
    }

    format!("{sign}{formatted},{decimal_part}")
}
