//! NFS-e invoice records and reconciliation types.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::invoice::rules::patterns::CNPJ_FORMATTED;

/// The canonical record extracted from one NFS-e.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Issuer CNPJ, formatted `NN.NNN.NNN/NNNN-NN`. Empty if unresolvable.
    pub issuer_tax_id: String,

    /// NFS-e number as printed (leading zeros kept).
    pub invoice_number: String,

    /// Issuer legal or trade name.
    pub issuer_name: String,

    /// Issue date, `DD/MM/YYYY`.
    pub issue_date: String,

    /// Fiscal month, `MM/YYYY`.
    pub competence: String,

    /// Service value ("Valor do Serviço" / "Valor Total").
    #[serde(with = "rust_decimal::serde::float")]
    pub gross_value: Decimal,

    /// Municipal service tax withheld at source.
    #[serde(with = "rust_decimal::serde::float")]
    pub iss_withheld: Decimal,

    /// `gross_value - iss_withheld`.
    #[serde(with = "rust_decimal::serde::float")]
    pub net_value: Decimal,

    /// Name of the file the record came from.
    pub source_filename: String,

    /// Non-fatal issues found while building the record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldWarning>,
}

impl InvoiceRecord {
    /// Turn the record back into a partial, every field present.
    pub fn to_partial(&self) -> PartialRecord {
        PartialRecord {
            issuer_tax_id: Some(self.issuer_tax_id.clone()),
            invoice_number: Some(self.invoice_number.clone()),
            issuer_name: Some(self.issuer_name.clone()),
            issue_date: Some(self.issue_date.clone()),
            competence: Some(self.competence.clone()),
            gross_value: Some(self.gross_value),
            iss_withheld: Some(self.iss_withheld),
            warnings: self.warnings.clone(),
        }
    }

    /// Build an invoice from a spreadsheet row.
    pub fn from_reference(row: &ReferenceRow, source_filename: &str) -> Self {
        Self {
            issuer_tax_id: row.tax_id.clone(),
            invoice_number: row.invoice_number.clone(),
            gross_value: row.value,
            net_value: row.value,
            source_filename: source_filename.to_string(),
            ..Default::default()
        }
    }

    /// Validate the record and return any issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.invoice_number.is_empty() {
            issues.push("Missing invoice number".to_string());
        }

        if self.issuer_tax_id.is_empty() {
            issues.push("Missing issuer CNPJ".to_string());
        } else if !CNPJ_FORMATTED.is_match(&self.issuer_tax_id) {
            issues.push(format!("Malformed issuer CNPJ: {}", self.issuer_tax_id));
        }

        if self.issuer_name.is_empty() {
            issues.push("Missing issuer name".to_string());
        }

        if self.issue_date.is_empty() {
            issues.push("Missing issue date".to_string());
        }

        if self.gross_value.is_zero() {
            issues.push("Service value is zero".to_string());
        }

        if self.net_value != self.gross_value - self.iss_withheld {
            issues.push(format!(
                "Net value ({}) differs from gross minus ISS ({})",
                self.net_value,
                self.gross_value - self.iss_withheld
            ));
        }

        issues
    }
}

/// A possibly incomplete set of fields from one extraction source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub issuer_tax_id: Option<String>,
    pub invoice_number: Option<String>,
    pub issuer_name: Option<String>,
    pub issue_date: Option<String>,
    pub competence: Option<String>,
    pub gross_value: Option<Decimal>,
    pub iss_withheld: Option<Decimal>,
    /// Warnings raised while producing this partial.
    pub warnings: Vec<FieldWarning>,
}

impl PartialRecord {
    /// True when the deterministic fields (tax id, number, gross) are all present.
    pub fn is_complete(&self) -> bool {
        has_text(&self.issuer_tax_id)
            && has_text(&self.invoice_number)
            && self.gross_value.is_some_and(|v| !v.is_zero())
    }

    /// True when both identity fields are present.
    pub fn has_identity(&self) -> bool {
        has_text(&self.issuer_tax_id) && has_text(&self.invoice_number)
    }

    /// True when neither a number nor a value was found.
    pub fn is_blank(&self) -> bool {
        !has_text(&self.invoice_number) && self.gross_value.is_none_or(|v| v.is_zero())
    }

    /// Number of populated fields out of the total.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            has_text(&self.issuer_tax_id),
            has_text(&self.invoice_number),
            has_text(&self.issuer_name),
            has_text(&self.issue_date),
            has_text(&self.competence),
            self.gross_value.is_some(),
            self.iss_withheld.is_some(),
        ]
        .iter()
        .filter(|f| **f)
        .count();
        (filled, 7)
    }

    pub(crate) fn warn(&mut self, field: &str, message: impl Into<String>) {
        push_warning(&mut self.warnings, FieldWarning::new(field, message));
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// A non-fatal, field-level problem attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    /// Field the warning refers to.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl FieldWarning {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Append a warning unless an identical one is already present.
pub(crate) fn push_warning(warnings: &mut Vec<FieldWarning>, warning: FieldWarning) {
    if !warnings.contains(&warning) {
        warnings.push(warning);
    }
}

/// One data row of the reference spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub tax_id: String,
    pub invoice_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

/// Outcome of matching one invoice against the reference list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub invoice: InvoiceRecord,
    pub reference: Option<ReferenceRow>,
    #[serde(rename = "match")]
    pub matched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record() -> InvoiceRecord {
        InvoiceRecord {
            issuer_tax_id: "12.345.678/0001-90".to_string(),
            invoice_number: "42".to_string(),
            issuer_name: "ACME Serviços Ltda".to_string(),
            issue_date: "05/03/2024".to_string(),
            competence: "03/2024".to_string(),
            gross_value: Decimal::from_str("100.00").unwrap(),
            iss_withheld: Decimal::from_str("5.00").unwrap(),
            net_value: Decimal::from_str("95.00").unwrap(),
            source_filename: "nota.pdf".to_string(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_validate_clean_record() {
        assert!(record().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_bad_cnpj_and_net() {
        let mut r = record();
        r.issuer_tax_id = "12345".to_string();
        r.net_value = Decimal::ZERO;
        let issues = r.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("Malformed issuer CNPJ"));
    }

    #[test]
    fn test_serializes_money_as_numbers() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["gross_value"], serde_json::json!(100.0));
        assert_eq!(json["net_value"], serde_json::json!(95.0));
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn test_partial_completeness() {
        let mut partial = PartialRecord::default();
        assert!(partial.is_blank());
        partial.issuer_tax_id = Some("12.345.678/0001-90".to_string());
        partial.invoice_number = Some("42".to_string());
        assert!(partial.has_identity());
        assert!(!partial.is_complete());
        partial.gross_value = Some(Decimal::ONE_HUNDRED);
        assert!(partial.is_complete());
        assert_eq!(partial.coverage(), (3, 7));
    }

    #[test]
    fn test_warnings_are_deduplicated() {
        let mut partial = PartialRecord::default();
        partial.warn("gross_value", "unparseable");
        partial.warn("gross_value", "unparseable");
        assert_eq!(partial.warnings.len(), 1);
    }

    #[test]
    fn test_reconciliation_result_uses_match_key() {
        let result = ReconciliationResult {
            invoice: record(),
            reference: None,
            matched: false,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["match"], serde_json::json!(false));
        assert!(json["reference"].is_null());
    }
}
