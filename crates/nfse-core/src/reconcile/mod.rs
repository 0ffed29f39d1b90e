//! Reconciliation of extracted invoices against a reference spreadsheet.

pub mod spreadsheet;

pub use spreadsheet::{read_reference_rows, ReferenceImport, SpreadsheetKind};

use crate::error::ReconcileError;
use crate::invoice::rules::canonical_cnpj;
use crate::models::invoice::{InvoiceRecord, ReconciliationResult, ReferenceRow};

/// Match every invoice against the first reference row with the same
/// `(tax_id, invoice_number)`.
///
/// The output has one entry per invoice, in input order. `matched` requires
/// an exact decimal equality between `gross_value` and the reference value.
pub fn reconcile(invoices: &[InvoiceRecord], references: &[ReferenceRow]) -> Vec<ReconciliationResult> {
    let keyed: Vec<(String, &str, &ReferenceRow)> = references
        .iter()
        .map(|r| (canonical_cnpj(&r.tax_id), r.invoice_number.trim(), r))
        .collect();

    invoices
        .iter()
        .map(|invoice| {
            let tax_id = canonical_cnpj(&invoice.issuer_tax_id);
            let number = invoice.invoice_number.trim();

            let reference = keyed
                .iter()
                .find(|(t, n, _)| *t == tax_id && *n == number)
                .map(|(_, _, r)| (*r).clone());

            let matched = reference
                .as_ref()
                .is_some_and(|r| r.value == invoice.gross_value);

            ReconciliationResult {
                invoice: invoice.clone(),
                reference,
                matched,
            }
        })
        .collect()
}

/// Process-local reconciliation state: extracted invoices plus the
/// current reference list. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationSession {
    invoices: Vec<InvoiceRecord>,
    references: Vec<ReferenceRow>,
}

impl ReconciliationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append invoices. Duplicates are kept.
    pub fn add_invoices(&mut self, invoices: impl IntoIterator<Item = InvoiceRecord>) {
        self.invoices.extend(invoices);
    }

    /// Replace the reference list.
    pub fn replace_references(&mut self, rows: Vec<ReferenceRow>) {
        self.references = rows;
    }

    pub fn invoices(&self) -> &[InvoiceRecord] {
        &self.invoices
    }

    pub fn references(&self) -> &[ReferenceRow] {
        &self.references
    }

    /// Reconcile the session. Both lists must be non-empty.
    pub fn compare(&self) -> Result<Vec<ReconciliationResult>, ReconcileError> {
        if self.invoices.is_empty() {
            return Err(ReconcileError::NoInvoices);
        }
        if self.references.is_empty() {
            return Err(ReconcileError::NoReferences);
        }
        Ok(reconcile(&self.invoices, &self.references))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn invoice(tax_id: &str, number: &str, gross: &str) -> InvoiceRecord {
        InvoiceRecord {
            issuer_tax_id: tax_id.to_string(),
            invoice_number: number.to_string(),
            gross_value: dec(gross),
            net_value: dec(gross),
            ..Default::default()
        }
    }

    fn row(tax_id: &str, number: &str, value: &str) -> ReferenceRow {
        ReferenceRow {
            tax_id: tax_id.to_string(),
            invoice_number: number.to_string(),
            value: dec(value),
        }
    }

    #[test]
    fn test_value_mismatch() {
        let results = reconcile(&[invoice("A", "1", "100")], &[row("A", "1", "101")]);
        assert_eq!(results.len(), 1);
        assert!(!results[0].matched);
        assert_eq!(results[0].reference, Some(row("A", "1", "101")));
    }

    #[test]
    fn test_exact_decimal_match() {
        let results = reconcile(&[invoice("A", "1", "100.00")], &[row("A", "1", "100")]);
        assert!(results[0].matched);

        let results = reconcile(&[invoice("A", "1", "100.001")], &[row("A", "1", "100")]);
        assert!(!results[0].matched);
    }

    #[test]
    fn test_first_matching_row_wins() {
        let results = reconcile(
            &[invoice("A", "1", "5")],
            &[row("A", "1", "4"), row("A", "1", "5")],
        );
        assert_eq!(results[0].reference, Some(row("A", "1", "4")));
        assert!(!results[0].matched);
    }

    #[test]
    fn test_canonical_tax_ids_compare_equal() {
        let results = reconcile(
            &[invoice("11.222.333/0001-81", "42", "10")],
            &[row("11222333000181", " 42 ", "10")],
        );
        assert!(results[0].matched);
    }

    #[test]
    fn test_totality_and_order() {
        let invoices = vec![
            invoice("A", "1", "1"),
            invoice("B", "2", "2"),
            invoice("A", "1", "1"),
        ];
        let results = reconcile(&invoices, &[row("A", "1", "1")]);

        assert_eq!(results.len(), 3);
        for (result, invoice) in results.iter().zip(&invoices) {
            assert_eq!(&result.invoice, invoice);
        }
        assert_eq!(
            results.iter().map(|r| r.matched).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(results[1].reference, None);
    }

    #[test]
    fn test_session_requires_both_lists() {
        let mut session = ReconciliationSession::new();
        assert_eq!(session.compare(), Err(ReconcileError::NoInvoices));

        session.add_invoices([invoice("A", "1", "100")]);
        assert_eq!(session.compare(), Err(ReconcileError::NoReferences));

        session.replace_references(vec![row("A", "1", "101")]);
        let results = session.compare().unwrap();
        assert!(!results[0].matched);

        session.replace_references(vec![row("A", "1", "100")]);
        assert!(session.compare().unwrap()[0].matched);
        assert_eq!(session.references().len(), 1);
    }
}
