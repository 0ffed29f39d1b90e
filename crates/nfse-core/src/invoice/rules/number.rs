//! NFS-e number extraction.

use super::patterns::INVOICE_NUMBER;
use super::{labelled_captures, ExtractionMatch, FieldRule};

/// Invoice number rule anchored on the "Número da NFS-e" label. Leading zeros are kept.
pub struct InvoiceNumberRule;

impl FieldRule for InvoiceNumberRule {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        labelled_captures(&INVOICE_NUMBER, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_number_rule() {
        let number = |text: &str| InvoiceNumberRule.extract(text).map(|m| m.value);
        assert_eq!(number("NúmerodaNFS-e  42"), Some("42".to_string()));
        assert_eq!(number("NúmerodaNFS-e\n0007"), Some("0007".to_string()));
        assert_eq!(number("Número da NFS-e 42"), None);
    }
}
