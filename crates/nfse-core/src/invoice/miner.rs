//! Deterministic field mining over raw and defragmented text.

use tracing::debug;

use crate::models::invoice::PartialRecord;

use super::rules::{
    parse_brazilian_amount, CnpjRule, ExtractionMatch, FieldRule, GrossValueRule,
    InvoiceNumberRule,
};

/// Regex miner for the three canonical fields.
///
/// Identity fields are looked up in the raw text first and then in the
/// defragmented text. The service value is only read from raw text, since
/// its label contains spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexMiner;

impl RegexMiner {
    pub fn new() -> Self {
        Self
    }

    /// Mine `issuer_tax_id`, `invoice_number` and `gross_value`.
    pub fn mine(&self, raw: &str, defragmented: &str) -> PartialRecord {
        let mut partial = PartialRecord::default();

        if let Some(m) = first_of(&CnpjRule, raw, defragmented) {
            debug!("CNPJ matched on {:?}", m.source);
            partial.issuer_tax_id = Some(m.value);
        }

        if let Some(m) = first_of(&InvoiceNumberRule, raw, defragmented) {
            debug!("NFS-e number matched on {:?}", m.source);
            partial.invoice_number = Some(m.value);
        }

        if let Some(m) = GrossValueRule.extract(raw) {
            match parse_brazilian_amount(&m.value) {
                Some(value) => partial.gross_value = Some(value),
                None => partial.warn(
                    "gross_value",
                    format!("unparseable amount '{}'", m.value),
                ),
            }
        }

        partial
    }

    /// True when both identity fields can be mined from the text.
    pub fn is_sufficient(&self, raw: &str, defragmented: &str) -> bool {
        self.mine(raw, defragmented).has_identity()
    }
}

fn first_of<R>(rule: &R, raw: &str, defragmented: &str) -> Option<ExtractionMatch<String>>
where
    R: FieldRule<Output = ExtractionMatch<String>>,
{
    rule.extract(raw).or_else(|| rule.extract(defragmented))
}
