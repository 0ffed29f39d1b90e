//! Merge of regex and LLM partials into the canonical record.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::invoice::{push_warning, FieldWarning, InvoiceRecord, PartialRecord};

use super::rules::patterns::CNPJ_FORMATTED;
use super::rules::{
    canonical_cnpj, competence_of, normalize_competence, parse_issue_date, validate_cnpj,
};
use super::rules::dates::format_issue_date;

/// Builds [`InvoiceRecord`]s from extraction partials.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    validate_cnpj: bool,
}

impl RecordNormalizer {
    pub fn new() -> Self {
        Self { validate_cnpj: true }
    }

    /// Warn when the CNPJ check digits do not match.
    pub fn with_cnpj_validation(mut self, validate: bool) -> Self {
        self.validate_cnpj = validate;
        self
    }

    /// Merge field by field, LLM first, then post-process.
    ///
    /// An LLM value wins when it is present and non-empty (strings) or
    /// non-zero (amounts). Otherwise the regex value is used, then the default.
    pub fn normalize(
        &self,
        regex: &PartialRecord,
        llm: Option<&PartialRecord>,
        source_filename: &str,
    ) -> InvoiceRecord {
        let mut warnings = Vec::new();
        for w in regex.warnings.iter().chain(llm.iter().flat_map(|l| l.warnings.iter())) {
            push_warning(&mut warnings, w.clone());
        }

        let text = |pick: fn(&PartialRecord) -> &Option<String>| -> String {
            let from_llm = llm.and_then(|l| non_empty(pick(l)));
            from_llm
                .or_else(|| non_empty(pick(regex)))
                .unwrap_or_default()
        };
        let amount = |pick: fn(&PartialRecord) -> Option<Decimal>| -> Decimal {
            let from_llm = llm.and_then(pick).filter(|v| !v.is_zero());
            from_llm.or_else(|| pick(regex)).unwrap_or_default()
        };

        let mut record = InvoiceRecord {
            issuer_tax_id: text(|p| &p.issuer_tax_id),
            invoice_number: text(|p| &p.invoice_number),
            issuer_name: text(|p| &p.issuer_name),
            issue_date: text(|p| &p.issue_date),
            competence: text(|p| &p.competence),
            gross_value: amount(|p| p.gross_value),
            iss_withheld: amount(|p| p.iss_withheld),
            net_value: Decimal::ZERO,
            source_filename: source_filename.to_string(),
            warnings: Vec::new(),
        };

        self.fix_tax_id(&mut record, &mut warnings);
        fix_dates(&mut record, &mut warnings);
        fix_amounts(&mut record, &mut warnings);

        for w in &warnings {
            warn!("{}: {}", source_filename, w);
        }
        record.warnings = warnings;

        debug!(
            "Normalized {} -> CNPJ {:?}, NFS-e {:?}, net {}",
            source_filename, record.issuer_tax_id, record.invoice_number, record.net_value
        );

        record
    }

    /// Re-run normalization over an emitted record.
    pub fn renormalize(&self, record: &InvoiceRecord) -> InvoiceRecord {
        self.normalize(&record.to_partial(), None, &record.source_filename)
    }

    fn fix_tax_id(&self, record: &mut InvoiceRecord, warnings: &mut Vec<FieldWarning>) {
        if record.issuer_tax_id.is_empty() {
            return;
        }

        let canonical = canonical_cnpj(&record.issuer_tax_id);
        if !CNPJ_FORMATTED.is_match(&canonical) {
            push_warning(
                warnings,
                FieldWarning::new(
                    "issuer_tax_id",
                    format!("not a CNPJ: '{}'", record.issuer_tax_id),
                ),
            );
            record.issuer_tax_id.clear();
            return;
        }

        if self.validate_cnpj && !validate_cnpj(&canonical) {
            push_warning(
                warnings,
                FieldWarning::new("issuer_tax_id", format!("check digits do not match for {canonical}")),
            );
        }
        record.issuer_tax_id = canonical;
    }
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize with default settings.
pub fn normalize(
    regex: &PartialRecord,
    llm: Option<&PartialRecord>,
    source_filename: &str,
) -> InvoiceRecord {
    RecordNormalizer::new().normalize(regex, llm, source_filename)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn fix_dates(record: &mut InvoiceRecord, warnings: &mut Vec<FieldWarning>) {
    let issue_date = if record.issue_date.is_empty() {
        None
    } else {
        let parsed = parse_issue_date(&record.issue_date);
        if parsed.is_none() {
            push_warning(
                warnings,
                FieldWarning::new("issue_date", format!("invalid date '{}'", record.issue_date)),
            );
        }
        parsed
    };
    record.issue_date = issue_date.map(format_issue_date).unwrap_or_default();

    if !record.competence.is_empty() {
        match normalize_competence(&record.competence) {
            Some(competence) => {
                record.competence = competence;
                return;
            }
            None => push_warning(
                warnings,
                FieldWarning::new(
                    "competence",
                    format!("invalid competence '{}'", record.competence),
                ),
            ),
        }
    }
    record.competence = issue_date.map(competence_of).unwrap_or_default();
}

fn fix_amounts(record: &mut InvoiceRecord, warnings: &mut Vec<FieldWarning>) {
    for (field, value) in [
        ("gross_value", &mut record.gross_value),
        ("iss_withheld", &mut record.iss_withheld),
    ] {
        if value.is_sign_negative() && !value.is_zero() {
            push_warning(warnings, FieldWarning::new(field, format!("negative amount {value}")));
            *value = Decimal::ZERO;
        }
    }

    if record.iss_withheld > record.gross_value {
        push_warning(
            warnings,
            FieldWarning::new(
                "net_value",
                format!(
                    "ISS withheld {} exceeds service value {}; net clamped to 0",
                    record.iss_withheld, record.gross_value
                ),
            ),
        );
        record.iss_withheld = record.gross_value;
    }

    record.net_value = record.gross_value - record.iss_withheld;
}
