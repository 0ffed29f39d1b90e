//! Lenient parsing of the model's JSON answer.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::invoice::rules::{decimal_from_f64, parse_amount_lenient};
use crate::models::invoice::PartialRecord;

/// One invoice as returned by the model.
///
/// Values are kept as raw JSON so that numbers sent as strings (or
/// identifiers sent as numbers) can still be used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmInvoice {
    pub issuer_name: Value,
    pub issuer_tax_id: Value,
    pub invoice_number: Value,
    pub gross_value: Value,
    pub net_value: Value,
    pub issue_date: Value,
    pub competence: Value,
    pub iss_withheld: Value,
}

/// Accepted keys per field, prompt key first.
const ISSUER_NAME_KEYS: &[&str] = &["Prestador de Serviços", "issuer_name"];
const ISSUER_TAX_ID_KEYS: &[&str] = &["CNPJ (NF)", "issuer_tax_id", "cnpj"];
const INVOICE_NUMBER_KEYS: &[&str] = &["Número da Nota (NF)", "invoice_number"];
const GROSS_VALUE_KEYS: &[&str] = &["Valor dos Serviços", "gross_value"];
const NET_VALUE_KEYS: &[&str] = &["Valor Líquido da Nota Fiscal", "net_value"];
const ISSUE_DATE_KEYS: &[&str] = &["Data da Nota Fiscal", "issue_date"];
const COMPETENCE_KEYS: &[&str] = &["Competência da Nota Fiscal", "competence"];
const ISS_WITHHELD_KEYS: &[&str] = &["ISS Retido", "iss_withheld"];

impl LlmInvoice {
    /// Read an invoice from one JSON object. Unknown keys are ignored; when
    /// several spellings of a field are present the first non-null one in
    /// key order wins.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let pick = |keys: &[&str]| -> Value {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .find(|value| !value.is_null())
                .cloned()
                .unwrap_or(Value::Null)
        };

        Self {
            issuer_name: pick(ISSUER_NAME_KEYS),
            issuer_tax_id: pick(ISSUER_TAX_ID_KEYS),
            invoice_number: pick(INVOICE_NUMBER_KEYS),
            gross_value: pick(GROSS_VALUE_KEYS),
            net_value: pick(NET_VALUE_KEYS),
            issue_date: pick(ISSUE_DATE_KEYS),
            competence: pick(COMPETENCE_KEYS),
            iss_withheld: pick(ISS_WITHHELD_KEYS),
        }
    }

    /// Convert into a partial record, attaching warnings for unusable values.
    ///
    /// The model's net value is ignored; net is always derived.
    pub fn into_partial(self) -> PartialRecord {
        let mut partial = PartialRecord::default();

        partial.issuer_name = text_field(&mut partial, "issuer_name", self.issuer_name);
        partial.issuer_tax_id = text_field(&mut partial, "issuer_tax_id", self.issuer_tax_id);
        partial.invoice_number = text_field(&mut partial, "invoice_number", self.invoice_number);
        partial.issue_date = text_field(&mut partial, "issue_date", self.issue_date);
        partial.competence = text_field(&mut partial, "competence", self.competence);
        partial.gross_value = amount_field(&mut partial, "gross_value", self.gross_value);
        partial.iss_withheld = amount_field(&mut partial, "iss_withheld", self.iss_withheld);

        partial
    }
}

fn text_field(partial: &mut PartialRecord, field: &str, value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        other => {
            partial.warn(field, format!("expected text, got {other}"));
            None
        }
    }
}

fn amount_field(partial: &mut PartialRecord, field: &str, value: Value) -> Option<Decimal> {
    let parsed = match &value {
        Value::Null => return None,
        Value::String(s) if s.trim().is_empty() => return None,
        Value::Number(n) => n.as_f64().and_then(decimal_from_f64),
        Value::String(s) => parse_amount_lenient(s),
        _ => None,
    };

    if parsed.is_none() {
        partial.warn(field, format!("unparseable amount {value}"));
    }
    parsed
}

/// Remove surrounding whitespace and optional triple-backtick fences.
pub fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Longest slice from the first `{` to the last `}`.
fn object_substring(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Parse the model content into one or more invoices.
///
/// Arrays and objects are accepted after fence stripping; a single object
/// is wrapped into a one-element list and array entries that are not
/// objects are dropped. When parsing fails, the outermost `{...}` substring
/// is retried. An array without objects yields one blank invoice.
pub fn parse_llm_content(content: &str) -> Result<Vec<LlmInvoice>, LlmError> {
    let cleaned = strip_fences(content);
    let parse_error = |reason: String| LlmError::Parse {
        reason,
        content: content.to_string(),
    };

    if cleaned.starts_with('[') {
        let items: Vec<Value> =
            serde_json::from_str(cleaned).map_err(|e| parse_error(e.to_string()))?;
        let invoices: Vec<LlmInvoice> = items
            .iter()
            .filter_map(Value::as_object)
            .map(LlmInvoice::from_object)
            .collect();
        if invoices.is_empty() {
            return Ok(vec![LlmInvoice::default()]);
        }
        return Ok(invoices);
    }

    if cleaned.starts_with('{') {
        if let Ok(object) = serde_json::from_str::<Map<String, Value>>(cleaned) {
            return Ok(vec![LlmInvoice::from_object(&object)]);
        }
    }

    let substring = object_substring(cleaned)
        .ok_or_else(|| parse_error("response is neither a JSON object nor an array".to_string()))?;
    serde_json::from_str::<Map<String, Value>>(substring)
        .map(|object| vec![LlmInvoice::from_object(&object)])
        .map_err(|e| parse_error(e.to_string()))
}
