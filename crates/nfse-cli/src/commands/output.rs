//! Record formatting shared by `process` and `batch`.

use nfse_core::invoice::rules::format_brazilian_amount;
use nfse_core::InvoiceRecord;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub const RECORD_COLUMNS: [&str; 9] = [
    "issuer_tax_id",
    "invoice_number",
    "issuer_name",
    "issue_date",
    "competence",
    "gross_value",
    "iss_withheld",
    "net_value",
    "source_filename",
];

pub fn record_row(record: &InvoiceRecord) -> [String; 9] {
    [
        record.issuer_tax_id.clone(),
        record.invoice_number.clone(),
        record.issuer_name.clone(),
        record.issue_date.clone(),
        record.competence.clone(),
        record.gross_value.to_string(),
        record.iss_withheld.to_string(),
        record.net_value.to_string(),
        record.source_filename.clone(),
    ]
}

pub fn format_records(records: &[InvoiceRecord], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Csv => format_csv(records),
        OutputFormat::Text => Ok(format_text(records)),
    }
}

fn format_csv(records: &[InvoiceRecord]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(RECORD_COLUMNS)?;
    for record in records {
        wtr.write_record(record_row(record))?;
    }
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(records: &[InvoiceRecord]) -> String {
    let mut output = String::new();

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        output.push_str(&format!("NFS-e: {}\n", record.invoice_number));
        output.push_str(&format!("Issued: {}\n", record.issue_date));
        output.push_str(&format!("Competence: {}\n", record.competence));
        output.push('\n');

        output.push_str("Issuer:\n");
        output.push_str(&format!("  {}\n", record.issuer_name));
        output.push_str(&format!("  CNPJ: {}\n", record.issuer_tax_id));
        output.push('\n');

        output.push_str("Values:\n");
        output.push_str(&format!("  Services:     R$ {}\n", format_brazilian_amount(record.gross_value)));
        output.push_str(&format!("  ISS withheld: R$ {}\n", format_brazilian_amount(record.iss_withheld)));
        output.push_str(&format!("  Net:          R$ {}\n", format_brazilian_amount(record.net_value)));

        if !record.warnings.is_empty() {
            output.push_str("\nWarnings:\n");
            for warning in &record.warnings {
                output.push_str(&format!("  - {}\n", warning));
            }
        }
    }

    output
}
