//! Reconcile command - compare invoices against a reference spreadsheet.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use glob::glob;
use tracing::{info, warn};

use nfse_core::reconcile::SpreadsheetKind;
use nfse_core::{
    read_reference_rows, Cancellation, ExtractOptions, InvoicePipeline, InvoiceRecord,
    ReconciliationResult, ReconciliationSession,
};

use super::process::build_pipeline;
use super::{display_name, extension_of, load_config};

/// Arguments for the reconcile command.
#[derive(Args)]
pub struct ReconcileArgs {
    /// Invoice PDFs or spreadsheets (paths or glob patterns)
    #[arg(long, required = true, num_args = 1..)]
    invoices: Vec<String>,

    /// Reference spreadsheet (xlsx, xls or csv)
    #[arg(long, required = true)]
    reference: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: ReconcileFormat,

    /// Skip the LLM and use only regex mining for PDFs
    #[arg(long)]
    regex_only: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ReconcileFormat {
    /// Table on stdout
    Text,
    /// JSON array of results
    Json,
}

pub async fn run(args: ReconcileArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let mut paths = Vec::new();
    for pattern in &args.invoices {
        let matched: Vec<PathBuf> = glob(pattern)?.filter_map(|r| r.ok()).collect();
        if matched.is_empty() {
            anyhow::bail!("No matching files found for: {}", pattern);
        }
        paths.extend(matched);
    }

    let mut session = ReconciliationSession::new();
    let mut pipeline: Option<InvoicePipeline> = None;

    for path in &paths {
        let invoices = if extension_of(path) == "pdf" {
            let pipeline = pipeline.get_or_insert_with(|| build_pipeline(&config, args.regex_only));
            extract_pdf(pipeline, &ExtractOptions::from_config(&config), path).await?
        } else if SpreadsheetKind::is_spreadsheet(&display_name(path)) {
            import_spreadsheet(path)?
        } else {
            anyhow::bail!("Unsupported file format: {}", path.display());
        };
        session.add_invoices(invoices);
    }

    let reference = read_reference_rows(&fs::read(&args.reference)?, &display_name(&args.reference))?;
    for warning in &reference.warnings {
        warn!("{}: {}", args.reference.display(), warning);
    }
    session.replace_references(reference.rows);

    let results = session.compare()?;
    info!("Reconciled {} invoice(s)", results.len());

    match args.format {
        ReconcileFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        ReconcileFormat::Text => print_table(&results),
    }

    Ok(())
}

async fn extract_pdf(
    pipeline: &InvoicePipeline,
    options: &ExtractOptions,
    path: &Path,
) -> anyhow::Result<Vec<InvoiceRecord>> {
    let data = fs::read(path)?;
    let records = pipeline
        .process_document(&data, &display_name(path), options, &Cancellation::new())
        .await?;
    Ok(records)
}

fn import_spreadsheet(path: &Path) -> anyhow::Result<Vec<InvoiceRecord>> {
    let name = display_name(path);
    let import = read_reference_rows(&fs::read(path)?, &name)?;
    for warning in &import.warnings {
        warn!("{}: {}", name, warning);
    }
    Ok(import.to_invoices(&name))
}

fn print_table(results: &[ReconciliationResult]) {
    println!(
        "{:<3} {:<20} {:<12} {:>14} {:>14}",
        "", "CNPJ", "NFS-e", "Invoice", "Reference"
    );

    let mut matched = 0;
    for result in results {
        let (mark, reference) = match (&result.reference, result.matched) {
            (Some(row), true) => (style("✓").green(), row.value.to_string()),
            (Some(row), false) => (style("✗").red(), row.value.to_string()),
            (None, _) => (style("-").yellow(), "not found".to_string()),
        };
        if result.matched {
            matched += 1;
        }
        println!(
            "{:<3} {:<20} {:<12} {:>14} {:>14}",
            mark,
            result.invoice.issuer_tax_id,
            result.invoice.invoice_number,
            result.invoice.gross_value.to_string(),
            reference
        );
    }

    println!();
    println!(
        "{} of {} invoice(s) match the reference",
        style(matched).green(),
        results.len()
    );
}
