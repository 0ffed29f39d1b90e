//! Process command - extract data from a single invoice PDF.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use nfse_core::{Cancellation, ExtractOptions, InvoicePipeline, NfseConfig};

use super::output::{format_records, OutputFormat};
use super::{display_name, extension_of, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Skip the LLM and use only regex mining
    #[arg(long)]
    regex_only: bool,

    /// Only ask the LLM when regex mining left a field empty
    #[arg(long)]
    minimal: bool,

    /// Validate extracted data
    #[arg(long)]
    validate: bool,
}

/// Pipeline for the CLI: regex-only on request or when no credential is set.
pub fn build_pipeline(config: &NfseConfig, regex_only: bool) -> InvoicePipeline {
    if regex_only {
        return InvoicePipeline::new(config);
    }
    let pipeline = InvoicePipeline::from_config(config);
    if !pipeline.has_extractor() {
        warn!("OPENAI_API_KEY is not set, using regex fields only");
    }
    pipeline
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    let extension = extension_of(&args.input);
    if extension != "pdf" {
        anyhow::bail!("Unsupported file format: {}", extension);
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Extracting invoice data...");

    let pipeline = build_pipeline(&config, args.regex_only);
    let mut options = ExtractOptions::from_config(&config);
    if args.minimal {
        options.full_fields = false;
    }

    let data = fs::read(&args.input)?;
    let result = pipeline
        .process_document(&data, &display_name(&args.input), &options, &Cancellation::new())
        .await;
    pb.finish_and_clear();
    let records = result?;

    if args.validate {
        for record in &records {
            let issues = record.validate();
            if !issues.is_empty() {
                eprintln!(
                    "{} NFS-e {}:",
                    style("Validation issues for").yellow(),
                    record.invoice_number
                );
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
            }
        }
    }

    let output = format_records(&records, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}
