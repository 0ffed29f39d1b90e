//! Batch processing command for multiple invoice PDFs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use nfse_core::{Cancellation, DocumentInput, DocumentOutcome, ExtractOptions, InvoiceRecord};

use super::output::{format_records, record_row, OutputFormat, RECORD_COLUMNS};
use super::process::build_pipeline;
use super::{display_name, extension_of, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern for input PDFs
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Skip the LLM and use only regex mining
    #[arg(long)]
    regex_only: bool,
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    records: Vec<InvoiceRecord>,
    error: Option<String>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| extension_of(p) == "pdf")
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        documents.push(DocumentInput {
            filename: display_name(path),
            bytes: fs::read(path)?,
        });
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let pipeline = build_pipeline(&config, args.regex_only);
    let options = ExtractOptions::from_config(&config);
    let cancel = Cancellation::new();

    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current file");
            on_ctrl_c.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel::<DocumentOutcome>(4);
    let collect = async {
        let mut results = Vec::with_capacity(files.len());
        while let Some(outcome) = rx.recv().await {
            let path = files[outcome.index].clone();
            let result = match outcome.result {
                Ok(records) => FileResult {
                    path,
                    records,
                    error: None,
                },
                Err(e) => FileResult {
                    path,
                    records: Vec::new(),
                    error: Some(e.to_string()),
                },
            };
            pb.inc(1);
            results.push(result);
        }
        results
    };

    let (summary, results) = tokio::join!(
        pipeline.process_batch(documents, &options, &cancel, tx),
        collect
    );

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for result in results.iter().filter(|r| r.error.is_none()) {
            let output_name = result
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("invoice");
            let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

            fs::write(&output_path, format_records(&result.records, args.format)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        summary.processed,
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed, {} invoice(s)",
        style(summary.succeeded).green(),
        style(summary.failed).red(),
        summary.records
    );
    if summary.stopped {
        println!(
            "   {} stopped after {} of {} files",
            style("!").yellow(),
            summary.processed,
            files.len()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["filename", "status"];
    header.extend(RECORD_COLUMNS);
    header.push("error");
    wtr.write_record(&header)?;

    for result in results {
        let filename = display_name(&result.path);

        match &result.error {
            Some(error) => {
                let mut row = vec![filename, "error".to_string()];
                row.extend(RECORD_COLUMNS.iter().map(|_| String::new()));
                row.push(error.clone());
                wtr.write_record(&row)?;
            }
            None => {
                for record in &result.records {
                    let mut row = vec![filename.clone(), "success".to_string()];
                    row.extend(record_row(record));
                    row.push(String::new());
                    wtr.write_record(&row)?;
                }
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
