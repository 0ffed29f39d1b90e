//! Flat-file persistence of uploaded invoices.
//!
//! Each persisted invoice is a pair of files in one directory: the verbatim
//! PDF and a JSON summary, sharing the stem `{email}_{number}_{YYYYMMDD_HHMMSS}`.

use async_trait::async_trait;
use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::models::invoice::InvoiceRecord;

/// Caller-supplied fields of a persist request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistSubmission {
    pub email: String,
    pub invoice_number: String,
    pub competence: String,
}

/// JSON document written next to each stored PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedInvoice {
    pub email: String,
    pub numero_nota: String,
    pub competencia: String,
    pub prestador: String,
    pub cnpj: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub valor_servicos: Decimal,
    pub data_nota: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub iss_retido: Decimal,
}

impl PersistedInvoice {
    /// Submitted number and competence win over the extracted ones.
    pub fn new(submission: &PersistSubmission, record: &InvoiceRecord) -> Self {
        Self {
            email: submission.email.clone(),
            numero_nota: submission.invoice_number.clone(),
            competencia: submission.competence.clone(),
            prestador: record.issuer_name.clone(),
            cnpj: record.issuer_tax_id.clone(),
            valor_servicos: record.gross_value,
            data_nota: record.issue_date.clone(),
            iss_retido: record.iss_withheld,
        }
    }
}

/// Paths and content of one stored pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedFile {
    pub stem: String,
    pub pdf_path: PathBuf,
    pub json_path: PathBuf,
    pub invoice: PersistedInvoice,
}

impl PersistedFile {
    /// File name of the stored PDF.
    pub fn pdf_filename(&self) -> String {
        format!("{}.pdf", self.stem)
    }
}

/// Destination for extracted records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store the PDF and its summary. Never deduplicates.
    async fn persist(
        &self,
        submission: &PersistSubmission,
        pdf: &[u8],
        record: &InvoiceRecord,
    ) -> Result<PersistedFile, StorageError>;

    /// Every stored summary whose competence contains `competence`.
    async fn search(&self, competence: &str) -> Result<Vec<PersistedInvoice>, StorageError>;
}

/// Pick the record whose number matches `invoice_number`, else the first.
pub fn select_record<'a>(records: &'a [InvoiceRecord], invoice_number: &str) -> Option<&'a InvoiceRecord> {
    let wanted = invoice_number.trim();
    records
        .iter()
        .find(|r| r.invoice_number == wanted)
        .or_else(|| records.first())
}

const MAX_STEM_ATTEMPTS: u32 = 1000;

/// [`RecordSink`] over a local directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the PDF file under the first free stem.
    ///
    /// The file is created exclusively, so concurrent writers never share a
    /// stem. A microsecond suffix breaks same-second collisions.
    async fn claim_stem(&self, submission: &PersistSubmission) -> Result<(String, File), StorageError> {
        let now = Local::now();
        let base = format!(
            "{}_{}_{}",
            sanitize_component(&submission.email),
            sanitize_component(&submission.invoice_number),
            now.format("%Y%m%d_%H%M%S")
        );

        for attempt in 0..MAX_STEM_ATTEMPTS {
            let stem = match attempt {
                0 => base.clone(),
                n => format!("{}_{:06}", base, now.timestamp_subsec_micros() + n),
            };
            if tokio::fs::try_exists(self.dir.join(format!("{stem}.json"))).await? {
                continue;
            }
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(format!("{stem}.pdf")))
                .await
            {
                Ok(file) => return Ok((stem, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {base}"),
        )
        .into())
    }
}

#[async_trait]
impl RecordSink for FileStore {
    async fn persist(
        &self,
        submission: &PersistSubmission,
        pdf: &[u8],
        record: &InvoiceRecord,
    ) -> Result<PersistedFile, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let (stem, mut pdf_file) = self.claim_stem(submission).await?;
        let pdf_path = self.dir.join(format!("{stem}.pdf"));
        let json_path = self.dir.join(format!("{stem}.json"));
        let invoice = PersistedInvoice::new(submission, record);

        pdf_file.write_all(pdf).await?;
        pdf_file.flush().await?;

        let json = serde_json::to_vec_pretty(&invoice)?;
        let mut json_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&json_path)
            .await?;
        json_file.write_all(&json).await?;
        json_file.flush().await?;

        info!("Persisted {} ({} bytes)", pdf_path.display(), pdf.len());
        Ok(PersistedFile {
            stem,
            pdf_path,
            json_path,
            invoice,
        })
    }

    async fn search(&self, competence: &str) -> Result<Vec<PersistedInvoice>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut found = Vec::new();
        for path in paths {
            let content = match tokio::fs::read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_slice::<PersistedInvoice>(&content) {
                Ok(invoice) if invoice.competencia.contains(competence) => found.push(invoice),
                Ok(_) => {}
                Err(e) => warn!("Skipping unparseable {}: {}", path.display(), e),
            }
        }

        debug!("Search for competence {:?}: {} hits", competence, found.len());
        Ok(found)
    }
}

/// Keep characters that are safe in a file name component.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
