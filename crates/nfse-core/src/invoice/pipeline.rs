//! End-to-end extraction pipeline: PDF bytes to normalized records.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::miner::RegexMiner;
use super::normalizer::RecordNormalizer;
use crate::error::{NfseError, PdfError, Result};
use crate::llm::{ExtractionInput, FieldExtractor, OpenAiExtractor};
use crate::models::config::{LlmMode, NfseConfig};
use crate::models::invoice::{InvoiceRecord, PartialRecord};
use crate::pdf::{create_rasterizer, extract_text, Rasterizer, TextExtraction};

/// Per-invocation overrides.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Ask the LLM even when the regex miner found every deterministic field.
    pub full_fields: bool,
    /// Upper bound for one LLM call.
    pub llm_timeout: Duration,
    /// Upper bound for one rasterization.
    pub render_timeout: Duration,
}

impl ExtractOptions {
    pub fn from_config(config: &NfseConfig) -> Self {
        Self {
            full_fields: config.extraction.full_fields,
            llm_timeout: config.llm.timeout(),
            render_timeout: config.pdf.render_timeout(),
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from_config(&NfseConfig::default())
    }
}

/// Cooperative cancellation shared by a request and its documents.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal every holder of this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so `changed` cannot fail here.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(NfseError::Cancelled),
            result = fut => result,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// One document of a batch.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Result for one document of a batch, emitted as soon as it is known.
#[derive(Debug)]
pub struct DocumentOutcome {
    /// Position in the input list.
    pub index: usize,
    pub filename: String,
    pub result: Result<Vec<InvoiceRecord>>,
}

/// Counters for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
    /// The batch stopped early (cancellation or dropped receiver).
    pub stopped: bool,
}

/// The extraction pipeline.
///
/// Without a [`FieldExtractor`] only regex mining runs.
pub struct InvoicePipeline {
    config: NfseConfig,
    miner: RegexMiner,
    normalizer: RecordNormalizer,
    rasterizer: Arc<dyn Rasterizer>,
    extractor: Option<Arc<dyn FieldExtractor>>,
}

impl InvoicePipeline {
    /// Pipeline without an LLM; rasterizer chosen from configuration.
    pub fn new(config: &NfseConfig) -> Self {
        Self {
            config: config.clone(),
            miner: RegexMiner::new(),
            normalizer: RecordNormalizer::new()
                .with_cnpj_validation(config.extraction.validate_cnpj),
            rasterizer: create_rasterizer(&config.pdf),
            extractor: None,
        }
    }

    /// Pipeline with the OpenAI extractor when a credential is configured.
    pub fn from_config(config: &NfseConfig) -> Self {
        let pipeline = Self::new(config);
        match OpenAiExtractor::new(&config.llm) {
            Ok(extractor) => pipeline.with_extractor(Arc::new(extractor)),
            Err(e) => {
                debug!("LLM extractor disabled: {}", e);
                pipeline
            }
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn config(&self) -> &NfseConfig {
        &self.config
    }

    /// Extract every invoice in one PDF.
    pub async fn process_document(
        &self,
        pdf: &[u8],
        filename: &str,
        options: &ExtractOptions,
        cancel: &Cancellation,
    ) -> Result<Vec<InvoiceRecord>> {
        if cancel.is_cancelled() {
            return Err(NfseError::Cancelled);
        }
        let start = Instant::now();

        let data = pdf.to_vec();
        let text = tokio::task::spawn_blocking(move || extract_text(&data))
            .await
            .map_err(|e| PdfError::Parse(format!("text extraction task failed: {e}")))??;

        debug!(
            "{}: {} pages, {:?} text for the model ({} chars), glyph-run fallback: {}",
            filename,
            text.pages.len(),
            text.source(),
            text.text().len(),
            text.secondary_text.is_some()
        );

        let records = self.run(&text, Some(pdf), filename, options, cancel).await?;

        info!(
            "{}: {} record(s) in {} ms",
            filename,
            records.len(),
            start.elapsed().as_millis()
        );
        Ok(records)
    }

    /// Extract from already-available text. Vision mode is unavailable.
    pub async fn process_text(
        &self,
        text: &str,
        filename: &str,
        options: &ExtractOptions,
        cancel: &Cancellation,
    ) -> Result<Vec<InvoiceRecord>> {
        if cancel.is_cancelled() {
            return Err(NfseError::Cancelled);
        }
        let extraction = TextExtraction::from_text(text);
        self.run(&extraction, None, filename, options, cancel).await
    }

    /// Process documents sequentially, sending each outcome as it completes.
    ///
    /// Per-document failures are reported and the batch continues. The batch
    /// stops on cancellation or when the receiver is dropped.
    pub async fn process_batch(
        &self,
        documents: Vec<DocumentInput>,
        options: &ExtractOptions,
        cancel: &Cancellation,
        tx: mpsc::Sender<DocumentOutcome>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = documents.len();

        for (index, document) in documents.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Batch cancelled after {}/{} documents", index, total);
                summary.stopped = true;
                break;
            }

            let result = self
                .process_document(&document.bytes, &document.filename, options, cancel)
                .await;

            if matches!(result, Err(NfseError::Cancelled)) {
                info!("{}: cancelled", document.filename);
                summary.stopped = true;
                break;
            }

            summary.processed += 1;
            match &result {
                Ok(records) => {
                    summary.succeeded += 1;
                    summary.records += records.len();
                }
                Err(e) => {
                    warn!("{}: {}", document.filename, e);
                    summary.failed += 1;
                }
            }

            let outcome = DocumentOutcome {
                index,
                filename: document.filename,
                result,
            };
            if tx.send(outcome).await.is_err() {
                info!("Batch receiver dropped, stopping");
                summary.stopped = true;
                break;
            }
        }

        summary
    }

    async fn run(
        &self,
        text: &TextExtraction,
        pdf: Option<&[u8]>,
        filename: &str,
        options: &ExtractOptions,
        cancel: &Cancellation,
    ) -> Result<Vec<InvoiceRecord>> {
        let regex = text.mine(&self.miner);
        let (filled, total) = regex.coverage();
        debug!("{}: regex miner filled {}/{} fields", filename, filled, total);

        let needs_llm = options.full_fields || !regex.is_complete();
        let extractor = match (&self.extractor, needs_llm) {
            (Some(extractor), true) => extractor,
            (None, true) => {
                debug!("{}: no LLM configured, using regex fields only", filename);
                return Ok(vec![self.normalizer.normalize(&regex, None, filename)]);
            }
            (_, false) => return Ok(vec![self.normalizer.normalize(&regex, None, filename)]),
        };

        let partials = self
            .call_llm(extractor.as_ref(), text, pdf, filename, options, cancel)
            .await?;

        let records = match partials.as_slice() {
            [single] => vec![self.normalizer.normalize(&regex, Some(single), filename)],
            many => many
                .iter()
                .map(|p| self.normalizer.normalize(&PartialRecord::default(), Some(p), filename))
                .collect(),
        };
        Ok(records)
    }

    async fn call_llm(
        &self,
        extractor: &dyn FieldExtractor,
        text: &TextExtraction,
        pdf: Option<&[u8]>,
        filename: &str,
        options: &ExtractOptions,
        cancel: &Cancellation,
    ) -> Result<Vec<PartialRecord>> {
        let sparse = text.alphanumeric_count() < self.config.pdf.min_text_chars;

        let vision_first = match (self.config.llm.mode, pdf) {
            (_, None) | (LlmMode::Text, _) => false,
            (LlmMode::Vision, Some(_)) => true,
            (LlmMode::Auto, Some(_)) => sparse,
        };

        if let (true, Some(pdf)) = (vision_first, pdf) {
            debug!("{}: using vision mode (sparse text: {})", filename, sparse);
            return self.vision(extractor, pdf, options, cancel).await;
        }

        let partials = cancel
            .guard(async {
                extractor
                    .extract(ExtractionInput::Text(text.text()), options.llm_timeout)
                    .await
                    .map_err(NfseError::from)
            })
            .await?;

        let all_blank = partials.iter().all(PartialRecord::is_blank);
        match (self.config.llm.mode, pdf) {
            (LlmMode::Auto, Some(pdf)) if all_blank => {
                info!("{}: text mode returned nothing usable, retrying with vision", filename);
                match self.vision(extractor, pdf, options, cancel).await {
                    Ok(vision) => Ok(vision),
                    Err(NfseError::Cancelled) => Err(NfseError::Cancelled),
                    Err(e) => {
                        warn!("{}: vision fallback failed: {}", filename, e);
                        Ok(partials)
                    }
                }
            }
            _ => Ok(partials),
        }
    }

    async fn vision(
        &self,
        extractor: &dyn FieldExtractor,
        pdf: &[u8],
        options: &ExtractOptions,
        cancel: &Cancellation,
    ) -> Result<Vec<PartialRecord>> {
        let png = cancel
            .guard(async {
                self.rasterizer
                    .rasterize_first_page(pdf, self.config.pdf.render_dpi, options.render_timeout)
                    .await
                    .map_err(NfseError::from)
            })
            .await?;
        debug!("Rendered page 1 with {} ({} bytes)", self.rasterizer.name(), png.len());

        cancel
            .guard(async {
                extractor
                    .extract(ExtractionInput::Image(&png), options.llm_timeout)
                    .await
                    .map_err(NfseError::from)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellation_resolves() {
        let cancel = Cancellation::new();
        assert!(!cancel.is_cancelled());

        let waiter = cancel.clone();
        cancel.cancel();
        waiter.cancelled().await;
        assert!(waiter.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_short_circuits() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let result: Result<()> = cancel.guard(std::future::pending()).await;
        assert!(matches!(result, Err(NfseError::Cancelled)));
    }

    #[tokio::test]
    async fn test_regex_only_pipeline() {
        let pipeline = InvoicePipeline::new(&NfseConfig::default());
        assert!(!pipeline.has_extractor());

        let text = "InscMunicipal11.222.333/0001-81 NúmerodaNFS-e 42 (-) Desconto Condicionado 1.234,56";
        let records = pipeline
            .process_text(text, "a.txt", &ExtractOptions::default(), &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].invoice_number, "42");
        assert_eq!(records[0].net_value.to_string(), "1234.56");
    }
}
