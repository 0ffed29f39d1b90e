//! End-to-end tests for the extraction pipeline with a deterministic
//! extractor and rasterizer.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use nfse_core::error::{LlmError, RasterError};
use nfse_core::llm::{parse_llm_content, LlmInvoice};
use nfse_core::{
    Cancellation, DocumentInput, ExtractOptions, ExtractionInput, FieldExtractor, InvoicePipeline,
    LlmMode, NfseConfig, NfseError, PartialRecord, Rasterizer,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// BT..ET block with one Tj per line starting at `top`, Latin-1 strings.
fn text_operations(lines: &[&[u8]], top: i64) -> Vec<Operation> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Td", vec![50.into(), top.into()]),
    ];
    for line in lines {
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(line.to_vec(), StringFormat::Literal)],
        ));
        operations.push(Operation::new("Td", vec![0.into(), (-20).into()]));
    }
    operations.push(Operation::new("ET", vec![]));
    operations
}

/// Single-page PDF with one Tj per line.
fn pdf_with_lines(lines: &[&[u8]]) -> Vec<u8> {
    pdf_with_form(lines, &[])
}

/// Single-page PDF; `form_lines` are drawn through a form XObject, which
/// only the layout-aware parser follows.
fn pdf_with_form(page_lines: &[&[u8]], form_lines: &[&[u8]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let font_resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };

    let mut operations = text_operations(page_lines, 800);
    let mut resources = font_resources.clone();
    if !form_lines.is_empty() {
        let form = Content {
            operations: text_operations(form_lines, 600),
        };
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => font_resources,
            },
            form.encode().unwrap(),
        ));
        resources.set("XObject", dictionary! { "Fm1" => form_id });
        operations.push(Operation::new("Do", vec!["Fm1".into()]));
    }
    let resources_id = doc.add_object(resources);

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn invoice_pdf() -> Vec<u8> {
    pdf_with_lines(&[
        b"Prefeitura Municipal",
        b"InscMunicipal12.345.678/0001-90",
        b"N\xfamerodaNFS-e 42",
    ])
}

fn partials_from(content: &str) -> Vec<PartialRecord> {
    parse_llm_content(content)
        .unwrap()
        .into_iter()
        .map(LlmInvoice::into_partial)
        .collect()
}

/// Extractor that answers from canned model output and records each call.
struct FakeExtractor {
    text_answer: Vec<PartialRecord>,
    image_answer: Vec<PartialRecord>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeExtractor {
    fn new(text_content: &str) -> Self {
        Self {
            text_answer: partials_from(text_content),
            image_answer: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_image_answer(mut self, content: &str) -> Self {
        self.image_answer = partials_from(content);
        self
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FieldExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn extract(
        &self,
        input: ExtractionInput<'_>,
        _timeout: Duration,
    ) -> Result<Vec<PartialRecord>, LlmError> {
        self.calls.lock().unwrap().push(input.mode_name());
        match input {
            ExtractionInput::Text(_) => Ok(self.text_answer.clone()),
            ExtractionInput::Image(_) if self.image_answer.is_empty() => {
                Err(LlmError::Api("no image answer".to_string()))
            }
            ExtractionInput::Image(_) => Ok(self.image_answer.clone()),
        }
    }
}

/// Extractor that never answers.
struct HangingExtractor;

#[async_trait]
impl FieldExtractor for HangingExtractor {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn extract(
        &self,
        _input: ExtractionInput<'_>,
        _timeout: Duration,
    ) -> Result<Vec<PartialRecord>, LlmError> {
        std::future::pending().await
    }
}

struct FakeRasterizer {
    available: bool,
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn rasterize_first_page(
        &self,
        _pdf: &[u8],
        _dpi: u32,
        _timeout: Duration,
    ) -> Result<Vec<u8>, RasterError> {
        if self.available {
            Ok(b"\x89PNG fake".to_vec())
        } else {
            Err(RasterError::Unavailable("pdftoppm".to_string()))
        }
    }
}

fn pipeline_with(config: &NfseConfig, extractor: Arc<dyn FieldExtractor>) -> InvoicePipeline {
    InvoicePipeline::new(config)
        .with_rasterizer(Arc::new(FakeRasterizer { available: true }))
        .with_extractor(extractor)
}

async fn run_text(pipeline: &InvoicePipeline, text: &str) -> Vec<nfse_core::InvoiceRecord> {
    pipeline
        .process_text(text, "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_regex_happy_path() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let records = run_text(
        &pipeline,
        "Prefeitura\nInscMunicipal12.345.678/0001-90\nNúmerodaNFS-e  42\n",
    )
    .await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
    assert_eq!(records[0].invoice_number, "42");
    assert_eq!(records[0].source_filename, "nota.pdf");
}

#[tokio::test]
async fn test_fragmented_text_is_defragmented_for_regex() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let records = run_text(
        &pipeline,
        "Insc Municipal 12.345.678/0001-90 ... Número da NFS-e 42",
    )
    .await;

    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
    assert_eq!(records[0].invoice_number, "42");
}

#[tokio::test]
async fn test_fenced_llm_answer() {
    let extractor = Arc::new(FakeExtractor::new(
        "```json\n{\"Número da Nota (NF)\": \"7\", \"Valor dos Serviços\": 100.0, \"ISS Retido\": 5.0}\n```",
    ));
    let pipeline = pipeline_with(&NfseConfig::default(), extractor.clone());
    let records = run_text(&pipeline, "texto qualquer da nota").await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].invoice_number, "7");
    assert_eq!(records[0].gross_value, dec("100"));
    assert_eq!(records[0].iss_withheld, dec("5"));
    assert_eq!(records[0].net_value, dec("95"));
    assert_eq!(extractor.calls(), vec!["text"]);
}

#[tokio::test]
async fn test_llm_object_recovered_from_prose() {
    let extractor = Arc::new(FakeExtractor::new(
        "Here you go: {\"Número da Nota (NF)\":\"7\",\"Valor dos Serviços\":10.0} end.",
    ));
    let pipeline = pipeline_with(&NfseConfig::default(), extractor);
    let records = run_text(&pipeline, "texto").await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].invoice_number, "7");
    assert_eq!(records[0].gross_value, dec("10"));
}

#[tokio::test]
async fn test_brazilian_amounts_from_llm() {
    let extractor = Arc::new(FakeExtractor::new(
        r#"[{"Número da Nota (NF)": "1", "Valor dos Serviços": "1.234,56"},
            {"Número da Nota (NF)": "2", "Valor dos Serviços": "1,234.56"}]"#,
    ));
    let pipeline = pipeline_with(&NfseConfig::default(), extractor);
    let records = run_text(&pipeline, "texto").await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].gross_value, dec("1234.56"));
    assert!(records[0].warnings.is_empty());
    assert_eq!(records[1].gross_value, Decimal::ZERO);
    assert!(records[1].warnings.iter().any(|w| w.field == "gross_value"));
}

#[tokio::test]
async fn test_llm_wins_over_regex_for_single_record() {
    let extractor = Arc::new(FakeExtractor::new(
        r#"{"Número da Nota (NF)": "99", "Prestador de Serviços": "ACME LTDA", "Valor dos Serviços": 50}"#,
    ));
    let pipeline = pipeline_with(&NfseConfig::default(), extractor);
    let records = run_text(&pipeline, "InscMunicipal12.345.678/0001-90 NúmerodaNFS-e 42").await;

    assert_eq!(records[0].invoice_number, "99");
    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
    assert_eq!(records[0].issuer_name, "ACME LTDA");
    assert_eq!(records[0].net_value, dec("50"));
}

#[tokio::test]
async fn test_complete_regex_skips_llm_unless_full_fields() {
    let extractor = Arc::new(FakeExtractor::new(r#"{"Prestador de Serviços": "ACME"}"#));
    let pipeline = pipeline_with(&NfseConfig::default(), extractor.clone());
    let text = "InscMunicipal12.345.678/0001-90 NúmerodaNFS-e 42 (-) Desconto Condicionado 1.234,56";

    let records = run_text(&pipeline, text).await;
    assert_eq!(records[0].gross_value, dec("1234.56"));
    assert_eq!(records[0].issuer_name, "");
    assert!(extractor.calls().is_empty());

    let options = ExtractOptions {
        full_fields: true,
        ..ExtractOptions::default()
    };
    let records = pipeline
        .process_text(text, "nota.pdf", &options, &Cancellation::new())
        .await
        .unwrap();
    assert_eq!(records[0].issuer_name, "ACME");
    assert_eq!(records[0].gross_value, dec("1234.56"));
    assert_eq!(extractor.calls(), vec!["text"]);
}

#[tokio::test]
async fn test_pdf_regex_path() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let records = pipeline
        .process_document(&invoice_pdf(), "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
    assert_eq!(records[0].invoice_number, "42");
}

#[tokio::test]
async fn test_pdf_with_spaced_labels() {
    let pdf = pdf_with_lines(&[
        b"Insc Municipal 12.345.678/0001-90",
        b"N\xfamero da NFS-e 42",
    ]);
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let records = pipeline
        .process_document(&pdf, "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
    assert_eq!(records[0].invoice_number, "42");
}

#[tokio::test]
async fn test_glyph_runs_only_fill_missing_identity() {
    let pdf = pdf_with_form(
        &[b"Prefeitura Municipal", b"N\xfamero da NFS-e 42"],
        &[b"InscMunicipal12.345.678/0001-90", b"(-) Desconto Condicionado 1.234,56"],
    );
    let extraction = nfse_core::extract_text(&pdf).unwrap();
    assert!(extraction.primary_text.contains("Desconto Condicionado"));
    assert!(extraction.secondary_text.is_some());
    assert_eq!(extraction.source(), nfse_core::TextSource::Primary);

    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let records = pipeline
        .process_document(&pdf, "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
    assert_eq!(records[0].invoice_number, "42");
    assert_eq!(records[0].gross_value, dec("1234.56"));
    assert_eq!(records[0].net_value, dec("1234.56"));
}

#[tokio::test]
async fn test_garbage_pdf_is_an_error() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let result = pipeline
        .process_document(b"not a pdf", "x.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await;
    assert!(matches!(result, Err(NfseError::Pdf(_))));
}

#[tokio::test]
async fn test_vision_mode_sends_image() {
    let mut config = NfseConfig::default();
    config.llm.mode = LlmMode::Vision;
    let extractor = Arc::new(
        FakeExtractor::new("{}").with_image_answer(r#"{"Número da Nota (NF)": "8", "Valor dos Serviços": 20}"#),
    );
    let pipeline = pipeline_with(&config, extractor.clone());

    let records = pipeline
        .process_document(&invoice_pdf(), "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(extractor.calls(), vec!["vision"]);
    assert_eq!(records[0].invoice_number, "8");
    assert_eq!(records[0].issuer_tax_id, "12.345.678/0001-90");
}

#[tokio::test]
async fn test_auto_mode_sparse_text_goes_to_vision() {
    let extractor = Arc::new(
        FakeExtractor::new("{}").with_image_answer(r#"{"Número da Nota (NF)": "3"}"#),
    );
    let pipeline = pipeline_with(&NfseConfig::default(), extractor.clone());

    let records = pipeline
        .process_document(&pdf_with_lines(&[b"x"]), "scan.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(extractor.calls(), vec!["vision"]);
    assert_eq!(records[0].invoice_number, "3");
}

#[tokio::test]
async fn test_auto_mode_blank_text_answer_retries_with_vision() {
    let extractor = Arc::new(
        FakeExtractor::new("{}").with_image_answer(r#"{"Valor dos Serviços": 77}"#),
    );
    let pipeline = pipeline_with(&NfseConfig::default(), extractor.clone());

    let records = pipeline
        .process_document(&invoice_pdf(), "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(extractor.calls(), vec!["text", "vision"]);
    assert_eq!(records[0].gross_value, dec("77"));
    assert_eq!(records[0].invoice_number, "42");
}

#[tokio::test]
async fn test_vision_fallback_failure_keeps_text_result() {
    let extractor = Arc::new(FakeExtractor::new("{}"));
    let pipeline = InvoicePipeline::new(&NfseConfig::default())
        .with_rasterizer(Arc::new(FakeRasterizer { available: false }))
        .with_extractor(extractor.clone());

    let records = pipeline
        .process_document(&invoice_pdf(), "nota.pdf", &ExtractOptions::default(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(extractor.calls(), vec!["text"]);
    assert_eq!(records[0].invoice_number, "42");
}

#[tokio::test]
async fn test_cancel_interrupts_llm_call() {
    let pipeline = pipeline_with(&NfseConfig::default(), Arc::new(HangingExtractor));
    let cancel = Cancellation::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = pipeline
        .process_text("texto", "nota.pdf", &ExtractOptions::default(), &cancel)
        .await;
    assert!(matches!(result, Err(NfseError::Cancelled)));
}

fn batch() -> Vec<DocumentInput> {
    vec![
        DocumentInput {
            filename: "a.pdf".to_string(),
            bytes: invoice_pdf(),
        },
        DocumentInput {
            filename: "broken.pdf".to_string(),
            bytes: b"garbage".to_vec(),
        },
        DocumentInput {
            filename: "c.pdf".to_string(),
            bytes: invoice_pdf(),
        },
    ]
}

#[tokio::test]
async fn test_batch_reports_each_document_in_order() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let (tx, mut rx) = mpsc::channel(8);

    let summary = pipeline
        .process_batch(batch(), &ExtractOptions::default(), &Cancellation::new(), tx)
        .await;

    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }

    assert_eq!(
        outcomes.iter().map(|o| o.filename.as_str()).collect::<Vec<_>>(),
        vec!["a.pdf", "broken.pdf", "c.pdf"]
    );
    assert_eq!(outcomes.iter().map(|o| o.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_err());
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.records, 2);
    assert!(!summary.stopped);
}

#[tokio::test]
async fn test_batch_stops_when_cancelled() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let cancel = Cancellation::new();
    cancel.cancel();
    let (tx, mut rx) = mpsc::channel(8);

    let summary = pipeline
        .process_batch(batch(), &ExtractOptions::default(), &cancel, tx)
        .await;

    assert!(summary.stopped);
    assert_eq!(summary.processed, 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_batch_stops_when_receiver_dropped() {
    let pipeline = InvoicePipeline::new(&NfseConfig::default());
    let (tx, rx) = mpsc::channel(8);
    drop(rx);

    let summary = pipeline
        .process_batch(batch(), &ExtractOptions::default(), &Cancellation::new(), tx)
        .await;

    assert!(summary.stopped);
    assert_eq!(summary.processed, 1);
}
