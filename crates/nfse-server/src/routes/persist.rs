//! Persisting uploaded invoices and searching them by competence.

use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use nfse_core::storage::{select_record, PersistSubmission};
use nfse_core::{Cancellation, InvoiceRecord, PersistedInvoice};

use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::UploadForm;

#[derive(Debug, Serialize)]
pub struct PersistResponse {
    pub message: String,
    pub filename: String,
    pub data: PersistedInvoice,
    pub extracted_data: InvoiceRecord,
}

pub async fn persist(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PersistResponse>, ApiError> {
    let form = UploadForm::read(&mut multipart).await?;

    let (Some(email), Some(invoice_number), Some(competence)) = (
        form.text("email"),
        form.text("numeroNota"),
        form.text("competencia"),
    ) else {
        return Err(ApiError::InputMissing(
            "email, numeroNota and competencia are required".to_string(),
        ));
    };
    let submission = PersistSubmission {
        email: email.to_string(),
        invoice_number: invoice_number.to_string(),
        competence: competence.to_string(),
    };

    let file = form
        .file("notaFiscal")
        .ok_or_else(|| ApiError::InputMissing("notaFiscal PDF is required".to_string()))?;
    if !file.is_pdf() {
        return Err(ApiError::UnsupportedFormat("only PDF files are accepted".to_string()));
    }

    state.require_extractor()?;

    let records = state
        .pipeline()
        .process_document(&file.bytes, &file.filename, &state.extract_options(), &Cancellation::new())
        .await?;
    let record = select_record(&records, &submission.invoice_number)
        .cloned()
        .ok_or_else(|| ApiError::NothingExtracted(file.filename.clone()))?;

    let stored = state.store().persist(&submission, &file.bytes, &record).await?;
    info!("Stored {} for {}", stored.pdf_filename(), submission.email);

    Ok(Json(PersistResponse {
        message: "invoice saved".to_string(),
        filename: stored.pdf_filename(),
        data: stored.invoice,
        extracted_data: record,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub competencia: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub notas_fiscais: Vec<PersistedInvoice>,
    pub total: usize,
    pub competencia: String,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let competence = params
        .competencia
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::InputMissing("competencia is required".to_string()))?;

    let found = state.store().search(&competence).await?;
    Ok(Json(SearchResponse {
        total: found.len(),
        notas_fiscais: found,
        competencia: competence,
    }))
}
