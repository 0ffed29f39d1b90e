//! Reconciliation session endpoints.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use nfse_core::reconcile::SpreadsheetKind;
use nfse_core::{
    read_reference_rows, Cancellation, InvoiceRecord, ReconciliationResult, ReferenceImport,
    ReferenceRow,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::{UploadForm, UploadedFile};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AddInvoicesResponse {
    /// One invoice extracted from a PDF.
    Pdf { message: String, invoice: InvoiceRecord },
    /// Rows imported from a spreadsheet.
    Spreadsheet {
        invoices: Vec<InvoiceRecord>,
        warnings: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ReferenceResponse {
    pub rows: Vec<ReferenceRow>,
    pub warnings: Vec<String>,
}

/// Read a spreadsheet; an import whose every row was rejected is an error.
fn import_rows(file: &UploadedFile) -> Result<ReferenceImport, ApiError> {
    let import = read_reference_rows(&file.bytes, &file.filename)?;
    if import.rows.is_empty() && !import.warnings.is_empty() {
        return Err(ApiError::Import {
            message: format!("no valid rows in '{}'", file.filename),
            details: import.warnings,
        });
    }
    Ok(import)
}

async fn uploaded_file(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    let form = UploadForm::read(multipart).await?;
    form.file("file")
        .cloned()
        .ok_or_else(|| ApiError::InputMissing("file is required".to_string()))
}

/// `POST /invoices`: add a PDF's invoice or a spreadsheet's rows to the session.
pub async fn add_invoices(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AddInvoicesResponse>, ApiError> {
    let file = uploaded_file(&mut multipart).await?;

    if file.is_pdf() {
        state.require_extractor()?;
        let records = state
            .pipeline()
            .process_document(&file.bytes, &file.filename, &state.extract_options(), &Cancellation::new())
            .await?;
        let invoice = records
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NothingExtracted(file.filename.clone()))?;

        state.session().write().await.add_invoices([invoice.clone()]);
        info!("{}: invoice {} added to session", file.filename, invoice.invoice_number);
        return Ok(Json(AddInvoicesResponse::Pdf {
            message: "invoice processed".to_string(),
            invoice,
        }));
    }

    if !SpreadsheetKind::is_spreadsheet(&file.filename) {
        return Err(ApiError::UnsupportedFormat(format!(
            "unsupported file '{}': expected pdf, xlsx, xls or csv",
            file.filename
        )));
    }

    let import = import_rows(&file)?;
    let mut session = state.session().write().await;
    session.add_invoices(import.to_invoices(&file.filename));
    info!("{}: {} invoice row(s) added to session", file.filename, import.rows.len());

    Ok(Json(AddInvoicesResponse::Spreadsheet {
        invoices: session.invoices().to_vec(),
        warnings: import.warnings,
    }))
}

/// `GET /invoices`: current session invoices.
pub async fn list_invoices(State(state): State<AppState>) -> Json<Vec<InvoiceRecord>> {
    Json(state.session().read().await.invoices().to_vec())
}

/// `POST /reference`: replace the session's reference rows.
pub async fn replace_reference(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ReferenceResponse>, ApiError> {
    let file = uploaded_file(&mut multipart).await?;
    let import = import_rows(&file)?;

    state.session().write().await.replace_references(import.rows.clone());
    info!("{}: {} reference row(s) loaded", file.filename, import.rows.len());

    Ok(Json(ReferenceResponse {
        rows: import.rows,
        warnings: import.warnings,
    }))
}

/// `GET /compare`: reconcile the session.
pub async fn compare(State(state): State<AppState>) -> Result<Json<Vec<ReconciliationResult>>, ApiError> {
    let results = state.session().read().await.compare()?;
    Ok(Json(results))
}
