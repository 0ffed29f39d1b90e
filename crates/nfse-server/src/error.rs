//! HTTP error mapping.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use nfse_core::error::{LlmError, ReconcileError, SpreadsheetError, StorageError};
use nfse_core::NfseError;

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// A required multipart field or query parameter is absent.
    #[error("{0}")]
    InputMissing(String),

    /// The uploaded file has an extension the endpoint does not accept.
    #[error("{0}")]
    UnsupportedFormat(String),

    /// The request could not be read.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Rows were rejected while importing a spreadsheet.
    #[error("{message}")]
    Import { message: String, details: Vec<String> },

    /// No LLM credential is configured.
    #[error("LLM credential missing (set OPENAI_API_KEY)")]
    CredentialMissing,

    /// The pipeline produced no record for the document.
    #[error("could not extract invoice data from {0}")]
    NothingExtracted(String),

    #[error(transparent)]
    Extraction(NfseError),

    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Anything else the server could not do.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InputMissing(_)
            | ApiError::UnsupportedFormat(_)
            | ApiError::BadRequest(_)
            | ApiError::Import { .. }
            | ApiError::NothingExtracted(_)
            | ApiError::Spreadsheet(_)
            | ApiError::Reconcile(_) => StatusCode::BAD_REQUEST,
            ApiError::CredentialMissing => StatusCode::UNAUTHORIZED,
            ApiError::Extraction(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::Import { details, .. } => Some(Value::from(details.clone())),
            ApiError::Extraction(NfseError::Llm(LlmError::Http { body, .. })) => {
                Some(Value::from(body.clone()))
            }
            ApiError::Extraction(e) => Some(Value::from(e.to_string())),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Extraction(_) => "failed to process invoice".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<NfseError> for ApiError {
    fn from(err: NfseError) -> Self {
        match err {
            NfseError::Llm(LlmError::CredentialMissing) => ApiError::CredentialMissing,
            NfseError::Spreadsheet(e) => ApiError::Spreadsheet(e),
            NfseError::Storage(e) => ApiError::Storage(e),
            NfseError::Reconcile(e) => ApiError::Reconcile(e),
            other => ApiError::Extraction(other),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.message(),
            details: self.details(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfse_core::error::PdfError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::InputMissing("files".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::CredentialMissing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(NfseError::Reconcile(ReconcileError::NoInvoices)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(NfseError::Pdf(PdfError::NoPages)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(NfseError::Llm(LlmError::CredentialMissing)).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_http_error_body_is_attached_verbatim() {
        let err = ApiError::from(NfseError::Llm(LlmError::Http {
            status: 502,
            body: "upstream down".to_string(),
        }));
        assert_eq!(err.details(), Some(Value::from("upstream down")));
    }
}
