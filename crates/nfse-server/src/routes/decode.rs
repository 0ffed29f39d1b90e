//! Streaming batch extraction.
//!
//! `POST /decode` runs every uploaded PDF through the pipeline and streams
//! one `{json}\n---\n` chunk per extracted invoice, in input order. Failed
//! documents are logged and left out of the stream.

use std::collections::VecDeque;
use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::Response;
use futures::stream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use nfse_core::{Cancellation, DocumentInput, DocumentOutcome, InvoiceRecord};

use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::UploadForm;

/// Separator written after every record.
pub const RECORD_DELIMITER: &str = "\n---\n";

/// Cancels the batch when the response body is dropped.
struct CancelOnDrop(Cancellation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub async fn decode(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    state.require_extractor()?;

    let form = UploadForm::read(&mut multipart).await?;
    let documents: Vec<DocumentInput> = form
        .files_named("files")
        .into_iter()
        .map(|f| DocumentInput {
            filename: f.filename,
            bytes: f.bytes,
        })
        .collect();

    if documents.is_empty() {
        return Err(ApiError::InputMissing("no files uploaded".to_string()));
    }
    info!("Decoding {} file(s)", documents.len());

    let (tx, rx) = mpsc::channel::<DocumentOutcome>(4);
    let cancel = Cancellation::new();

    let worker_state = state.clone();
    let worker_cancel = cancel.clone();
    tokio::spawn(async move {
        let options = worker_state.extract_options();
        let summary = worker_state
            .pipeline()
            .process_batch(documents, &options, &worker_cancel, tx)
            .await;
        info!(
            "Decode finished: {} processed, {} failed, {} record(s){}",
            summary.processed,
            summary.failed,
            summary.records,
            if summary.stopped { ", stopped early" } else { "" }
        );
    });

    let body = stream::unfold(
        (rx, VecDeque::new(), CancelOnDrop(cancel)),
        |(mut rx, mut pending, guard)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((Ok::<Bytes, Infallible>(chunk), (rx, pending, guard)));
                }
                let outcome = rx.recv().await?;
                match outcome.result {
                    Ok(records) => pending.extend(records.iter().filter_map(record_chunk)),
                    Err(e) => warn!("{}: {}", outcome.filename, e),
                }
            }
        },
    );

    Response::builder()
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::Internal(format!("could not start stream: {e}")))
}

fn record_chunk(record: &InvoiceRecord) -> Option<Bytes> {
    match serde_json::to_vec(record) {
        Ok(mut json) => {
            json.extend_from_slice(RECORD_DELIMITER.as_bytes());
            Some(Bytes::from(json))
        }
        Err(e) => {
            warn!("{}: could not serialize record: {}", record.source_filename, e);
            None
        }
    }
}

/// Split a `/decode` response body back into records.
pub fn split_records(body: &str) -> Vec<&str> {
    body.split(RECORD_DELIMITER)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_chunk_ends_with_delimiter() {
        let record = InvoiceRecord {
            invoice_number: "42".to_string(),
            ..Default::default()
        };
        let chunk = record_chunk(&record).unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        assert!(text.ends_with(RECORD_DELIMITER));
        assert_eq!(split_records(text).len(), 1);
    }

    #[test]
    fn test_split_records() {
        assert_eq!(split_records("{\"a\":1}\n---\n{\"b\":2}\n---\n"), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert!(split_records("").is_empty());
    }
}
