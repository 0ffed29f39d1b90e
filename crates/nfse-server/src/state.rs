//! Application state management

use std::sync::Arc;

use tokio::sync::RwLock;

use nfse_core::{ExtractOptions, FileStore, InvoicePipeline, NfseConfig, RecordSink, ReconciliationSession};

use crate::error::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: NfseConfig,
    pipeline: InvoicePipeline,
    store: Arc<dyn RecordSink>,
    session: RwLock<ReconciliationSession>,
}

impl AppState {
    /// Build the pipeline and file store described by `config`.
    pub fn new(config: NfseConfig) -> Self {
        let pipeline = InvoicePipeline::from_config(&config);
        let store = Arc::new(FileStore::new(config.server.upload_dir.clone()));
        Self::with_parts(config, pipeline, store)
    }

    /// Assemble state from prebuilt parts.
    pub fn with_parts(config: NfseConfig, pipeline: InvoicePipeline, store: Arc<dyn RecordSink>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pipeline,
                store,
                session: RwLock::new(ReconciliationSession::new()),
            }),
        }
    }

    pub fn config(&self) -> &NfseConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &InvoicePipeline {
        &self.inner.pipeline
    }

    pub fn store(&self) -> &dyn RecordSink {
        self.inner.store.as_ref()
    }

    /// Reconciliation session for this process.
    pub fn session(&self) -> &RwLock<ReconciliationSession> {
        &self.inner.session
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions::from_config(&self.inner.config)
    }

    /// Extraction endpoints refuse to run without an LLM credential.
    pub fn require_extractor(&self) -> Result<(), ApiError> {
        if self.inner.pipeline.has_extractor() {
            Ok(())
        } else {
            Err(ApiError::CredentialMissing)
        }
    }
}
