//! Multipart form reading.

use std::collections::HashMap;
use std::path::Path;

use axum::extract::Multipart;

use crate::error::ApiError;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Lowercased extension of the client-supplied file name.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    pub fn is_pdf(&self) -> bool {
        self.extension() == "pdf"
    }
}

/// A fully read multipart form: files plus trimmed text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field.bytes().await?;
                    tracing::debug!("Received file field '{}': {} ({} bytes)", name, filename, bytes.len());
                    form.files.push(UploadedFile {
                        field: name,
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value.trim().to_string());
                }
            }
        }

        Ok(form)
    }

    /// Every file sent under `field`.
    pub fn files_named(&self, field: &str) -> Vec<UploadedFile> {
        self.files.iter().filter(|f| f.field == field).cloned().collect()
    }

    /// First file sent under `field`.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Non-empty text field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
