//! Text extraction with a primary/secondary parser fallback chain.

use tracing::debug;

use super::{primary_page_texts, PdfExtractor, PdfProcessor, Result};
use crate::error::PdfError;
use crate::invoice::miner::RegexMiner;
use crate::invoice::rules::defragment;
use crate::models::invoice::PartialRecord;

/// Which parser produced the text handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// Layout-aware per-page text.
    Primary,
    /// Glyph runs joined by single spaces.
    Secondary,
}

/// Text pulled from one PDF.
///
/// The primary text is always kept. The glyph-run text is only read when the
/// primary text lacks an identity field, and then only fills those fields.
#[derive(Debug, Clone, Default)]
pub struct TextExtraction {
    /// Primary parser output, one entry per page. Empty when it failed.
    pub pages: Vec<String>,
    /// Concatenation of the non-empty primary pages.
    pub primary_text: String,
    /// Glyph-run text, when the fallback parser ran.
    pub secondary_text: Option<String>,
    /// Whitespace-free fallback text. Only fed to the regex miner.
    pub secondary_defragmented: String,
}

impl TextExtraction {
    fn from_pages(pages: Vec<String>) -> Self {
        let primary_text = join_pages(&pages, "\n");
        Self {
            pages,
            primary_text,
            ..Self::default()
        }
    }

    /// Text from another source; it also serves as its own fallback.
    pub fn from_text(text: &str) -> Self {
        Self {
            pages: vec![text.to_string()],
            primary_text: text.to_string(),
            secondary_text: None,
            secondary_defragmented: defragment(text),
        }
    }

    fn with_secondary(mut self, secondary: String) -> Self {
        self.secondary_defragmented = defragment(&secondary);
        self.secondary_text = Some(secondary);
        self
    }

    /// Parser whose text is handed to the model.
    pub fn source(&self) -> TextSource {
        match &self.secondary_text {
            Some(secondary) if !has_alphanumeric(&self.primary_text) && has_alphanumeric(secondary) => {
                TextSource::Secondary
            }
            _ => TextSource::Primary,
        }
    }

    /// Primary text, or the glyph-run text when the primary one is empty.
    pub fn text(&self) -> &str {
        match (self.source(), &self.secondary_text) {
            (TextSource::Secondary, Some(secondary)) => secondary,
            _ => &self.primary_text,
        }
    }

    /// Number of alphanumeric characters in [`Self::text`].
    pub fn alphanumeric_count(&self) -> usize {
        self.text().chars().filter(|c| c.is_alphanumeric()).count()
    }

    /// Mine the canonical fields.
    ///
    /// Identity fields come from [`Self::text`] first, then from the
    /// defragmented fallback text. The service value only comes from
    /// [`Self::text`].
    pub fn mine(&self, miner: &RegexMiner) -> PartialRecord {
        miner.mine(self.text(), &self.secondary_defragmented)
    }

    /// True when the primary text alone holds both identity fields.
    fn primary_is_sufficient(&self) -> bool {
        RegexMiner::new().is_sufficient(&self.primary_text, "")
    }
}

fn join_pages(pages: &[String], separator: &str) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn has_alphanumeric(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Extract text from a PDF.
///
/// The primary parser runs first. When the regex miner cannot find both the
/// issuer CNPJ and the NFS-e number in its output, the secondary glyph-run
/// parser also runs and its text is kept alongside.
/// Fails only when neither parser can open the document.
pub fn extract_text(data: &[u8]) -> Result<TextExtraction> {
    let loaded = PdfExtractor::from_bytes(data);
    let primary_input = match &loaded {
        Ok(extractor) => extractor.raw_data(),
        Err(_) => data,
    };

    let primary = primary_page_texts(primary_input).map(TextExtraction::from_pages);

    match &primary {
        Ok(extraction) if extraction.primary_is_sufficient() => {
            debug!("Primary text parser sufficient ({} chars)", extraction.primary_text.len());
            return primary;
        }
        Ok(extraction) => debug!(
            "Primary text parser insufficient ({} chars), trying glyph runs",
            extraction.primary_text.len()
        ),
        Err(e) => debug!("Primary text parser failed: {}", e),
    }

    let extractor = match loaded {
        Ok(extractor) => extractor,
        Err(secondary_err) => {
            return match primary {
                Ok(extraction) => Ok(extraction),
                Err(PdfError::Parse(primary_err)) if !matches!(secondary_err, PdfError::Encrypted) => {
                    Err(PdfError::Parse(format!(
                        "primary: {primary_err}; secondary: {secondary_err}"
                    )))
                }
                Err(_) => Err(secondary_err),
            };
        }
    };

    let pages: Vec<String> = (1..=extractor.page_count())
        .map(|page| match extractor.extract_glyph_runs(page) {
            Ok(runs) => runs.join(" "),
            Err(e) => {
                debug!("Skipping page {}: {}", page, e);
                String::new()
            }
        })
        .collect();
    let secondary = join_pages(&pages, " ");
    debug!("Glyph-run text: {} chars", secondary.len());

    let extraction = primary.unwrap_or_default().with_secondary(secondary);
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_garbage_is_fatal() {
        assert!(matches!(extract_text(b"%PDF-broken"), Err(PdfError::Parse(_))));
        assert!(extract_text(b"").is_err());
    }

    #[test]
    fn test_primary_pages_are_joined() {
        let extraction = TextExtraction::from_pages(vec![
            "  a b ".to_string(),
            String::new(),
            "c".to_string(),
        ]);
        assert_eq!(extraction.primary_text, "a b\nc");
        assert_eq!(extraction.pages.len(), 3);
        assert_eq!(extraction.source(), TextSource::Primary);
        assert_eq!(extraction.alphanumeric_count(), 3);
        assert!(extraction.secondary_defragmented.is_empty());
    }

    #[test]
    fn test_fallback_fills_only_missing_identity() {
        let extraction = TextExtraction::from_pages(vec![
            "InscMunicipal12.345.678/0001-90\n(-) Desconto Condicionado 1.234,56".to_string(),
        ])
        .with_secondary("Prefeitura N\u{fa}mero da NFS-e 42".to_string());

        assert_eq!(extraction.source(), TextSource::Primary);
        assert!(extraction.text().contains("Desconto"));

        let partial = extraction.mine(&RegexMiner::new());
        assert_eq!(partial.issuer_tax_id.as_deref(), Some("12.345.678/0001-90"));
        assert_eq!(partial.invoice_number.as_deref(), Some("42"));
        assert_eq!(partial.gross_value, Some(Decimal::from_str("1234.56").unwrap()));
    }

    #[test]
    fn test_primary_identity_wins_over_fallback() {
        let extraction = TextExtraction::from_pages(vec!["InscMunicipal12.345.678/0001-90".to_string()])
            .with_secondary("InscMunicipal 45.997.418/0001-53 NúmerodaNFS-e 7".to_string());

        let partial = extraction.mine(&RegexMiner::new());
        assert_eq!(partial.issuer_tax_id.as_deref(), Some("12.345.678/0001-90"));
        assert_eq!(partial.invoice_number.as_deref(), Some("7"));
    }

    #[test]
    fn test_empty_primary_hands_glyph_runs_to_model() {
        let extraction = TextExtraction::default()
            .with_secondary("Insc Municipal 12.345.678/0001-90 Número da NFS-e 42".to_string());

        assert_eq!(extraction.source(), TextSource::Secondary);
        assert!(extraction.text().starts_with("Insc Municipal"));

        let partial = extraction.mine(&RegexMiner::new());
        assert_eq!(partial.issuer_tax_id.as_deref(), Some("12.345.678/0001-90"));
        assert_eq!(partial.invoice_number.as_deref(), Some("42"));
    }

    #[test]
    fn test_from_text_is_its_own_fallback() {
        let extraction = TextExtraction::from_text("Número da NFS-e 42");
        assert_eq!(extraction.secondary_defragmented, "NúmerodaNFS-e42");
        assert_eq!(extraction.text(), "Número da NFS-e 42");
    }
}
