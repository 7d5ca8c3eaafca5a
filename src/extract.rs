//! Per-page text extraction for source documents.
//!
//! Extraction strategies implement [`DocumentExtractor`]. The loader holds
//! an ordered list of them and, for each file, tries every extractor that
//! [`supports`](DocumentExtractor::supports) it until one succeeds.
//!
//! Built-in strategies, in default order:
//! - [`PdfExtractor`] — `pdf-extract`, page-by-page.
//! - [`LopdfExtractor`] — `lopdf` content-stream text, used when the first fails.
//! - [`PlainTextExtractor`] — `.txt` / `.md` files as a single page.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Text of one page as reported by an extractor, before normalization.
///
/// `page` is whatever page indicator the extractor produced; the loader
/// parses it and falls back to 0 when it is missing or not a number.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub text: String,
    pub page: Option<String>,
}

/// Extraction error. Never fatal for a batch; the loader logs and moves on.
#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    Pdf(String),
    Unsupported(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Unsupported(path) => write!(f, "no extractor supports {}", path),
        }
    }
}

impl std::error::Error for ExtractError {}

/// A strategy for turning one file into pages of text.
pub trait DocumentExtractor: Send + Sync {
    /// Short identifier used in log lines.
    fn name(&self) -> &str;
    /// Whether this strategy should be attempted for `path`.
    fn supports(&self, path: &Path) -> bool;
    /// Extract the file's pages in document order.
    fn extract(&self, path: &Path) -> Result<Vec<RawPage>, ExtractError>;
}

/// The default extractor chain: pdf-extract, then lopdf, then plain text.
pub fn default_extractors() -> Vec<Box<dyn DocumentExtractor>> {
    vec![
        Box::new(PdfExtractor),
        Box::new(LopdfExtractor),
        Box::new(PlainTextExtractor),
    ]
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))
}

/// Primary PDF strategy backed by `pdf-extract`.
pub struct PdfExtractor;

impl DocumentExtractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["pdf"])
    }

    fn extract(&self, path: &Path) -> Result<Vec<RawPage>, ExtractError> {
        let bytes = read_bytes(path)?;
        // pdf-extract panics on some malformed inputs
        let pages = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        }))
        .map_err(|_| ExtractError::Pdf("pdf-extract panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| RawPage {
                text,
                page: Some(i.to_string()),
            })
            .collect())
    }
}

/// Fallback PDF strategy backed by `lopdf`.
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["pdf"])
    }

    fn extract(&self, path: &Path) -> Result<Vec<RawPage>, ExtractError> {
        let bytes = read_bytes(path)?;
        let doc = lopdf::Document::load_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            let text = match doc.extract_text(&[*page_number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(page = page_number, error = %e, "lopdf could not read page text");
                    String::new()
                }
            };
            // lopdf numbers pages from 1
            pages.push(RawPage {
                text,
                page: Some(page_number.saturating_sub(1).to_string()),
            });
        }
        Ok(pages)
    }
}

/// Plain text and Markdown, read as one page without a page indicator.
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["txt", "md"])
    }

    fn extract(&self, path: &Path) -> Result<Vec<RawPage>, ExtractError> {
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::Io(e.to_string()))?;
        Ok(vec![RawPage { text, page: None }])
    }
}
