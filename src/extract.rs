//! Document-to-text extraction.
//!
//! Turns a file on disk into the plain UTF-8 text that ingestion chunks.
//! PDFs go through `pdf-extract` page by page, each page introduced by a
//! `--- Page N ---` line; every other extension is read as UTF-8 text. A document that yields no visible characters (a scanned PDF with no
//! text layer, an empty file) is an error rather than an empty string, so
//! callers never mistake it for a successfully ingested empty document.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// How a file's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Classify by extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("pdf") => DocumentKind::Pdf,
            _ => DocumentKind::Text,
        }
    }
}

/// Extraction error. No variant panics; callers decide whether to skip.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("document is not valid UTF-8 text")]
    NotUtf8,

    #[error("document contains no extractable text")]
    NoText,
}

/// Extract text from the file at `path`.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = extract_bytes(&bytes, DocumentKind::from_path(path))?;
    tracing::debug!(path = %path.display(), chars = text.chars().count(), "extracted text");
    Ok(text)
}

/// Extract text from in-memory document bytes.
pub fn extract_bytes(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
    let text = match kind {
        DocumentKind::Pdf => extract_pdf(bytes)?,
        DocumentKind::Text => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8)?,
    };
    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(with_page_markers(&pages))
}

/// Join page texts, each preceded by a `--- Page N ---` line (1-based), so
/// chunks carry the page they came from. Blank input stays blank.
fn with_page_markers(pages: &[String]) -> String {
    if pages.iter().all(|p| p.trim().is_empty()) {
        return String::new();
    }
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        out.push_str(&format!("\n--- Page {} ---\n", i + 1));
        out.push_str(page);
    }
    out
}
