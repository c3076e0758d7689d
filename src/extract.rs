//! Text extraction for source documents.
//!
//! The knowledge loader hands a path here and gets plain UTF-8 text back.
//! PDF is the primary format; plain text and markdown are accepted as-is.

use std::path::Path;
use thiserror::Error;

/// Extraction failure. Fatal for `load`: an unreadable source document
/// means there is nothing to index.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract plain text from the document at `path`, dispatching on the
/// file extension.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => extract_pdf(path),
        "txt" | "md" => {
            std::fs::read_to_string(path).map_err(|source| ExtractError::Unreadable {
                path: path.display().to_string(),
                source,
            })
        }
        other => Err(ExtractError::UnsupportedFormat(other.to_string())),
    }
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
