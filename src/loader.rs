//! Document loaders: PDF (one page per PDF page) and UTF-8 text.
//!
//! Loaders read from the local filesystem and return page-level text.
//! Failures never panic; they surface as
//! [`RagError::SourceUnavailable`] so the build aborts cleanly.
//!
//! Plain-text files are split into pages on form feeds (`\x0c`), which is
//! how `pdftotext` and similar tools mark page breaks. A file without form
//! feeds is a single page.

use std::path::Path;

use pdf_rag_core::error::RagError;
use pdf_rag_core::models::Document;
use pdf_rag_core::pipeline::DocumentLoader;

pub const FORM_FEED: char = '\x0c';

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed for {path}: {message}")]
    Pdf { path: String, message: String },
    #[error("{path} is not valid UTF-8 text")]
    NotUtf8 { path: String },
    #[error("unsupported document type: {path} (expected .pdf, .txt or .md)")]
    Unsupported { path: String },
}

impl From<LoadError> for RagError {
    fn from(err: LoadError) -> Self {
        RagError::SourceUnavailable(err.to_string())
    }
}

fn read_bytes(path: &str) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_string(),
        source,
    })
}

/// Per-page text extraction with `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl PdfLoader {
    pub fn extract(path: &str, bytes: &[u8]) -> Result<Document, LoadError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
            LoadError::Pdf {
                path: path.to_string(),
                message: e.to_string(),
            }
        })?;
        tracing::debug!(path, pages = pages.len(), "extracted PDF text");
        Ok(Document::from_page_texts(path, pages))
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self, source: &str) -> pdf_rag_core::Result<Document> {
        let bytes = read_bytes(source)?;
        Ok(Self::extract(source, &bytes)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl TextLoader {
    pub fn parse(path: &str, bytes: Vec<u8>) -> Result<Document, LoadError> {
        let text = String::from_utf8(bytes).map_err(|_| LoadError::NotUtf8 {
            path: path.to_string(),
        })?;
        Ok(Document::from_page_texts(path, text.split(FORM_FEED)))
    }
}

impl DocumentLoader for TextLoader {
    fn load(&self, source: &str) -> pdf_rag_core::Result<Document> {
        let bytes = read_bytes(source)?;
        Ok(Self::parse(source, bytes)?)
    }
}

/// Picks [`PdfLoader`] or [`TextLoader`] from the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl DocumentLoader for FileLoader {
    fn load(&self, source: &str) -> pdf_rag_core::Result<Document> {
        let ext = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => PdfLoader.load(source),
            Some("txt") | Some("md") | Some("text") => TextLoader.load(source),
            _ => Err(LoadError::Unsupported {
                path: source.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_pages_split_on_form_feed() {
        let doc = TextLoader::parse("notes.txt", b"first page\x0csecond page".to_vec()).unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.pages[1].text, "second page");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = TextLoader::parse("bad.txt", vec![0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, LoadError::NotUtf8 { .. }));
    }

    #[test]
    fn test_garbage_pdf_is_source_unavailable() {
        let err: RagError = PdfLoader::extract("broken.pdf", b"not a pdf").unwrap_err().into();
        assert!(matches!(err, RagError::SourceUnavailable(_)));
    }

    #[test]
    fn test_missing_file_and_unknown_extension() {
        assert!(matches!(
            FileLoader.load("/definitely/not/here.pdf"),
            Err(RagError::SourceUnavailable(_))
        ));
        let err = FileLoader.load("slides.pptx").unwrap_err();
        assert!(err.to_string().contains("unsupported document type"));
    }
}
