//! Core data models that flow through the build and query phases.
//!
//! A [`Document`] is split into [`Chunk`]s, each bound to one embedding
//! inside the vector index. Queries produce a [`RetrievalResult`] and,
//! after generation, an [`Answer`].

use serde::Serialize;

/// A loaded source document: identifier plus ordered pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Path or URI the document was loaded from.
    pub source: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(source: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            source: source.into(),
            pages,
        }
    }

    /// Build a document from raw page texts, numbering pages from 1.
    pub fn from_page_texts<I, S>(source: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page::new(i as u32 + 1, text))
            .collect();
        Self::new(source, pages)
    }
}

/// A single page of text with its 1-based page number.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A bounded substring of a page, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Deterministic UUID (v5) derived from source, page and start offset.
    pub id: String,
    pub source: String,
    pub page_number: u32,
    /// Position of this chunk across the whole document, starting at 0.
    pub chunk_index: usize,
    /// Byte offset of the chunk start within the page text.
    pub start: usize,
    /// Byte offset one past the chunk end within the page text.
    pub end: usize,
    /// Bytes at the start of `text` shared with the previous chunk of the same page.
    pub overlap: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    /// The part of the chunk not already covered by its predecessor.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }
}

/// A chunk paired with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Ranked chunks for one query, most similar first.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Generated text together with the chunks it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: RetrievalResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_numbered_from_one() {
        let doc = Document::from_page_texts("doc.pdf", ["first", "second"]);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.pages[1].number, 2);
        assert_eq!(doc.pages[1].text, "second");
    }
}
