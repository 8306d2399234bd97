//! Overlapping, boundary-aware text chunker.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters, each
//! sharing up to `chunk_overlap` characters with its predecessor so that
//! context spanning a cut is not lost at retrieval time.
//!
//! # Algorithm
//!
//! 1. Take a window of `chunk_size` characters from the current start.
//! 2. If the window does not reach the end of the page, cut it at the last
//!    paragraph break (`\n\n`), else line break, else space inside the
//!    window, as long as the resulting chunk stays longer than the overlap.
//!    Otherwise cut hard at `chunk_size` characters.
//! 3. Start the next window `chunk_overlap` characters before the cut,
//!    moved forward to the start of a word when the overlap holds whitespace.
//!
//! Because every chunk is longer than the overlap, each step makes forward
//! progress. Nothing is trimmed: dropping the leading [`Chunk::overlap`] bytes
//! of every chunk after the first and concatenating reconstructs the page exactly.
//!
//! # Example
//!
//! ```rust
//! use pdf_rag_core::chunk::{ChunkConfig, Chunker};
//! use pdf_rag_core::models::Page;
//!
//! let chunker = Chunker::new(ChunkConfig::new(1000, 150).unwrap());
//! let page = Page::new(1, "Hello world.\n\nSecond paragraph.");
//! let chunks: Vec<_> = chunker.split("doc.pdf", &page).collect();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, page.text);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, Page};

/// Separators tried, in order, when looking for a soft cut.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Validated chunking parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkConfig {
    pub const DEFAULT_SIZE: usize = 1000;
    pub const DEFAULT_OVERLAP: usize = 150;

    /// Rejects a zero size and any overlap that would not leave room to advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_SIZE,
            chunk_overlap: Self::DEFAULT_OVERLAP,
        }
    }
}

/// Splits pages into chunks according to a [`ChunkConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Lazily split one page. Each call returns a fresh iterator, and the
    /// iterator itself is `Clone`, so the sequence can be restarted freely.
    pub fn split<'a>(&self, source: &'a str, page: &'a Page) -> PageChunks<'a> {
        PageChunks::new(source, page, self.config, 0)
    }

    /// Split every page of a document, numbering chunks contiguously from 0.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in &doc.pages {
            let first_index = chunks.len();
            chunks.extend(PageChunks::new(&doc.source, page, self.config, first_index));
        }
        chunks
    }
}

/// Chunk every page of `doc` with `config`.
pub fn chunk_document(doc: &Document, config: &ChunkConfig) -> Vec<Chunk> {
    Chunker::new(*config).split_document(doc)
}

/// Iterator over the chunks of a single page.
#[derive(Debug, Clone)]
pub struct PageChunks<'a> {
    source: &'a str,
    page_number: u32,
    text: &'a str,
    size: usize,
    overlap: usize,
    next_start: Option<usize>,
    pending_overlap: usize,
    next_index: usize,
}

impl<'a> PageChunks<'a> {
    fn new(source: &'a str, page: &'a Page, config: ChunkConfig, first_index: usize) -> Self {
        let next_start = if page.text.is_empty() { None } else { Some(0) };
        Self {
            source,
            page_number: page.number,
            text: &page.text,
            size: config.chunk_size,
            overlap: config.chunk_overlap,
            next_start,
            pending_overlap: 0,
            next_index: first_index,
        }
    }

    /// Byte offset of the cut for a window starting at `start`.
    fn cut(&self, start: usize) -> usize {
        let rest = &self.text[start..];
        let hard_end = match rest.char_indices().nth(self.size) {
            Some((i, _)) => start + i,
            None => return self.text.len(),
        };

        let window = &self.text[start..hard_end];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let cut = start + pos + sep.len();
                if self.text[start..cut].chars().count() > self.overlap {
                    return cut;
                }
            }
        }
        hard_end
    }

    /// Start of the next window, `overlap` characters back from `end`.
    fn next_window_start(&self, start: usize, end: usize) -> usize {
        if self.overlap == 0 {
            return end;
        }
        let back = self.text[start..end]
            .char_indices()
            .rev()
            .nth(self.overlap - 1)
            .map(|(i, _)| start + i)
            .unwrap_or(end);

        let word_start = self.text[back..end]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| back + i + c.len_utf8());

        match word_start {
            Some(s) if s < end => s,
            _ => back,
        }
    }
}

impl<'a> Iterator for PageChunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_start?;
        let end = self.cut(start);
        let overlap = self.pending_overlap;

        if end >= self.text.len() {
            self.next_start = None;
        } else {
            let next = self.next_window_start(start, end);
            self.pending_overlap = end - next;
            self.next_start = Some(next);
        }

        let chunk = make_chunk(
            self.source,
            self.page_number,
            self.next_index,
            start,
            end,
            overlap,
            &self.text[start..end],
        );
        self.next_index += 1;
        Some(chunk)
    }
}

impl std::iter::FusedIterator for PageChunks<'_> {}

/// Create a single [`Chunk`] with a deterministic id and SHA-256 content hash.
fn make_chunk(
    source: &str,
    page_number: u32,
    index: usize,
    start: usize,
    end: usize,
    overlap: usize,
    text: &str,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{}#page={}&offset={}", source, page_number, start);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string();

    Chunk {
        id,
        source: source.to_string(),
        page_number,
        chunk_index: index,
        start,
        end,
        overlap,
        text: text.to_string(),
        hash,
    }
}
