//! Turns a retrieval result into the context block handed to the model.

use crate::models::RetrievalResult;

/// Stand-in context when nothing was retrieved, so the prompt can say so.
pub const EMPTY_CONTEXT_MARKER: &str = "NO RELEVANT CONTEXT FOUND";

/// Separator placed between retrieved chunks.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Join retrieved chunks in ranked order, each under a `[n] (page p)` header.
///
/// Chunk text is trimmed for display; an empty result maps to
/// [`EMPTY_CONTEXT_MARKER`], never to an empty string.
pub fn format_context(result: &RetrievalResult) -> String {
    let blocks: Vec<String> = result
        .iter()
        .filter(|sc| !sc.chunk.text.trim().is_empty())
        .enumerate()
        .map(|(i, sc)| {
            format!(
                "[{}] (page {})\n{}",
                i + 1,
                sc.chunk.page_number,
                sc.chunk.text.trim()
            )
        })
        .collect();

    if blocks.is_empty() {
        return EMPTY_CONTEXT_MARKER.to_string();
    }
    blocks.join(CHUNK_SEPARATOR)
}
