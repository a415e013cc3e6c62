//! Fixed-width overlapping chunking of OCR text.

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 64;

/// A chunk waiting to be embedded and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub page_id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
}

/// Split text into overlapping fixed-size windows, counted in characters so
/// multi-byte input never splits inside a code point. Whitespace-only text
/// produces no chunks. Deterministic: re-chunking the same text yields the
/// same sequence.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        let next = start + chunk_size - overlap;
        if next >= chars.len() {
            break;
        }
        start = next;
    }
    chunks
}

/// Build per-page chunk plans from OCR output `(page_id, document_id, text)`.
pub fn chunk_ocr_results(
    ocr_results: &[(i64, i64, String)],
    chunk_size: usize,
    overlap: usize,
) -> Vec<ChunkPlan> {
    let mut out = Vec::new();
    for (page_id, document_id, full_text) in ocr_results {
        for (idx, text) in chunk_text(full_text, chunk_size, overlap).into_iter().enumerate() {
            out.push(ChunkPlan {
                page_id: *page_id,
                document_id: *document_id,
                chunk_index: idx as i64,
                text,
            });
        }
    }
    tracing::debug!(
        chunks = out.len(),
        pages = ocr_results.len(),
        "Chunked OCR output"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello world", 512, 64), vec!["hello world"]);
    }

    #[test]
    fn empty_and_whitespace_produce_nothing() {
        assert!(chunk_text("", 512, 64).is_empty());
        assert!(chunk_text("   \n\t ", 512, 64).is_empty());
    }

    #[test]
    fn long_text_overlaps_by_configured_amount() {
        let text = "a".repeat(600);
        let chunks = chunk_text(&text, 512, 64);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 512);
        // Second window starts at 448, so it covers the 152 remaining chars
        // plus the 64-char overlap.
        assert_eq!(chunks[1].len(), 152);
    }

    #[test]
    fn chunking_is_idempotent() {
        let text = "the quick brown fox ".repeat(100);
        let first = chunk_text(&text, 512, 64);
        let second = chunk_text(&text, 512, 64);
        assert_eq!(first, second);
    }

    #[test]
    fn multibyte_text_never_panics() {
        let text = "日本語のテキスト。".repeat(200);
        let chunks = chunk_text(&text, 512, 64);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 512));
    }

    #[test]
    fn per_page_indices_restart_at_zero() {
        let ocr = vec![
            (1i64, 9i64, "x".repeat(600)),
            (2i64, 9i64, "short".to_string()),
            (3i64, 9i64, String::new()),
        ];
        let plans = chunk_ocr_results(&ocr, 512, 64);
        let page1: Vec<i64> = plans.iter().filter(|p| p.page_id == 1).map(|p| p.chunk_index).collect();
        let page2: Vec<i64> = plans.iter().filter(|p| p.page_id == 2).map(|p| p.chunk_index).collect();
        assert_eq!(page1, vec![0, 1]);
        assert_eq!(page2, vec![0]);
        assert!(plans.iter().all(|p| p.page_id != 3));
    }
}
