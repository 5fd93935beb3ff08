//! Deterministic structure-aware chunker (§4.4). Splits parsed elements into
//! fixed-size, overlapping chunks with a stable id and content hash.

use crate::error::ChunkError;
use crate::parser::{ParsedDocument, ParsedElement};
use kb_core::entities::{chunk_id, content_hash, Chunk, Locator, Modality};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_chars: 800, overlap: 80 }
    }
}

#[derive(Clone, Copy, Default)]
struct PieceLocator {
    page: Option<i64>,
    time_range: Option<(f64, f64)>,
    bbox: Option<[f64; 4]>,
}

struct Piece {
    text: String,
    locator: PieceLocator,
}

pub fn chunk_document(
    doc: &ParsedDocument,
    document_id: i64,
    space_code: &str,
    index_version: i64,
    config: &ChunkerConfig,
) -> Result<Vec<Chunk>, ChunkError> {
    let modality = match doc.source_modality.as_str() {
        "image" => Modality::Image,
        "audio" => Modality::Audio,
        _ => Modality::Text,
    };

    let pieces = build_pieces(&doc.elements, config.max_chars);
    if pieces.is_empty() {
        return Err(ChunkError::Empty);
    }

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut buf_parts: Vec<String> = Vec::new();
    let mut buf_locators: Vec<PieceLocator> = Vec::new();
    let mut buf_start_char: Option<usize> = None;
    let mut global_char = 0usize;

    for piece in &pieces {
        if buf_start_char.is_none() {
            buf_start_char = Some(global_char);
        }

        let piece_len = char_len(&piece.text);
        let projected_len = if buf_parts.is_empty() { piece_len } else { buffer_len(&buf_parts) + 1 + piece_len };
        if projected_len > config.max_chars && !buf_parts.is_empty() {
            flush_chunk(
                &mut chunks, &mut buf_parts, &mut buf_locators, &mut buf_start_char, &mut chunk_index,
                document_id, space_code, index_version, modality, config.overlap,
            );
            if buf_start_char.is_none() {
                buf_start_char = Some(global_char);
            }
        }

        buf_parts.push(piece.text.clone());
        buf_locators.push(piece.locator);
        global_char += piece_len + 1;
    }

    if !buf_parts.is_empty() {
        flush_chunk(
            &mut chunks, &mut buf_parts, &mut buf_locators, &mut buf_start_char, &mut chunk_index,
            document_id, space_code, index_version, modality, config.overlap,
        );
    }

    Ok(chunks)
}

/// Splits elements into `max_chars`-sized pieces, hard-splitting any single
/// element that exceeds the limit. Each piece keeps its source element's
/// page/time/bbox so `flush_chunk` can merge them once several pieces are
/// packed into one chunk.
fn build_pieces(elements: &[ParsedElement], max_chars: usize) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for el in elements {
        let text = el.text.trim();
        if text.is_empty() {
            continue;
        }
        let locator = PieceLocator { page: el.page, time_range: el.time_range, bbox: el.bbox };
        let chars: Vec<&str> = text.graphemes(true).collect();
        let mut start = 0usize;
        while start < chars.len() {
            let end = (start + max_chars).min(chars.len());
            pieces.push(Piece { text: chars[start..end].concat(), locator });
            start = end;
        }
    }
    pieces
}

/// Joins the buffered pieces, merges their locators, and emits a chunk; the
/// buffer is then reset to the overlap tail of the flushed content (carrying
/// only the last piece's locator forward, matching a single contributing
/// element for that carried-over text).
#[allow(clippy::too_many_arguments)]
fn flush_chunk(
    chunks: &mut Vec<Chunk>,
    buf_parts: &mut Vec<String>,
    buf_locators: &mut Vec<PieceLocator>,
    buf_start_char: &mut Option<usize>,
    chunk_index: &mut i64,
    document_id: i64,
    space_code: &str,
    index_version: i64,
    modality: Modality,
    overlap: usize,
) {
    let content = buf_parts.join("\n");
    let char_start = buf_start_char.unwrap_or(0);
    let char_end = char_start + char_len(&content);
    let locator = merge_locator(buf_locators, char_start, char_end);

    chunks.push(Chunk {
        chunk_id: chunk_id(document_id, index_version, *chunk_index),
        document_id,
        space_code: space_code.to_string(),
        index_version,
        chunk_index: *chunk_index,
        modality,
        content_hash: content_hash(&content),
        token_count: approximate_token_count(&content),
        locator,
        content: content.clone(),
    });
    *chunk_index += 1;

    if overlap > 0 && char_len(&content) > overlap {
        let tail = tail_chars(&content, overlap);
        let last_locator = buf_locators.last().copied().unwrap_or_default();
        *buf_parts = vec![tail];
        *buf_locators = vec![last_locator];
        *buf_start_char = Some(char_end - overlap);
    } else {
        buf_parts.clear();
        buf_locators.clear();
        *buf_start_char = None;
    }
}

/// Unions pages, takes the min/max of time ranges, and concatenates bboxes
/// (capped at 50) across every piece folded into one chunk (§4.4).
fn merge_locator(locators: &[PieceLocator], char_start: usize, char_end: usize) -> Locator {
    let mut pages: Vec<i64> = locators.iter().filter_map(|l| l.page).collect();
    pages.sort_unstable();
    pages.dedup();

    let starts: Vec<f64> = locators.iter().filter_map(|l| l.time_range.map(|(s, _)| s)).collect();
    let ends: Vec<f64> = locators.iter().filter_map(|l| l.time_range.map(|(_, e)| e)).collect();
    let time_range = if starts.is_empty() || ends.is_empty() {
        None
    } else {
        Some((starts.into_iter().fold(f64::INFINITY, f64::min), ends.into_iter().fold(f64::NEG_INFINITY, f64::max)))
    };

    let bboxes: Vec<[f64; 4]> = locators.iter().filter_map(|l| l.bbox).take(50).collect();

    Locator { pages, time_range, bboxes, char_start, char_end }
}

fn char_len(s: &str) -> usize {
    s.graphemes(true).count()
}

fn buffer_len(parts: &[String]) -> usize {
    let sum: usize = parts.iter().map(|p| char_len(p)).sum();
    sum + parts.len().saturating_sub(1)
}

fn tail_chars(text: &str, n: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    let start = graphemes.len().saturating_sub(n);
    graphemes[start..].concat()
}

/// Approximates token count: CJK characters count 1 each, contiguous ASCII
/// alphanumeric runs count 1 each, everything else is divided by 4 (§4.4).
fn approximate_token_count(text: &str) -> i64 {
    let mut count = 0.0f64;
    let mut ascii_run = 0usize;
    let mut other_run = 0usize;

    let flush_ascii = |run: &mut usize, count: &mut f64| {
        if *run > 0 {
            *count += 1.0;
            *run = 0;
        }
    };
    let flush_other = |run: &mut usize, count: &mut f64| {
        if *run > 0 {
            *count += *run as f64 / 4.0;
            *run = 0;
        }
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush_ascii(&mut ascii_run, &mut count);
            flush_other(&mut other_run, &mut count);
            count += 1.0;
        } else if c.is_ascii_alphanumeric() {
            flush_other(&mut other_run, &mut count);
            ascii_run += 1;
        } else if c.is_whitespace() {
            flush_ascii(&mut ascii_run, &mut count);
            flush_other(&mut other_run, &mut count);
        } else {
            flush_ascii(&mut ascii_run, &mut count);
            other_run += 1;
        }
    }
    flush_ascii(&mut ascii_run, &mut count);
    flush_other(&mut other_run, &mut count);
    count.ceil() as i64
}

fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp)
        || (0x3040..=0x30FF).contains(&cp)
        || (0xAC00..=0xD7A3).contains(&cp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedElement;

    fn doc_from(text: &str) -> ParsedDocument {
        ParsedDocument {
            elements: vec![ParsedElement { text: text.to_string(), ..Default::default() }],
            text: text.to_string(),
            source_modality: "text".to_string(),
        }
    }

    #[test]
    fn yields_dense_zero_based_chunk_indices() {
        let doc = doc_from(&"a".repeat(2000));
        let chunks = chunk_document(&doc, 1, "default", 1, &ChunkerConfig::default()).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn chunk_ids_are_deterministic_and_content_hash_matches() {
        let doc = doc_from("Hello world.\n\nSecond paragraph.");
        let chunks = chunk_document(&doc, 7, "default", 1, &ChunkerConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, kb_core::entities::chunk_id(7, 1, 0));
        assert_eq!(chunks[0].content_hash, kb_core::entities::content_hash(&chunks[0].content));
    }

    #[test]
    fn empty_document_errors() {
        let doc = doc_from("");
        let result = chunk_document(&doc, 1, "default", 1, &ChunkerConfig::default());
        assert!(matches!(result, Err(ChunkError::Empty)));
    }

    #[test]
    fn overlap_copies_tail_of_previous_chunk() {
        let config = ChunkerConfig { max_chars: 10, overlap: 3 };
        let doc = doc_from(&"0123456789".repeat(3));
        let chunks = chunk_document(&doc, 1, "default", 1, &config).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks[1].content.starts_with("789"));
    }

    #[test]
    fn token_count_treats_cjk_as_one_token_each() {
        assert_eq!(approximate_token_count("你好"), 2);
        assert_eq!(approximate_token_count("hello"), 1);
    }
}
