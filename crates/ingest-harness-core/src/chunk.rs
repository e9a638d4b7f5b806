//! Paragraph-boundary text chunker.
//!
//! Splits text into pieces that respect a configurable `max_tokens`
//! limit. Splitting occurs on paragraph boundaries (`\n\n`) to preserve
//! semantic coherence within each chunk.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` paragraph boundaries.
//! 3. Accumulate paragraphs into a buffer until adding the next paragraph
//!    would exceed `max_chars`.
//! 4. When exceeded, flush the buffer as a chunk and start a new one.
//! 5. If a single paragraph exceeds `max_chars`, perform a hard split at
//!    the nearest newline or space boundary (never inside a UTF-8 char).
//! 6. With `overlap_tokens > 0`, every chunk after the first is prefixed
//!    with the tail of its predecessor.
//! 7. Guarantee at least one chunk (even for empty text).
//!
//! # Example
//!
//! ```rust
//! use ingest_harness_core::chunk::split_text;
//!
//! let chunks = split_text("Hello world.\n\nSecond paragraph.", 700, 0);
//! assert_eq!(chunks.len(), 1);
//! ```

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting `max_tokens`.
pub fn split_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);

    if text.is_empty() {
        return vec![String::new()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(std::mem::take(&mut current_buf));
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, remaining.len().min(max_chars));
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                // A single char wider than max_chars still has to make progress.
                let actual_split = if actual_split == 0 {
                    remaining
                        .char_indices()
                        .nth(1)
                        .map(|(i, _)| i)
                        .unwrap_or(remaining.len())
                } else {
                    actual_split
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(current_buf);
    }

    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }

    if overlap_tokens > 0 && chunks.len() > 1 {
        apply_overlap(&mut chunks, overlap_tokens * CHARS_PER_TOKEN);
    }

    chunks
}

fn apply_overlap(chunks: &mut [String], overlap_chars: usize) {
    let originals: Vec<String> = chunks.to_vec();
    for i in 1..chunks.len() {
        let prev = &originals[i - 1];
        let start = prev.len().saturating_sub(overlap_chars);
        let mut start = ceil_char_boundary(prev, start);
        // Start the tail on a word boundary when one is available.
        if let Some(pos) = prev[start..].find(' ') {
            if start > 0 {
                start += pos + 1;
            }
        }
        let tail = prev[start..].trim();
        if !tail.is_empty() {
            chunks[i] = format!("{tail} {}", originals[i]);
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
