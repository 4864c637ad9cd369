//! Sentence-boundary text chunker.
//!
//! Splits extracted document text into overlapping segments that respect a
//! configurable character budget. Sentences are accumulated until the next
//! one would overflow `chunk_size`; the chunk is then closed and the next
//! chunk is seeded with the trailing `overlap` characters of the closed one
//! so context survives the boundary.
//!
//! Known limitation: a single sentence longer than `chunk_size` is emitted
//! as its own oversized chunk rather than truncated — content is never
//! dropped mid-sentence.

use crate::config::ChunkingConfig;

/// Split text into ordered chunks. Blank input yields no chunks; output is
/// capped at `max_chunks`. All sizes are Unicode scalar counts.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();

        if current_len + sentence_len > config.chunk_size && !current.is_empty() {
            let seed = tail_chars(&current, config.overlap).to_string();
            chunks.push(current.trim().to_string());
            if chunks.len() >= config.max_chunks {
                return chunks;
            }
            current = seed;
            current.push(' ');
            current.push_str(sentence);
            current_len = current.chars().count();
        } else {
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(sentence);
            current_len += sentence_len;
        }
    }

    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }

    chunks
}

/// Split on sentence terminators (`.`, `!`, `?`), keeping the terminator
/// with its sentence. Whitespace-only fragments are dropped; a trailing
/// fragment without a terminator is kept.
fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}
