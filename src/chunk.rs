//! Paragraph-boundary document chunker.
//!
//! Splits extracted document text into [`Chunk`]s that respect a
//! configurable `max_tokens` budget. Splitting happens on paragraph
//! boundaries (`\n\n`) so each chunk stays semantically coherent; a single
//! paragraph larger than the budget is hard-split at word boundaries.
//!
//! Each chunk gets a fresh UUID and a SHA-256 digest of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks on paragraph boundaries, respecting
/// `max_tokens`. Chunk indices are contiguous starting at 0.
pub fn chunk_document(source_id: &str, collection: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Flush the buffer if appending this paragraph would overflow it.
        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            chunks.push(make_chunk(source_id, collection, index, &buf));
            index += 1;
            buf.clear();
        }

        if trimmed.len() > max_chars {
            // Oversized paragraph: hard-split at word boundaries.
            if !buf.is_empty() {
                chunks.push(make_chunk(source_id, collection, index, &buf));
                index += 1;
                buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = remaining.len().min(max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                chunks.push(make_chunk(
                    source_id,
                    collection,
                    index,
                    remaining[..actual_split].trim(),
                ));
                index += 1;
                remaining = &remaining[actual_split..];
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        chunks.push(make_chunk(source_id, collection, index, &buf));
    }

    chunks
}

fn make_chunk(source_id: &str, collection: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source_id: source_id.to_string(),
        collection: collection.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
