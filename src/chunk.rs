//! Word-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s by greedy accumulation of
//! whitespace-separated words up to a configurable character limit. A chunk
//! boundary only ever falls on whitespace; a single word longer than the
//! limit becomes a chunk of its own rather than being split mid-word.
//!
//! Indices are dense and zero-based; `token_count` is the whitespace word
//! count of the chunk.

use uuid::Uuid;

use crate::models::Chunk;

/// Split text into word-bounded chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        // +1 for the joining space
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            chunks.push(make_chunk(chunks.len() as i64, &current));
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(make_chunk(chunks.len() as i64, &current));
    }

    chunks
}

fn make_chunk(index: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        chunk_text: text.to_string(),
        token_count: text.split_whitespace().count() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_text, "Hello, world!");
        assert_eq!(chunks[0].token_count, 2);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 1000).is_empty());
        assert!(chunk_text("   \n\t ", 1000).is_empty());
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 50);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_never_splits_mid_word() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let words: Vec<&str> = text.split_whitespace().collect();
        let chunks = chunk_text(text, 12);
        for chunk in &chunks {
            for word in chunk.chunk_text.split_whitespace() {
                assert!(words.contains(&word), "word {:?} was split", word);
            }
        }
    }

    #[test]
    fn test_concatenation_roundtrip() {
        let text = "The quick brown fox jumps over the lazy dog and keeps going for a while longer";
        let chunks = chunk_text(text, 20);
        let rejoined = chunks
            .iter()
            .map(|c| c.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let original: Vec<&str> = text.split_whitespace().collect();
        let roundtrip: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(original, roundtrip);
    }

    #[test]
    fn test_oversized_word_kept_whole() {
        let long_word = "a".repeat(64);
        let text = format!("short {} tail", long_word);
        let chunks = chunk_text(&text, 16);
        assert!(chunks.iter().any(|c| c.chunk_text == long_word));
    }

    #[test]
    fn test_respects_limit_for_normal_words() {
        let text = (0..100).map(|_| "token").collect::<Vec<_>>().join(" ");
        for chunk in chunk_text(&text, 30) {
            assert!(chunk.chunk_text.len() <= 30);
        }
    }
}
