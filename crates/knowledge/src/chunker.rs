//! Text chunking with configurable size and overlap.

use crate::types::ChunkCandidate;
use motolaw_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// Chunk text into overlapping segments measured in characters.
///
/// Splits prefer paragraph, then sentence, then word boundaries.
pub fn chunk_text(
    source_id: &str,
    location: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> AppResult<Vec<ChunkCandidate>> {
    let config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Knowledge(format!("Invalid chunk configuration: {}", e)))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<ChunkCandidate> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .enumerate()
        .map(|(position, (offset, chunk))| ChunkCandidate {
            source_id: source_id.to_string(),
            position: position as u32,
            text: chunk.to_string(),
            metadata: serde_json::json!({
                "location": location,
                "offset": offset,
            }),
        })
        .collect();

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_respects_size() {
        let text = "Riders must wear helmets. ".repeat(200);
        let chunks = chunk_text("s1", "rules.txt", &text, 200, 50).unwrap();

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i as u32);
            assert!(chunk.text.chars().count() <= 200);
        }
    }

    #[test]
    fn test_chunk_text_overlaps() {
        let text = "abcdefghij ".repeat(100);
        let chunks = chunk_text("s1", "a.txt", &text, 100, 40).unwrap();

        let first_offset = chunks[0].metadata["offset"].as_u64().unwrap() as usize;
        let second_offset = chunks[1].metadata["offset"].as_u64().unwrap() as usize;
        assert!(second_offset < first_offset + chunks[0].text.len());
    }

    #[test]
    fn test_chunk_text_cjk() {
        let text = "大型重型機車駕駛人應持有相應駕照。".repeat(100);
        let chunks = chunk_text("s1", "rules.txt", &text, 1000, 200).unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
        assert_eq!(chunks[0].metadata["location"], "rules.txt");
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("s1", "a.txt", "", 100, 10).unwrap().is_empty());
        assert!(chunk_text("s1", "a.txt", "   \n ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_larger_than_size_is_error() {
        assert!(chunk_text("s1", "a.txt", "text", 100, 100).is_err());
    }
}
