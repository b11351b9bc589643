//! Fixed-window text chunking with exact overlap.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text is never split inside a
//! code point. Consecutive chunks share exactly `chunk_overlap` characters: dropping the first
//! `chunk_overlap` characters of every chunk after the first and concatenating reproduces the
//! input. A chunk end is moved back to just after a whitespace character when one exists in the
//! back half of the window; otherwise the window is cut hard.

use super::types::ChunkingError;

/// Split `text` into `(index, chunk)` pairs of at most `chunk_size` characters.
///
/// Empty or whitespace-only input yields no chunks. Input no longer than `chunk_size` yields a
/// single chunk equal to the input.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<(usize, String)>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            chunk_size,
            chunk_overlap,
        });
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total <= chunk_size {
        return Ok(vec![(0, text.to_string())]);
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + chunk_size).min(total);
        if hard_end == total {
            chunks.push(text[boundaries[start]..boundaries[total]].to_string());
            break;
        }

        // The next chunk starts `chunk_overlap` before this end, so the end must stay past
        // `start + chunk_overlap` for the window to advance.
        let earliest = (start + chunk_size / 2).max(start + chunk_overlap + 1);
        let end = (earliest..=hard_end)
            .rev()
            .find(|&candidate| chars[candidate - 1].is_whitespace())
            .unwrap_or(hard_end);

        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        start = end - chunk_overlap;
    }

    Ok(chunks.into_iter().enumerate().collect())
}
