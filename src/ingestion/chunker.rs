/// Separator priority for the recursive splitter (spec.md §4.6 step 4):
/// try to break on paragraph boundaries first, falling back to smaller and
/// smaller units, and finally hard-splitting on character count when no
/// separator helps at all.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// One ordered piece of a document's text, not yet embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub chunk_index: usize,
    pub text: String,
}

/// Splits `text` into chunks of at most `chunk_size` characters, with
/// `chunk_overlap` characters of context carried over between consecutive
/// chunks, recursing through [`SEPARATORS`] so splits prefer natural
/// boundaries over mid-word cuts.
///
/// Returns chunks in document order, each tagged with its `chunk_index`.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    assert!(chunk_overlap < chunk_size, "chunk_overlap must be smaller than chunk_size");

    let pieces = recursive_split(text, chunk_size, 0);
    let merged = merge_with_overlap(&pieces, chunk_size, chunk_overlap);

    merged
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| TextChunk { chunk_index, text })
        .collect()
}

/// Recursively breaks `text` on the highest-priority separator that
/// actually shortens every resulting piece below `chunk_size`, falling
/// through to the next separator (and ultimately a hard character split)
/// when a separator can't make progress.
fn recursive_split(text: &str, chunk_size: usize, separator_idx: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    if separator_idx >= SEPARATORS.len() {
        return hard_split(text, chunk_size);
    }

    let separator = SEPARATORS[separator_idx];
    if separator.is_empty() {
        return hard_split(text, chunk_size);
    }

    let parts: Vec<&str> = text.split(separator).collect();
    if parts.len() <= 1 {
        return recursive_split(text, chunk_size, separator_idx + 1);
    }

    let mut result = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if part.chars().count() > chunk_size {
            result.extend(recursive_split(part, chunk_size, separator_idx + 1));
        } else {
            result.push((*part).to_string());
        }
        let _ = i;
    }

    if result.is_empty() {
        vec![text.to_string()]
    } else {
        result
    }
}

fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<char>>()
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

/// Greedily packs the recursively-split pieces back up to `chunk_size`,
/// carrying the last `chunk_overlap` characters of each finished chunk
/// into the next one so retrieval never loses context at a chunk seam.
fn merge_with_overlap(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let separator = if current.is_empty() { "" } else { " " };
        let candidate_len = current.chars().count() + separator.chars().count() + piece.chars().count();

        if !current.is_empty() && candidate_len > chunk_size {
            chunks.push(current.clone());
            current = overlap_tail(&current, chunk_overlap);
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(piece);
        } else {
            current.push_str(separator);
            current.push_str(piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn overlap_tail(text: &str, chunk_overlap: usize) -> String {
    if chunk_overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(chunk_overlap);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split("a short sentence.", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "a short sentence.");
    }

    #[test]
    fn splits_on_paragraph_boundaries_first() {
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(50), "b".repeat(50), "c".repeat(50));
        let chunks = split(&text, 60, 0);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 60));
    }

    #[test]
    fn chunk_indices_are_ordered_from_zero() {
        let text = "x".repeat(5000);
        let chunks = split(&text, 1000, 200);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap_text() {
        let text = "word ".repeat(500);
        let chunks = split(&text, 200, 50);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let overlap = overlap_tail(&pair[0].text, 50);
            let overlap = overlap.trim();
            assert!(!overlap.is_empty());
            assert!(pair[1].text.contains(overlap));
        }
    }

    #[test]
    fn falls_back_to_hard_split_with_no_separators() {
        let text = "x".repeat(2500);
        let chunks = split(&text, 1000, 0);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
    }

    #[test]
    #[should_panic(expected = "chunk_overlap must be smaller")]
    fn rejects_overlap_larger_than_chunk_size() {
        split("anything", 10, 10);
    }
}
