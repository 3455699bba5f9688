use crate::error::ConfigError;

pub const DEFAULT_CHUNK_CHARS: usize = 500;
pub const DEFAULT_OVERLAP_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_chars == 0 {
            return Err(ConfigError::InvalidChunking(
                "chunk size must be positive".to_string(),
            ));
        }

        if self.overlap_chars >= self.chunk_chars {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.chunk_chars
            )));
        }

        Ok(())
    }
}

/// Fixed-stride windows of at most `chunk_chars` Unicode scalar values;
/// consecutive chunks share exactly `overlap_chars` characters.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, ConfigError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    if chars.len() <= config.chunk_chars {
        return Ok(vec![text.to_string()]);
    }

    let step = config.chunk_chars - config.overlap_chars;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::{chunk_text, ChunkingConfig};

    fn config(chunk_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_chars,
            overlap_chars,
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("short text", config(500, 100)).expect("config is valid");
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = chunk_text("", config(500, 100)).expect("config is valid");
        assert!(chunks.is_empty());
    }

    #[test]
    fn exact_boundary_is_a_single_chunk() {
        let text = "a".repeat(500);
        let chunks = chunk_text(&text, config(500, 100)).expect("config is valid");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 500);
    }

    #[test]
    fn thousand_chars_split_into_three_windows() {
        let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, config(500, 100)).expect("config is valid");

        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.chars().count()).collect();
        assert_eq!(lengths, vec![500, 500, 200]);
    }

    #[test]
    fn chunk_count_follows_the_stride() {
        // ceil((len - overlap) / (chunk - overlap)) for len > chunk
        let cases = [(1200usize, 3usize), (1000, 3), (900, 2), (501, 2), (500, 1)];
        for (len, expected) in cases {
            let text = "x".repeat(len);
            let chunks = chunk_text(&text, config(500, 100)).expect("config is valid");
            assert_eq!(chunks.len(), expected, "len={len}");
        }
    }

    #[test]
    fn consecutive_chunks_share_the_overlap() {
        let text: String = (0..1200).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, config(500, 100)).expect("config is valid");
        assert_eq!(chunks.len(), 3);

        for window in chunks.windows(2) {
            let tail: String = window[0].chars().skip(400).collect();
            let head: String = window[1].chars().take(100).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn dropping_overlaps_reconstructs_the_text() {
        let text: String = (0..2345).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, config(500, 100)).expect("config is valid");

        let mut rebuilt: String = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(100));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn windows_count_scalar_values_not_bytes() {
        let text = "é".repeat(600);
        let chunks = chunk_text(&text, config(500, 100)).expect("config is valid");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 500);
        assert_eq!(chunks[1].chars().count(), 200);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "the same input ".repeat(200);
        let first = chunk_text(&text, config(500, 100)).expect("config is valid");
        let second = chunk_text(&text, config(500, 100)).expect("config is valid");
        assert_eq!(first, second);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        assert!(chunk_text("text", config(100, 100)).is_err());
        assert!(chunk_text("text", config(100, 150)).is_err());
        assert!(chunk_text("text", config(0, 0)).is_err());
    }
}
