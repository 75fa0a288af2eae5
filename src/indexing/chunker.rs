use crate::core::config::{BINARY_PROBE_BYTES, CHUNK_CHAR_BUDGET, CHUNK_LINE_OVERLAP};
use crate::core::error::Result;
use crate::indexing::tokenizer::tokenize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A line-range excerpt of a file, before vectorization
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub id: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub content: String,
    pub tokens: Vec<String>,
}

/// Stable chunk identity derived only from the path and the line span.
pub fn chunk_id(relative_path: &str, start_line: usize, end_line: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(end_line.to_string().as_bytes());
    let digest = hasher.finalize();
    digest[..12].iter().map(|b| format!("{:02x}", b)).collect()
}

/// True when the leading probe window contains a NUL byte
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_PROBE_BYTES).any(|&b| b == 0)
}

/// Read a source file as text. Returns `Ok(None)` for binary content.
pub fn read_source_file(path: &Path) -> Result<Option<String>> {
    let bytes = std::fs::read(path)?;
    if is_binary(&bytes) {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Split file text into overlapping chunks.
///
/// Lines accumulate until the character budget is reached (the line that crosses
/// it is kept) or the file ends. The next chunk restarts [`CHUNK_LINE_OVERLAP`]
/// lines before the previous end. Chunks with no tokens are dropped, but still
/// advance the window.
pub fn chunk_file(relative_path: &str, text: &str) -> Vec<TextChunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < lines.len() {
        let mut end = start;
        let mut chars = 0;
        loop {
            chars += lines[end].chars().count() + 1;
            if chars >= CHUNK_CHAR_BUDGET || end + 1 == lines.len() {
                break;
            }
            end += 1;
        }

        let content = lines[start..=end].join("\n");
        let tokens = tokenize(&content);
        if !tokens.is_empty() {
            chunks.push(TextChunk {
                id: chunk_id(relative_path, start + 1, end + 1),
                start_line: start + 1,
                end_line: end + 1,
                content,
                tokens,
            });
        }

        if end + 1 == lines.len() {
            break;
        }
        start = (end + 1).saturating_sub(CHUNK_LINE_OVERLAP).max(start + 1);
    }

    chunks
}
