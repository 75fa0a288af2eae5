use crate::core::config::{INDEX_VERSION, VECTOR_DIMENSION};
use crate::search::vectorizer::IdfTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fingerprint and chunk membership of one indexed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub mtime_ms: u64,
    /// Ids of this file's chunks, in file order
    pub chunk_ids: Vec<String>,
    /// The last read failed; the next rebuild reads the file again
    #[serde(default, skip_serializing_if = "is_false")]
    pub unreadable: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FileEntry {
    /// Whether `(size, mtime)` still matches this entry
    pub fn matches(&self, size: u64, mtime_ms: u64) -> bool {
        self.size == size && self.mtime_ms == mtime_ms
    }
}

/// The atomic unit of indexing and retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub content: String,
    pub tokens: Vec<String>,
    pub vector: Vec<f32>,
}

/// The persisted index of one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceIndex {
    pub version: u32,
    pub workspace_path: String,
    /// Build time, milliseconds since the Unix epoch
    pub indexed_at: u64,
    pub total_files: usize,
    pub total_chunks: usize,
    pub dimension: usize,
    pub idf: IdfTable,
    pub files: BTreeMap<String, FileEntry>,
    /// Order is significant: ties in ranking keep this order
    pub chunks: Vec<Chunk>,
}

impl WorkspaceIndex {
    /// An empty index for `workspace_path` at the current schema version
    pub fn empty(workspace_path: String, indexed_at: u64) -> Self {
        Self {
            version: INDEX_VERSION,
            workspace_path,
            indexed_at,
            total_files: 0,
            total_chunks: 0,
            dimension: VECTOR_DIMENSION,
            idf: IdfTable::new(),
            files: BTreeMap::new(),
            chunks: Vec::new(),
        }
    }

    /// Chunks keyed by id, for reuse lookups
    pub fn chunk_map(&self) -> HashMap<&str, &Chunk> {
        self.chunks.iter().map(|c| (c.id.as_str(), c)).collect()
    }

    /// Chunks of one file, in file order
    pub fn chunks_for_file<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.chunks.iter().filter(move |c| c.path == path)
    }
}
