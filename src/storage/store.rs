use crate::core::config::{Config, INDEX_VERSION, VECTOR_DIMENSION};
use crate::core::error::{Error, Result};
use crate::indexing::chunker::{chunk_file, read_source_file, TextChunk};
use crate::indexing::discovery::{discover_files, language_for_path, DiscoveredFile};
use crate::search::vectorizer::{build_vector, compute_idf};
use crate::storage::index::{Chunk, FileEntry, WorkspaceIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Outcome of a rebuild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub total_files: usize,
    pub total_chunks: usize,
    /// Files whose chunks were carried over from the previous index
    pub reused_files: usize,
    /// Files that were read and chunked again
    pub updated_files: usize,
    /// Files in the previous index that no longer exist
    pub removed_files: usize,
    pub duration_ms: u64,
}

/// Distinguishes temp files of saves running at the same time
static SAVE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Owns the on-disk index documents, one JSON file per workspace
#[derive(Debug, Clone)]
pub struct IndexStore {
    index_dir: PathBuf,
}

impl IndexStore {
    /// Open the store, creating the index directory if needed
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.index_dir)?;
        Ok(Self {
            index_dir: config.index_dir.clone(),
        })
    }

    /// Location of the index document for a canonical workspace path
    pub fn index_path(&self, workspace: &Path) -> PathBuf {
        self.index_dir
            .join(format!("{}.json", workspace_key(workspace)))
    }

    /// Read the persisted index for a workspace.
    ///
    /// Missing, unreadable, malformed, or version-mismatched documents all
    /// come back as `None`.
    pub fn load(&self, workspace: &Path) -> Option<WorkspaceIndex> {
        let path = self.index_path(workspace);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read index {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<VersionProbe>(&bytes) {
            Ok(probe) if probe.version == INDEX_VERSION => {}
            Ok(probe) => {
                info!(
                    "Discarding index {} with schema version {} (expected {})",
                    path.display(),
                    probe.version,
                    INDEX_VERSION
                );
                return None;
            }
            Err(e) => {
                warn!("Discarding unreadable index {}: {}", path.display(), e);
                return None;
            }
        }

        let index: WorkspaceIndex = match serde_json::from_slice(&bytes) {
            Ok(index) => index,
            Err(e) => {
                warn!("Discarding malformed index {}: {}", path.display(), e);
                return None;
            }
        };

        if let Err(reason) = validate(&index, workspace) {
            warn!("Discarding index {}: {}", path.display(), reason);
            return None;
        }

        Some(index)
    }

    /// Persist an index, replacing any previous document atomically
    pub fn save(&self, index: &WorkspaceIndex) -> Result<()> {
        std::fs::create_dir_all(&self.index_dir)?;
        let path = self.index_path(Path::new(&index.workspace_path));
        let tmp_path = path.with_extension(format!(
            "json.{}-{}.tmp",
            std::process::id(),
            SAVE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let json = serde_json::to_vec(index)?;
        std::fs::write(&tmp_path, json)?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete the persisted index for a workspace. Returns whether one existed.
    pub fn remove(&self, workspace: &Path) -> Result<bool> {
        match std::fs::remove_file(self.index_path(workspace)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Build a fresh index from `previous` and persist it.
    ///
    /// The previous document on disk is only replaced once the new one has been
    /// fully built and serialized.
    pub fn rebuild(
        &self,
        workspace: &Path,
        previous: Option<&WorkspaceIndex>,
    ) -> Result<(WorkspaceIndex, BuildStats)> {
        let (index, stats) = build_index(workspace, previous)?;
        self.save(&index)?;
        Ok((index, stats))
    }
}

/// Canonical absolute form of a workspace root
pub fn canonicalize_workspace(path: &Path) -> Result<PathBuf> {
    let canonical = path.canonicalize().map_err(|e| {
        Error::InvalidWorkspace(format!("{}: {}", path.display(), e))
    })?;
    if !canonical.is_dir() {
        return Err(Error::InvalidWorkspace(format!(
            "Path is not a directory: {}",
            canonical.display()
        )));
    }
    Ok(canonical)
}

/// Stable filename key for a canonical workspace path
pub fn workspace_key(workspace: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workspace.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Build a complete index for `workspace`, reusing unchanged files from `previous`.
///
/// IDF and every vector are recomputed over the full resulting corpus.
pub fn build_index(
    workspace: &Path,
    previous: Option<&WorkspaceIndex>,
) -> Result<(WorkspaceIndex, BuildStats)> {
    let started = Instant::now();
    let files = discover_files(workspace)?;
    let (index, stats) = build_from_files(workspace, &files, previous, started);

    info!(
        workspace = %workspace.display(),
        files = stats.total_files,
        chunks = stats.total_chunks,
        reused = stats.reused_files,
        updated = stats.updated_files,
        removed = stats.removed_files,
        "Index rebuilt in {}ms",
        stats.duration_ms
    );

    Ok((index, stats))
}

/// Assemble an index from an already enumerated file list
fn build_from_files(
    workspace: &Path,
    files: &[DiscoveredFile],
    previous: Option<&WorkspaceIndex>,
    started: Instant,
) -> (WorkspaceIndex, BuildStats) {
    let workspace_path = workspace.to_string_lossy().into_owned();

    let previous = previous.filter(|p| p.workspace_path == workspace_path);
    let old_chunks = previous.map(WorkspaceIndex::chunk_map).unwrap_or_default();

    let reusable: Vec<Option<Vec<Chunk>>> = files
        .iter()
        .map(|file| reusable_chunks(previous, &old_chunks, file))
        .collect();

    // Order of `collect` follows `files`, so chunk order stays deterministic.
    let fresh: Vec<Option<Result<Vec<TextChunk>>>> = files
        .par_iter()
        .zip(reusable.par_iter())
        .map(|(file, reused)| match reused {
            Some(_) => None,
            None => Some(chunk_discovered(file)),
        })
        .collect();

    let mut entries = BTreeMap::new();
    let mut chunks = Vec::new();
    let mut reused_files = 0;
    let mut updated_files = 0;

    for ((file, reused), fresh) in files.iter().zip(reusable).zip(fresh) {
        let mut unreadable = false;
        let file_chunks = match reused {
            Some(reused) => {
                reused_files += 1;
                reused
            }
            None => {
                updated_files += 1;
                let language = language_for_path(&file.path).unwrap_or("text");
                let text_chunks = match fresh.unwrap_or_else(|| Ok(Vec::new())) {
                    Ok(text_chunks) => text_chunks,
                    Err(e) => {
                        warn!("Skipping unreadable file {}: {}", file.relative_path, e);
                        unreadable = true;
                        Vec::new()
                    }
                };
                text_chunks
                    .into_iter()
                    .map(|c| Chunk {
                        id: c.id,
                        path: file.relative_path.clone(),
                        start_line: c.start_line,
                        end_line: c.end_line,
                        language: language.to_string(),
                        content: c.content,
                        tokens: c.tokens,
                        vector: Vec::new(),
                    })
                    .collect()
            }
        };

        entries.insert(
            file.relative_path.clone(),
            FileEntry {
                size: file.size,
                mtime_ms: file.modified_ms,
                chunk_ids: file_chunks.iter().map(|c| c.id.clone()).collect(),
                unreadable,
            },
        );
        chunks.extend(file_chunks);
    }

    let removed_files = previous
        .map(|p| p.files.keys().filter(|k| !entries.contains_key(*k)).count())
        .unwrap_or(0);

    let idf = compute_idf(chunks.iter().map(|c| c.tokens.as_slice()));
    chunks
        .par_iter_mut()
        .for_each(|chunk| chunk.vector = build_vector(&chunk.tokens, &idf));

    let mut index = WorkspaceIndex::empty(workspace_path, now_ms());
    index.total_files = entries.len();
    index.total_chunks = chunks.len();
    index.idf = idf;
    index.files = entries;
    index.chunks = chunks;

    let stats = BuildStats {
        total_files: index.total_files,
        total_chunks: index.total_chunks,
        reused_files,
        updated_files,
        removed_files,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    (index, stats)
}

/// The previous chunks of `file`, if its fingerprint is unchanged, its last
/// read succeeded and every recorded chunk id still resolves.
fn reusable_chunks(
    previous: Option<&WorkspaceIndex>,
    old_chunks: &HashMap<&str, &Chunk>,
    file: &DiscoveredFile,
) -> Option<Vec<Chunk>> {
    let entry = previous?.files.get(&file.relative_path)?;
    if entry.unreadable || !entry.matches(file.size, file.modified_ms) {
        return None;
    }

    entry
        .chunk_ids
        .iter()
        .map(|id| {
            old_chunks
                .get(id.as_str())
                .filter(|c| c.path == file.relative_path)
                .map(|c| (*c).clone())
        })
        .collect()
}

/// Read and chunk one file. Binary files yield no chunks; read failures are
/// returned so the file can be retried by the next build.
fn chunk_discovered(file: &DiscoveredFile) -> Result<Vec<TextChunk>> {
    match read_source_file(&file.path)? {
        Some(text) => Ok(chunk_file(&file.relative_path, &text)),
        None => {
            debug!("Skipping binary file {}", file.relative_path);
            Ok(Vec::new())
        }
    }
}

fn validate(index: &WorkspaceIndex, workspace: &Path) -> std::result::Result<(), String> {
    if index.workspace_path != workspace.to_string_lossy() {
        return Err(format!("belongs to {}", index.workspace_path));
    }
    if index.dimension != VECTOR_DIMENSION {
        return Err(format!("dimension {} != {}", index.dimension, VECTOR_DIMENSION));
    }
    if let Some(chunk) = index.chunks.iter().find(|c| c.vector.len() != index.dimension) {
        return Err(format!("chunk {} has a {}-wide vector", chunk.id, chunk.vector.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, IndexStore) {
        let temp_dir = TempDir::new().unwrap();
        let workspace = temp_dir.path().join("ws");
        fs::create_dir_all(&workspace).unwrap();
        let workspace = canonicalize_workspace(&workspace).unwrap();
        let config = Config::new(Some(temp_dir.path().join("home"))).unwrap();
        let store = IndexStore::open(&config).unwrap();
        (temp_dir, workspace, store)
    }

    #[test]
    fn test_workspace_key_is_stable() {
        let a = workspace_key(Path::new("/tmp/project"));
        assert_eq!(a, workspace_key(Path::new("/tmp/project")));
        assert_ne!(a, workspace_key(Path::new("/tmp/other")));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_load_missing_is_none() {
        let (_tmp, workspace, store) = setup();
        assert!(store.load(&workspace).is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (_tmp, workspace, store) = setup();
        fs::write(workspace.join("a.ts"), "export function computeTotal() {}\n").unwrap();

        let (index, _) = store.rebuild(&workspace, None).unwrap();
        let loaded = store.load(&workspace).unwrap();
        assert_eq!(loaded, index);

        // no temp files left next to the document
        let index_path = store.index_path(&workspace);
        let entries: Vec<PathBuf> = fs::read_dir(index_path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![index_path]);
    }

    #[test]
    fn test_version_mismatch_is_none() {
        let (_tmp, workspace, store) = setup();
        let mut index = WorkspaceIndex::empty(workspace.to_string_lossy().into_owned(), 1);
        index.version = INDEX_VERSION + 1;
        fs::write(store.index_path(&workspace), serde_json::to_vec(&index).unwrap()).unwrap();
        assert!(store.load(&workspace).is_none());
    }

    #[test]
    fn test_malformed_documents_are_none() {
        let (_tmp, workspace, store) = setup();
        let path = store.index_path(&workspace);

        fs::write(&path, "{ not json").unwrap();
        assert!(store.load(&workspace).is_none());

        // file entry without a numeric size
        let doc = serde_json::json!({
            "version": INDEX_VERSION,
            "workspacePath": workspace.to_string_lossy(),
            "indexedAt": 1,
            "totalFiles": 1,
            "totalChunks": 0,
            "dimension": VECTOR_DIMENSION,
            "idf": {},
            "files": { "a.ts": { "size": "big", "mtimeMs": 1, "chunkIds": [] } },
            "chunks": []
        });
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        assert!(store.load(&workspace).is_none());

        // chunk without a token array
        let doc = serde_json::json!({
            "version": INDEX_VERSION,
            "workspacePath": workspace.to_string_lossy(),
            "indexedAt": 1,
            "totalFiles": 0,
            "totalChunks": 1,
            "dimension": VECTOR_DIMENSION,
            "idf": {},
            "files": {},
            "chunks": [{
                "id": "x", "path": "a.ts", "startLine": 1, "endLine": 1,
                "language": "typescript", "content": "x", "vector": []
            }]
        });
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        assert!(store.load(&workspace).is_none());
    }

    #[test]
    fn test_remove() {
        let (_tmp, workspace, store) = setup();
        store.rebuild(&workspace, None).unwrap();
        assert!(store.remove(&workspace).unwrap());
        assert!(!store.remove(&workspace).unwrap());
        assert!(store.load(&workspace).is_none());
    }

    #[test]
    fn test_binary_file_is_recorded_without_chunks() {
        let (_tmp, workspace, store) = setup();
        fs::write(workspace.join("data.json"), [b'{', 0, b'}']).unwrap();
        fs::write(workspace.join("b.ts"), "const answer = computeTotal(x);\n").unwrap();

        let (index, stats) = store.rebuild(&workspace, None).unwrap();
        assert_eq!(stats.total_files, 2);
        assert!(index.files["data.json"].chunk_ids.is_empty());
        assert_eq!(index.chunks.len(), 1);
        assert_eq!(index.chunks[0].language, "typescript");
    }

    #[test]
    fn test_unreadable_file_is_retried_by_next_build() {
        let (_tmp, workspace, _store) = setup();
        fs::write(workspace.join("a.ts"), "export function computeTotal() {}\n").unwrap();
        let mut files = discover_files(&workspace).unwrap();

        // b.ts is enumerated but gone by the time it is read
        let late = "const answer = computeTotal(x);\n";
        files.push(DiscoveredFile {
            path: workspace.join("b.ts"),
            relative_path: "b.ts".to_string(),
            size: late.len() as u64,
            modified_ms: 42,
        });

        let (first, stats) = build_from_files(&workspace, &files, None, Instant::now());
        assert_eq!(stats.total_files, 2);
        assert!(first.files["b.ts"].unreadable);
        assert!(first.files["b.ts"].chunk_ids.is_empty());
        assert!(!first.files["a.ts"].unreadable);

        // same fingerprint, now readable
        fs::write(workspace.join("b.ts"), late).unwrap();
        let (second, stats) = build_from_files(&workspace, &files, Some(&first), Instant::now());
        assert_eq!(stats.reused_files, 1);
        assert_eq!(stats.updated_files, 1);
        assert!(!second.files["b.ts"].unreadable);
        assert_eq!(second.files["b.ts"].chunk_ids.len(), 1);
        assert!(second.chunks.iter().any(|c| c.path == "b.ts"));
    }

    #[test]
    fn test_unreadable_flag_round_trips() {
        let (_tmp, workspace, store) = setup();
        let mut index = WorkspaceIndex::empty(workspace.to_string_lossy().into_owned(), 1);
        index.files.insert(
            "b.ts".to_string(),
            FileEntry {
                size: 3,
                mtime_ms: 4,
                chunk_ids: Vec::new(),
                unreadable: true,
            },
        );
        index.total_files = 1;
        store.save(&index).unwrap();
        assert_eq!(store.load(&workspace).unwrap(), index);
    }

    #[test]
    fn test_missing_chunk_record_forces_rechunk() {
        let (_tmp, workspace, store) = setup();
        fs::write(workspace.join("a.ts"), "export function computeTotal() {}\n").unwrap();
        let (mut index, _) = store.rebuild(&workspace, None).unwrap();

        index.chunks.clear();
        let (rebuilt, stats) = build_index(&workspace, Some(&index)).unwrap();
        assert_eq!(stats.reused_files, 0);
        assert_eq!(stats.updated_files, 1);
        assert_eq!(rebuilt.chunks.len(), 1);
    }
}
