//! Search orchestration: index freshness, rebuild coordination and query execution.
//!
//! All per-workspace state is owned by a [`SearchEngine`] instance. Each
//! workspace gets a slot holding the cached index, the rebuild lock and the
//! bookkeeping reported by [`SearchEngine::get_status`].

use crate::core::config::{Config, SearchSettings};
use crate::core::error::{Error, Result};
use crate::indexing::discovery::{discover_files, DiscoveredFile};
use crate::indexing::tokenizer::tokenize;
use crate::search::fusion::{fuse, grep_hits, SearchHit};
use crate::search::grep::{LiteralSearch, RipgrepSearch};
use crate::search::vectorizer::build_vector;
use crate::storage::index::WorkspaceIndex;
use crate::storage::store::{canonicalize_workspace, BuildStats, IndexStore};
use crate::storage::vectors::rank_chunks;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Hashed-vector similarity only
    Semantic,
    /// Semantic ranking fused with literal grep matches
    #[default]
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub workspace_path: PathBuf,
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub mode: Option<SearchMode>,
}

impl SearchRequest {
    pub fn new(workspace_path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            query: query.into(),
            limit: None,
            min_score: None,
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub took_ms: u64,
    /// False when this call had to build the first index of the workspace
    pub from_index: bool,
    /// True when a freshness probe triggered a rebuild during this call
    pub auto_refreshed: bool,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub exists: bool,
    pub indexing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// An index ready for querying, and how it was obtained
#[derive(Debug, Clone)]
pub struct EnsuredIndex {
    pub index: Arc<WorkspaceIndex>,
    pub from_index: bool,
    pub auto_refreshed: bool,
}

#[derive(Debug, Default)]
struct SlotState {
    cached: Option<Arc<WorkspaceIndex>>,
    indexing: bool,
    last_error: Option<String>,
    last_probe: Option<Instant>,
}

#[derive(Debug)]
struct WorkspaceSlot {
    root: PathBuf,
    state: Mutex<SlotState>,
    /// Held for the whole duration of a rebuild
    build_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Proof that the caller owns the rebuild of one workspace
struct RebuildGuard {
    slot: Arc<WorkspaceSlot>,
    _lock: OwnedMutexGuard<()>,
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        lock(&self.slot.state).indexing = false;
    }
}

impl WorkspaceSlot {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: Mutex::new(SlotState::default()),
            build_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Claim the rebuild of this workspace, failing fast if one is running
    fn begin_rebuild(self: &Arc<Self>) -> Result<RebuildGuard> {
        let guard = self
            .build_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::RebuildInProgress {
                workspace: self.root.clone(),
            })?;
        lock(&self.state).indexing = true;
        Ok(RebuildGuard {
            slot: Arc::clone(self),
            _lock: guard,
        })
    }

    /// Publish the outcome of a rebuild to the slot state
    fn finish_rebuild(
        &self,
        result: Result<(WorkspaceIndex, BuildStats)>,
    ) -> Result<(Arc<WorkspaceIndex>, BuildStats)> {
        match result {
            Ok((index, stats)) => {
                let index = Arc::new(index);
                let mut state = lock(&self.state);
                state.cached = Some(Arc::clone(&index));
                state.last_error = None;
                state.last_probe = Some(Instant::now());
                Ok((index, stats))
            }
            Err(e) => {
                warn!("Rebuild of {} failed: {}", self.root.display(), e);
                lock(&self.state).last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn cached(&self) -> Option<Arc<WorkspaceIndex>> {
        lock(&self.state).cached.clone()
    }

    /// Whether a freshness probe may run now; claims the probe slot if so
    fn claim_probe(&self, interval: std::time::Duration) -> bool {
        let mut state = lock(&self.state);
        let now = Instant::now();
        match state.last_probe {
            Some(last) if now.duration_since(last) < interval => false,
            _ => {
                state.last_probe = Some(now);
                true
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether the enumerated files differ from what the index recorded
pub fn index_is_stale(index: &WorkspaceIndex, files: &[DiscoveredFile]) -> bool {
    files.len() != index.files.len()
        || files.iter().any(|file| {
            index
                .files
                .get(&file.relative_path)
                .map_or(true, |entry| !entry.matches(file.size, file.modified_ms))
        })
}

/// The search engine. One instance owns every workspace it serves.
pub struct SearchEngine<G = RipgrepSearch> {
    store: IndexStore,
    grep: G,
    settings: SearchSettings,
    slots: Mutex<HashMap<PathBuf, Arc<WorkspaceSlot>>>,
}

impl SearchEngine<RipgrepSearch> {
    /// Engine using ripgrep for smart-mode literal matches
    pub fn new(config: &Config, settings: SearchSettings) -> Result<Self> {
        let grep = RipgrepSearch::new(settings.grep_program.clone());
        Self::with_literal_search(config, settings, grep)
    }
}

impl<G: LiteralSearch> SearchEngine<G> {
    pub fn with_literal_search(config: &Config, settings: SearchSettings, grep: G) -> Result<Self> {
        Ok(Self {
            store: IndexStore::open(config)?,
            grep,
            settings,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Index presence, size and rebuild state of a workspace
    pub async fn get_status(&self, workspace: &Path) -> Result<IndexStatus> {
        let slot = self.slot(workspace)?;
        let index = self.load_index(&slot).await?;
        let state = lock(&slot.state);

        Ok(IndexStatus {
            exists: index.is_some(),
            indexing: state.indexing,
            total_files: index.as_ref().map(|i| i.total_files),
            total_chunks: index.as_ref().map(|i| i.total_chunks),
            indexed_at: index.as_ref().map(|i| i.indexed_at),
            last_error: state.last_error.clone(),
        })
    }

    /// Rebuild the index of a workspace now.
    ///
    /// Fails with [`Error::RebuildInProgress`] if another rebuild of the same
    /// workspace is running.
    pub async fn index_workspace(&self, workspace: &Path) -> Result<BuildStats> {
        let slot = self.slot(workspace)?;
        let guard = slot.begin_rebuild()?;
        let (_, stats) = self.run_rebuild(&slot, guard).await?;
        Ok(stats)
    }

    /// Make sure a usable index exists, building or refreshing it as needed.
    ///
    /// With no index at all this blocks on the first build, joining one that
    /// is already running. Otherwise a rate-limited freshness probe may
    /// trigger a rebuild; when another rebuild is in flight the last good
    /// index is served instead.
    pub async fn ensure_index(&self, workspace: &Path) -> Result<EnsuredIndex> {
        let slot = self.slot(workspace)?;

        if let Some(index) = self.load_index(&slot).await? {
            return self.refresh_if_stale(&slot, index).await;
        }

        match slot.begin_rebuild() {
            Ok(guard) => {
                let (index, _) = self.run_rebuild(&slot, guard).await?;
                Ok(EnsuredIndex {
                    index,
                    from_index: false,
                    auto_refreshed: false,
                })
            }
            Err(Error::RebuildInProgress { .. }) => {
                debug!("Waiting for first index of {}", slot.root.display());
                drop(slot.build_lock.lock().await);
                match self.load_index(&slot).await? {
                    Some(index) => Ok(EnsuredIndex {
                        index,
                        from_index: false,
                        auto_refreshed: false,
                    }),
                    None => {
                        let reason = lock(&slot.state)
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "initial index build did not complete".to_string());
                        Err(Error::Index(reason))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Run a query against a workspace
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let mode = request.mode.unwrap_or_default();
        let limit = request
            .limit
            .unwrap_or(self.settings.default_limit)
            .clamp(1, self.settings.max_limit.max(1));
        let min_score = request
            .min_score
            .filter(|s| s.is_finite())
            .unwrap_or(self.settings.default_min_score)
            .clamp(0.0, 1.0);

        let query = request.query.trim();
        if query.is_empty() {
            return Ok(SearchResponse {
                query: request.query.clone(),
                mode,
                took_ms: started.elapsed().as_millis() as u64,
                from_index: false,
                auto_refreshed: false,
                hits: Vec::new(),
            });
        }

        let ensured = self.ensure_index(&request.workspace_path).await?;
        let index = ensured.index;
        let workspace = PathBuf::from(&index.workspace_path);

        let query_vector = build_vector(&tokenize(query), &index.idf);
        let semantic: Vec<SearchHit> = rank_chunks(&index, &query_vector, min_score, limit)
            .into_iter()
            .map(|(chunk, score)| SearchHit::from_chunk(chunk, score, &workspace))
            .collect();

        let hits = match mode {
            SearchMode::Semantic => semantic,
            SearchMode::Smart => {
                let max_matches = limit * self.settings.grep_fanout.max(1);
                let matches = self.grep.find(&workspace, query, max_matches).await;
                debug!("{} literal matches for {:?}", matches.len(), query);
                fuse(semantic, grep_hits(&matches, &workspace, min_score), limit)
            }
        };

        Ok(SearchResponse {
            query: request.query.clone(),
            mode,
            took_ms: started.elapsed().as_millis() as u64,
            from_index: ensured.from_index,
            auto_refreshed: ensured.auto_refreshed,
            hits,
        })
    }

    /// Delete the persisted index of a workspace and forget its cached copy
    pub async fn remove_index(&self, workspace: &Path) -> Result<bool> {
        let slot = self.slot(workspace)?;
        let _guard = slot.begin_rebuild()?;

        let store = self.store.clone();
        let root = slot.root.clone();
        let removed = tokio::task::spawn_blocking(move || store.remove(&root)).await??;

        let mut state = lock(&slot.state);
        state.cached = None;
        state.last_probe = None;
        state.last_error = None;
        Ok(removed)
    }

    fn slot(&self, workspace: &Path) -> Result<Arc<WorkspaceSlot>> {
        let root = canonicalize_workspace(workspace)?;
        let mut slots = lock(&self.slots);
        let slot = slots
            .entry(root.clone())
            .or_insert_with(|| Arc::new(WorkspaceSlot::new(root)));
        Ok(Arc::clone(slot))
    }

    /// The cached index, else the persisted one (which is then cached)
    async fn load_index(&self, slot: &Arc<WorkspaceSlot>) -> Result<Option<Arc<WorkspaceIndex>>> {
        if let Some(index) = slot.cached() {
            return Ok(Some(index));
        }

        let store = self.store.clone();
        let root = slot.root.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load(&root)).await?;

        Ok(loaded.map(|index| {
            let index = Arc::new(index);
            let mut state = lock(&slot.state);
            // a rebuild may have finished while we were reading
            state.cached.get_or_insert_with(|| Arc::clone(&index)).clone()
        }))
    }

    async fn refresh_if_stale(
        &self,
        slot: &Arc<WorkspaceSlot>,
        index: Arc<WorkspaceIndex>,
    ) -> Result<EnsuredIndex> {
        let current = EnsuredIndex {
            index,
            from_index: true,
            auto_refreshed: false,
        };

        if !slot.claim_probe(self.settings.freshness_interval) {
            return Ok(current);
        }

        let root = slot.root.clone();
        let files = match tokio::task::spawn_blocking(move || discover_files(&root)).await {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                debug!("Freshness probe failed for {}: {}", slot.root.display(), e);
                return Ok(current);
            }
            Err(e) => {
                debug!("Freshness probe task failed for {}: {}", slot.root.display(), e);
                return Ok(current);
            }
        };

        if !index_is_stale(&current.index, &files) {
            return Ok(current);
        }

        info!("Workspace {} changed, rebuilding index", slot.root.display());
        match slot.begin_rebuild() {
            Ok(guard) => {
                let (index, _) = self.run_rebuild(slot, guard).await?;
                Ok(EnsuredIndex {
                    index,
                    from_index: true,
                    auto_refreshed: true,
                })
            }
            Err(_) => {
                debug!("Rebuild already running for {}, serving last index", slot.root.display());
                Ok(current)
            }
        }
    }

    async fn run_rebuild(
        &self,
        slot: &Arc<WorkspaceSlot>,
        guard: RebuildGuard,
    ) -> Result<(Arc<WorkspaceIndex>, BuildStats)> {
        let previous = self.load_index(slot).await?;
        let store = self.store.clone();
        let slot = Arc::clone(slot);

        // The guard travels with the blocking work: a caller that stops
        // awaiting must not release the build lock while the rebuild runs.
        tokio::task::spawn_blocking(move || {
            let result = store.rebuild(&slot.root, previous.as_deref());
            let outcome = slot.finish_rebuild(result);
            drop(guard);
            outcome
        })
        .await?
    }
}
