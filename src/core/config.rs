use super::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Schema version of the persisted index document. Any other value is discarded on read.
pub const INDEX_VERSION: u32 = 1;

/// Width of every chunk and query vector.
pub const VECTOR_DIMENSION: usize = 384;

/// Character budget a chunk accumulates lines up to.
pub const CHUNK_CHAR_BUDGET: usize = 1800;

/// Lines a new chunk re-reads from the end of the previous one.
pub const CHUNK_LINE_OVERLAP: usize = 4;

/// Files larger than this are not indexed.
pub const MAX_FILE_BYTES: u64 = 512 * 1024;

/// Leading bytes inspected for a NUL when detecting binary files.
pub const BINARY_PROBE_BYTES: usize = 4096;

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "CODESIFT_HOME";

/// Configuration for codesift
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for codesift data
    pub base_dir: PathBuf,
    /// Directory holding one index document per workspace
    pub index_dir: PathBuf,
}

impl Config {
    /// Get the default base directory (per-user cache root)
    pub fn default_base_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::cache_dir()
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))
            .map(|cache| cache.join("codesift"))
    }

    /// Create a new configuration
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = match base_dir {
            Some(dir) => dir,
            None => Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".codesift")),
        };

        Ok(Self {
            index_dir: base_dir.join("indexes"),
            base_dir,
        })
    }

    /// Initialize the configuration directories
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.index_dir)?;
        Ok(())
    }

    /// Check if the configuration is already initialized
    pub fn is_initialized(&self) -> bool {
        self.base_dir.exists() && self.index_dir.exists()
    }
}

/// Runtime tunables for the search engine.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Minimum wall-clock gap between two freshness probes of one workspace.
    pub freshness_interval: Duration,
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_min_score: f32,
    /// Literal matches requested per result slot in smart mode.
    pub grep_fanout: usize,
    /// Program invoked for literal search.
    pub grep_program: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            freshness_interval: Duration::from_millis(2500),
            default_limit: 8,
            max_limit: 20,
            default_min_score: 0.2,
            grep_fanout: 8,
            grep_program: "rg".to_string(),
        }
    }
}
