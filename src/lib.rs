// Core functionality
pub mod core {
    pub mod config;
    pub mod error;
}

// Persisted index and scoring
pub mod storage {
    pub mod index;
    pub mod store;
    pub mod vectors;
}

// Indexing pipeline
pub mod indexing {
    pub mod chunker;
    pub mod discovery;
    pub mod tokenizer;
}

// Vectorization, literal matching and orchestration
pub mod search {
    pub mod engine;
    pub mod fusion;
    pub mod grep;
    pub mod vectorizer;
}

// User interfaces
pub mod ui {
    pub mod cli;
}

// Re-export commonly used types
pub use core::config::{Config, SearchSettings};
pub use core::error::{Error, Result};
pub use indexing::chunker::{chunk_file, chunk_id};
pub use indexing::discovery::{discover_files, DiscoveredFile};
pub use indexing::tokenizer::tokenize;
pub use search::engine::{IndexStatus, SearchEngine, SearchMode, SearchRequest, SearchResponse};
pub use search::fusion::{HitSource, SearchHit};
pub use search::grep::{LiteralMatch, LiteralSearch, RipgrepSearch};
pub use storage::index::{Chunk, FileEntry, WorkspaceIndex};
pub use storage::store::{build_index, BuildStats, IndexStore};
pub use ui::cli::Cli;
