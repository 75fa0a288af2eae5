use crate::search::engine::SearchMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// codesift - Offline code search for your workspaces
#[derive(Parser, Debug)]
#[command(name = "codesift")]
#[command(about = "A lightweight, offline code search engine for workspaces", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Custom base directory (default: per-user cache directory, or $CODESIFT_HOME)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show whether a workspace is indexed
    Status {
        /// Workspace directory
        path: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the index of a workspace now
    Index {
        /// Workspace directory
        path: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Search a workspace, indexing it first if needed
    Search {
        /// Workspace directory
        path: PathBuf,
        /// Search query
        query: String,
        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,
        /// Minimum similarity score in [0, 1]
        #[arg(long)]
        min_score: Option<f32>,
        /// Ranking mode
        #[arg(short, long, value_enum, default_value_t = ModeArg::Smart)]
        mode: ModeArg,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete the persisted index of a workspace
    Clear {
        /// Workspace directory
        path: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Semantic,
    Smart,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Semantic => SearchMode::Semantic,
            ModeArg::Smart => SearchMode::Smart,
        }
    }
}
