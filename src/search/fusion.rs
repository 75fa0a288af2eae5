//! Hybrid result merging for smart mode.
//!
//! Semantic hits and grep hits are keyed by `(path, start_line, end_line)`.
//! A key present in both sets becomes a single `hybrid` hit carrying the
//! larger score.

use crate::indexing::chunker::chunk_id;
use crate::indexing::discovery::language_for_path;
use crate::search::grep::LiteralMatch;
use crate::storage::index::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Score given to the first grep hit when the threshold is low.
const GREP_BASE_SCORE: f32 = 0.75;

/// Minimum distance between the first grep score and the threshold.
const GREP_SEED_MARGIN: f32 = 0.05;

/// Per-rank decay of grep scores toward the threshold.
const GREP_DECAY: f32 = 0.97;

const SNIPPET_MAX_LINES: usize = 12;
const SNIPPET_MAX_CHARS: usize = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Semantic,
    Grep,
    Hybrid,
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub source: HitSource,
    pub score: f32,
    pub path: String,
    pub absolute_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub snippet: String,
}

impl SearchHit {
    /// A semantic hit for an index chunk
    pub fn from_chunk(chunk: &Chunk, score: f32, workspace: &Path) -> Self {
        Self {
            id: chunk.id.clone(),
            source: HitSource::Semantic,
            score,
            path: chunk.path.clone(),
            absolute_path: absolute_path(workspace, &chunk.path),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            language: chunk.language.clone(),
            snippet: make_snippet(&chunk.content),
        }
    }

    fn key(&self) -> (&str, usize, usize) {
        (self.path.as_str(), self.start_line, self.end_line)
    }
}

/// Turn grep matches into single-line hits with decaying scores.
///
/// The first match scores highest; every score stays strictly above `min_score`
/// unless the threshold is already 1.0.
pub fn grep_hits(matches: &[LiteralMatch], workspace: &Path, min_score: f32) -> Vec<SearchHit> {
    let seed = (min_score + GREP_SEED_MARGIN).max(GREP_BASE_SCORE).min(1.0);

    matches
        .iter()
        .enumerate()
        .map(|(rank, m)| SearchHit {
            id: chunk_id(&m.path, m.line, m.line),
            source: HitSource::Grep,
            score: min_score + (seed - min_score) * GREP_DECAY.powi(rank as i32),
            path: m.path.clone(),
            absolute_path: absolute_path(workspace, &m.path),
            start_line: m.line,
            end_line: m.line,
            language: language_for_path(Path::new(&m.path))
                .unwrap_or("text")
                .to_string(),
            snippet: make_snippet(m.text.trim()),
        })
        .collect()
}

/// Merge semantic and grep hits, re-sort by score and keep `limit`.
///
/// Equal scores keep arrival order: semantic hits first, then grep hits.
pub fn fuse(semantic: Vec<SearchHit>, grep: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut merged: Vec<SearchHit> = Vec::with_capacity(semantic.len() + grep.len());
    let mut positions: HashMap<(String, usize, usize), usize> = HashMap::new();

    for hit in semantic.into_iter().chain(grep) {
        let (path, start, end) = hit.key();
        let key = (path.to_string(), start, end);
        match positions.get(&key) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                if existing.source != hit.source {
                    existing.source = HitSource::Hybrid;
                }
                existing.score = existing.score.max(hit.score);
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(hit);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(limit);
    merged
}

fn absolute_path(workspace: &Path, relative: &str) -> String {
    workspace.join(relative).to_string_lossy().into_owned()
}

fn make_snippet(content: &str) -> String {
    let mut snippet = content
        .lines()
        .take(SNIPPET_MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    if let Some((cut, _)) = snippet.char_indices().nth(SNIPPET_MAX_CHARS) {
        snippet.truncate(cut);
    }
    snippet
}
