//! Literal line matches from an external grep tool (ripgrep).

use std::future::Future;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// One matching line reported by the literal search tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralMatch {
    /// Workspace-relative, `/`-separated
    pub path: String,
    /// 1-based
    pub line: usize,
    pub text: String,
}

/// Source of exact line matches fused into smart-mode results.
///
/// Implementations never fail: a missing tool or a bad query yields no matches.
pub trait LiteralSearch: Send + Sync {
    fn find(
        &self,
        workspace: &Path,
        query: &str,
        max_matches: usize,
    ) -> impl Future<Output = Vec<LiteralMatch>> + Send;
}

/// Runs `rg` as a subprocess in the workspace root
#[derive(Debug, Clone)]
pub struct RipgrepSearch {
    program: String,
}

impl RipgrepSearch {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for RipgrepSearch {
    fn default() -> Self {
        Self::new("rg")
    }
}

impl LiteralSearch for RipgrepSearch {
    async fn find(&self, workspace: &Path, query: &str, max_matches: usize) -> Vec<LiteralMatch> {
        if query.trim().is_empty() || max_matches == 0 {
            return Vec::new();
        }

        let output = Command::new(&self.program)
            .current_dir(workspace)
            .arg("--no-heading")
            .arg("--line-number")
            .arg("--smart-case")
            .arg("--color")
            .arg("never")
            .arg("--max-count")
            .arg(max_matches.to_string())
            .arg("--")
            .arg(query)
            .arg(".")
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                debug!("{} unavailable: {}", self.program, e);
                return Vec::new();
            }
        };

        // exit code 1 means "no matches"; anything else non-zero is an error
        if !output.status.success() {
            if output.status.code() != Some(1) {
                debug!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            return Vec::new();
        }

        parse_matches(&String::from_utf8_lossy(&output.stdout), max_matches)
    }
}

/// Parse `path:line:text` records, keeping at most `max_matches`
pub fn parse_matches(stdout: &str, max_matches: usize) -> Vec<LiteralMatch> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let path = parts.next()?;
            let line_number = parts.next()?.parse::<usize>().ok()?;
            let text = parts.next().unwrap_or("");
            if path.is_empty() || line_number == 0 {
                return None;
            }
            Some(LiteralMatch {
                path: normalize_rel_path(path),
                line: line_number,
                text: text.to_string(),
            })
        })
        .take(max_matches)
        .collect()
}

fn normalize_rel_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").to_string()
}
