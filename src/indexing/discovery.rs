use crate::core::config::MAX_FILE_BYTES;
use crate::core::error::{Error, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Directory names whose whole subtree is never indexed.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "bower_components",
    "dist",
    "build",
    "out",
    "target",
    ".next",
    ".nuxt",
    ".turbo",
    ".cache",
    "coverage",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".idea",
    ".vscode",
    ".gradle",
];

/// Extension whitelist paired with the language reported for matching chunks.
const LANGUAGES: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("rs", "rust"),
    ("py", "python"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("swift", "swift"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("scala", "scala"),
    ("lua", "lua"),
    ("dart", "dart"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("sql", "sql"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("less", "less"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("graphql", "graphql"),
    ("proto", "protobuf"),
    ("md", "markdown"),
    ("mdx", "markdown"),
    ("txt", "text"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("ini", "ini"),
    ("xml", "xml"),
];

/// A file eligible for indexing, with the fingerprint used for reuse decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Workspace-relative path, always `/`-separated
    pub relative_path: String,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub modified_ms: u64,
}

/// Enumerate every indexable file under `root`, sorted by relative path.
///
/// Excluded directories are pruned before descent. Files outside the extension
/// whitelist or above [`MAX_FILE_BYTES`] are left out. Entries that cannot be
/// stat'ed are skipped rather than failing the walk.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(Error::InvalidWorkspace(format!(
            "Directory does not exist: {}",
            root.display()
        )));
    }

    if !root.is_dir() {
        return Err(Error::InvalidWorkspace(format!(
            "Path is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();

    // Only the fixed rules apply; .gitignore and hidden-file filtering are off.
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && entry.depth() > 0 && is_excluded_dir(&entry.file_name().to_string_lossy()))
        })
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skipping unreadable entry: {}", err);
                continue;
            }
        };

        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        if language_for_path(path).is_none() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!("skipping {}: {}", path.display(), err);
                continue;
            }
        };

        if metadata.len() > MAX_FILE_BYTES {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            relative_path: normalize_relative(relative),
            size: metadata.len(),
            modified_ms,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Check if a directory name belongs to the fixed exclusion set
pub fn is_excluded_dir(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Language of an indexable file, or `None` when its extension is not whitelisted
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
}

fn normalize_relative(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
