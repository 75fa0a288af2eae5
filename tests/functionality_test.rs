use codesift::search::fusion::grep_hits;
use codesift::storage::store::canonicalize_workspace;
use codesift::{
    discover_files, Config, HitSource, LiteralMatch, LiteralSearch, Result, SearchEngine,
    SearchMode, SearchRequest, SearchSettings,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// In-process stand-in for ripgrep with `--smart-case` semantics
struct ScanGrep;

impl LiteralSearch for ScanGrep {
    async fn find(&self, workspace: &Path, query: &str, max_matches: usize) -> Vec<LiteralMatch> {
        let case_sensitive = query.chars().any(char::is_uppercase);
        let needle = if case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };

        let mut matches = Vec::new();
        for file in discover_files(workspace).unwrap_or_default() {
            let Ok(text) = fs::read_to_string(&file.path) else {
                continue;
            };
            for (i, line) in text.lines().enumerate() {
                let haystack = if case_sensitive {
                    line.to_string()
                } else {
                    line.to_lowercase()
                };
                if haystack.contains(&needle) {
                    matches.push(LiteralMatch {
                        path: file.relative_path.clone(),
                        line: i + 1,
                        text: line.to_string(),
                    });
                }
            }
        }
        matches.truncate(max_matches);
        matches
    }
}

fn legacy_source() -> String {
    let mut text = String::new();
    for i in 0..60 {
        if i == 30 {
            text.push_str("  legacy.computeTotal(cart);\n");
        }
        text.push_str(&format!("  word{:03} alpha{:03}\n", i, i));
    }
    text
}

fn setup_workspace() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("shop");
    fs::create_dir_all(&root).unwrap();

    fs::write(
        root.join("a.ts"),
        "export function computeTotal(items) {\n  return items.length;\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("b.ts"),
        "const amount = computeTotal(x);\n\nQuarterly revenue summary for regional sales teams.\n",
    )
    .unwrap();
    fs::write(root.join("legacy.ts"), legacy_source()).unwrap();

    let root = canonicalize_workspace(&root).unwrap();
    (temp_dir, root)
}

fn engine(temp_dir: &TempDir) -> Result<SearchEngine<ScanGrep>> {
    let config = Config::new(Some(temp_dir.path().join("home")))?;
    config.init()?;
    SearchEngine::with_literal_search(&config, SearchSettings::default(), ScanGrep)
}

#[tokio::test]
async fn test_semantic_search_finds_definition_and_call_site() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let engine = engine(&tmp)?;

    let response = engine
        .search(SearchRequest::new(&root, "computeTotal").with_mode(SearchMode::Semantic))
        .await?;
    assert!(!response.from_index);

    let paths: Vec<&str> = response.hits.iter().map(|h| h.path.as_str()).collect();
    assert!(paths.contains(&"a.ts"), "hits: {:?}", paths);
    assert!(paths.contains(&"b.ts"), "hits: {:?}", paths);
    // one mention among a hundred other tokens stays under the threshold
    assert!(!paths.contains(&"legacy.ts"));

    for hit in &response.hits {
        assert_eq!(hit.source, HitSource::Semantic);
        assert!(hit.score > 0.2);
    }
    for pair in response.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    Ok(())
}

#[tokio::test]
async fn test_smart_search_adds_literal_lines() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let engine = engine(&tmp)?;

    let response = engine
        .search(SearchRequest::new(&root, "computeTotal").with_mode(SearchMode::Smart))
        .await?;

    let legacy = response
        .hits
        .iter()
        .find(|h| h.path == "legacy.ts")
        .expect("grep line from legacy.ts");
    assert_eq!(legacy.source, HitSource::Grep);
    assert_eq!((legacy.start_line, legacy.end_line), (31, 31));
    assert!(legacy.snippet.contains("legacy.computeTotal(cart)"));
    assert!(legacy.absolute_path.ends_with("legacy.ts"));

    assert!(response.hits.iter().any(|h| h.source == HitSource::Semantic));
    assert!(response.hits.len() <= engine.settings().default_limit);
    for pair in response.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    Ok(())
}

#[tokio::test]
async fn test_matching_spans_fuse_into_one_hybrid_hit() -> Result<()> {
    let (tmp, root) = setup_workspace();
    fs::write(root.join("one.ts"), "computeTotal(order)\n")?;
    let engine = engine(&tmp)?;

    let semantic = engine
        .search(SearchRequest::new(&root, "computeTotal").with_mode(SearchMode::Semantic))
        .await?;
    let semantic_score = semantic
        .hits
        .iter()
        .find(|h| h.path == "one.ts")
        .map(|h| h.score)
        .expect("semantic hit for one.ts");

    let matches = ScanGrep.find(&root, "computeTotal", 64).await;
    let grep_score = grep_hits(&matches, &root, 0.2)
        .into_iter()
        .find(|h| h.path == "one.ts")
        .map(|h| h.score)
        .expect("grep hit for one.ts");

    let smart = engine
        .search(SearchRequest::new(&root, "computeTotal").with_mode(SearchMode::Smart))
        .await?;
    let one: Vec<_> = smart.hits.iter().filter(|h| h.path == "one.ts").collect();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].source, HitSource::Hybrid);
    assert_eq!((one[0].start_line, one[0].end_line), (1, 1));
    assert!((one[0].score - semantic_score.max(grep_score)).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn test_scores_stay_in_unit_range() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let engine = engine(&tmp)?;

    for query in ["computeTotal", "revenue summary", "word001 alpha001", "items"] {
        for mode in [SearchMode::Semantic, SearchMode::Smart] {
            let response = engine
                .search(
                    SearchRequest::new(&root, query)
                        .with_mode(mode)
                        .with_min_score(0.0),
                )
                .await?;
            for hit in &response.hits {
                assert!(
                    (0.0..=1.0).contains(&hit.score),
                    "{} scored {} for {:?}",
                    hit.path,
                    hit.score,
                    query
                );
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_request_limits_are_clamped() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let engine = engine(&tmp)?;

    let response = engine
        .search(
            SearchRequest::new(&root, "computeTotal")
                .with_limit(0)
                .with_min_score(0.0),
        )
        .await?;
    assert_eq!(response.hits.len(), 1);

    let response = engine
        .search(
            SearchRequest::new(&root, "word")
                .with_limit(1000)
                .with_min_score(-3.0),
        )
        .await?;
    assert!(response.hits.len() <= engine.settings().max_limit);

    let response = engine.search(SearchRequest::new(&root, "   ")).await?;
    assert!(response.hits.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_status_and_remove_index() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let engine = engine(&tmp)?;

    let status = engine.get_status(&root).await?;
    assert!(!status.exists);
    assert!(!status.indexing);
    assert_eq!(status.total_files, None);

    let stats = engine.index_workspace(&root).await?;
    assert_eq!(stats.total_files, 3);

    let status = engine.get_status(&root).await?;
    assert!(status.exists);
    assert!(!status.indexing);
    assert_eq!(status.total_files, Some(3));
    assert_eq!(status.total_chunks, Some(stats.total_chunks));
    assert!(status.indexed_at.is_some());
    assert_eq!(status.last_error, None);

    assert!(engine.remove_index(&root).await?);
    assert!(!engine.get_status(&root).await?.exists);
    assert!(!engine.remove_index(&root).await?);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_index_is_rebuilt_on_search() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let engine = engine(&tmp)?;

    let index_path = engine.store().index_path(&root);
    fs::write(&index_path, "{\"version\": 1, \"chunks\": [")?;
    assert!(!engine.get_status(&root).await?.exists);

    let response = engine
        .search(SearchRequest::new(&root, "computeTotal").with_mode(SearchMode::Semantic))
        .await?;
    assert!(!response.from_index);
    assert!(!response.hits.is_empty());
    assert!(engine.store().load(&root).is_some());
    Ok(())
}

#[tokio::test]
async fn test_edited_file_is_picked_up_by_later_search() -> Result<()> {
    let (tmp, root) = setup_workspace();
    let config = Config::new(Some(tmp.path().join("home")))?;
    config.init()?;
    let settings = SearchSettings {
        freshness_interval: std::time::Duration::ZERO,
        ..SearchSettings::default()
    };
    let engine = SearchEngine::with_literal_search(&config, settings, ScanGrep)?;

    engine.index_workspace(&root).await?;
    fs::write(
        root.join("c.ts"),
        "export function applyDiscount(price, coupon) {\n  return price - coupon;\n}\n",
    )?;

    let response = engine
        .search(SearchRequest::new(&root, "applyDiscount").with_mode(SearchMode::Semantic))
        .await?;
    assert!(response.auto_refreshed);
    assert_eq!(response.hits.first().map(|h| h.path.as_str()), Some("c.ts"));
    Ok(())
}
