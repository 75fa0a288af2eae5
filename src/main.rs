use anyhow::{Context, Result};
use clap::Parser;
use codesift::ui::cli::{Cli, Commands};
use codesift::{Config, IndexStatus, SearchEngine, SearchRequest, SearchResponse, SearchSettings};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::new(cli.base_dir.clone())?;
    config
        .init()
        .with_context(|| format!("Failed to create {}", config.base_dir.display()))?;
    let engine = SearchEngine::new(&config, SearchSettings::default())?;

    match cli.command {
        Commands::Status { path, json } => handle_status(&engine, &path, json).await,
        Commands::Index { path, json } => handle_index(&engine, &path, json).await,
        Commands::Search {
            path,
            query,
            limit,
            min_score,
            mode,
            json,
        } => {
            let request = SearchRequest {
                workspace_path: path,
                query,
                limit,
                min_score,
                mode: Some(mode.into()),
            };
            handle_search(&engine, request, json).await
        }
        Commands::Clear { path } => handle_clear(&engine, &path).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "codesift=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_status(engine: &SearchEngine, path: &Path, json: bool) -> Result<()> {
    let status = engine.get_status(path).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    print_status(path, &status);
    Ok(())
}

async fn handle_index(engine: &SearchEngine, path: &Path, json: bool) -> Result<()> {
    let stats = engine
        .index_workspace(path)
        .await
        .with_context(|| format!("Indexing {} failed", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Indexed {}", path.display());
    println!("  Files:  {}", stats.total_files);
    println!("  Chunks: {}", stats.total_chunks);
    println!(
        "  Reused: {}  Updated: {}  Removed: {}",
        stats.reused_files, stats.updated_files, stats.removed_files
    );
    println!("  Took:   {:.2}s", stats.duration_ms as f64 / 1000.0);
    Ok(())
}

async fn handle_search(engine: &SearchEngine, request: SearchRequest, json: bool) -> Result<()> {
    let response = engine.search(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    print_results(&response);
    Ok(())
}

async fn handle_clear(engine: &SearchEngine, path: &Path) -> Result<()> {
    if engine.remove_index(path).await? {
        println!("Removed index for {}", path.display());
    } else {
        println!("No index for {}", path.display());
    }
    Ok(())
}

fn print_status(path: &Path, status: &IndexStatus) {
    if !status.exists {
        println!("{} is not indexed", path.display());
    } else {
        println!(
            "{}: {} files, {} chunks",
            path.display(),
            status.total_files.unwrap_or(0),
            status.total_chunks.unwrap_or(0)
        );
    }
    if status.indexing {
        println!("  (indexing in progress)");
    }
    if let Some(err) = &status.last_error {
        println!("  Last error: {}", err);
    }
}

fn print_results(response: &SearchResponse) {
    if response.hits.is_empty() {
        println!("No results for \"{}\".", response.query);
        return;
    }

    println!(
        "{} results for \"{}\" ({}ms{})",
        response.hits.len(),
        response.query,
        response.took_ms,
        if response.auto_refreshed { ", index refreshed" } else { "" }
    );
    for (i, hit) in response.hits.iter().enumerate() {
        println!(
            "\n{}. {}:{}-{} [{:?}] (score: {:.3})",
            i + 1,
            hit.path,
            hit.start_line,
            hit.end_line,
            hit.source,
            hit.score
        );
        for line in hit.snippet.lines().take(4) {
            println!("   {}", line);
        }
    }
}
