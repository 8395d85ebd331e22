use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::chunker::chunk_chapter;
use crate::citations::Citation;
use crate::config::Config;
use crate::database::sqlite::{QueryLog, QueryRecord};
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::generation::ChatClient;
use crate::index::SearchFilter;
use crate::index::qdrant::QdrantIndex;
use crate::orchestrator::{Orchestrator, QueryMode, QueryOutcome};
use crate::parser::chapter_number_from_path;
use crate::tokenizer::HeuristicTokenizer;

/// Write a default config file if none exists yet, or show the active one.
#[inline]
pub fn configure(show: bool) -> Result<()> {
    if show {
        return crate::config::show_config();
    }

    let config = Config::load_default()?;
    let config_path = config.base_dir.join("config.toml");
    if config_path.exists() {
        println!("Configuration already exists: {}", config_path.display());
        println!("Edit the file directly, or run 'textbook-rag config --show' to inspect it.");
    } else {
        config.save()?;
        println!("Wrote default configuration to {}", config_path.display());
    }
    Ok(())
}

/// Create the passage collection in the vector store.
#[inline]
pub fn init(recreate: bool) -> Result<()> {
    let config = Config::load_default()?;
    let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)?;

    if recreate {
        warn!("Recreating collection; all indexed passages will be lost");
    }
    index.create_collection(recreate)?;
    println!(
        "Collection '{}' is ready ({}-dimensional, cosine distance)",
        index.collection_name(),
        config.embedder.dimension
    );
    Ok(())
}

/// Chunk, embed, and index Markdown chapter files.
///
/// `path` may be one file or a directory of `.md` files. Files whose
/// chapter number cannot be determined are skipped with a warning;
/// one bad file never aborts the rest of the ingestion.
#[inline]
pub fn ingest(path: PathBuf, chapter_override: Option<u32>) -> Result<()> {
    let config = Config::load_default()?;
    let embedder = EmbeddingClient::new(&config.embedder)?;
    let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)?;
    index.create_collection(false)?;

    let files = collect_markdown_files(&path)?;
    if files.is_empty() {
        bail!("No .md files found at {}", path.display());
    }

    info!("Ingesting {} files from {}", files.len(), path.display());
    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );

    let mut total_passages = 0;
    let mut skipped = 0;

    for file in &files {
        let name = file
            .file_name()
            .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().to_string());
        progress.set_message(name.clone());

        match ingest_file(file, chapter_override, &config, &embedder, &index) {
            Ok(count) => {
                total_passages += count;
            }
            Err(e) => {
                error!("Skipping {}: {}", file.display(), e);
                skipped += 1;
            }
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    println!(
        "Ingested {} passages from {} files ({} skipped)",
        total_passages,
        files.len() - skipped,
        skipped
    );
    Ok(())
}

fn ingest_file(
    file: &Path,
    chapter_override: Option<u32>,
    config: &Config,
    embedder: &EmbeddingClient,
    index: &QdrantIndex,
) -> Result<usize> {
    let chapter = match chapter_override {
        Some(n) => n,
        None => chapter_number_from_path(file)
            .with_context(|| format!("Cannot determine chapter number for {}", file.display()))?,
    };

    let markdown = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let source_document = file
        .file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().to_string());

    let passages = chunk_chapter(
        &markdown,
        chapter,
        &source_document,
        config.chunking,
        &HeuristicTokenizer,
    );
    if passages.is_empty() {
        warn!("{} produced no passages", file.display());
        return Ok(0);
    }

    let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
    let vectors = embedder.embed_many(&texts)?;
    let stored = index.upsert(&passages, &vectors)?;

    info!(
        "Indexed {} passages from {} (chapter {})",
        stored,
        file.display(),
        chapter
    );
    Ok(stored)
}

fn collect_markdown_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} is neither a file nor a directory", path.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();
    Ok(files)
}

/// Answer a question from the indexed textbook.
#[inline]
pub async fn ask(question: String, chapter: Option<u32>, section: Option<String>) -> Result<()> {
    let config = Config::load_default()?;
    let embedder = EmbeddingClient::new(&config.embedder)?;
    let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)?;
    let generator = ChatClient::new(&config.generation)?;
    let orchestrator = Orchestrator::new(
        &embedder,
        &index,
        &generator,
        &HeuristicTokenizer,
        &config,
    );

    let filter = SearchFilter { chapter, section };
    let started = Instant::now();
    let result = orchestrator.answer_question(&question, &filter);
    let elapsed_ms = started.elapsed().as_millis() as i64;

    log_query(&config, &question, QueryMode::Global, elapsed_ms, &result).await;
    let outcome = result?;

    print_outcome(&outcome);
    Ok(())
}

/// Answer a question scoped to a selected span of text read from a file.
#[inline]
pub async fn ask_selected(question: String, file: PathBuf) -> Result<()> {
    let selected_text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read selection from {}", file.display()))?;

    let config = Config::load_default()?;
    let embedder = EmbeddingClient::new(&config.embedder)?;
    let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)?;
    let generator = ChatClient::new(&config.generation)?;
    let orchestrator = Orchestrator::new(
        &embedder,
        &index,
        &generator,
        &HeuristicTokenizer,
        &config,
    );

    let started = Instant::now();
    let result = orchestrator.answer_about_selection(&question, &selected_text);
    let elapsed_ms = started.elapsed().as_millis() as i64;

    log_query(
        &config,
        &question,
        QueryMode::SelectedText,
        elapsed_ms,
        &result,
    )
    .await;
    let outcome = result?;

    print_outcome(&outcome);
    Ok(())
}

/// Show service health, index size, and recent queries.
#[inline]
pub async fn status() -> Result<()> {
    let config = Config::load_default()?;
    let embedder = EmbeddingClient::new(&config.embedder)?;
    let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)?;

    let embedder_ok = embedder.health_check();
    let store_ok = index.health_check();
    println!(
        "Embedding service: {}",
        if embedder_ok { "ok" } else { "unreachable" }
    );
    println!(
        "Vector store:      {}",
        if store_ok { "ok" } else { "unreachable" }
    );

    if store_ok {
        match index.count() {
            Ok(count) => println!(
                "Indexed passages:  {} (collection '{}')",
                count,
                index.collection_name()
            ),
            Err(e) => println!("Indexed passages:  unavailable ({})", e),
        }
    }

    match QueryLog::connect(&config.database_path()).await {
        Ok(log) => {
            let total = log.count().await.unwrap_or(0);
            println!("Logged queries:    {}", total);
            let recent = log.recent(5).await.unwrap_or_default();
            if !recent.is_empty() {
                println!("Recent queries:");
                for record in &recent {
                    println!(
                        "  [{}] {} ({} ms, {} chunks{})",
                        record.mode,
                        record.query_text,
                        record.response_time_ms,
                        record.chunk_count,
                        record
                            .error
                            .as_deref()
                            .map_or_else(String::new, |e| format!(", error: {}", e)),
                    );
                }
            }
        }
        Err(e) => println!("Query log:         unavailable ({})", e),
    }

    Ok(())
}

// The log's chunk_count is the number of passages retrieval supplied,
// not the number that ended up cited.
fn query_record_for(
    question: &str,
    mode: QueryMode,
    elapsed_ms: i64,
    result: &crate::Result<QueryOutcome>,
) -> QueryRecord {
    let (chunk_count, error) = match result {
        Ok(outcome) => (outcome.retrieved_count() as i64, None),
        Err(e) => (0, Some(e.to_string())),
    };
    QueryRecord::new(question, mode, elapsed_ms, chunk_count, error)
}

// Best effort: a logging failure must never fail the query itself.
async fn log_query(
    config: &Config,
    question: &str,
    mode: QueryMode,
    elapsed_ms: i64,
    result: &crate::Result<QueryOutcome>,
) {
    let record = query_record_for(question, mode, elapsed_ms, result);

    match QueryLog::connect(&config.database_path()).await {
        Ok(log) => {
            if let Err(e) = log.record(&record).await {
                warn!("Failed to log query: {}", e);
            }
        }
        Err(e) => warn!("Failed to open query log: {}", e),
    }
}

fn print_outcome(outcome: &QueryOutcome) {
    println!("{}", outcome.answer());

    let citations = outcome.citations();
    if !citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in citations.iter().enumerate() {
            print_citation(i + 1, citation);
        }
    }
}

fn print_citation(position: usize, citation: &Citation) {
    println!(
        "  {}. {} (score {:.2})",
        position, citation.source, citation.relevance_score
    );
}
