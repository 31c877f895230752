//! # ingest-files CLI
//!
//! ```bash
//! ingest-files [--config ingest.toml] <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest-files serve` | Watch `[watch].dir` and serve `GET /healthz` until Ctrl-C |
//! | `ingest-files ingest <PATH>...` | Ingest files or directories once and exit |
//!
//! Every setting can also come from the environment (`WATCH_DIR`,
//! `VECTOR_DB_URL`, `ROUTER_URL`, `LLM_ROUTER_API_KEY`, ...), which takes
//! precedence over the file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use ingest_files::chunk::{Chunker, Cl100kTokenizer};
use ingest_files::config::{self, Config};
use ingest_files::dispatch::{Dispatcher, Summary};
use ingest_files::embedding::RouterClient;
use ingest_files::processor::{FileProcessor, PreviewProcessor, ProcessFile};
use ingest_files::store::PgChunkStore;
use ingest_files::watcher::{self, DirectoryWatcher};
use ingest_files::{logging, server};

/// Watch a folder and load new documents into a vector store.
#[derive(Parser)]
#[command(name = "ingest-files", version)]
struct Cli {
    /// Path to a TOML configuration file. Optional; defaults and
    /// environment variables are used without it.
    #[arg(long, global = true, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured directory and ingest new files until Ctrl-C.
    ///
    /// In-flight files are finished before exit; files still settling are
    /// dropped.
    Serve,

    /// Ingest the given files and directories once, then exit.
    ///
    /// Directories are walked recursively with the same extension and
    /// exclude rules the watcher applies. Exits non-zero if any file failed.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Extract and chunk only. No router calls, no database writes.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Serve => run_serve(&cfg).await,
        Commands::Ingest { paths, dry_run } => run_ingest(&cfg, &paths, dry_run).await,
    }
}

fn build_chunker(cfg: &Config) -> Result<Chunker> {
    let tokenizer = Cl100kTokenizer::new().context("failed to load cl100k_base tokenizer")?;
    Ok(Chunker::new(
        Arc::new(tokenizer),
        cfg.chunking.max_tokens,
        cfg.chunking.overlap_tokens,
    )?)
}

fn build_processor(cfg: &Config, store: Arc<PgChunkStore>) -> Result<FileProcessor> {
    let embedder = RouterClient::new(&cfg.router)?;
    tracing::debug!(
        token_url = embedder.token_url(),
        embed_url = embedder.embed_url(),
        "router configured"
    );
    Ok(FileProcessor::new(build_chunker(cfg)?, Arc::new(embedder), store))
}

async fn run_serve(cfg: &Config) -> Result<()> {
    let store = Arc::new(PgChunkStore::new(cfg.require_db_url()?, &cfg.db)?);
    let processor = build_processor(cfg, store.clone())?;
    let dispatcher = Dispatcher::new(Arc::new(processor), cfg.watch.concurrency);
    let watcher = DirectoryWatcher::new(&cfg.watch, dispatcher)?;

    let listener = server::bind(&cfg.server.bind).await?;
    let health = tokio::spawn(server::serve(listener, shutdown_signal()));

    watcher.run_until(shutdown_signal()).await;
    store.close().await;

    health.await.context("health server task failed")??;
    Ok(())
}

async fn run_ingest(cfg: &Config, paths: &[PathBuf], dry_run: bool) -> Result<()> {
    let files = watcher::scan_paths(paths, &cfg.watch.exclude_globs)?;
    if files.is_empty() {
        println!("No supported files found.");
        return Ok(());
    }

    let mut store = None;
    let handler: Arc<dyn ProcessFile> = if dry_run {
        Arc::new(PreviewProcessor::new(build_chunker(cfg)?))
    } else {
        let pg = Arc::new(PgChunkStore::new(cfg.require_db_url()?, &cfg.db)?);
        store = Some(pg.clone());
        Arc::new(build_processor(cfg, pg)?)
    };

    println!("Ingesting {} file(s)...", files.len());
    let mut dispatcher = Dispatcher::new(handler, cfg.watch.concurrency);
    for file in files {
        dispatcher.admit(file).await;
    }
    let summary = dispatcher.drain().await;

    if let Some(store) = store {
        store.close().await;
    }

    print_summary(&summary, dry_run);
    if summary.failed > 0 {
        bail!("{} of {} file(s) failed", summary.failed, summary.files());
    }
    Ok(())
}

fn print_summary(summary: &Summary, dry_run: bool) {
    if dry_run {
        println!("Dry run:");
        println!("  files previewed: {}", summary.previewed);
        println!("  chunks:          {}", summary.chunks);
    } else {
        println!("Ingest complete:");
        println!("  files ingested: {}", summary.ingested);
        println!("  chunks written: {}", summary.chunks);
    }
    println!("  empty files:    {}", summary.empty);
    println!("  failed files:   {}", summary.failed);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
