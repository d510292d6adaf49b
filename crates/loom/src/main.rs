//! Command-line token tree explorer.
//!
//! Loads a tokenizer and bigram logits table from a model directory, expands
//! the prompt to the requested depth and width, and prints the tree as JSON.

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use loom::config::LoomConfig;
use loom::model::CandleBackend;
use loom::Loom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_NODES: usize = 100_000;

/// Expand the most probable continuations of a prompt into a token tree.
#[derive(Parser, Debug)]
#[command(name = "loom", version)]
#[command(about = "Build a tree of the W most probable continuations of a prompt, D tokens deep")]
struct Cli {
    /// Directory holding tokenizer.json and the safetensors logits table.
    #[arg(short, long)]
    model: PathBuf,

    /// Prompt the tree grows from.
    #[arg(short, long, default_value = "The meaning of life is")]
    prompt: String,

    /// Maximum depth (tokens added past the prompt) [default: 3]
    #[arg(short, long)]
    depth: Option<usize>,

    /// Children per expanded node [default: 3]
    #[arg(short, long)]
    width: Option<usize>,

    /// JSON config file; command-line flags take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum sequences per model call.
    #[arg(long)]
    max_batch_size: Option<usize>,

    /// Refuse to start if the tree could exceed this many nodes [default: 100000]
    #[arg(long)]
    max_nodes: Option<usize>,

    /// Prepend the tokenizer's BOS token to the prompt.
    #[arg(long)]
    bos: bool,

    /// Write the tree here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn loom_config(&self) -> Result<LoomConfig> {
        let mut config = match &self.config {
            Some(path) => LoomConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => LoomConfig::default(),
        };
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if self.max_batch_size.is_some() {
            config.max_batch_size = self.max_batch_size;
        }
        config.max_nodes = self.max_nodes.or(config.max_nodes).or(Some(DEFAULT_MAX_NODES));
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.loom_config()?;

    info!("Loading model from {}", cli.model.display());
    let backend = CandleBackend::bigram_from_dir(&cli.model, Device::Cpu)
        .with_context(|| format!("failed to load model from {}", cli.model.display()))?
        .with_bos(cli.bos);
    if cli.bos && backend.tokenizer().bos_token_id().is_none() {
        warn!("--bos given but the tokenizer has no BOS token");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let loom = Loom::builder()
        .config(config)
        .backend(backend)
        .prompt(cli.prompt.clone())
        .stop_flag(stop.clone())
        .build()?;

    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing current batch");
                stop.store(true, Ordering::Relaxed);
            }
        }
    });

    info!("Starting loom...");
    let (loom, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = loom.run();
        (loom, outcome)
    })
    .await
    .context("tree builder thread panicked")?;

    // Emit whatever was built before reporting a failure.
    let json = loom.to_json()?;
    match &cli.output {
        Some(path) => std::fs::write(path, &json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    let stats = outcome?;
    info!(
        nodes = loom.store().len(),
        batches = stats.batches,
        stopped_early = stats.stopped_early,
        "done"
    );
    Ok(())
}
