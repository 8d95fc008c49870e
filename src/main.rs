//! # Vectorizer CLI
//!
//! Command-line entry point for the vectorization pipeline. Selects the run
//! mode and sink targets, wires up telemetry and a Ctrl-C handler, then
//! drives one orchestrated run and prints a summary.
//!
//! Exit codes: 0 on normal completion (including an empty queue), nonzero
//! when initialization fails.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use vectorizer::config::{RunMode, SinkTarget, VectorizerConfig};
use vectorizer::orchestrator::RunSummary;
use vectorizer::{pipeline, telemetry};

#[derive(Parser, Debug)]
#[command(author, version, about = "Resilient batch vectorization pipeline", long_about = None)]
struct Cli {
    /// Vectorization mode (auto picks instant or bulk from queue depth)
    #[arg(short, long, default_value = "auto", value_parser = ["auto", "instant", "bulk"])]
    mode: String,

    /// Maximum batches for bulk mode
    #[arg(short, long, default_value = "10")]
    batches: usize,

    /// Write target
    #[arg(short, long, default_value = "both", value_parser = ["relational", "vector", "both"])]
    target: String,

    /// Path to the work queue database
    #[arg(long, default_value = "queue.db")]
    queue_db: PathBuf,

    /// Path to the vector store database
    #[arg(long, default_value = "vectors.db")]
    store_db: PathBuf,

    /// Optional JSON configuration file overlaying the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving daily-rolled JSON run logs
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _telemetry = telemetry::init_tracing(cli.log_dir.as_deref());

    let mut config = match &cli.config {
        Some(path) => VectorizerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => VectorizerConfig::default(),
    };
    config.batch.bulk_max_batches = cli.batches;

    let mode = RunMode::parse(&cli.mode)?;
    let target = SinkTarget::parse(&cli.target)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nshutdown requested, finishing current item...");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let mut orchestrator = pipeline::initialize(
        &config,
        cli.queue_db.to_str().context("queue path is not UTF-8")?,
        cli.store_db.to_str().context("store path is not UTF-8")?,
        target,
        shutdown,
    )
    .await
    .context("vectorizer initialization failed")?;

    let summary = orchestrator.run(mode).await;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "=".repeat(60));
    println!("VECTORIZATION COMPLETE ({} mode)", summary.mode);
    println!("{}", "=".repeat(60));
    println!("  processed:            {}", summary.total_processed);
    println!("  queue remaining:      {}", summary.queue_remaining);
    println!(
        "  embeddings generated: {}",
        summary.stats.embeddings_generated
    );
    println!("  cache hits:           {}", summary.stats.cache_hits);
    println!("  embedding errors:     {}", summary.stats.embedding_errors);
    println!("  empty inputs:         {}", summary.stats.empty_inputs);
    println!("  circuit trips:        {}", summary.circuit_trips);
    println!("  relational writes:    {}", summary.relational_writes);
    println!("  vector writes:        {}", summary.vector_writes);
    println!("  dlq recovered:        {}", summary.dlq_recovered);
    if summary.dlq_remaining > 0 {
        println!(
            "  dlq remaining:        {} (will retry next run)",
            summary.dlq_remaining
        );
    }
    println!("{}", "=".repeat(60));
}
