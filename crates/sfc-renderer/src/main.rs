//! sfc-renderer - service function chaining renderer
//!
//! Renders the given paths against a static topology into an in-memory flow
//! store and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use sfc_renderer::rsp::{RspProcessor, Topology};
use sfc_renderer::writer::InMemoryFlowStore;
use sfc_renderer::RendererConfig;
use sfc_types::{PathId, RenderedServicePath};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Service function chaining renderer
#[derive(Parser, Debug)]
#[command(name = "sfc-renderer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// JSON topology with forwarders and functions
    #[arg(short = 't', long)]
    topology: PathBuf,

    /// JSON file with one rendered service path or a list of them
    #[arg(short = 'r', long = "rsp")]
    rsps: Vec<PathBuf>,

    /// Path id to delete after rendering
    #[arg(short = 'd', long = "delete")]
    deletes: Vec<u32>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Shift the pipeline to coexist with another application
    #[arg(long)]
    app_coexistence: bool,

    /// Print the committed flows as JSON
    #[arg(long)]
    dump: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RspFile {
    Many(Vec<RenderedServicePath>),
    One(RenderedServicePath),
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_rsps(path: &Path) -> Result<Vec<RenderedServicePath>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: RspFile =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match parsed {
        RspFile::Many(rsps) => rsps,
        RspFile::One(rsp) => vec![rsp],
    })
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RendererConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RendererConfig::default(),
    };
    if args.app_coexistence {
        config.pipeline.app_coexistence = true;
        config.validate().context("validating config")?;
    }

    init_logging(
        args.log_level.as_deref().unwrap_or(&config.logging.level),
        args.json_logs || config.logging.json,
    );

    info!("--- Starting sfc-renderer ---");

    let topology = Topology::load(&args.topology)
        .with_context(|| format!("loading topology {}", args.topology.display()))?;
    info!(
        forwarders = topology.forwarders.len(),
        functions = topology.functions.len(),
        "Topology loaded"
    );

    let store = Arc::new(InMemoryFlowStore::new());
    let processor = RspProcessor::from_config(&config, Arc::new(topology), store.clone())
        .with_commit_wait(true);

    let mut failed = 0usize;
    for path in &args.rsps {
        for rsp in load_rsps(path)? {
            match processor.process_rsp(&rsp).await {
                Ok(outcome) => info!(
                    path = %outcome.path_id,
                    state = %outcome.state,
                    flows = outcome.flows,
                    nodes = outcome.nodes.len(),
                    "Rendered path"
                ),
                Err(e) => {
                    failed += 1;
                    error!(path = %rsp.path_id, error = %e, "Failed to render path");
                }
            }
        }
    }

    for id in &args.deletes {
        let path = PathId::new(*id);
        match processor.delete_rsp(path).await {
            Ok(nodes) => info!(%path, nodes = nodes.len(), "Deleted path"),
            Err(e) => warn!(%path, error = %e, "Failed to delete path"),
        }
    }

    processor.drain().await?;
    let stats = processor.writer_stats().await;
    let dropped = processor.shutdown(config.shutdown_timeout()).await;

    info!(
        rendered = processor.rendered_paths().await.len(),
        failed,
        flows = store.len(),
        committed_batches = stats.committed_batches,
        failed_batches = stats.failed_batches,
        dropped,
        "Renderer finished"
    );

    if args.dump {
        println!("{}", serde_json::to_string_pretty(&store.flows())?);
    }

    if failed > 0 {
        anyhow::bail!("{} path(s) failed to render", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sfc-renderer: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
