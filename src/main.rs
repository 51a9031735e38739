//! lspgraph - Entry Point
//!
//! Parses arguments, sets up logging, runs the selected extraction mode,
//! and emits the edge set as tab-separated lines (and optionally as a
//! Graphviz dot file).

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lspgraph::graph::{
    Direction, EdgeSet, HarvestOptions, ReferenceHarvester, TraverseOptions, harvest_calls,
    traverse,
};

/// Extraction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// References-based crawl (precise, `invoke` edges).
    Refs,
    /// Definition-based scan (fast, lossy, `called` edges).
    Calls,
    /// Depth-limited expansion from seed entities.
    Traverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Downstream,
    Upstream,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Downstream => Direction::Downstream,
            DirectionArg::Upstream => Direction::Upstream,
            DirectionArg::Both => Direction::Both,
        }
    }
}

/// Call-graph and cross-reference extractor driving external language servers.
#[derive(Parser, Debug)]
#[command(name = "lspgraph")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root directory to analyze.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Extraction mode.
    #[arg(short, long, value_enum, default_value_t = Mode::Refs)]
    mode: Mode,

    /// Restrict the crawl to one entity name.
    #[arg(long)]
    entity: Option<String>,

    /// Keep edges whose reference site has no enclosing function.
    #[arg(long)]
    keep_unenclosed: bool,

    /// Seed entities for traversal (bare name or path:name).
    #[arg(long)]
    seeds: Vec<String>,

    /// Traversal depth.
    #[arg(long, default_value_t = 1)]
    depth: u32,

    /// Traversal direction.
    #[arg(long, value_enum, default_value_t = DirectionArg::Downstream)]
    direction: DirectionArg,

    /// Also write the edges to a Graphviz dot file.
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lspgraph={level}")));

    // Logs go to stderr; stdout carries the edge lines.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Writes the edge set as a Graphviz digraph.
fn write_dot(path: &PathBuf, edges: &EdgeSet) -> Result<()> {
    let mut out = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writeln!(out, "digraph invocations {{")?;
    for edge in edges {
        writeln!(out, "    \"{}\" -> \"{}\";", edge.source, edge.target)?;
    }
    writeln!(out, "}}")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.parse_log_level()?;
    init_tracing(log_level)?;

    info!(
        path = %args.path.display(),
        mode = ?args.mode,
        "starting extraction"
    );

    let edges = match args.mode {
        Mode::Refs => {
            let options = HarvestOptions {
                entity: args.entity.clone(),
                keep_unenclosed: args.keep_unenclosed,
            };
            ReferenceHarvester::new(&args.path, options)
                .harvest()
                .await
                .context("reference crawl failed")?
        }
        Mode::Calls => harvest_calls(&args.path)
            .await
            .context("call-graph extraction failed")?,
        Mode::Traverse => {
            let options = TraverseOptions {
                direction: args.direction.into(),
                depth: args.depth,
                ..Default::default()
            };
            traverse(&args.path, &args.seeds, &options)
                .await
                .context("traversal failed")?
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for edge in &edges {
        writeln!(out, "{edge}")?;
    }

    if let Some(dot) = &args.dot {
        write_dot(dot, &edges)?;
        info!("wrote {} edges to {}", edges.len(), dot.display());
    }

    Ok(())
}
