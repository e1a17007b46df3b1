//! Mediagraph CLI - drive a stage graph from the command line.
//!
//! Reads a graph description and a raw input file, cuts the input into
//! fixed-size units and feeds them through a session. Output records are
//! written as JSON lines to stdout (or `--output`); logs go to stderr.

use anyhow::{bail, Context};
use clap::Parser;
use mediagraph_codec::BuiltinCodecs;
use mediagraph_core::NO_PTS;
use mediagraph_pipeline::{
    DispatchMode, GraphSpec, JsonLinesChannel, Session, SessionConfig, SharedOutput, StageRegistry,
    UnitMetadata,
};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the mediagraph tool.
#[derive(Parser, Debug)]
#[command(name = "mediagraph")]
#[command(version)]
#[command(about = "Run raw media through a tree of processing stages")]
#[command(long_about = "Mediagraph builds a stage graph from a JSON description and feeds it \
    input units cut from a file.\n\n\
    EXAMPLES:\n    \
    mediagraph --graph graph.json --input audio.pcm --chunk-size 3840 --pts-step 1800\n    \
    mediagraph --graph graph.json --input - --mode async --output records.jsonl\n    \
    mediagraph --list-stages")]
struct Args {
    /// Graph description (JSON)
    #[arg(short, long, required_unless_present = "list_stages")]
    graph: Option<PathBuf>,

    /// Input file, `-` for stdin
    #[arg(short, long, required_unless_present = "list_stages")]
    input: Option<PathBuf>,

    /// Bytes per input unit
    #[arg(long, default_value = "4096")]
    chunk_size: usize,

    /// Timestamp increment per unit, in the input time base (omit for undefined timestamps)
    #[arg(long)]
    pts_step: Option<i64>,

    /// Dispatch mode (sync, async); overrides the config file
    #[arg(short, long)]
    mode: Option<String>,

    /// Session configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write records here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the registered stages and exit
    #[arg(long)]
    list_stages: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let registry = StageRegistry::builtin();
    if args.list_stages {
        return list_stages(&registry);
    }

    let (Some(graph_path), Some(input_path)) = (&args.graph, &args.input) else {
        bail!("--graph and --input are required");
    };
    if args.chunk_size == 0 {
        bail!("--chunk-size must be positive");
    }

    let spec = GraphSpec::from_slice(&read_path(graph_path)?)
        .with_context(|| format!("invalid graph description {}", graph_path.display()))?;
    let config = load_config(&args)?;
    let input = read_path(input_path)?;

    let output = SharedOutput::new(JsonLinesChannel::new(open_output(args.output.as_deref())?));
    let mut session = Session::start(
        config.clone(),
        &spec,
        &registry,
        Arc::new(BuiltinCodecs::new()),
        output,
    )
    .context("failed to build graph")?;
    info!(
        root = %session.topology().name,
        stages = session.topology().node_count(),
        mode = %config.mode,
        "graph ready"
    );

    let start = Instant::now();
    for (index, chunk) in input.chunks(args.chunk_size).enumerate() {
        let pts = args.pts_step.map_or(NO_PTS, |step| step * index as i64);
        debug!(unit = index, pts, bytes = chunk.len(), "feeding unit");
        // The unit index travels as caller metadata so records can be matched up.
        session
            .process_frame(
                UnitMetadata::at(pts),
                (index as u64).to_le_bytes().to_vec(),
                chunk.to_vec(),
            )
            .with_context(|| format!("unit {} failed", index))?;
    }
    session.flush().context("flush failed")?;

    info!(
        units = session.units(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "done"
    );
    Ok(())
}

/// Build the session configuration from `--config` and `--mode`.
fn load_config(args: &Args) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_slice(&read_path(path)?)
            .with_context(|| format!("invalid session config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(mode) = &args.mode {
        config = config.with_mode(DispatchMode::parse(mode));
    }
    Ok(config)
}

fn read_path(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if path == Path::new("-") {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("failed to read stdin")?;
    } else {
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    Ok(bytes)
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    })
}

fn list_stages(registry: &StageRegistry) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for name in registry.names() {
        if let Some(descriptor) = registry.get(name) {
            writeln!(stdout, "{:<24} {:?}", name, descriptor.kind)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "mediagraph",
            "--graph",
            "g.json",
            "--input",
            "-",
            "--chunk-size",
            "960",
            "--pts-step",
            "900",
            "--mode",
            "async",
        ]);
        assert_eq!(args.chunk_size, 960);
        assert_eq!(args.pts_step, Some(900));
        assert_eq!(load_config(&args).unwrap().mode, DispatchMode::Async);
    }

    #[test]
    fn test_graph_and_input_required() {
        assert!(Args::try_parse_from(["mediagraph", "--graph", "g.json"]).is_err());
        assert!(Args::try_parse_from(["mediagraph", "--list-stages"]).is_ok());
    }

    #[test]
    fn test_default_config() {
        let args = Args::parse_from(["mediagraph", "-g", "g.json", "-i", "in.raw"]);
        assert_eq!(load_config(&args).unwrap(), SessionConfig::default());
        assert_eq!(args.chunk_size, 4096);
        assert!(args.pts_step.is_none());
    }
}
