//! Command-line interface: benchmark harness, HTTP server, consistency check.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hdrhistogram::Histogram;
use rand::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::dijkstra::{DijkstraEngine, QueryStats};
use crate::elevation::ElevationStore;
use crate::fmi;
use crate::graph::Graph;
use crate::nearest::nearest_node_coordinates;
use crate::server;

#[derive(Parser)]
#[command(name = "velo-route")]
#[command(about = "Climb-aware bicycle routing over .fmi road graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a graph and run the benchmark phases.
    ///
    /// Query costs go to stdout, one per line (-1 for unreachable), so the
    /// output is byte-compatible with .sol files. All timing diagnostics go
    /// to stderr.
    Bench {
        /// Graph file (.fmi)
        #[arg(long)]
        graph: PathBuf,

        /// SRTM tile directory (default: `srtm` next to the graph file)
        #[arg(long)]
        srtm: Option<PathBuf>,

        /// Query file (.que): one `src tgt weight` triple per line
        #[arg(long)]
        que: Option<PathBuf>,

        /// Latitude for a nearest-node lookup (requires --lon)
        #[arg(long)]
        lat: Option<f64>,

        /// Longitude for a nearest-node lookup (requires --lat)
        #[arg(long)]
        lon: Option<f64>,

        /// Source node for a one-to-all run
        #[arg(short, long)]
        source: Option<u32>,

        /// Weight for the one-to-all run
        #[arg(long, default_value = "1.0")]
        weight: f64,
    },

    /// Load a graph and serve the interactive HTTP API.
    Serve {
        /// Graph file (.fmi)
        #[arg(long)]
        graph: PathBuf,

        /// SRTM tile directory (default: `srtm` next to the graph file)
        #[arg(long)]
        srtm: Option<PathBuf>,

        /// Port to listen on (default: first free port from 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of static front-end files
        #[arg(long, default_value = "web")]
        web_dir: PathBuf,

        /// Log format: text or json
        #[arg(long, default_value = "text")]
        log_format: String,
    },

    /// Cross-check one-to-one against one-to-all on random pairs.
    Validate {
        /// Graph file (.fmi)
        #[arg(long)]
        graph: PathBuf,

        /// SRTM tile directory (default: `srtm` next to the graph file)
        #[arg(long)]
        srtm: Option<PathBuf>,

        /// Number of random source nodes
        #[arg(long, default_value = "4")]
        n_sources: usize,

        /// Number of random targets per source
        #[arg(long, default_value = "64")]
        n_targets: usize,

        /// Weight to check at
        #[arg(long, default_value = "0.5")]
        weight: f64,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

/// Initialize structured logging with tracing.
///
/// Diagnostics go to stderr so benchmark stdout stays byte-clean. Respects
/// RUST_LOG for filtering (default: `info`).
pub fn init_tracing(log_format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
}

impl Cli {
    /// Log format requested on the command line (`text` unless `serve`
    /// asked for something else). Read before the subscriber is installed.
    pub fn log_format(&self) -> &str {
        match &self.command {
            Commands::Serve { log_format, .. } => log_format,
            _ => "text",
        }
    }

    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Bench {
                graph,
                srtm,
                que,
                lat,
                lon,
                source,
                weight,
            } => run_bench(&graph, srtm, que, lat, lon, source, weight),

            Commands::Serve {
                graph,
                srtm,
                port,
                web_dir,
                log_format: _,
            } => {
                let graph = load_graph(&graph, srtm)?;
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(server::serve(graph, port, web_dir))
            }

            Commands::Validate {
                graph,
                srtm,
                n_sources,
                n_targets,
                weight,
                seed,
            } => run_validate(&graph, srtm, n_sources, n_targets, weight, seed),
        }
    }
}

/// Full startup sequence: parse the graph, assign node elevations from SRTM,
/// recompute edge climbs, sweep the invariants. Strictly ordered; any failure
/// aborts startup.
pub fn load_graph(graph_path: &Path, srtm_dir: Option<PathBuf>) -> Result<Graph> {
    let srtm_dir = srtm_dir.unwrap_or_else(|| default_srtm_dir(graph_path));

    let mut graph = fmi::read_graph(graph_path)?;

    let mut store = ElevationStore::new(&srtm_dir);
    fmi::assign_elevations(&mut graph, &mut store)
        .with_context(|| format!("elevation assignment from {}", srtm_dir.display()))?;

    let start = Instant::now();
    graph.update_edge_climbs();
    tracing::info!("edge climbs updated in {:.1}s", start.elapsed().as_secs_f64());

    graph.validate().context("graph invariant check failed")?;
    Ok(graph)
}

/// Default tile directory: a sibling of the graph file named `srtm`.
fn default_srtm_dir(graph_path: &Path) -> PathBuf {
    graph_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("srtm")
}

fn run_bench(
    graph_path: &Path,
    srtm: Option<PathBuf>,
    que: Option<PathBuf>,
    lat: Option<f64>,
    lon: Option<f64>,
    source: Option<u32>,
    weight: f64,
) -> Result<()> {
    let load_start = Instant::now();
    let graph = load_graph(graph_path, srtm)?;
    eprintln!("\tgraph read took {}ms", load_start.elapsed().as_millis());

    let mut engine = DijkstraEngine::new(graph.node_count());

    if let (Some(lat), Some(lon)) = (lat, lon) {
        let find_start = Instant::now();
        let (node_lat, node_lon) = nearest_node_coordinates(&graph, lat, lon);
        eprintln!(
            "\tfinding node took {}ms: {} {}",
            find_start.elapsed().as_millis(),
            node_lat,
            node_lon
        );
    }

    if let Some(que_path) = que {
        process_queries(&graph, &mut engine, &que_path)?;
    }

    if let Some(source) = source {
        if source as usize >= graph.node_count() {
            bail!("one-to-all source {} outside [0, {})", source, graph.node_count());
        }
        let all_start = Instant::now();
        engine.one_to_all(&graph, source, weight);
        let reached = engine.distances().iter().filter(|&&d| d != u64::MAX).count();
        eprintln!(
            "\tone-to-all from {} at weight {} took {}ms ({} nodes reached)",
            source,
            weight,
            all_start.elapsed().as_millis(),
            reached
        );
        let stats = engine.stats();
        eprintln!(
            "\tone-to-all counters: pops={} pushes={} relaxations={}",
            stats.pops, stats.pushes, stats.relaxations
        );
    }

    Ok(())
}

/// Run every query in a `.que` file, printing exactly one cost per line to
/// stdout. Latency percentiles and averaged engine counters land on stderr
/// afterwards.
fn process_queries(graph: &Graph, engine: &mut DijkstraEngine, que_path: &Path) -> Result<()> {
    let file = File::open(que_path)
        .with_context(|| format!("failed to open query file {}", que_path.display()))?;
    let reader = BufReader::new(file);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let mut hist = Histogram::<u64>::new(3)?;
    let mut n_queries = 0usize;
    let mut total = QueryStats::default();
    let batch_start = Instant::now();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("I/O error while reading query file")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let line_no = idx + 1;
        let mut fields = trimmed.split_whitespace();
        let source: u32 = parse_query_field(fields.next(), "source", line_no)?;
        let target: u32 = parse_query_field(fields.next(), "target", line_no)?;
        let weight: f64 = parse_query_field(fields.next(), "weight", line_no)?;

        if source as usize >= graph.node_count() || target as usize >= graph.node_count() {
            bail!("query line {}: node id outside [0, {})", line_no, graph.node_count());
        }

        let query_start = Instant::now();
        let cost = engine.one_to_one(graph, source, target, weight);
        hist.record(query_start.elapsed().as_micros() as u64)?;
        n_queries += 1;

        let stats = engine.stats();
        total.pops += stats.pops;
        total.pushes += stats.pushes;
        total.relaxations += stats.relaxations;

        writeln!(out, "{}", cost)?;
    }
    out.flush()?;

    eprintln!(
        "\tprocessing .que file took {}ms ({} queries)",
        batch_start.elapsed().as_millis(),
        n_queries
    );
    if n_queries > 0 {
        eprintln!(
            "\tquery latency us: p50={} p95={} p99={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.max()
        );
        let n = n_queries as u64;
        eprintln!(
            "\tper-query counters (avg): pops={} pushes={} relaxations={}",
            total.pops / n,
            total.pushes / n,
            total.relaxations / n
        );
    }

    Ok(())
}

fn parse_query_field<T: std::str::FromStr>(
    field: Option<&str>,
    name: &str,
    line_no: usize,
) -> Result<T> {
    let raw = match field {
        Some(raw) => raw,
        None => bail!("query line {}: missing {} field", line_no, name),
    };
    match raw.parse() {
        Ok(value) => Ok(value),
        Err(_) => bail!("query line {}: non-numeric {} '{}'", line_no, name, raw),
    }
}

/// Seeded random cross-check of the two engine entry points: for each random
/// source, a one-to-all run must agree with one-to-one for every sampled
/// target. Exits non-zero on the first mismatch.
fn run_validate(
    graph_path: &Path,
    srtm: Option<PathBuf>,
    n_sources: usize,
    n_targets: usize,
    weight: f64,
    seed: u64,
) -> Result<()> {
    let graph = load_graph(graph_path, srtm)?;
    let n = graph.node_count() as u32;

    let mut all = DijkstraEngine::new(graph.node_count());
    let mut one = DijkstraEngine::new(graph.node_count());
    let mut rng = StdRng::seed_from_u64(seed);

    let mut checked = 0usize;
    for i in 0..n_sources {
        let source = rng.gen_range(0..n);
        let start = Instant::now();
        all.one_to_all(&graph, source, weight);
        eprintln!(
            "\t[{}/{}] one-to-all from {} took {}ms",
            i + 1,
            n_sources,
            source,
            start.elapsed().as_millis()
        );

        for _ in 0..n_targets {
            let target = rng.gen_range(0..n);
            let expected = all.distance(target);
            let actual = one.one_to_one(&graph, source, target, weight);
            if expected != actual {
                bail!(
                    "consistency violation: {} -> {} at weight {}: one-to-all {} vs one-to-one {}",
                    source,
                    target,
                    weight,
                    expected,
                    actual
                );
            }
            checked += 1;
        }
    }

    eprintln!("\tvalidated {} pairs, all consistent", checked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_srtm_dir_is_sibling() {
        assert_eq!(
            default_srtm_dir(Path::new("/data/bw-bicycle.fmi")),
            PathBuf::from("/data/srtm")
        );
        assert_eq!(default_srtm_dir(Path::new("graph.fmi")), PathBuf::from("srtm"));
    }

    #[test]
    fn test_cli_parses_bench_flags() {
        let cli = Cli::try_parse_from([
            "velo-route",
            "bench",
            "--graph",
            "bw.fmi",
            "--que",
            "bw.que",
            "--lat",
            "48.5",
            "--lon",
            "9.1",
            "-s",
            "12345",
            "--weight",
            "0.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Bench {
                graph,
                que,
                lat,
                lon,
                source,
                weight,
                ..
            } => {
                assert_eq!(graph, PathBuf::from("bw.fmi"));
                assert_eq!(que, Some(PathBuf::from("bw.que")));
                assert_eq!(lat, Some(48.5));
                assert_eq!(lon, Some(9.1));
                assert_eq!(source, Some(12345));
                assert_eq!(weight, 0.5);
            }
            _ => panic!("expected bench subcommand"),
        }
    }

    #[test]
    fn test_cli_requires_graph() {
        assert!(Cli::try_parse_from(["velo-route", "bench"]).is_err());
    }
}
