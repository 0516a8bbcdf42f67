//! Loader for `.fmi` graph files.
//!
//! # File Format
//!
//! UTF-8 text. Leading blank lines and `#` comments are skipped, then:
//!
//! ```text
//! <node count N>
//! <edge count M>
//! <id> <osm_id> <lat> <lon> 0        (N node lines; fields 0, 2, 3 consumed)
//! <src> <tgt> <length_cm> <type>     (M edge lines, sorted by src; field 3 ignored)
//! ```
//!
//! Node ids are consecutive from 0. Edges grouped by source feed straight
//! into the adjacency offsets; sources with no outgoing edges get an empty
//! offset range. Every malformed line is fatal, reported with its line
//! number.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use crate::elevation::ElevationStore;
use crate::graph::{Edge, Graph};

/// Read a graph from an `.fmi` file on disk.
pub fn read_graph(path: &Path) -> Result<Graph> {
    let start = Instant::now();
    tracing::info!("reading graph file {}", path.display());

    let file = File::open(path)
        .with_context(|| format!("failed to open graph file {}", path.display()))?;
    let graph = read_graph_from(BufReader::new(file))
        .with_context(|| format!("failed to parse graph file {}", path.display()))?;

    tracing::info!(
        "graph loaded in {:.1}s: {} nodes, {} edges, ~{} MB",
        start.elapsed().as_secs_f64(),
        graph.node_count(),
        graph.edge_count(),
        graph.estimated_memory_bytes() / (1024 * 1024)
    );
    Ok(graph)
}

/// Read a graph from any buffered reader (exposed for tests).
pub fn read_graph_from<R: BufRead>(reader: R) -> Result<Graph> {
    let mut lines = reader.lines().enumerate();

    let (node_count, _) = next_count(&mut lines, "node count")?;
    let (edge_count, _) = next_count(&mut lines, "edge count")?;

    let mut graph = Graph::new(node_count, edge_count);

    // Node lines: id, osm_id, lat, lon, 0. Only positions 0, 2, 3 matter.
    for i in 0..node_count {
        let (line_no, line) = next_body_line(&mut lines)
            .with_context(|| format!("graph truncated: expected {} node lines, got {}", node_count, i))?;
        let mut fields = line.split_whitespace();

        let id: usize = parse_field(fields.next(), "node id", line_no)?;
        let _osm_id = fields.next();
        let lat: f64 = parse_field(fields.next(), "latitude", line_no)?;
        let lon: f64 = parse_field(fields.next(), "longitude", line_no)?;

        if id >= node_count {
            bail!("line {}: node id {} outside [0, {})", line_no, id, node_count);
        }
        graph.nodes[id].lat = lat;
        graph.nodes[id].lon = lon;

        if i > 0 && i % 100_000 == 0 {
            tracing::debug!("read {} nodes", i);
        }
    }

    // Edge lines: src, tgt, length_cm, type; field 3 ignored. As the source
    // id advances, offsets for all sources up to and including it are filled,
    // which covers sources with no outgoing edges.
    let mut next_offset_node = 0usize;
    for i in 0..edge_count {
        let (line_no, line) = next_body_line(&mut lines)
            .with_context(|| format!("graph truncated: expected {} edge lines, got {}", edge_count, i))?;
        let mut fields = line.split_whitespace();

        let source: usize = parse_field(fields.next(), "source id", line_no)?;
        let target: usize = parse_field(fields.next(), "target id", line_no)?;
        let length_cm: u32 = parse_field(fields.next(), "edge length", line_no)?;

        if source >= node_count {
            bail!("line {}: source id {} outside [0, {})", line_no, source, node_count);
        }
        if target >= node_count {
            bail!("line {}: target id {} outside [0, {})", line_no, target, node_count);
        }
        if source + 1 < next_offset_node {
            bail!("line {}: edges not sorted by source (source {} after {})", line_no, source, next_offset_node - 1);
        }

        for node in next_offset_node..=source {
            graph.offsets[node] = i as u32;
        }
        next_offset_node = source + 1;

        graph.edges.push(Edge {
            target: target as u32,
            length_cm,
            climb_cm: 0,
        });

        if i > 0 && i % 500_000 == 0 {
            tracing::debug!("read {} edges", i);
        }
    }

    // Trailing sources without edges, plus the final offset marker.
    for node in next_offset_node..=node_count {
        graph.offsets[node] = edge_count as u32;
    }

    Ok(graph)
}

/// Assign every node's elevation from the SRTM store, in id order. A missing
/// or corrupt tile aborts the startup phase.
pub fn assign_elevations(graph: &mut Graph, store: &mut ElevationStore) -> Result<()> {
    let start = Instant::now();
    let total = graph.node_count();

    for id in 0..total {
        let (lat, lon) = (graph.nodes[id].lat, graph.nodes[id].lon);
        graph.nodes[id].elevation_cm = store
            .elevation_cm(lat, lon)
            .with_context(|| format!("failed to resolve elevation for node {}", id))?;

        if id > 0 && id % 100_000 == 0 {
            tracing::debug!("assigned elevation for {}/{} nodes", id, total);
        }
    }

    tracing::info!(
        "node elevations assigned in {:.1}s ({} tiles cached)",
        start.elapsed().as_secs_f64(),
        store.cached_tiles()
    );
    Ok(())
}

/// Next count line, skipping blanks and `#` comments.
fn next_count<I>(lines: &mut I, what: &str) -> Result<(usize, usize)>
where
    I: Iterator<Item = (usize, std::io::Result<String>)>,
{
    for (idx, line) in lines {
        let line = line.context("I/O error while reading graph")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line_no = idx + 1;
        let count: usize = match trimmed.parse() {
            Ok(count) => count,
            Err(_) => bail!("line {}: malformed {} line '{}'", line_no, what, trimmed),
        };
        return Ok((count, line_no));
    }
    bail!("unexpected end of file before {} line", what)
}

/// Next body line. Body lines are positional, so nothing is skipped here.
fn next_body_line<I>(lines: &mut I) -> Result<(usize, String)>
where
    I: Iterator<Item = (usize, std::io::Result<String>)>,
{
    match lines.next() {
        Some((idx, line)) => Ok((idx + 1, line.context("I/O error while reading graph")?)),
        None => bail!("unexpected end of file"),
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, name: &str, line_no: usize) -> Result<T> {
    let raw = match field {
        Some(raw) => raw,
        None => bail!("line {}: missing {} field", line_no, name),
    };
    match raw.parse() {
        Ok(value) => Ok(value),
        Err(_) => bail!("line {}: non-numeric {} '{}'", line_no, name, raw),
    }
}
