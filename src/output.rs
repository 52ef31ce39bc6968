//! Persistence for the reconciliation products.
//!
//! The canonical trip table goes to CSV, the station all-names map and the
//! run summary to JSON, and the flow network to an edges CSV plus an
//! annotated node-info JSON. Everything is a portable structured format so
//! downstream visualisation tooling can consume it without this crate.

use std::fs;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::model::{CleanSummary, TripTable};
use crate::network::{FlowEdge, NodeInfo};
use crate::stations::StationRegistry;

/// Writes the canonical trip table as CSV with a header row.
pub fn write_trip_table(path: &Path, table: &TripTable) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating trip table at {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().from_writer(file);
    for row in table.rows() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = table.len(), "Trip table written");
    Ok(())
}

/// Reads a previously written trip table back, re-checking the key invariant.
pub fn read_trip_table(path: &Path) -> Result<TripTable> {
    let file =
        File::open(path).with_context(|| format!("opening trip table at {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    rows.sort_by_key(|r: &crate::model::TripRow| r.rental_id);
    for pair in rows.windows(2) {
        if pair[0].rental_id == pair[1].rental_id {
            bail!(
                "trip table at {} has duplicate rental_id {}",
                path.display(),
                pair[0].rental_id
            );
        }
    }
    Ok(TripTable::from_sorted_unique(rows))
}

/// Writes the station id → all-observed-names map as JSON, names sorted.
pub fn write_station_names(path: &Path, registry: &StationRegistry) -> Result<()> {
    let text = serde_json::to_string_pretty(registry.allnames())?;
    fs::write(path, text)
        .with_context(|| format!("writing station names to {}", path.display()))?;
    info!(path = %path.display(), stations = registry.allnames().len(), "Station names written");
    Ok(())
}

/// Writes the audit summary as JSON.
pub fn write_summary(path: &Path, summary: &CleanSummary) -> Result<()> {
    let text = serde_json::to_string_pretty(summary)?;
    fs::write(path, text).with_context(|| format!("writing summary to {}", path.display()))?;
    Ok(())
}

/// Writes the directed flow edges as CSV.
pub fn write_flow_edges(path: &Path, edges: &[FlowEdge]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating edges file at {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().from_writer(file);
    for edge in edges {
        writer.serialize(edge)?;
    }
    writer.flush()?;
    info!(path = %path.display(), edges = edges.len(), "Flow edges written");
    Ok(())
}

/// Writes annotated node info (coordinates, size, community) as JSON.
pub fn write_node_info(path: &Path, nodes: &[NodeInfo]) -> Result<()> {
    let text = serde_json::to_string_pretty(nodes)?;
    fs::write(path, text).with_context(|| format!("writing node info to {}", path.display()))?;
    info!(path = %path.display(), nodes = nodes.len(), "Node info written");
    Ok(())
}
