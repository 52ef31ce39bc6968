//! Backfill, unattributable-record drops, and rental_id deduplication.
//!
//! The stages here have a hard ordering: backfill needs a resolved
//! [`StationDirectory`], the drops need backfilled ids, and dedup must run
//! last so the first occurrence it keeps is a fully attributed row. The
//! ordering is carried in the types — each stage consumes the previous
//! stage's output wrapper, so calling them out of order does not compile.

use std::collections::HashSet;

use crate::config::ReconConfig;
use crate::model::{CleanSummary, TripRow};
use crate::stations::StationDirectory;

/// Rows whose missing station ids and names have been filled from the
/// resolved directory where possible.
pub struct Backfilled(pub(crate) Vec<TripRow>);

/// Rows that survived the sentinel-id and exclusion-list drops.
pub struct Attributed(pub(crate) Vec<TripRow>);

/// Fills missing station ids from names and missing names from ids, in both
/// trip directions. Rows that stay unresolved keep their `None`s; the filter
/// stage decides their fate.
pub fn backfill(rows: Vec<TripRow>, directory: &StationDirectory) -> Backfilled {
    let rows = rows
        .into_iter()
        .map(|mut row| {
            if row.start_station_id.is_none() {
                if let Some(name) = row.start_station_name.as_deref() {
                    row.start_station_id = directory.lookup_id(name);
                }
            }
            if row.end_station_id.is_none() {
                if let Some(name) = row.end_station_name.as_deref() {
                    row.end_station_id = directory.lookup_id(name);
                }
            }
            if row.start_station_name.is_none() {
                if let Some(id) = row.start_station_id {
                    row.start_station_name = directory.lookup_name(id).map(str::to_string);
                }
            }
            if row.end_station_name.is_none() {
                if let Some(id) = row.end_station_id {
                    row.end_station_name = directory.lookup_name(id).map(str::to_string);
                }
            }
            row
        })
        .collect();
    Backfilled(rows)
}

/// Drops rows that cannot be safely attributed to real stations: sentinel
/// station ids, and names on the misidentification exclusion list (either
/// trip end). These records are unfixable; dropping them is deliberate data
/// policy, not error recovery.
pub fn drop_unattributable(
    rows: Backfilled,
    config: &ReconConfig,
    summary: &mut CleanSummary,
) -> Attributed {
    let mut kept = Vec::with_capacity(rows.0.len());
    for row in rows.0 {
        let sentinel = row
            .start_station_id
            .is_some_and(|id| config.is_sentinel_id(id))
            || row.end_station_id.is_some_and(|id| config.is_sentinel_id(id));
        if sentinel {
            summary.sentinel_id_dropped += 1;
            continue;
        }

        let excluded = row
            .start_station_name
            .as_deref()
            .is_some_and(|n| config.is_excluded_name(n))
            || row
                .end_station_name
                .as_deref()
                .is_some_and(|n| config.is_excluded_name(n));
        if excluded {
            summary.excluded_name_dropped += 1;
            continue;
        }

        kept.push(row);
    }
    Attributed(kept)
}

/// Removes duplicate rental_ids, keeping the first occurrence.
///
/// Source files cover overlapping time windows, so the same rental shows up
/// in more than one export — sometimes with differently rounded timestamps.
/// Matching is by id alone for exactly that reason.
pub fn dedup_by_rental_id(rows: Attributed, summary: &mut CleanSummary) -> Vec<TripRow> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(rows.0.len());
    for row in rows.0 {
        if seen.insert(row.rental_id) {
            kept.push(row);
        } else {
            summary.duplicate_dropped += 1;
        }
    }
    kept
}
