//! Core data types for the reconciliation pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One trip record, normalized but not yet reconciled.
///
/// Station fields are genuinely optional: some source eras omit the id
/// columns entirely and names can be blank, so `Option` carries that through
/// rather than a magic value. `rental_id` is always present; rows without one
/// never make it out of ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRow {
    pub rental_id: i64,
    pub duration: Option<i64>,
    pub bike_id: Option<i64>,
    pub end_date: NaiveDateTime,
    pub end_station_id: Option<i64>,
    pub end_station_name: Option<String>,
    pub start_date: NaiveDateTime,
    pub start_station_id: Option<i64>,
    pub start_station_name: Option<String>,
    /// Name of the source file this row was first read from.
    pub source_file: String,
}

/// The rows of a single source file after per-file normalization.
#[derive(Debug, Clone)]
pub struct FilePiece {
    pub source_file: String,
    pub rows: Vec<TripRow>,
}

/// The canonical trip table: unique rental_id, sorted ascending.
///
/// Construction goes through [`crate::assemble::assemble`], which enforces
/// the key invariant; there is deliberately no other way to build one.
#[derive(Debug, Clone)]
pub struct TripTable {
    rows: Vec<TripRow>,
}

impl TripTable {
    pub(crate) fn from_sorted_unique(rows: Vec<TripRow>) -> Self {
        TripTable { rows }
    }

    pub fn rows(&self) -> &[TripRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a trip by rental_id. Rows are sorted, so this is a binary
    /// search.
    pub fn get(&self, rental_id: i64) -> Option<&TripRow> {
        self.rows
            .binary_search_by_key(&rental_id, |r| r.rental_id)
            .ok()
            .map(|i| &self.rows[i])
    }
}

/// Audit counters for one reconciliation run.
///
/// Silent row loss undermines trust in aggregate counts, so every filtering
/// stage records what it dropped. Logged at the end of a run and written to
/// JSON alongside the table.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanSummary {
    pub files_processed: usize,
    pub files_fallback: usize,
    pub files_failed: usize,
    pub rows_read: usize,
    pub empty_rows_dropped: usize,
    pub coercion_rows_dropped: usize,
    pub date_window_dropped: usize,
    pub blank_date_dropped: usize,
    pub missing_rental_id: usize,
    pub sentinel_id_dropped: usize,
    pub excluded_name_dropped: usize,
    pub duplicate_dropped: usize,
    pub rows_kept: usize,
}

impl CleanSummary {
    /// Adds another summary's counters into this one. Used to merge per-file
    /// counts only once a file has definitively been ingested.
    pub fn absorb(&mut self, other: &CleanSummary) {
        self.files_processed += other.files_processed;
        self.files_fallback += other.files_fallback;
        self.files_failed += other.files_failed;
        self.rows_read += other.rows_read;
        self.empty_rows_dropped += other.empty_rows_dropped;
        self.coercion_rows_dropped += other.coercion_rows_dropped;
        self.date_window_dropped += other.date_window_dropped;
        self.blank_date_dropped += other.blank_date_dropped;
        self.missing_rental_id += other.missing_rental_id;
        self.sentinel_id_dropped += other.sentinel_id_dropped;
        self.excluded_name_dropped += other.excluded_name_dropped;
        self.duplicate_dropped += other.duplicate_dropped;
        self.rows_kept += other.rows_kept;
    }
}
