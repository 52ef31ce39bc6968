//! Per-file ingestion: column normalization, row filtering, type coercion.
//!
//! Every source file gets the strict reader first. Files whose headers cannot
//! be mapped onto the full canonical schema come back as
//! [`IngestError::SchemaMismatch`] and are re-read by the relaxed reader,
//! which tolerates absent station-id columns and leaves ids to be backfilled
//! from names during assembly.
//!
//! Files are ISO-8859-2 encoded; bytes are decoded up front and the CSV
//! reader runs over the decoded text.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::config::ReconConfig;
use crate::error::IngestError;
use crate::model::{CleanSummary, FilePiece, TripRow};
use crate::stations::StationRegistry;
use crate::timeparse;

/// Indices of the canonical columns within one file's header, after applying
/// the alternative-names table. `None` means the column is absent from the
/// file under every known name.
#[derive(Debug, Default)]
struct ColumnIndices {
    rental_id: Option<usize>,
    duration: Option<usize>,
    /// The duration column matched the millisecond-denominated synonym and
    /// its values need converting to seconds.
    duration_in_ms: bool,
    bike_id: Option<usize>,
    end_date: Option<usize>,
    end_station_id: Option<usize>,
    end_station_name: Option<usize>,
    start_date: Option<usize>,
    start_station_id: Option<usize>,
    start_station_name: Option<usize>,
}

impl ColumnIndices {
    /// The first canonical column missing from the strict schema, if any.
    fn missing_for_strict(&self) -> Option<&'static str> {
        let required = [
            (self.rental_id, "Rental Id"),
            (self.duration, "Duration"),
            (self.bike_id, "Bike Id"),
            (self.end_date, "End Date"),
            (self.end_station_id, "EndStation Id"),
            (self.end_station_name, "EndStation Name"),
            (self.start_date, "Start Date"),
            (self.start_station_id, "StartStation Id"),
            (self.start_station_name, "StartStation Name"),
        ];
        required.iter().find(|(idx, _)| idx.is_none()).map(|(_, name)| *name)
    }

    /// The first column missing that even the relaxed reader cannot do
    /// without: timestamps and station names.
    fn missing_for_relaxed(&self) -> Option<&'static str> {
        let required = [
            (self.end_date, "End Date"),
            (self.end_station_name, "EndStation Name"),
            (self.start_date, "Start Date"),
            (self.start_station_name, "StartStation Name"),
        ];
        required.iter().find(|(idx, _)| idx.is_none()).map(|(_, name)| *name)
    }
}

/// Maps a raw header onto canonical column indices. Exact canonical names
/// win; otherwise the first known alternative present in the header is used.
/// Columns outside the canonical vocabulary are simply never referenced,
/// which is how they get dropped.
fn map_columns(headers: &StringRecord, config: &ReconConfig) -> ColumnIndices {
    let positions: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();

    let find = |canonical: &str| -> Option<usize> {
        if let Some(&i) = positions.get(canonical) {
            return Some(i);
        }
        let (_, alternatives) = config
            .column_alternatives
            .iter()
            .find(|(c, _)| c == canonical)?;
        alternatives
            .iter()
            .find_map(|alt| positions.get(alt.as_str()).copied())
    };

    let duration = find("Duration");
    let duration_in_ms = duration
        .and_then(|i| headers.get(i))
        .is_some_and(|h| h.trim() == "Total duration (ms)");

    ColumnIndices {
        rental_id: find("Rental Id"),
        duration,
        duration_in_ms,
        bike_id: find("Bike Id"),
        end_date: find("End Date"),
        end_station_id: find("EndStation Id"),
        end_station_name: find("EndStation Name"),
        start_date: find("Start Date"),
        start_station_id: find("StartStation Id"),
        start_station_name: find("StartStation Name"),
    }
}

/// Integer coercion tolerant of the float-formatted ids some eras exported
/// (`"123.0"`). Empty and non-numeric values are `None`.
fn coerce_int(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

fn field<'r>(record: &'r StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
}

fn nonempty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn decode_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let (text, _, _) = encoding_rs::ISO_8859_2.decode(&bytes);
    Ok(text.into_owned())
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Strict reader: requires the full canonical schema.
///
/// Rows that are entirely empty are dropped as blank-row padding. Rows whose
/// rental_id or station ids fail integer coercion are dropped individually
/// and counted; a header that cannot be mapped fails the whole file with
/// [`IngestError::SchemaMismatch`] so the caller can route it to
/// [`read_trip_file_relaxed`].
pub fn read_trip_file(
    path: &Path,
    config: &ReconConfig,
    summary: &mut CleanSummary,
) -> Result<FilePiece, IngestError> {
    let text = decode_file(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns = map_columns(reader.headers()?, config);
    if let Some(missing) = columns.missing_for_strict() {
        return Err(IngestError::SchemaMismatch {
            path: path.to_path_buf(),
            missing: missing.to_string(),
        });
    }

    read_rows(path, &mut reader, &columns, config, summary, true)
}

/// Relaxed fallback reader for problem files.
///
/// Only timestamps and station names are required; station ids are taken
/// where a column exists and left `None` otherwise, to be backfilled from
/// the resolved station directory during assembly. Rows without a rental_id
/// are dropped and counted, since rental_id is the table key.
pub fn read_trip_file_relaxed(
    path: &Path,
    config: &ReconConfig,
    summary: &mut CleanSummary,
) -> Result<FilePiece, IngestError> {
    let text = decode_file(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns = map_columns(reader.headers()?, config);
    if let Some(missing) = columns.missing_for_relaxed() {
        return Err(IngestError::SchemaMismatch {
            path: path.to_path_buf(),
            missing: missing.to_string(),
        });
    }

    read_rows(path, &mut reader, &columns, config, summary, false)
}

fn read_rows(
    path: &Path,
    reader: &mut csv::Reader<&[u8]>,
    columns: &ColumnIndices,
    config: &ReconConfig,
    summary: &mut CleanSummary,
    strict: bool,
) -> Result<FilePiece, IngestError> {
    let source_file = source_name(path);
    let mut rows = Vec::new();
    // Counters go to a local summary first; a file that errors out (and may
    // be retried on the fallback path) must not leave half its rows counted.
    let mut local = CleanSummary::default();
    // Date formats are inferred from the first data row, per column.
    let mut end_format = None;
    let mut start_format = None;

    for result in reader.records() {
        let record = result?;
        local.rows_read += 1;

        if record.iter().all(|f| f.trim().is_empty()) {
            local.empty_rows_dropped += 1;
            continue;
        }

        let end_raw = field(&record, columns.end_date).unwrap_or("");
        let start_raw = field(&record, columns.start_date).unwrap_or("");
        if end_raw.trim().is_empty() || start_raw.trim().is_empty() {
            // A blank timestamp spoils only its own row; format inference
            // waits for the first row that actually carries dates.
            local.blank_date_dropped += 1;
            continue;
        }
        let end_fmt = *end_format.get_or_insert_with(|| timeparse::infer_format(end_raw));
        let start_fmt = *start_format.get_or_insert_with(|| timeparse::infer_format(start_raw));

        let end_date = timeparse::parse_minute(end_raw, end_fmt)?;
        let start_date = timeparse::parse_minute(start_raw, start_fmt)?;
        if !timeparse::within_window(end_date, config) || !timeparse::within_window(start_date, config)
        {
            local.date_window_dropped += 1;
            continue;
        }

        let rental_id = match coerce_int(field(&record, columns.rental_id)) {
            Some(id) => id,
            None => {
                if strict {
                    local.coercion_rows_dropped += 1;
                } else {
                    local.missing_rental_id += 1;
                }
                continue;
            }
        };

        let end_station_id = coerce_int(field(&record, columns.end_station_id));
        let start_station_id = coerce_int(field(&record, columns.start_station_id));
        if strict && (end_station_id.is_none() || start_station_id.is_none()) {
            // Strict files declare id columns; a value that will not coerce
            // is the historical non-numeric sentinel or similar garbage.
            local.coercion_rows_dropped += 1;
            continue;
        }

        rows.push(TripRow {
            rental_id,
            duration: coerce_int(field(&record, columns.duration))
                .map(|d| if columns.duration_in_ms { d / 1000 } else { d }),
            bike_id: coerce_int(field(&record, columns.bike_id)),
            end_date,
            end_station_id,
            end_station_name: nonempty(field(&record, columns.end_station_name)),
            start_date,
            start_station_id,
            start_station_name: nonempty(field(&record, columns.start_station_name)),
            source_file: source_file.clone(),
        });
    }

    if strict && rows.is_empty() && local.coercion_rows_dropped > 0 {
        // Coercion failed for every row: the column itself is bad, not a few
        // values in it. Let the caller retry on the fallback path.
        return Err(IngestError::TypeCoercion {
            path: path.to_path_buf(),
        });
    }

    summary.absorb(&local);
    debug!(path = %path.display(), rows = rows.len(), strict, "File ingested");
    Ok(FilePiece { source_file, rows })
}

/// Result of ingesting a whole folder of exports.
pub struct IngestOutcome {
    pub pieces: Vec<FilePiece>,
    pub registry: StationRegistry,
    pub summary: CleanSummary,
}

/// Ingests every `.csv` under `dir` in sorted filename order.
///
/// Strict-path failures with a schema mismatch are retried on the relaxed
/// path; files failing both paths (or failing on a date-format mismatch) are
/// logged and skipped without aborting the batch. Station names are
/// accumulated from every surviving piece.
pub fn ingest_folder(
    dir: &Path,
    limit: Option<usize>,
    config: &ReconConfig,
) -> Result<IngestOutcome, IngestError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    paths.sort();
    if let Some(limit) = limit {
        paths.truncate(limit);
    }

    let mut summary = CleanSummary::default();
    let mut registry = StationRegistry::new();
    let mut pieces = Vec::new();
    let mut problem_paths = Vec::new();

    for path in &paths {
        info!(path = %path.display(), "Processing");
        match read_trip_file(path, config, &mut summary) {
            Ok(piece) => {
                registry.collect_names(&piece.rows);
                pieces.push(piece);
                summary.files_processed += 1;
            }
            Err(IngestError::SchemaMismatch { missing, .. }) => {
                warn!(path = %path.display(), missing, "Schema mismatch, deferring to fallback");
                problem_paths.push(path.clone());
            }
            Err(IngestError::TypeCoercion { .. }) => {
                warn!(path = %path.display(), "File-wide coercion failure, deferring to fallback");
                problem_paths.push(path.clone());
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "File ingestion failed");
                summary.files_failed += 1;
            }
        }
    }

    // Problem files are handled after the clean ones so the station registry
    // already holds the names needed to backfill their missing ids.
    for path in &problem_paths {
        info!(path = %path.display(), "Processing on fallback path");
        match read_trip_file_relaxed(path, config, &mut summary) {
            Ok(piece) => {
                registry.collect_names(&piece.rows);
                pieces.push(piece);
                summary.files_fallback += 1;
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Fallback ingestion failed");
                summary.files_failed += 1;
            }
        }
    }

    Ok(IngestOutcome {
        pieces,
        registry,
        summary,
    })
}
