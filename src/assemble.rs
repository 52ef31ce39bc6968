//! Assembly of the canonical trip table from per-file pieces.

use tracing::info;

use crate::config::ReconConfig;
use crate::dedup;
use crate::error::ReconError;
use crate::model::{CleanSummary, FilePiece, TripTable};
use crate::stations::StationDirectory;

/// Concatenates all pieces and runs the reconciliation pipeline:
/// backfill → unattributable drops → rental_id dedup → sort.
///
/// A duplicate rental_id surviving dedup means the pipeline itself is broken,
/// so that check fails loudly instead of being patched over.
pub fn assemble(
    pieces: Vec<FilePiece>,
    directory: &StationDirectory,
    config: &ReconConfig,
    summary: &mut CleanSummary,
) -> Result<TripTable, ReconError> {
    let rows: Vec<_> = pieces.into_iter().flat_map(|p| p.rows).collect();

    let backfilled = dedup::backfill(rows, directory);
    let attributed = dedup::drop_unattributable(backfilled, config, summary);
    let mut rows = dedup::dedup_by_rental_id(attributed, summary);

    rows.sort_by_key(|r| r.rental_id);
    for pair in rows.windows(2) {
        if pair[0].rental_id == pair[1].rental_id {
            return Err(ReconError::DuplicateKey {
                rental_id: pair[0].rental_id,
            });
        }
    }

    summary.rows_kept = rows.len();
    info!(
        rows = rows.len(),
        duplicates_dropped = summary.duplicate_dropped,
        excluded_dropped = summary.excluded_name_dropped,
        sentinel_dropped = summary.sentinel_id_dropped,
        "Trip table assembled"
    );

    Ok(TripTable::from_sorted_unique(rows))
}
