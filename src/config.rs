//! Curated reconciliation configuration.
//!
//! The alternatives table, the misidentification exclusion list, and the
//! sentinel ids are static data about the upstream bike-share exports,
//! maintained by hand as defects are discovered. They are compiled in but
//! carried on an explicit `ReconConfig` value that is passed by reference
//! into every stage, never read through a module global.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Canonical column vocabulary, paired with the header synonyms seen across
/// source eras. The first synonym found in a file's header wins. Values under
/// `Total duration (ms)` are converted to seconds during ingestion.
pub static COLUMN_ALTERNATIVES: &[(&str, &[&str])] = &[
    ("Rental Id", &["Number"]),
    ("Duration", &["Duration_Seconds", "Total duration (ms)"]),
    ("Bike Id", &["Bike number"]),
    ("End Date", &["End date"]),
    ("EndStation Id", &["End station number", "End Station Id"]),
    ("EndStation Name", &["End station", "End Station Name"]),
    ("Start Date", &["Start date"]),
    ("StartStation Id", &["Start station number", "Start Station Id"]),
    ("StartStation Name", &["Start station", "Start Station Name"]),
];

/// Station names known to have been wrongly assigned an id shared with a
/// different physical station. Records carrying any of these names cannot be
/// attributed safely and are dropped.
pub static MISIDENTIFIED_NAMES: &[&str] = &[
    "Columbia Road Market, Weavers",
    "Exhibition Road Museums, South Kensington",
    "Pop Up Dock 1",
    "Pop Up Dock 2",
    "Tabletop1",
    "Tabletop2",
];

/// Station ids that are placeholders rather than real docks. Seen where the
/// upstream system recorded a workshop or test value instead of a station.
pub static SENTINEL_STATION_IDS: &[i64] = &[0];

/// Immutable configuration for one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconConfig {
    /// (canonical header, synonyms) pairs.
    pub column_alternatives: Vec<(String, Vec<String>)>,
    /// Misidentification exclusion list.
    pub excluded_names: HashSet<String>,
    /// Known-invalid numeric station ids.
    pub sentinel_station_ids: Vec<i64>,
    /// Trips before this date are nonsense (scheme launch).
    pub earliest_plausible: NaiveDate,
}

impl ReconConfig {
    /// The built-in curated configuration.
    pub fn builtin() -> Self {
        ReconConfig {
            column_alternatives: COLUMN_ALTERNATIVES
                .iter()
                .map(|(canon, alts)| {
                    (
                        (*canon).to_string(),
                        alts.iter().map(|a| (*a).to_string()).collect(),
                    )
                })
                .collect(),
            excluded_names: MISIDENTIFIED_NAMES.iter().map(|n| (*n).to_string()).collect(),
            sentinel_station_ids: SENTINEL_STATION_IDS.to_vec(),
            earliest_plausible: NaiveDate::from_ymd_opt(2010, 7, 30)
                .unwrap_or(NaiveDate::MIN),
        }
    }

    /// True if `name` is on the misidentification exclusion list.
    pub fn is_excluded_name(&self, name: &str) -> bool {
        self.excluded_names.contains(name)
    }

    /// True if `id` is a known-invalid sentinel.
    pub fn is_sentinel_id(&self, id: i64) -> bool {
        self.sentinel_station_ids.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_canonical_columns() {
        let config = ReconConfig::builtin();
        assert_eq!(config.column_alternatives.len(), 9);
        let canonical: Vec<_> = config
            .column_alternatives
            .iter()
            .map(|(c, _)| c.as_str())
            .collect();
        assert!(canonical.contains(&"Rental Id"));
        assert!(canonical.contains(&"StartStation Name"));
    }

    #[test]
    fn test_exclusion_lookup() {
        let config = ReconConfig::builtin();
        assert!(config.is_excluded_name("Tabletop1"));
        assert!(!config.is_excluded_name("Abbey Road"));
    }

    #[test]
    fn test_sentinel_lookup() {
        let config = ReconConfig::builtin();
        assert!(config.is_sentinel_id(0));
        assert!(!config.is_sentinel_id(101));
    }
}
