//! Station identity resolution.
//!
//! The upstream system never versioned station names: the same dock shows up
//! across the years under renames, punctuation variants, and suffixes, and a
//! handful of ids were reused for genuinely different stations. The registry
//! accumulates every name ever observed per id, then resolves one canonical
//! name per id and an inverted name→id map used to backfill records from
//! files that lack id columns.
//!
//! Accumulation is a per-id set union: commutative, associative, and
//! idempotent, so files can be processed in any order (or in parallel and
//! merged) with identical results.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use crate::config::ReconConfig;
use crate::model::TripRow;

/// Accumulates the all-names set for every station id seen so far.
#[derive(Debug, Default, Clone)]
pub struct StationRegistry {
    allnames: BTreeMap<i64, BTreeSet<String>>,
}

impl StationRegistry {
    pub fn new() -> Self {
        StationRegistry::default()
    }

    /// Records one (id, name) observation.
    pub fn add(&mut self, id: i64, name: &str) {
        self.allnames
            .entry(id)
            .or_default()
            .insert(name.to_string());
    }

    /// Records every (id, name) pair present in `rows`, both trip ends.
    pub fn collect_names(&mut self, rows: &[TripRow]) {
        for row in rows {
            if let (Some(id), Some(name)) = (row.start_station_id, row.start_station_name.as_deref())
            {
                self.add(id, name);
            }
            if let (Some(id), Some(name)) = (row.end_station_id, row.end_station_name.as_deref()) {
                self.add(id, name);
            }
        }
    }

    /// Set-union merge of another registry, for map-reduce style ingestion.
    pub fn merge(&mut self, other: StationRegistry) {
        for (id, names) in other.allnames {
            self.allnames.entry(id).or_default().extend(names);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allnames.is_empty()
    }

    /// The accumulated id → all-names map.
    pub fn allnames(&self) -> &BTreeMap<i64, BTreeSet<String>> {
        &self.allnames
    }

    /// Resolves the registry into canonical lookups.
    ///
    /// For each id, names on the misidentification exclusion list are
    /// filtered out first; if that empties the set the unfiltered set is used
    /// instead, so an id whose every observed name is excluded still gets a
    /// canonical name. The canonical name is the lexicographic minimum of the
    /// surviving set.
    pub fn resolve(&self, config: &ReconConfig) -> StationDirectory {
        let mut id_to_name = HashMap::new();
        let mut name_to_id: HashMap<String, i64> = HashMap::new();

        for (&id, names) in &self.allnames {
            let filtered: BTreeSet<&String> = names
                .iter()
                .filter(|n| !config.is_excluded_name(n))
                .collect();
            let chosen: Vec<&String> = if filtered.is_empty() {
                names.iter().collect()
            } else {
                filtered.into_iter().collect()
            };

            // BTreeSet iteration is sorted, so the first element is the
            // lexicographic minimum.
            if let Some(first) = chosen.first() {
                id_to_name.insert(id, (*first).clone());
            }

            for name in chosen {
                if let Some(&previous) = name_to_id.get(name) {
                    if previous != id {
                        // Genuine upstream renumbering not covered by the
                        // exclusion list. Ids are iterated ascending, so the
                        // highest id wins, deterministically. Pending a
                        // decision from the data owners.
                        warn!(
                            name = %name,
                            previous_id = previous,
                            new_id = id,
                            "station name observed under multiple ids"
                        );
                    }
                }
                name_to_id.insert(name.clone(), id);
            }
        }

        StationDirectory {
            id_to_name,
            name_to_id,
        }
    }
}

/// Resolved bidirectional station lookups. Misses return `None`, never panic.
#[derive(Debug, Default, Clone)]
pub struct StationDirectory {
    id_to_name: HashMap<i64, String>,
    name_to_id: HashMap<String, i64>,
}

impl StationDirectory {
    pub fn lookup_id(&self, name: &str) -> Option<i64> {
        self.name_to_id.get(name).copied()
    }

    pub fn lookup_name(&self, id: i64) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }
}

/// Shortens a canonical station name for display: everything after the first
/// `;`, `,` or `:` is dropped.
pub fn display_name(name: &str) -> String {
    name.split([';', ',', ':'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconConfig {
        ReconConfig::builtin()
    }

    #[test]
    fn test_accumulation_is_idempotent() {
        let mut once = StationRegistry::new();
        once.add(1, "Abbey Road");
        once.add(1, "Abbey Road, St John's Wood");

        let mut twice = once.clone();
        twice.add(1, "Abbey Road");
        twice.add(1, "Abbey Road, St John's Wood");

        assert_eq!(once.allnames(), twice.allnames());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = StationRegistry::new();
        a.add(1, "Abbey Road");
        a.add(2, "Baker Street");

        let mut b = StationRegistry::new();
        b.add(1, "Abbey Road (REMOVED)");
        b.add(3, "Camden Lock");

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab.allnames(), ba.allnames());
        let config = config();
        let dir_ab = ab.resolve(&config);
        let dir_ba = ba.resolve(&config);
        assert_eq!(dir_ab.lookup_name(1), dir_ba.lookup_name(1));
        assert_eq!(dir_ab.lookup_id("Camden Lock"), dir_ba.lookup_id("Camden Lock"));
    }

    #[test]
    fn test_canonical_name_is_lexicographic_minimum() {
        let mut registry = StationRegistry::new();
        registry.add(7, "abbey road (REMOVED)");
        registry.add(7, "Abbey Road");

        let directory = registry.resolve(&config());
        // Uppercase sorts before lowercase in lexicographic byte order
        assert_eq!(directory.lookup_name(7), Some("Abbey Road"));
    }

    #[test]
    fn test_excluded_name_is_skipped_for_canonical_choice() {
        let mut config = config();
        config.excluded_names.insert("Abbey Road".to_string());

        let mut registry = StationRegistry::new();
        registry.add(7, "Abbey Road");
        registry.add(7, "abbey road (REMOVED)");

        let directory = registry.resolve(&config);
        assert_eq!(directory.lookup_name(7), Some("abbey road (REMOVED)"));
        // The excluded name is not in the inverted map either
        assert_eq!(directory.lookup_id("Abbey Road"), None);
    }

    #[test]
    fn test_fully_excluded_id_falls_back_to_unfiltered_set() {
        let mut registry = StationRegistry::new();
        registry.add(200, "Tabletop1");

        let directory = registry.resolve(&config());
        assert_eq!(directory.lookup_name(200), Some("Tabletop1"));
    }

    #[test]
    fn test_empty_registry_resolves_to_empty_maps() {
        let registry = StationRegistry::new();
        let directory = registry.resolve(&config());
        assert!(directory.is_empty());
        assert_eq!(directory.lookup_id("anything"), None);
        assert_eq!(directory.lookup_name(1), None);
    }

    #[test]
    fn test_name_under_two_ids_resolves_to_highest() {
        let mut registry = StationRegistry::new();
        registry.add(10, "Moved Dock");
        registry.add(44, "Moved Dock");

        let directory = registry.resolve(&config());
        assert_eq!(directory.lookup_id("Moved Dock"), Some(44));
    }

    #[test]
    fn test_display_name_truncates_at_punctuation() {
        assert_eq!(display_name("Waterloo Station 3, Waterloo"), "Waterloo Station 3");
        assert_eq!(display_name("Hyde Park Corner"), "Hyde Park Corner");
        assert_eq!(display_name("Belgrove Street; King's Cross"), "Belgrove Street");
    }
}
