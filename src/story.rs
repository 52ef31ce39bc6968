//! Per-bike trip stories: the chains of rides a single bike went through.
//!
//! A chain is a run of consecutive trips where each ride starts at the
//! station the previous one ended at; a break means the bike was moved by
//! van, not ridden. Distances come from station coordinates via haversine.

use chrono::Duration;

use crate::model::{TripRow, TripTable};
use crate::network::StationLocations;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// All trips of one bike, sorted by start time.
pub fn story_for_bike<'t>(table: &'t TripTable, bike_id: i64) -> Vec<&'t TripRow> {
    let mut trips: Vec<&TripRow> = table
        .rows()
        .iter()
        .filter(|r| r.bike_id == Some(bike_id))
        .collect();
    trips.sort_by_key(|r| r.start_date);
    trips
}

/// Total time the bike spent in rides.
pub fn total_usage(story: &[&TripRow]) -> Duration {
    story
        .iter()
        .fold(Duration::zero(), |acc, trip| acc + (trip.end_date - trip.start_date))
}

/// Splits a story into station-continuity chains. A new chain starts
/// whenever a trip does not begin where the previous one ended (unknown
/// stations always break the chain).
pub fn split_chains<'t>(story: &[&'t TripRow]) -> Vec<Vec<&'t TripRow>> {
    let mut chains: Vec<Vec<&TripRow>> = Vec::new();
    for &trip in story {
        let continues = chains.last().and_then(|chain| chain.last()).is_some_and(|prev| {
            prev.end_station_id.is_some() && prev.end_station_id == trip.start_station_id
        });
        if continues {
            chains.last_mut().expect("chain exists").push(trip);
        } else {
            chains.push(vec![trip]);
        }
    }
    chains
}

/// Which distance to report per chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDistance {
    /// Sum of the ridden legs.
    Total,
    /// Crow-flight distance from the chain's first start to its last end.
    StartEnd,
}

/// Distance and length of one chain.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainStat {
    pub chain_len: usize,
    pub distance_m: f64,
}

/// Distance-vs-length statistics across all chains of a story.
/// Trips between stations without coordinates contribute zero distance.
pub fn chain_distance_vs_length(
    chains: &[Vec<&TripRow>],
    locations: &StationLocations,
    kind: ChainDistance,
) -> Vec<ChainStat> {
    chains
        .iter()
        .map(|chain| {
            let distance_m = match kind {
                ChainDistance::Total => chain
                    .iter()
                    .filter_map(|trip| trip_distance(trip, locations))
                    .sum(),
                ChainDistance::StartEnd => {
                    if chain.len() == 1 {
                        0.0
                    } else {
                        start_end_distance(chain, locations).unwrap_or(0.0)
                    }
                }
            };
            ChainStat {
                chain_len: chain.len(),
                distance_m,
            }
        })
        .collect()
}

fn trip_distance(trip: &TripRow, locations: &StationLocations) -> Option<f64> {
    let start = locations.get(trip.start_station_id?)?;
    let end = locations.get(trip.end_station_id?)?;
    Some(haversine_m(start.lat, start.lon, end.lat, end.lon))
}

fn start_end_distance(chain: &[&TripRow], locations: &StationLocations) -> Option<f64> {
    let first = chain.first()?;
    let last = chain.last()?;
    let start = locations.get(first.start_station_id?)?;
    let end = locations.get(last.end_station_id?)?;
    Some(haversine_m(start.lat, start.lon, end.lat, end.lon))
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn trip(rental_id: i64, bike: i64, start: (i64, u32), end: (i64, u32)) -> TripRow {
        TripRow {
            rental_id,
            duration: None,
            bike_id: Some(bike),
            end_date: at(end.1, 0),
            end_station_id: Some(end.0),
            end_station_name: None,
            start_date: at(start.1, 0),
            start_station_id: Some(start.0),
            start_station_name: None,
            source_file: "t.csv".to_string(),
        }
    }

    fn table(rows: Vec<TripRow>) -> TripTable {
        TripTable::from_sorted_unique(rows)
    }

    #[test]
    fn test_story_filters_and_sorts_by_start_time() {
        let table = table(vec![
            trip(1, 8, (1, 12), (2, 13)),
            trip(2, 9, (5, 8), (6, 9)),
            trip(3, 8, (2, 8), (3, 9)),
        ]);
        let story = story_for_bike(&table, 8);
        let ids: Vec<_> = story.iter().map(|t| t.rental_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_total_usage_sums_ride_time() {
        let table = table(vec![trip(1, 8, (1, 8), (2, 9)), trip(2, 8, (2, 10), (3, 12))]);
        let story = story_for_bike(&table, 8);
        assert_eq!(total_usage(&story), Duration::hours(3));
    }

    #[test]
    fn test_chains_break_on_station_discontinuity() {
        let table = table(vec![
            trip(1, 8, (1, 8), (2, 9)),
            trip(2, 8, (2, 10), (3, 11)),
            // Bike redistributed: next trip starts from station 9
            trip(3, 8, (9, 12), (1, 13)),
        ]);
        let story = story_for_bike(&table, 8);
        let chains = split_chains(&story);

        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].len(), 2);
        assert_eq!(chains[1].len(), 1);
    }

    #[test]
    fn test_chain_distances() {
        let locations = StationLocations::from_pairs(&[
            (1, 51.50, -0.10),
            (2, 51.51, -0.10),
            (3, 51.52, -0.10),
        ]);
        let table = table(vec![trip(1, 8, (1, 8), (2, 9)), trip(2, 8, (2, 10), (3, 11))]);
        let story = story_for_bike(&table, 8);
        let chains = split_chains(&story);

        let total = chain_distance_vs_length(&chains, &locations, ChainDistance::Total);
        let direct = chain_distance_vs_length(&chains, &locations, ChainDistance::StartEnd);

        assert_eq!(total.len(), 1);
        assert_eq!(total[0].chain_len, 2);
        // 0.02 degrees of latitude is roughly 2.2 km either way
        assert!((total[0].distance_m - 2224.0).abs() < 20.0);
        assert!((direct[0].distance_m - 2224.0).abs() < 20.0);
    }

    #[test]
    fn test_single_trip_chain_has_zero_start_end_distance() {
        let locations = StationLocations::from_pairs(&[(1, 51.50, -0.10), (2, 51.51, -0.10)]);
        let table = table(vec![trip(1, 8, (1, 8), (2, 9))]);
        let story = story_for_bike(&table, 8);
        let chains = split_chains(&story);
        let direct = chain_distance_vs_length(&chains, &locations, ChainDistance::StartEnd);
        assert_eq!(direct[0].distance_m, 0.0);
    }
}
