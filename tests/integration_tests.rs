use std::fs;
use std::path::PathBuf;

use bikeshare_recon::assemble::assemble;
use bikeshare_recon::config::ReconConfig;
use bikeshare_recon::ingest::{IngestOutcome, ingest_folder};
use bikeshare_recon::model::CleanSummary;
use bikeshare_recon::stations::StationRegistry;

const HEADER: &str = "Rental Id,Duration,Bike Id,End Date,EndStation Id,EndStation Name,Start Date,StartStation Id,StartStation Name\n";

fn setup_dir(name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bikeshare_recon_it_{name}"));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    for (filename, contents) in files {
        fs::write(dir.join(filename), contents).unwrap();
    }
    dir
}

#[test]
fn test_overlapping_files_keep_first_seen_record() {
    // rental 1001 appears in both files; the second export rounded its
    // timestamps differently, so the duration disagrees too
    let week1 = format!(
        "{HEADER}1001,600,42,14/06/2021 08:13,2,Baker Street,14/06/2021 08:03,1,Abbey Road\n\
         1002,300,43,14/06/2021 09:08,1,Abbey Road,14/06/2021 09:03,2,Baker Street\n"
    );
    let week2 = format!(
        "{HEADER}1001,660,42,14/06/2021 08:14,2,Baker Street,14/06/2021 08:03,1,Abbey Road\n\
         1003,900,44,15/06/2021 10:18,2,Baker Street,15/06/2021 10:03,1,Abbey Road\n"
    );
    let dir = setup_dir(
        "overlap",
        &[("2021_week1.csv", &week1), ("2021_week2.csv", &week2)],
    );

    let config = ReconConfig::builtin();
    let IngestOutcome {
        pieces,
        registry,
        mut summary,
    } = ingest_folder(&dir, None, &config).unwrap();
    let directory = registry.resolve(&config);
    let table = assemble(pieces, &directory, &config, &mut summary).unwrap();

    assert_eq!(table.len(), 3);
    let kept = table.get(1001).unwrap();
    assert_eq!(kept.duration, Some(600));
    assert_eq!(kept.source_file, "2021_week1.csv");
    assert_eq!(summary.duplicate_dropped, 1);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_problem_file_is_backfilled_from_names() {
    // The second file lacks station id columns entirely and must go through
    // the fallback path, with ids recovered from the resolved directory
    let strict = format!(
        "{HEADER}1001,600,42,14/06/2021 08:13,2,Baker Street,14/06/2021 08:03,1,Abbey Road\n"
    );
    let no_ids = "Rental Id,Duration,Bike Id,End Date,EndStation Name,Start Date,StartStation Name\n\
                  1002,300,43,14/06/2021 09:08,Abbey Road,14/06/2021 09:03,Baker Street\n";
    let dir = setup_dir(
        "fallback",
        &[("a_strict.csv", &strict), ("b_no_ids.csv", no_ids)],
    );

    let config = ReconConfig::builtin();
    let IngestOutcome {
        pieces,
        registry,
        mut summary,
    } = ingest_folder(&dir, None, &config).unwrap();
    assert_eq!(summary.files_fallback, 1);

    let directory = registry.resolve(&config);
    let table = assemble(pieces, &directory, &config, &mut summary).unwrap();

    let recovered = table.get(1002).unwrap();
    assert_eq!(recovered.start_station_id, Some(2));
    assert_eq!(recovered.end_station_id, Some(1));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_excluded_station_rows_are_dropped() {
    let contents = format!(
        "{HEADER}1001,600,42,14/06/2021 08:13,2,Baker Street,14/06/2021 08:03,7,Tabletop1\n\
         1002,300,43,14/06/2021 09:08,2,Baker Street,14/06/2021 09:03,1,Abbey Road\n"
    );
    let dir = setup_dir("exclusion", &[("trips.csv", &contents)]);

    let config = ReconConfig::builtin();
    let IngestOutcome {
        pieces,
        registry,
        mut summary,
    } = ingest_folder(&dir, None, &config).unwrap();
    let directory = registry.resolve(&config);
    let table = assemble(pieces, &directory, &config, &mut summary).unwrap();

    assert_eq!(table.len(), 1);
    assert!(table.get(1001).is_none());
    assert!(table.get(1002).is_some());
    assert_eq!(summary.excluded_name_dropped, 1);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_resolution_is_order_independent() {
    let file_a = format!(
        "{HEADER}1001,600,42,14/06/2021 08:13,2,Baker Street,14/06/2021 08:03,1,Abbey Road\n"
    );
    let file_b = format!(
        "{HEADER}1002,300,43,14/06/2021 09:08,2,Baker St;Marylebone,14/06/2021 09:03,1,abbey road (REMOVED)\n"
    );
    let dir = setup_dir("order", &[("a.csv", &file_a), ("b.csv", &file_b)]);

    let config = ReconConfig::builtin();
    let mut summary = CleanSummary::default();

    let piece_a =
        bikeshare_recon::ingest::read_trip_file(&dir.join("a.csv"), &config, &mut summary).unwrap();
    let piece_b =
        bikeshare_recon::ingest::read_trip_file(&dir.join("b.csv"), &config, &mut summary).unwrap();

    let mut forward = StationRegistry::new();
    forward.collect_names(&piece_a.rows);
    forward.collect_names(&piece_b.rows);

    let mut backward = StationRegistry::new();
    backward.collect_names(&piece_b.rows);
    backward.collect_names(&piece_a.rows);

    let dir_fwd = forward.resolve(&config);
    let dir_bwd = backward.resolve(&config);

    for id in [1, 2] {
        assert_eq!(dir_fwd.lookup_name(id), dir_bwd.lookup_name(id));
    }
    assert_eq!(dir_fwd.lookup_name(1), Some("Abbey Road"));
    assert_eq!(
        dir_fwd.lookup_id("abbey road (REMOVED)"),
        dir_bwd.lookup_id("abbey road (REMOVED)")
    );

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_rental_ids_are_unique_and_sorted() {
    let week1 = format!(
        "{HEADER}1005,600,42,14/06/2021 08:13,2,Baker Street,14/06/2021 08:03,1,Abbey Road\n\
         1001,300,43,14/06/2021 09:08,1,Abbey Road,14/06/2021 09:03,2,Baker Street\n"
    );
    let week2 = format!(
        "{HEADER}1003,660,42,14/06/2021 08:14,2,Baker Street,14/06/2021 08:03,1,Abbey Road\n\
         1001,300,43,14/06/2021 09:08,1,Abbey Road,14/06/2021 09:03,2,Baker Street\n"
    );
    let dir = setup_dir("unique", &[("w1.csv", &week1), ("w2.csv", &week2)]);

    let config = ReconConfig::builtin();
    let IngestOutcome {
        pieces,
        registry,
        mut summary,
    } = ingest_folder(&dir, None, &config).unwrap();
    let directory = registry.resolve(&config);
    let table = assemble(pieces, &directory, &config, &mut summary).unwrap();

    let ids: Vec<i64> = table.rows().iter().map(|r| r.rental_id).collect();
    let mut deduped = ids.clone();
    deduped.dedup();
    assert_eq!(ids, deduped);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids, vec![1001, 1003, 1005]);

    fs::remove_dir_all(dir).unwrap();
}
