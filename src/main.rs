//! CLI entry point for the bike-share reconciliation tool.
//!
//! Provides subcommands for cleaning a folder of raw trip exports into the
//! canonical table, building the station-to-station flow network with
//! community labels, and summarising a single bike's ride chains.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use bikeshare_recon::config::ReconConfig;
use bikeshare_recon::network::StationLocations;
use bikeshare_recon::story::ChainDistance;
use bikeshare_recon::{assemble, community, ingest, network, output, stations, story};

#[derive(Parser)]
#[command(name = "bikeshare_recon")]
#[command(about = "Reconcile bike-share trip exports into a canonical dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a folder of raw CSV exports into the canonical trip table
    Clean {
        /// Folder containing the raw CSV files
        #[arg(value_name = "INPUT_DIR")]
        input_dir: PathBuf,

        /// Directory to write trips.csv, station_names.json and the summary
        #[arg(short, long, default_value = "cleaned")]
        output_dir: PathBuf,

        /// Only process the first N files (sorted by name)
        #[arg(short, long)]
        num_files: Option<usize>,
    },
    /// Build the station-to-station flow network from a cleaned trip table
    Network {
        /// Cleaned trip table CSV (output of `clean`)
        #[arg(value_name = "TRIPS_CSV")]
        trips: PathBuf,

        /// Station id -> {lat, lon} JSON file
        #[arg(short, long)]
        stations: PathBuf,

        /// Minimum trip_count as a fraction of total trips
        #[arg(short, long, default_value_t = 2e-5)]
        threshold: f64,

        /// Keep self-loop edges in the visualisation output
        #[arg(long, default_value_t = false)]
        keep_self_loops: bool,

        /// Directory to write flow_edges.csv and nodes.json
        #[arg(short, long, default_value = "network")]
        output_dir: PathBuf,
    },
    /// Summarise one bike's ride chains
    Story {
        /// Cleaned trip table CSV (output of `clean`)
        #[arg(value_name = "TRIPS_CSV")]
        trips: PathBuf,

        /// Station id -> {lat, lon} JSON file
        #[arg(short, long)]
        stations: PathBuf,

        /// Bike to follow
        #[arg(short, long)]
        bike_id: i64,

        /// Which distance to report per chain
        #[arg(short, long, value_enum, default_value_t = DistanceArg::Total)]
        distance: DistanceArg,

        /// File to write the chain statistics to
        #[arg(short, long, default_value = "story.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DistanceArg {
    /// Sum of ridden legs
    Total,
    /// Crow-flight first start to last end
    StartEnd,
}

impl From<DistanceArg> for ChainDistance {
    fn from(value: DistanceArg) -> Self {
        match value {
            DistanceArg::Total => ChainDistance::Total,
            DistanceArg::StartEnd => ChainDistance::StartEnd,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bikeshare_recon.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_recon.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clean {
            input_dir,
            output_dir,
            num_files,
        } => clean(&input_dir, &output_dir, num_files),
        Commands::Network {
            trips,
            stations,
            threshold,
            keep_self_loops,
            output_dir,
        } => build_network(&trips, &stations, threshold, keep_self_loops, &output_dir),
        Commands::Story {
            trips,
            stations,
            bike_id,
            distance,
            output,
        } => bike_story(&trips, &stations, bike_id, distance.into(), &output),
    }
}

fn clean(input_dir: &Path, output_dir: &Path, num_files: Option<usize>) -> Result<()> {
    let config = ReconConfig::builtin();

    let ingest::IngestOutcome {
        pieces,
        registry,
        mut summary,
    } = ingest::ingest_folder(input_dir, num_files, &config)?;

    let directory = registry.resolve(&config);
    info!(stations = directory.len(), "Station identities resolved");

    let table = assemble::assemble(pieces, &directory, &config, &mut summary)?;

    fs::create_dir_all(output_dir)?;
    output::write_trip_table(&output_dir.join("trips.csv"), &table)?;
    output::write_station_names(&output_dir.join("station_names.json"), &registry)?;
    output::write_summary(&output_dir.join("clean_summary.json"), &summary)?;

    info!(
        files_processed = summary.files_processed,
        files_fallback = summary.files_fallback,
        files_failed = summary.files_failed,
        rows_read = summary.rows_read,
        rows_kept = summary.rows_kept,
        empty_dropped = summary.empty_rows_dropped,
        coercion_dropped = summary.coercion_rows_dropped,
        date_window_dropped = summary.date_window_dropped,
        blank_date_dropped = summary.blank_date_dropped,
        missing_rental_id = summary.missing_rental_id,
        sentinel_dropped = summary.sentinel_id_dropped,
        excluded_dropped = summary.excluded_name_dropped,
        duplicates_dropped = summary.duplicate_dropped,
        "Clean finished"
    );
    Ok(())
}

fn build_network(
    trips: &Path,
    stations_json: &Path,
    threshold: f64,
    keep_self_loops: bool,
    output_dir: &Path,
) -> Result<()> {
    let config = ReconConfig::builtin();
    let table = output::read_trip_table(trips)?;
    let locations = StationLocations::load(stations_json)?;

    // The cleaned table carries the observed names; resolving them again
    // gives the display names for node labels.
    let mut registry = stations::StationRegistry::new();
    registry.collect_names(table.rows());
    let directory = registry.resolve(&config);

    let mut graph = network::build_flow_graph(&table, threshold);
    network::prune_missing_coordinates(&mut graph, &locations);

    let projection = network::undirected_projection(&graph);
    let partition = community::louvain_partition(&projection);
    let communities = partition.values().collect::<std::collections::HashSet<_>>().len();
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        communities,
        "Flow network built"
    );

    let nodes = network::node_info(&graph, &locations, &directory, &partition);

    let mut visualisation = graph;
    if !keep_self_loops {
        network::remove_self_loops(&mut visualisation);
    }

    fs::create_dir_all(output_dir)?;
    output::write_flow_edges(&output_dir.join("flow_edges.csv"), &network::flow_edges(&visualisation))?;
    output::write_node_info(&output_dir.join("nodes.json"), &nodes)?;
    Ok(())
}

fn bike_story(
    trips: &Path,
    stations_json: &Path,
    bike_id: i64,
    distance: ChainDistance,
    output: &Path,
) -> Result<()> {
    let table = output::read_trip_table(trips)?;
    let locations = StationLocations::load(stations_json)?;

    let trips = story::story_for_bike(&table, bike_id);
    let chains = story::split_chains(&trips);
    let stats = story::chain_distance_vs_length(&chains, &locations, distance);
    let usage = story::total_usage(&trips);

    info!(
        bike_id,
        trips = trips.len(),
        chains = chains.len(),
        usage_minutes = usage.num_minutes(),
        "Story assembled"
    );

    let report = serde_json::json!({
        "bike_id": bike_id,
        "trips": trips.len(),
        "chains": stats,
        "usage_minutes": usage.num_minutes(),
    });
    fs::write(output, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
