pub mod assemble;
pub mod community;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod model;
pub mod network;
pub mod output;
pub mod stations;
pub mod story;
pub mod timeparse;
