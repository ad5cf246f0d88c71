pub mod archive;
pub mod config;
pub mod constants;
pub mod failures;
pub mod fetcher;
pub mod filter;
pub mod ingest;
pub mod listing;
pub mod models;
pub mod pages;
pub mod query;
pub mod record;
pub mod runlog;
pub mod scheduler;
pub mod store;
