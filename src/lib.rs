pub mod adapters;
pub mod app;
pub mod backfill;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fasta;
pub mod output;
pub mod retry;
pub mod sink;
pub mod store;
pub mod uniprot;
