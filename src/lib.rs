//! Bookshelf Core Library
//!
//! Resumable bulk ingestion of line-delimited book and author dumps into a
//! SQLite catalog, thumbhash enrichment of cover images, and the filtered
//! listing queries the catalog front end reads.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`checkpoint`] - Per-job progress markers for exact resume
//! - [`records`] - Typed input records for each dump
//! - [`ingest`] - Line reader, batch accumulator and the pipeline driver
//! - [`writer`] - Transactional batch writers
//! - [`enrich`] - Bounded-concurrency image fetch and thumbhash worker
//! - [`progress`] - Throughput and ETA reporting
//! - [`query`] - Filtered, paginated catalog reads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod db;
pub mod enrich;
pub mod ingest;
pub mod progress;
pub mod query;
pub mod records;
pub mod writer;

// Re-export commonly used types
pub use checkpoint::{CheckpointError, CheckpointStore, JobKind};
pub use db::{Database, DbError};
pub use enrich::{EnrichmentWorker, ImageClient, ImageSource};
pub use ingest::{BatchConsumer, PipelineError, PipelineOptions, process_entities};
pub use writer::{AuthorWriter, BookWriter, ThumbhashWriter, WriteError};
