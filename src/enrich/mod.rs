//! Thumbhash enrichment: fetch each book's cover image, derive a compact
//! placeholder hash, and store it on the book row.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use bookshelf_core::checkpoint::{CheckpointStore, JobKind};
//! use bookshelf_core::db::Database;
//! use bookshelf_core::enrich::{DEFAULT_CONCURRENCY, EnrichmentWorker, FetchConfig, ImageClient};
//! use bookshelf_core::ingest::{PipelineOptions, process_entities};
//! use bookshelf_core::writer::ThumbhashWriter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("data.db")).await?;
//! let client = ImageClient::new(FetchConfig::default())?;
//! let worker = EnrichmentWorker::new(client, ThumbhashWriter::new(db), DEFAULT_CONCURRENCY)?;
//! process_entities(
//!     Path::new("books.json"),
//!     &CheckpointStore::new("."),
//!     &worker,
//!     &PipelineOptions::for_job(JobKind::Thumbhash),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod hash;
mod worker;

pub use client::{
    BROWSER_USER_AGENT, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_TIMEOUT_SECS, FetchConfig,
    FetchError, ImageClient, ImageSource, MAX_IMAGE_BYTES, request_headers, skip_reason,
};
pub use hash::{HashError, THUMBNAIL_MAX_DIMENSION, thumbhash_from_image_bytes};
pub use worker::{DEFAULT_CONCURRENCY, EnrichError, EnrichmentWorker};
