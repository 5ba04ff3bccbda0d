//! Streaming ingestion of newline-delimited JSON dumps.
//!
//! A [`LineReader`] hands lines to [`process_entities`], which decodes each
//! into the consumer's record type, groups records with a
//! [`BatchAccumulator`], and passes full batches to a [`BatchConsumer`].
//! After each committed batch the job's checkpoint is saved with the current
//! line position, so an interrupted run resumes where it stopped.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use bookshelf_core::checkpoint::{CheckpointStore, JobKind};
//! use bookshelf_core::db::Database;
//! use bookshelf_core::ingest::{PipelineOptions, process_entities};
//! use bookshelf_core::writer::AuthorWriter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("data.db")).await?;
//! let checkpoints = CheckpointStore::new(".");
//! let writer = AuthorWriter::new(db.clone());
//! let summary = process_entities(
//!     Path::new("authors.json"),
//!     &checkpoints,
//!     &writer,
//!     &PipelineOptions::for_job(JobKind::Authors),
//! )
//! .await?;
//! println!("{} lines processed", summary.processed_lines);
//! # Ok(())
//! # }
//! ```

mod batch;
mod consumer;
mod pipeline;
mod reader;

pub use batch::BatchAccumulator;
pub use consumer::{BatchConsumer, BatchReport, FailurePolicy};
pub use pipeline::{PipelineError, PipelineOptions, PipelineSummary, process_entities};
pub use reader::{LineReader, count_lines};
