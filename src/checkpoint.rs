//! Per-job progress markers persisted as small JSON files.
//!
//! A checkpoint records how many input lines a job has fully consumed, as
//! `{"processedLines": <n>}`. Loading is soft: a missing or corrupt file reads
//! as zero so the job restarts from the top. Saving writes a sibling temp file
//! and renames it over the checkpoint, so a reader sees either the old value
//! or the new one.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Default batch size for the author import.
pub const AUTHOR_BATCH_SIZE: usize = 2000;

/// Default batch size for the book import and the thumbhash pass.
pub const BOOK_BATCH_SIZE: usize = 900;

/// The ingestion jobs, each with its own independent checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Author rows from `authors.json`.
    Authors,
    /// Book rows and book/author links from `books.json`.
    Books,
    /// Thumbhash enrichment over `books.json`.
    Thumbhash,
}

impl JobKind {
    /// Stable label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authors => "authors",
            Self::Books => "books",
            Self::Thumbhash => "thumbhash",
        }
    }

    /// File name of this job's checkpoint inside the checkpoint directory.
    #[must_use]
    pub fn checkpoint_file_name(self) -> &'static str {
        match self {
            Self::Authors => "author_import_checkpoint.json",
            Self::Books => "book_import_checkpoint.json",
            Self::Thumbhash => "thumbhash_update_checkpoint.json",
        }
    }

    /// Batch size used when the operator does not override it.
    #[must_use]
    pub fn default_batch_size(self) -> usize {
        match self {
            Self::Authors => AUTHOR_BATCH_SIZE,
            Self::Books | Self::Thumbhash => BOOK_BATCH_SIZE,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from persisting a checkpoint. Loading never fails.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Writing, renaming or removing the checkpoint file failed.
    #[error("IO error writing checkpoint {path}: {source}")]
    Io {
        /// The checkpoint path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The checkpoint could not be encoded.
    #[error("failed to encode checkpoint {path}: {source}")]
    Encode {
        /// The checkpoint path.
        path: PathBuf,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(rename = "processedLines")]
    processed_lines: u64,
}

/// Directory-backed checkpoint storage, one file per [`JobKind`].
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the checkpoint path for `job`.
    #[must_use]
    pub fn path_for(&self, job: JobKind) -> PathBuf {
        self.dir.join(job.checkpoint_file_name())
    }

    /// Loads the number of processed lines for `job`.
    ///
    /// Any read or parse failure yields `0`.
    #[instrument(skip(self), fields(job = %job))]
    pub async fn load(&self, job: JobKind) -> u64 {
        let path = self.path_for(job);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no checkpoint, starting from line 0");
                return 0;
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable checkpoint, starting from line 0");
                return 0;
            }
        };

        match serde_json::from_str::<CheckpointFile>(&raw) {
            Ok(checkpoint) => checkpoint.processed_lines,
            Err(error) => {
                warn!(path = %path.display(), %error, "corrupt checkpoint, starting from line 0");
                0
            }
        }
    }

    /// Persists `processed_lines` for `job`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the directory, temp file or rename
    /// fails. The previous checkpoint is left untouched in that case.
    #[instrument(skip(self), fields(job = %job))]
    pub async fn save(&self, job: JobKind, processed_lines: u64) -> Result<(), CheckpointError> {
        let path = self.path_for(job);
        let body = serde_json::to_vec(&CheckpointFile { processed_lines }).map_err(|source| {
            CheckpointError::Encode {
                path: path.clone(),
                source,
            }
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &body)
            .await
            .map_err(|source| CheckpointError::Io {
                path: temp_path.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CheckpointError::Io { path, source });
        }

        debug!(processed_lines, "checkpoint saved");
        Ok(())
    }

    /// Deletes the checkpoint for `job` so the next run starts from line 0.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if removal fails for a reason other
    /// than the file not existing.
    #[instrument(skip(self), fields(job = %job))]
    pub async fn reset(&self, job: JobKind) -> Result<(), CheckpointError> {
        let path = self.path_for(job);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }
}
