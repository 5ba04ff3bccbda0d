//! Bounded-concurrency fetch-and-hash over one batch of image records.
//!
//! # Concurrency Model
//!
//! - One task is spawned per distinct image URL in the batch
//! - A semaphore caps how many tasks fetch or decode at the same time
//! - The permit is held from the request until the hash is computed, so the
//!   cap bounds open connections and in-flight image buffers together
//! - Decoding runs on the blocking pool
//!
//! A failed fetch or decode only loses that URL. Results are written once
//! every task has finished, in a single transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::client::{DEFAULT_FETCH_TIMEOUT_SECS, ImageSource};
use super::hash::thumbhash_from_image_bytes;
use crate::checkpoint::JobKind;
use crate::ingest::{BatchConsumer, BatchReport, FailurePolicy};
use crate::query::EMPTY_IMAGE_URL;
use crate::records::{ImageRecord, non_empty};
use crate::writer::{EnrichmentResult, ThumbhashWriter, WriteError};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },
}

/// All records in a batch that share one image URL.
#[derive(Debug)]
struct UrlGroup {
    url: String,
    /// Title of the first record, for log context.
    title: Option<String>,
    /// Distinct ISBNs among the records, in first-seen order.
    isbns: Vec<String>,
    /// Whether some record had no ISBN and must be matched by URL.
    by_url: bool,
    records: usize,
}

impl UrlGroup {
    fn results(&self, thumbhash: &str) -> Vec<EnrichmentResult> {
        let mut results: Vec<EnrichmentResult> = self
            .isbns
            .iter()
            .map(|isbn| EnrichmentResult {
                thumbhash: thumbhash.to_string(),
                image_url: self.url.clone(),
                isbn: Some(isbn.clone()),
            })
            .collect();
        if self.by_url {
            results.push(EnrichmentResult {
                thumbhash: thumbhash.to_string(),
                image_url: self.url.clone(),
                isbn: None,
            });
        }
        results
    }
}

/// Groups records by image URL, dropping missing and placeholder URLs.
///
/// Returns the groups in first-occurrence order and the number of records
/// dropped.
fn group_by_url(batch: Vec<ImageRecord>) -> (Vec<UrlGroup>, usize) {
    let mut groups: Vec<UrlGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut dropped = 0;

    for record in batch {
        let Some(url) = non_empty(record.image_url.as_ref()) else {
            dropped += 1;
            continue;
        };
        if url == EMPTY_IMAGE_URL {
            dropped += 1;
            continue;
        }

        let slot = match index.get(url) {
            Some(&slot) => slot,
            None => {
                index.insert(url.to_string(), groups.len());
                groups.push(UrlGroup {
                    url: url.to_string(),
                    title: record.title.clone(),
                    isbns: Vec::new(),
                    by_url: false,
                    records: 0,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        group.records += 1;
        match non_empty(record.isbn.as_ref()) {
            Some(isbn) if !group.isbns.iter().any(|seen| seen == isbn) => {
                group.isbns.push(isbn.to_string());
            }
            Some(_) => {}
            None => group.by_url = true,
        }
    }

    (groups, dropped)
}

/// Computes thumbhashes for a batch of image records and writes them back.
#[derive(Debug)]
pub struct EnrichmentWorker<S> {
    source: Arc<S>,
    writer: ThumbhashWriter,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    fetch_timeout: Duration,
}

impl<S: ImageSource> EnrichmentWorker<S> {
    /// Creates a worker that runs at most `concurrency` fetches at once.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(source, writer))]
    pub fn new(
        source: S,
        writer: ThumbhashWriter,
        concurrency: usize,
    ) -> Result<Self, EnrichError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EnrichError::InvalidConcurrency { value: concurrency });
        }

        Ok(Self {
            source: Arc::new(source),
            writer,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        })
    }

    /// Bounds each fetch independently of the source's own timeouts.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Fetches and hashes every distinct URL in `batch`.
    ///
    /// Every record that shares a successfully hashed URL gets a result:
    /// one per distinct ISBN, plus one keyed by URL when some record had no
    /// ISBN. Also returns how many records got no result.
    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    pub async fn enrich(&self, batch: Vec<ImageRecord>) -> (Vec<EnrichmentResult>, usize) {
        let batch_len = batch.len();
        let (groups, dropped) = group_by_url(batch);
        info!(
            unique = groups.len(),
            total = batch_len,
            concurrency = self.concurrency,
            "processing unique image URLs"
        );

        let handles: Vec<_> = groups
            .iter()
            .map(|group| {
                let source = Arc::clone(&self.source);
                let semaphore = Arc::clone(&self.semaphore);
                let url = group.url.clone();
                let title = group.title.clone();
                let fetch_timeout = self.fetch_timeout;
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    hash_url(source.as_ref(), &url, title.as_deref(), fetch_timeout).await
                })
            })
            .collect();

        let outcomes = join_all(handles).await;

        let mut results = Vec::new();
        let mut missed = dropped;
        for (group, outcome) in groups.iter().zip(outcomes) {
            match outcome {
                Ok(Some(thumbhash)) => results.extend(group.results(&thumbhash)),
                Ok(None) => missed += group.records,
                Err(e) => {
                    warn!(url = %group.url, error = %e, "thumbhash task panicked");
                    missed += group.records;
                }
            }
        }

        (results, missed)
    }

    /// Enriches `batch` and writes the results in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if the write fails. Fetch and decode failures
    /// are not errors.
    pub async fn process_batch(&self, batch: Vec<ImageRecord>) -> Result<BatchReport, WriteError> {
        let (results, missed) = self.enrich(batch).await;
        let updated = self.writer.apply(&results).await?;
        info!(
            results = results.len(),
            rows_updated = updated,
            "thumbhash batch written"
        );

        Ok(BatchReport {
            written: usize::try_from(updated).unwrap_or(usize::MAX),
            skipped: missed,
            ..BatchReport::default()
        })
    }
}

/// Fetches one URL and hashes it; `None` means no result.
async fn hash_url<S: ImageSource + ?Sized>(
    source: &S,
    url: &str,
    title: Option<&str>,
    fetch_timeout: Duration,
) -> Option<String> {
    let bytes = match tokio::time::timeout(fetch_timeout, source.fetch(url)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!(url, title, error = %e, "could not fetch image");
            return None;
        }
        Err(_) => {
            warn!(url, title, timeout_secs = fetch_timeout.as_secs_f64(), "image fetch timed out");
            return None;
        }
    };

    match tokio::task::spawn_blocking(move || thumbhash_from_image_bytes(&bytes)).await {
        Ok(Ok(hash)) => {
            debug!(url, "thumbhash generated");
            Some(hash)
        }
        Ok(Err(e)) => {
            warn!(url, title, error = %e, "could not generate thumbhash");
            None
        }
        Err(e) => {
            warn!(url, error = %e, "thumbhash decode task failed");
            None
        }
    }
}

#[async_trait]
impl<S: ImageSource> BatchConsumer for EnrichmentWorker<S> {
    type Record = ImageRecord;

    fn job(&self) -> JobKind {
        JobKind::Thumbhash
    }

    /// A failed thumbhash write stops the run.
    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }

    async fn consume(&self, batch: Vec<ImageRecord>) -> Result<BatchReport, WriteError> {
        self.process_batch(batch).await
    }
}
