//! Checkpoint-resumable driver: read, batch, consume, save, report.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::batch::BatchAccumulator;
use super::consumer::{BatchConsumer, BatchReport, FailurePolicy};
use super::reader::{Line, LineReader, MAX_LINE_BYTES, count_lines};
use crate::checkpoint::{CheckpointError, CheckpointStore, JobKind};
use crate::progress::ProgressReporter;
use crate::writer::WriteError;

/// Per-run tuning for [`process_entities`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    /// Progress denominator; counted from the file when `None`.
    pub total: Option<u64>,
    /// Draw a terminal progress bar in addition to log lines.
    pub show_progress: bool,
    /// Lines longer than this are dropped as malformed without being buffered.
    pub max_line_bytes: usize,
}

impl PipelineOptions {
    /// Options with the job's default batch size and no bar.
    #[must_use]
    pub fn for_job(job: JobKind) -> Self {
        Self {
            batch_size: job.default_batch_size(),
            total: None,
            show_progress: false,
            max_line_bytes: MAX_LINE_BYTES,
        }
    }
}

/// What a run did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Checkpoint value the run resumed from.
    pub start_line: u64,
    /// Lines consumed in total, including those skipped on resume.
    pub processed_lines: u64,
    /// Lines that decoded into a record during this run.
    pub records: u64,
    /// Lines dropped because they were not valid records.
    pub malformed: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    /// Failed batches rolled back because the database was busy or locked.
    /// Their lines are behind the checkpoint once a later batch commits.
    pub batches_contended: u64,
    pub report: BatchReport,
    pub elapsed: Duration,
}

/// Errors that stop a run. Per-line and per-batch failures of bulk jobs are
/// logged and counted instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open input {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading input {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Progress could not be persisted, so resuming is no longer trustworthy.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("{job} batch failed and the run was aborted: {source}")]
    BatchAborted {
        job: JobKind,
        #[source]
        source: WriteError,
    },
}

/// Streams `path` into `consumer`, resuming after the job's saved checkpoint.
///
/// Every line read advances the position, whether or not it decodes. The
/// checkpoint is saved with the current position after each committed batch.
///
/// # Errors
///
/// Returns [`PipelineError`] when the input cannot be read, the checkpoint
/// cannot be written, or a consumer with [`FailurePolicy::Abort`] fails.
#[instrument(skip(checkpoints, consumer, options), fields(job = %consumer.job(), path = %path.display()))]
pub async fn process_entities<C: BatchConsumer>(
    path: &Path,
    checkpoints: &CheckpointStore,
    consumer: &C,
    options: &PipelineOptions,
) -> Result<PipelineSummary, PipelineError> {
    let job = consumer.job();
    let start_line = checkpoints.load(job).await;

    let mut reader = LineReader::open(path)
        .await
        .map_err(|source| PipelineError::Open {
            path: path.to_path_buf(),
            source,
        })?
        .with_max_line_bytes(options.max_line_bytes);

    let total = match options.total {
        Some(total) => total,
        None => count_lines(path).await.map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?,
    };

    if start_line > 0 {
        let skipped = reader
            .skip(start_line)
            .await
            .map_err(|source| PipelineError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if skipped < start_line {
            warn!(
                checkpoint = start_line,
                lines = skipped,
                "checkpoint is past the end of the input; nothing left to process"
            );
        } else {
            info!(checkpoint = start_line, "resuming from checkpoint");
        }
    }

    let mut run = Run {
        job,
        consumer,
        checkpoints,
        reporter: ProgressReporter::new(job, total, start_line, options.show_progress),
        last_saved: start_line,
        failed_since_save: false,
        summary: PipelineSummary {
            start_line,
            ..PipelineSummary::default()
        },
    };
    let mut accumulator = BatchAccumulator::new(options.batch_size);
    debug!(
        batch_size = accumulator.batch_size(),
        total, "processing input"
    );

    loop {
        let line = match reader.next_line().await {
            Ok(Some(Line::Text(line))) => line,
            Ok(Some(Line::TooLong { bytes })) => {
                run.summary.malformed += 1;
                warn!(
                    line = reader.position(),
                    bytes,
                    limit = options.max_line_bytes,
                    "skipping oversized line"
                );
                continue;
            }
            Ok(None) => break,
            Err(source) => {
                run.reporter.finish();
                return Err(PipelineError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let position = reader.position();

        if line.trim().is_empty() {
            debug!(line = position, "skipping blank line");
            continue;
        }

        match serde_json::from_str::<C::Record>(&line) {
            Ok(record) => {
                run.summary.records += 1;
                if let Some(batch) = accumulator.push(record) {
                    run.flush(batch, position).await?;
                }
            }
            Err(err) => {
                run.summary.malformed += 1;
                warn!(line = position, error = %err, "skipping malformed line");
            }
        }
    }

    let end = reader.position();
    if let Some(batch) = accumulator.finish() {
        run.flush(batch, end).await?;
    } else if end > run.last_saved && !run.failed_since_save {
        // Trailing lines that produced no records still count as consumed.
        run.save(end).await?;
    }

    run.reporter.finish();
    run.summary.processed_lines = end;
    run.summary.elapsed = run.reporter.elapsed();

    info!(
        processed_lines = end,
        records = run.summary.records,
        malformed = run.summary.malformed,
        batches_committed = run.summary.batches_committed,
        batches_failed = run.summary.batches_failed,
        batches_contended = run.summary.batches_contended,
        written = run.summary.report.written,
        skipped = run.summary.report.skipped,
        "import finished"
    );
    if run.summary.batches_contended > 0 {
        warn!(
            batches = run.summary.batches_contended,
            "batches were rolled back on a busy database; reset the checkpoint to retry them"
        );
    }

    Ok(run.summary)
}

/// Mutable state for one invocation of [`process_entities`].
struct Run<'a, C> {
    job: JobKind,
    consumer: &'a C,
    checkpoints: &'a CheckpointStore,
    reporter: ProgressReporter,
    last_saved: u64,
    failed_since_save: bool,
    summary: PipelineSummary,
}

impl<C: BatchConsumer> Run<'_, C> {
    async fn flush(&mut self, batch: Vec<C::Record>, position: u64) -> Result<(), PipelineError> {
        let batch_len = batch.len();
        let started = Instant::now();

        match self.consumer.consume(batch).await {
            Ok(report) => {
                self.summary.batches_committed += 1;
                self.summary.report.absorb(report);
                self.save(position).await?;
                self.reporter.batch_committed(position, started.elapsed());
                Ok(())
            }
            Err(source) => {
                let kind = source.kind();
                self.summary.batches_failed += 1;
                if kind.is_transient() {
                    self.summary.batches_contended += 1;
                }
                self.failed_since_save = true;
                error!(
                    job = %self.job,
                    line = position,
                    batch_len,
                    %kind,
                    transient = kind.is_transient(),
                    error = %source,
                    "batch rolled back"
                );
                match self.consumer.failure_policy() {
                    FailurePolicy::SkipBatch => Ok(()),
                    FailurePolicy::Abort => {
                        self.reporter.finish();
                        Err(PipelineError::BatchAborted {
                            job: self.job,
                            source,
                        })
                    }
                }
            }
        }
    }

    async fn save(&mut self, position: u64) -> Result<(), PipelineError> {
        if let Err(err) = self.checkpoints.save(self.job, position).await {
            self.reporter.finish();
            return Err(err.into());
        }
        self.last_saved = position;
        self.failed_since_save = false;
        Ok(())
    }
}
