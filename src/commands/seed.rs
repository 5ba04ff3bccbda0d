//! Seed command handlers: authors, books and thumbhash imports.

use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::{Context, Result};
use bookshelf_core::checkpoint::{CheckpointStore, JobKind};
use bookshelf_core::db::Database;
use bookshelf_core::enrich::{EnrichmentWorker, FetchConfig, ImageClient};
use bookshelf_core::ingest::{BatchConsumer, PipelineOptions, PipelineSummary, process_entities};
use bookshelf_core::writer::{AuthorWriter, BookWriter, ThumbhashWriter};
use tracing::info;

use crate::app_config::Settings;
use crate::cli::{ImportArgs, SeedJob};

pub async fn run_seed_command(settings: &Settings, job: &SeedJob, quiet: bool) -> Result<()> {
    let db = Database::new_with_options(&settings.database_path, settings.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database '{}'",
                settings.database_path.display()
            )
        })?;
    let checkpoints = CheckpointStore::new(&settings.checkpoint_dir);
    let show_progress = !quiet && io::stderr().is_terminal();

    let result = match job {
        SeedJob::Authors(import) => {
            let writer = AuthorWriter::new(db.clone());
            run_import(settings, &checkpoints, &writer, import, show_progress).await
        }
        SeedJob::Books(import) => {
            let writer = BookWriter::new(db.clone());
            run_import(settings, &checkpoints, &writer, import, show_progress).await
        }
        SeedJob::Thumbhash(args) => {
            let fetch = FetchConfig {
                timeout: args
                    .timeout
                    .map_or(settings.fetch.timeout, Duration::from_secs),
                ..settings.fetch
            };
            let concurrency = args
                .concurrency
                .map_or(settings.enrich_concurrency, usize::from);
            let client = ImageClient::new(fetch)?;
            let worker = EnrichmentWorker::new(client, ThumbhashWriter::new(db.clone()), concurrency)?
                .with_fetch_timeout(fetch.timeout);
            run_import(settings, &checkpoints, &worker, &args.import, show_progress).await
        }
    };

    db.close().await;
    result.map(|_| ())
}

async fn run_import<C: BatchConsumer>(
    settings: &Settings,
    checkpoints: &CheckpointStore,
    consumer: &C,
    args: &ImportArgs,
    show_progress: bool,
) -> Result<PipelineSummary> {
    let job = consumer.job();
    if args.restart {
        checkpoints
            .reset(job)
            .await
            .with_context(|| format!("Failed to reset the {job} checkpoint"))?;
        info!(%job, "checkpoint reset, starting from the first line");
    }

    let options = PipelineOptions {
        batch_size: args
            .batch_size
            .map_or(settings.batch_size(job), |size| {
                usize::try_from(size).unwrap_or(usize::MAX)
            }),
        total: args.total,
        show_progress,
        ..PipelineOptions::for_job(job)
    };

    let summary = process_entities(&args.file, checkpoints, consumer, &options)
        .await
        .with_context(|| format!("{job} import from '{}' failed", args.file.display()))?;

    info!(
        %job,
        processed_lines = summary.processed_lines,
        written = summary.report.written,
        skipped = summary.report.skipped,
        malformed = summary.malformed,
        failed_batches = summary.batches_failed,
        contended_batches = summary.batches_contended,
        elapsed_secs = summary.elapsed.as_secs(),
        "{}",
        completion_message(job, &summary)
    );

    Ok(summary)
}

fn completion_message(job: JobKind, summary: &PipelineSummary) -> String {
    match job {
        JobKind::Authors => format!("Seeded {} authors", summary.report.written),
        JobKind::Books => format!(
            "Seeded {} books with {} author links",
            summary.report.written, summary.report.links_written
        ),
        JobKind::Thumbhash => format!(
            "Updated thumbhash for {} books",
            summary.report.written
        ),
    }
}
