use async_trait::async_trait;
use tracing::{debug, instrument};

use super::WriteError;
use crate::checkpoint::JobKind;
use crate::db::Database;
use crate::ingest::{BatchConsumer, BatchReport};
use crate::records::{AuthorRecord, non_empty, parse_count};

/// Inserts author batches, one transaction per batch.
#[derive(Debug, Clone)]
pub struct AuthorWriter {
    db: Database,
}

impl AuthorWriter {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts every author not already present, keyed by `author_id`.
    ///
    /// All rows commit together or none do.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Database`] if any statement fails; the batch is
    /// rolled back.
    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    pub async fn insert_batch(&self, batch: &[AuthorRecord]) -> Result<BatchReport, WriteError> {
        let mut tx = self.db.pool().begin().await?;
        let mut report = BatchReport::default();

        for author in batch {
            let result = sqlx::query(
                r"INSERT OR IGNORE INTO authors
                  (id, name, average_rating, text_reviews_count, ratings_count)
                  VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&author.author_id)
            .bind(&author.name)
            .bind(non_empty(author.average_rating.as_ref()))
            .bind(parse_count(
                "text_reviews_count",
                author.text_reviews_count.as_ref(),
            ))
            .bind(parse_count("ratings_count", author.ratings_count.as_ref()))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                debug!(author_id = %author.author_id, "author already present");
                report.skipped += 1;
            } else {
                report.written += 1;
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}

#[async_trait]
impl BatchConsumer for AuthorWriter {
    type Record = AuthorRecord;

    fn job(&self) -> JobKind {
        JobKind::Authors
    }

    async fn consume(&self, batch: Vec<AuthorRecord>) -> Result<BatchReport, WriteError> {
        self.insert_batch(&batch).await
    }
}
