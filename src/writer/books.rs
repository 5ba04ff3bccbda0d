use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, instrument, warn};

use super::WriteError;
use crate::checkpoint::JobKind;
use crate::db::Database;
use crate::ingest::{BatchConsumer, BatchReport};
use crate::records::{AuthorRef, BookRecord, non_empty, parse_count};

/// Inserts book batches together with their author links.
#[derive(Debug, Clone)]
pub struct BookWriter {
    db: Database,
}

impl BookWriter {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts each book with a title, then links it to every referenced
    /// author that already exists.
    ///
    /// Books are insert-if-absent on ISBN. Untitled records are skipped and
    /// links to unknown authors are dropped; neither is an error. The batch
    /// is a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if a statement fails or a nested list cannot be
    /// encoded; the batch is rolled back.
    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    pub async fn insert_batch(&self, batch: &[BookRecord]) -> Result<BatchReport, WriteError> {
        let mut tx = self.db.pool().begin().await?;
        let mut report = BatchReport::default();

        for book in batch {
            let Some(title) = non_empty(book.title.as_ref()) else {
                info!(isbn = ?book.isbn, "skipping book with missing title");
                report.skipped += 1;
                continue;
            };

            let Some(book_id) = insert_book(&mut tx, book, title, &mut report).await? else {
                continue;
            };

            for author in &book.authors {
                link_author(&mut tx, book_id, title, author, &mut report).await?;
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}

/// Inserts one book and returns the id to link authors against.
///
/// With an ISBN the id is looked up afterwards, so a book seeded by an
/// earlier run still receives its links. Without one, only a fresh insert
/// yields an id.
async fn insert_book(
    tx: &mut Transaction<'_, Sqlite>,
    book: &BookRecord,
    title: &str,
    report: &mut BatchReport,
) -> Result<Option<i64>, WriteError> {
    let isbn = non_empty(book.isbn.as_ref());
    let series = book
        .series
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| WriteError::Encode {
            field: "series",
            source,
        })?;
    let shelves =
        serde_json::to_string(&book.popular_shelves).map_err(|source| WriteError::Encode {
            field: "popular_shelves",
            source,
        })?;

    let result = sqlx::query(
        r"INSERT OR IGNORE INTO books
          (isbn, isbn13, title, publication_year, publisher, image_url, description,
           num_pages, language_code, text_reviews_count, ratings_count, average_rating,
           series, popular_shelves, title_tsv)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(isbn)
    .bind(non_empty(book.isbn13.as_ref()))
    .bind(title)
    .bind(parse_count("publication_year", book.publication_year.as_ref()))
    .bind(non_empty(book.publisher.as_ref()))
    .bind(non_empty(book.image_url.as_ref()))
    .bind(non_empty(book.description.as_ref()))
    .bind(parse_count("num_pages", book.num_pages.as_ref()))
    .bind(non_empty(book.language_code.as_ref()))
    .bind(parse_count(
        "text_reviews_count",
        book.text_reviews_count.as_ref(),
    ))
    .bind(parse_count("ratings_count", book.ratings_count.as_ref()))
    .bind(non_empty(book.average_rating.as_ref()))
    .bind(series)
    .bind(shelves)
    .bind(title)
    .execute(&mut **tx)
    .await?;

    let inserted = result.rows_affected() > 0;
    if inserted {
        report.written += 1;
    } else {
        debug!(isbn, "book already present");
        report.skipped += 1;
    }

    match isbn {
        Some(isbn) => {
            let id = sqlx::query_scalar::<_, i64>("SELECT id FROM books WHERE isbn = ?")
                .bind(isbn)
                .fetch_optional(&mut **tx)
                .await?;
            Ok(id)
        }
        None if inserted => Ok(Some(result.last_insert_rowid())),
        None => Ok(None),
    }
}

async fn link_author(
    tx: &mut Transaction<'_, Sqlite>,
    book_id: i64,
    title: &str,
    author: &AuthorRef,
    report: &mut BatchReport,
) -> Result<(), WriteError> {
    let Some(author_id) = non_empty(author.author_id.as_ref()) else {
        warn!(book_id, title, "skipping author link with missing author_id");
        report.links_skipped += 1;
        return Ok(());
    };

    let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM authors WHERE id = ?")
        .bind(author_id)
        .fetch_optional(&mut **tx)
        .await?
        .is_some();
    if !exists {
        info!(book_id, author_id, title, "author not found, skipping link");
        report.links_skipped += 1;
        return Ok(());
    }

    let result =
        sqlx::query("INSERT OR IGNORE INTO book_to_author (book_id, author_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(author_id)
            .execute(&mut **tx)
            .await?;
    if result.rows_affected() > 0 {
        report.links_written += 1;
    }
    Ok(())
}

#[async_trait]
impl BatchConsumer for BookWriter {
    type Record = BookRecord;

    fn job(&self) -> JobKind {
        JobKind::Books
    }

    async fn consume(&self, batch: Vec<BookRecord>) -> Result<BatchReport, WriteError> {
        self.insert_batch(&batch).await
    }
}
