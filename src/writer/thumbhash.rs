use tracing::{debug, instrument};

use super::WriteError;
use crate::db::Database;

/// A derived hash waiting to be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentResult {
    /// Base64 thumbhash.
    pub thumbhash: String,
    /// The URL the hash was computed from.
    pub image_url: String,
    /// Natural key of the record, when it had one.
    pub isbn: Option<String>,
}

/// Writes thumbhash results with parameterized updates in one transaction.
#[derive(Debug, Clone)]
pub struct ThumbhashWriter {
    db: Database,
}

impl ThumbhashWriter {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Applies every result, by ISBN when present and by image URL otherwise.
    ///
    /// Returns the number of book rows updated.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Database`] if any update fails; none of the
    /// results are kept.
    #[instrument(skip(self, results), fields(results = results.len()))]
    pub async fn apply(&self, results: &[EnrichmentResult]) -> Result<u64, WriteError> {
        if results.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.pool().begin().await?;
        let mut updated = 0;

        for result in results {
            let outcome = match result.isbn.as_deref() {
                Some(isbn) => {
                    sqlx::query("UPDATE books SET thumbhash = ? WHERE isbn = ?")
                        .bind(&result.thumbhash)
                        .bind(isbn)
                        .execute(&mut *tx)
                        .await?
                }
                None => {
                    sqlx::query("UPDATE books SET thumbhash = ? WHERE image_url = ?")
                        .bind(&result.thumbhash)
                        .bind(&result.image_url)
                        .execute(&mut *tx)
                        .await?
                }
            };
            if outcome.rows_affected() == 0 {
                debug!(isbn = ?result.isbn, url = %result.image_url, "no book matched thumbhash update");
            }
            updated += outcome.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }
}
