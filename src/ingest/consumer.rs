//! The seam between the pipeline driver and the per-job batch handlers.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::checkpoint::JobKind;
use crate::writer::WriteError;

/// What the driver does when [`BatchConsumer::consume`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the rolled-back batch and continue with the next one.
    SkipBatch,
    /// Stop the run and surface the error.
    Abort,
}

/// Per-batch outcome reported by a consumer after commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows inserted or updated.
    pub written: usize,
    /// Records dropped by the consumer's own rules (missing title, no image, failed fetch...).
    pub skipped: usize,
    /// Book/author link rows inserted.
    pub links_written: usize,
    /// Links dropped because the referenced author does not exist.
    pub links_skipped: usize,
}

impl BatchReport {
    /// Adds another report's counts into this one.
    pub fn absorb(&mut self, other: BatchReport) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.links_written += other.links_written;
        self.links_skipped += other.links_skipped;
    }
}

/// A typed handler for one job's batches.
///
/// Each job pairs its own record type with one implementation, so the driver
/// never handles loosely typed rows.
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    /// The record decoded from each input line.
    type Record: DeserializeOwned + Send + 'static;

    /// Which job this consumer serves; selects the checkpoint.
    fn job(&self) -> JobKind;

    /// How the driver treats a failed batch.
    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::SkipBatch
    }

    /// Writes one batch atomically.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] when the batch was rolled back.
    async fn consume(&self, batch: Vec<Self::Record>) -> Result<BatchReport, WriteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_absorb_sums_fields() {
        let mut total = BatchReport::default();
        total.absorb(BatchReport {
            written: 2,
            skipped: 1,
            links_written: 3,
            links_skipped: 1,
        });
        total.absorb(BatchReport {
            written: 1,
            ..BatchReport::default()
        });

        assert_eq!(total.written, 3);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.links_written, 3);
        assert_eq!(total.links_skipped, 1);
    }
}
