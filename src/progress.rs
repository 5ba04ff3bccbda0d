//! Throughput and ETA reporting per committed batch.

use std::fmt;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::checkpoint::JobKind;

/// Estimated time to completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    /// Nothing processed yet, so no rate is known.
    Unknown,
    /// Linear estimate from the rate so far.
    Remaining(Duration),
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Remaining(remaining) => {
                write!(f, "{:.2} minutes", remaining.as_secs_f64() / 60.0)
            }
        }
    }
}

/// A point-in-time progress computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    /// `None` when the total is zero.
    pub percent: Option<f64>,
    pub eta: Eta,
    pub last_batch: Duration,
}

impl ProgressSnapshot {
    /// Computes percentage and a linear ETA of `elapsed / processed * remaining`.
    #[must_use]
    pub fn compute(processed: u64, total: u64, elapsed: Duration, last_batch: Duration) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let percent = (total > 0).then(|| processed as f64 * 100.0 / total as f64);

        let eta = if processed == 0 {
            Eta::Unknown
        } else {
            let remaining = total.saturating_sub(processed);
            #[allow(clippy::cast_precision_loss)]
            let secs = elapsed.as_secs_f64() / processed as f64 * remaining as f64;
            Duration::try_from_secs_f64(secs).map_or(Eta::Unknown, Eta::Remaining)
        };

        Self {
            processed,
            total,
            percent,
            eta,
            last_batch,
        }
    }
}

/// Logs progress after each committed batch and optionally drives a bar.
///
/// ETA uses only the lines consumed in this run, so a resumed job does not
/// look faster than it is.
#[derive(Debug)]
pub struct ProgressReporter {
    job: JobKind,
    total: u64,
    start_line: u64,
    started: Instant,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(job: JobKind, total: u64, start_line: u64, show_bar: bool) -> Self {
        let bar = show_bar.then(|| {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_position(start_line);
            bar.set_message(job.as_str());
            bar
        });

        Self {
            job,
            total,
            start_line,
            started: Instant::now(),
            bar,
        }
    }

    /// Records a committed batch ending at line `processed` and logs it.
    pub fn batch_committed(&self, processed: u64, last_batch: Duration) -> ProgressSnapshot {
        let eta = ProgressSnapshot::compute(
            processed.saturating_sub(self.start_line),
            self.total.saturating_sub(self.start_line),
            self.started.elapsed(),
            last_batch,
        )
        .eta;
        let mut overall = ProgressSnapshot::compute(processed, self.total, Duration::ZERO, last_batch);
        overall.eta = eta;

        if let Some(bar) = &self.bar {
            bar.set_position(processed);
        }

        info!(
            job = %self.job,
            processed,
            total = self.total,
            percent = %overall.percent.map_or_else(|| "unknown".to_string(), |p| format!("{p:.2}")),
            batch_secs = %format!("{:.2}", last_batch.as_secs_f64()),
            eta = %overall.eta,
            "batch committed"
        );

        overall
    }

    /// Wall time since the reporter was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Clears the bar, if any.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_processed_reports_unknown_eta() {
        let snapshot =
            ProgressSnapshot::compute(0, 100, Duration::from_secs(5), Duration::from_secs(1));

        assert_eq!(snapshot.eta, Eta::Unknown);
        assert_eq!(snapshot.eta.to_string(), "unknown");
        assert_eq!(snapshot.percent, Some(0.0));
    }

    #[test]
    fn test_half_done_in_ten_seconds_needs_ten_more() {
        let snapshot =
            ProgressSnapshot::compute(50, 100, Duration::from_secs(10), Duration::from_secs(2));

        let Eta::Remaining(remaining) = snapshot.eta else {
            panic!("expected a known ETA");
        };
        assert!((remaining.as_secs_f64() - 10.0).abs() < 1e-6);
        assert_eq!(snapshot.percent, Some(50.0));
    }

    #[test]
    fn test_zero_total_has_no_percent() {
        let snapshot = ProgressSnapshot::compute(3, 0, Duration::from_secs(1), Duration::ZERO);
        assert_eq!(snapshot.percent, None);
        assert_eq!(snapshot.eta, Eta::Remaining(Duration::ZERO));
    }

    #[test]
    fn test_processed_beyond_total_does_not_underflow() {
        let snapshot = ProgressSnapshot::compute(120, 100, Duration::from_secs(6), Duration::ZERO);
        assert_eq!(snapshot.eta, Eta::Remaining(Duration::ZERO));
    }

    #[test]
    fn test_eta_display_in_minutes() {
        assert_eq!(Eta::Remaining(Duration::from_secs(90)).to_string(), "1.50 minutes");
    }

    #[test]
    fn test_reporter_uses_run_relative_rate() {
        let reporter = ProgressReporter::new(JobKind::Books, 1000, 900, false);
        let snapshot = reporter.batch_committed(950, Duration::from_millis(5));

        assert_eq!(snapshot.processed, 950);
        assert_eq!(snapshot.percent, Some(95.0));
        assert!(matches!(snapshot.eta, Eta::Remaining(_)));
    }
}
