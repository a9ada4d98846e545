//! Batch progress bookkeeping
//!
//! Counts per-item outcomes for a batch run and renders the one-line summary
//! printed after the loop. Pure bookkeeping; the summary print is the only
//! I/O side effect.

use console::style;

/// Counters for one batch run
#[derive(Debug)]
pub struct BatchProgress {
    label: &'static str,
    total: usize,
    processed: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

/// Snapshot of a batch's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
    pub remaining: usize,
}

impl BatchProgress {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Record a processed item's outcome
    pub fn complete(&mut self, success: bool) {
        self.processed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Record an item that was skipped without being processed
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            total: self.total,
            remaining: self
                .total
                .saturating_sub(self.processed + self.skipped),
        }
    }

    /// Render the one-line human summary. Suppressed in quiet and
    /// machine-readable output modes.
    pub fn print_summary(&self, quiet: bool, json: bool) {
        if quiet || json {
            return;
        }

        let summary = self.summary();
        let mut parts = Vec::new();
        if summary.succeeded > 0 {
            parts.push(format!("{} succeeded", summary.succeeded));
        }
        if summary.failed > 0 {
            parts.push(format!("{} failed", summary.failed));
        }
        if summary.skipped > 0 {
            parts.push(format!("{} skipped", summary.skipped));
        }

        let outcome = if parts.is_empty() {
            "no items processed".to_string()
        } else {
            parts.join(", ")
        };
        let message = format!(
            "Batch complete: {outcome} ({} total {})",
            summary.total, self.label
        );

        let styled = if summary.failed == 0 {
            style(message).green()
        } else if summary.succeeded > 0 {
            style(message).yellow()
        } else {
            style(message).red()
        };
        eprintln!("{styled}");
    }
}

/// Progress marker used in per-item log lines, e.g. `[2/10]`
pub fn format_item_progress(current: usize, total: usize) -> String {
    format!("[{current}/{total}]")
}
