//! Progress reporting and cooperative cancellation.
//!
//! Pack and unpack call a [`ProgressSink`] synchronously on the calling
//! thread with `(bytes_processed, total_bytes)`. The total is fixed before the
//! first report and `bytes_processed` never decreases. Returning
//! [`Progress::Abort`] is the only way to cancel an operation.

use crate::error::{ArchiveError, Result};

/// Answer from a progress sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Progress {
    /// Keep going.
    #[default]
    Continue,
    /// Stop the operation and unwind.
    Abort,
}

/// Receiver of progress reports.
///
/// Implementations must return quickly; the pipeline is blocked while a
/// report is being handled.
pub trait ProgressSink {
    /// Called with the bytes processed so far and the fixed total.
    fn report(&mut self, processed: u64, total: u64) -> Progress;
}

impl<F> ProgressSink for F
where
    F: FnMut(u64, u64) -> Progress,
{
    fn report(&mut self, processed: u64, total: u64) -> Progress {
        self(processed, total)
    }
}

/// A sink that ignores every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _processed: u64, _total: u64) -> Progress {
        Progress::Continue
    }
}

/// Progress counter owned by a single pack or unpack operation.
pub struct ProgressState<'a> {
    processed: u64,
    total: u64,
    sink: &'a mut dyn ProgressSink,
}

impl<'a> ProgressState<'a> {
    /// Create a counter with a fixed ceiling.
    pub fn new(total: u64, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            processed: 0,
            total,
            sink,
        }
    }

    /// Bytes processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// The fixed ceiling.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Add `bytes` to the counter and report.
    ///
    /// The counter saturates at the total, so a file that grew after it was
    /// measured cannot push the report past the ceiling.
    pub fn advance(&mut self, bytes: u64) -> Result<()> {
        self.processed = self.processed.saturating_add(bytes).min(self.total);
        self.poll()
    }

    /// Report the current value again, giving the sink a chance to abort.
    pub fn poll(&mut self) -> Result<()> {
        match self.sink.report(self.processed, self.total) {
            Progress::Continue => Ok(()),
            Progress::Abort => Err(ArchiveError::cancelled(self.processed)),
        }
    }

    /// Move the counter to the total and report.
    pub fn finish(&mut self) -> Result<()> {
        self.processed = self.total;
        self.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink_records_reports() {
        let mut seen = Vec::new();
        let mut sink = |processed: u64, total: u64| {
            seen.push((processed, total));
            Progress::Continue
        };

        let mut state = ProgressState::new(10, &mut sink);
        state.poll().unwrap();
        state.advance(4).unwrap();
        state.advance(4).unwrap();
        state.finish().unwrap();
        drop(state);

        assert_eq!(seen, vec![(0, 10), (4, 10), (8, 10), (10, 10)]);
    }

    #[test]
    fn test_advance_saturates_at_total() {
        let mut sink = NoProgress;
        let mut state = ProgressState::new(5, &mut sink);
        state.advance(3).unwrap();
        state.advance(100).unwrap();
        assert_eq!(state.processed(), 5);
        assert_eq!(state.total(), 5);
    }

    #[test]
    fn test_abort_becomes_cancelled() {
        let mut sink = |processed: u64, _total: u64| {
            if processed >= 2 {
                Progress::Abort
            } else {
                Progress::Continue
            }
        };
        let mut state = ProgressState::new(10, &mut sink);
        state.advance(1).unwrap();
        let err = state.advance(1).unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled { processed: 2 }));
    }
}
