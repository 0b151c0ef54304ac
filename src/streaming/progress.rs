//! Progress snapshots and run statistics for streaming decodes

use crate::engine::DecodeSpan;
use std::time::Duration;

/// Emitted after each completed chunk when progress reporting is enabled
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    /// Samples whose owning chunk has completed (overlap not double-counted)
    pub processed_samples: usize,
    /// Percent complete in `[0, 100]`
    pub percent: f64,
    /// Chunks completed so far
    pub current_chunk: usize,
    pub total_chunks: usize,
    /// Instantaneous processing speed, samples per second
    pub speed: f64,
    /// Estimated time remaining; 0 while percent is 0, never negative
    pub eta_ms: u64,
}

impl ProgressSnapshot {
    /// Derive a snapshot from elapsed wall time and completed work
    pub fn compute(
        processed_samples: usize,
        total_samples: usize,
        current_chunk: usize,
        total_chunks: usize,
        elapsed: Duration,
    ) -> Self {
        let percent = if total_samples == 0 {
            100.0
        } else {
            processed_samples as f64 / total_samples as f64 * 100.0
        };
        let secs = elapsed.as_secs_f64();
        let speed = if secs > 0.0 {
            processed_samples as f64 / secs
        } else {
            0.0
        };
        let eta_ms = if percent > 0.0 {
            let remaining = elapsed.as_millis() as f64 * (100.0 - percent) / percent;
            remaining.max(0.0) as u64
        } else {
            0
        };
        Self {
            processed_samples,
            percent,
            current_chunk,
            total_chunks,
            speed,
            eta_ms,
        }
    }
}

/// Final statistics of a streaming run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamingStats {
    pub total_samples: usize,
    pub chunks_processed: usize,
    pub processing_time_ms: u64,
    /// Samples per second over the whole run
    pub average_speed: f64,
    pub total_results: usize,
    /// High-water mark of in-flight chunk buffer bytes
    pub peak_memory_usage: usize,
}

/// Resolved result of a streaming run
///
/// Hook failures and user cancellation land here as `success: false` with
/// whatever partial results and statistics had accumulated; they are never
/// surfaced as `Err`.
#[derive(Clone, Debug, Default)]
pub struct StreamingOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Per-chunk spans concatenated by chunk index, not completion order
    pub results: Vec<DecodeSpan>,
    pub stats: StreamingStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_zero_at_zero_percent() {
        let snap = ProgressSnapshot::compute(0, 1000, 0, 4, Duration::from_millis(500));
        assert_eq!(snap.percent, 0.0);
        assert_eq!(snap.eta_ms, 0, "ETA must be 0 while percent is 0");
    }

    #[test]
    fn test_eta_never_negative() {
        // Past 100% (all chunks done) the remaining estimate clamps to 0
        let snap = ProgressSnapshot::compute(1000, 1000, 4, 4, Duration::from_millis(80));
        assert_eq!(snap.percent, 100.0);
        assert_eq!(snap.eta_ms, 0);
    }

    #[test]
    fn test_halfway_estimate() {
        let snap = ProgressSnapshot::compute(500, 1000, 2, 4, Duration::from_millis(200));
        assert_eq!(snap.percent, 50.0);
        assert_eq!(snap.eta_ms, 200, "half done in 200ms leaves 200ms");
        assert!(snap.speed > 0.0);
    }
}
