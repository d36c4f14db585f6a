//! Send-side progress reporting
//!
//! The engine reports a [`TransferProgress`] snapshot after each chunk. The
//! percentage is `chunks_sent / chunks_total × 100`, rounded down, and only
//! reaches 100 once the transfer is complete.

use std::time::{Duration, Instant};
use wisp_files::TransferId;

/// Transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Chunks are being sent
    Sending,
    /// Every message of the transfer has been sent
    Complete,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sending => write!(f, "Sending"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// Progress snapshot of one outbound transfer
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Transfer id; `None` for single-message transfers
    pub transfer_id: Option<TransferId>,

    /// File being sent
    pub file_name: String,

    /// Current status
    pub status: TransferStatus,

    /// Encrypted bytes sent so far
    pub bytes_sent: u64,

    /// Encrypted payload size
    pub bytes_total: u64,

    /// Chunks sent so far
    pub chunks_sent: u64,

    /// Total chunks (1 for single-message transfers)
    pub chunks_total: u64,

    /// Time since the transfer started
    pub elapsed: Duration,
}

impl TransferProgress {
    /// Integer percentage in `0..=100`
    ///
    /// Reports at most 99 until the status is [`TransferStatus::Complete`].
    pub fn percent(&self) -> u8 {
        if self.status == TransferStatus::Complete {
            return 100;
        }
        if self.chunks_total == 0 {
            return 0;
        }
        let pct = self.chunks_sent.saturating_mul(100) / self.chunks_total;
        pct.min(99) as u8
    }

    /// Check if transfer is complete
    pub fn is_complete(&self) -> bool {
        matches!(self.status, TransferStatus::Complete)
    }

    /// Average send rate so far
    pub fn speed_bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated time remaining at the current average rate
    pub fn eta(&self) -> Option<Duration> {
        let speed = self.speed_bytes_per_sec();
        if speed > 0.0 && self.bytes_sent < self.bytes_total {
            let remaining = (self.bytes_total - self.bytes_sent) as f64;
            Some(Duration::from_secs_f64(remaining / speed))
        } else {
            None
        }
    }

    /// Get human-readable speed string
    pub fn speed_string(&self) -> String {
        let speed = self.speed_bytes_per_sec();
        if speed < 1024.0 {
            format!("{speed:.2} B/s")
        } else if speed < 1024.0 * 1024.0 {
            format!("{:.2} KiB/s", speed / 1024.0)
        } else {
            format!("{:.2} MiB/s", speed / (1024.0 * 1024.0))
        }
    }
}

/// Builds snapshots for one transfer
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    transfer_id: Option<TransferId>,
    file_name: String,
    bytes_total: u64,
    chunks_total: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        transfer_id: Option<TransferId>,
        file_name: &str,
        bytes_total: u64,
        chunks_total: u64,
    ) -> Self {
        Self {
            transfer_id,
            file_name: file_name.to_string(),
            bytes_total,
            chunks_total,
            started: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self, status: TransferStatus, chunks_sent: u64, bytes_sent: u64) -> TransferProgress {
        TransferProgress {
            transfer_id: self.transfer_id.clone(),
            file_name: self.file_name.clone(),
            status,
            bytes_sent,
            bytes_total: self.bytes_total,
            chunks_sent,
            chunks_total: self.chunks_total,
            elapsed: self.started.elapsed(),
        }
    }

    pub(crate) fn complete(&self) -> TransferProgress {
        self.snapshot(TransferStatus::Complete, self.chunks_total, self.bytes_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(chunks_sent: u64, chunks_total: u64, status: TransferStatus) -> TransferProgress {
        TransferProgress {
            transfer_id: Some("t1".into()),
            file_name: "a.bin".into(),
            status,
            bytes_sent: chunks_sent * 100,
            bytes_total: chunks_total * 100,
            chunks_sent,
            chunks_total,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_percent_rounds_down() {
        assert_eq!(progress(1, 4, TransferStatus::Sending).percent(), 25);
        assert_eq!(progress(1, 3, TransferStatus::Sending).percent(), 33);
        assert_eq!(progress(2, 3, TransferStatus::Sending).percent(), 66);
    }

    #[test]
    fn test_percent_capped_until_complete() {
        assert_eq!(progress(4, 4, TransferStatus::Sending).percent(), 99);
        assert_eq!(progress(4, 4, TransferStatus::Complete).percent(), 100);
    }

    #[test]
    fn test_percent_without_chunks() {
        assert_eq!(progress(0, 0, TransferStatus::Sending).percent(), 0);
    }

    #[test]
    fn test_speed_and_eta() {
        let p = progress(2, 4, TransferStatus::Sending);
        assert_eq!(p.speed_bytes_per_sec(), 200.0);
        assert_eq!(p.speed_string(), "200.00 B/s");
        assert_eq!(p.eta(), Some(Duration::from_secs(1)));

        let done = progress(4, 4, TransferStatus::Complete);
        assert!(done.is_complete());
        assert_eq!(done.eta(), None);
    }

    #[test]
    fn test_tracker_complete() {
        let tracker = ProgressTracker::new(None, "a.bin", 500, 1);
        let snapshot = tracker.complete();
        assert_eq!(snapshot.percent(), 100);
        assert_eq!(snapshot.bytes_sent, 500);
        assert_eq!(snapshot.transfer_id, None);
    }
}
