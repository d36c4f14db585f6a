//! Transfer progress display with progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BYTES_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const CHUNKS_TEMPLATE: &str = "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} chunks";

/// Progress bar for one transfer
#[derive(Clone)]
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Bar measured in bytes, for outbound transfers
    #[must_use]
    pub fn bytes(total_bytes: u64, filename: &str) -> Self {
        Self::with_template(total_bytes, BYTES_TEMPLATE, format!("Sending: {filename}"))
    }

    /// Bar measured in chunks, for inbound transfers
    #[must_use]
    pub fn chunks(total_chunks: u64, filename: &str) -> Self {
        Self::with_template(total_chunks, CHUNKS_TEMPLATE, format!("Receiving: {filename}"))
    }

    fn with_template(len: u64, template: &str, message: String) -> Self {
        let bar = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template(template)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Update progress
    pub fn update(&self, position: u64) {
        self.bar.set_position(position);
    }

    /// Update progress against a total that may differ from the initial
    /// length
    pub fn update_with_total(&self, position: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(position);
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    /// Abandon the progress bar (for errors)
    pub fn abandon(&self, msg: String) {
        self.bar.abandon_with_message(msg);
    }
}

/// Format bytes in human-readable format
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format duration in human-readable format
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(16 * 1024), "16.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024_u64.pow(4)), "1.00 TB");
    }

    #[test]
    fn test_update_with_total_resizes() {
        let bar = TransferBar::bytes(50_000, "a.bin");
        bar.update_with_total(50_016, 50_016);

        assert_eq!(bar.bar.length(), Some(50_016));
        assert_eq!(bar.bar.position(), 50_016);
        bar.abandon(String::new());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m");
    }
}
