//! Download progress accounting.

use std::time::{Duration, Instant};

/// Progress information for a download.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes (if known).
    pub total_bytes: Option<u64>,
    /// Download speed in bytes per second.
    pub speed_bytes_per_sec: f64,
    /// Percentage complete (0-100).
    pub percent: Option<f64>,
    /// Estimated time remaining in seconds.
    pub eta_seconds: Option<f64>,
}

impl DownloadProgress {
    pub fn new(bytes_downloaded: u64, total_bytes: Option<u64>, speed: f64) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        });

        let eta_seconds = total_bytes.and_then(|total| {
            if speed > 0.0 && bytes_downloaded < total {
                Some((total - bytes_downloaded) as f64 / speed)
            } else {
                None
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            speed_bytes_per_sec: speed,
            percent,
            eta_seconds,
        }
    }

    /// One-line summary for log output.
    pub fn summary(&self) -> String {
        const MIB: f64 = 1024.0 * 1024.0;
        let done = self.bytes_downloaded as f64 / MIB;
        let speed = self.speed_bytes_per_sec / MIB;
        match (self.total_bytes, self.percent) {
            (Some(total), Some(percent)) => format!(
                "{done:.0}/{:.0} MiB ({percent:.1}%, {speed:.1} MiB/s)",
                total as f64 / MIB
            ),
            _ => format!("{done:.0} MiB ({speed:.1} MiB/s)"),
        }
    }
}

/// Average throughput since the download started, with a throttle for
/// periodic reporting.
pub(crate) struct SpeedTracker {
    start_time: Instant,
    total_bytes: u64,
    last_report: Instant,
    report_interval: Duration,
}

impl SpeedTracker {
    pub(crate) fn new(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            total_bytes: 0,
            last_report: now,
            report_interval,
        }
    }

    pub(crate) fn record(&mut self, bytes: u64) {
        self.total_bytes += bytes;
    }

    pub(crate) fn speed(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_bytes as f64 / elapsed
        } else {
            0.0
        }
    }

    /// True at most once per report interval.
    pub(crate) fn report_due(&mut self) -> bool {
        if self.last_report.elapsed() >= self.report_interval {
            self.last_report = Instant::now();
            true
        } else {
            false
        }
    }
}
