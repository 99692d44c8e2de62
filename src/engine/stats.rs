//! Poll throughput tracking and degradation detection.
//!
//! Two independent windows are kept: one for the periodic performance
//! log (reset on every read) and one for the degradation check (reset
//! each time a verdict is produced).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Thresholds for [`StatsTracker::check_degradation`].
#[derive(Debug, Clone)]
pub struct DegradationConfig {
    /// Throughput floor in checks per minute.
    pub min_checks_per_minute: f64,
    /// Cumulative checks required before the floor applies.
    pub min_total_checks: u64,
    /// Minimum window length before a verdict is produced.
    pub window: Duration,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            min_checks_per_minute: 10.0,
            min_total_checks: 100,
            window: Duration::from_secs(300),
        }
    }
}

/// Snapshot returned by [`StatsTracker::throughput`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub checks_per_minute: f64,
    pub total_checks: u64,
    pub period_checks: u64,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    checks_at_start: u64,
}

impl Window {
    fn new(total: u64) -> Self {
        Self {
            started: Instant::now(),
            checks_at_start: total,
        }
    }

    fn rate(&self, total: u64, elapsed: Duration) -> (u64, f64) {
        let checks = total.saturating_sub(self.checks_at_start);
        let secs = elapsed.as_secs_f64();
        let per_minute = if secs > 0.0 {
            checks as f64 / secs * 60.0
        } else {
            0.0
        };
        (checks, per_minute)
    }
}

pub struct StatsTracker {
    total_checks: AtomicU64,
    performance: Mutex<Window>,
    degradation: Mutex<Window>,
    config: DegradationConfig,
}

impl StatsTracker {
    pub fn new(config: DegradationConfig) -> Self {
        Self {
            total_checks: AtomicU64::new(0),
            performance: Mutex::new(Window::new(0)),
            degradation: Mutex::new(Window::new(0)),
            config,
        }
    }

    pub fn increment_checks(&self) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }

    /// Checks per minute since the previous call.
    pub async fn throughput(&self) -> Throughput {
        let total = self.total_checks();
        let mut window = self.performance.lock().await;
        let (period_checks, checks_per_minute) = window.rate(total, window.started.elapsed());
        *window = Window::new(total);

        Throughput {
            checks_per_minute,
            total_checks: total,
            period_checks,
        }
    }

    /// Log throughput alongside the processed-listing count.
    pub async fn log_performance(&self, processed_listings: usize) {
        let t = self.throughput().await;
        info!(
            checks_per_minute = format!("{:.1}", t.checks_per_minute),
            period_checks = t.period_checks,
            total_checks = t.total_checks,
            processed_listings,
            "Performance"
        );
    }

    /// `true` when windowed throughput fell below the floor after the
    /// startup grace period. Returns `false` until the window has run
    /// for at least `config.window`.
    pub async fn check_degradation(&self) -> bool {
        let total = self.total_checks();
        let mut window = self.degradation.lock().await;
        let elapsed = window.started.elapsed();
        if elapsed < self.config.window {
            return false;
        }

        let (_, per_minute) = window.rate(total, elapsed);
        *window = Window::new(total);

        per_minute < self.config.min_checks_per_minute && total > self.config.min_total_checks
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> StatsTracker {
        StatsTracker::new(DegradationConfig {
            min_checks_per_minute: 10.0,
            min_total_checks: 100,
            window: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_resets_each_read() {
        let stats = tracker();
        for _ in 0..30 {
            stats.increment_checks();
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let t = stats.throughput().await;
        assert_eq!(t.period_checks, 30);
        assert_eq!(t.total_checks, 30);
        assert!((t.checks_per_minute - 30.0).abs() < 0.01);

        tokio::time::advance(Duration::from_secs(30)).await;
        stats.increment_checks();
        let t = stats.throughput().await;
        assert_eq!(t.period_checks, 1);
        assert_eq!(t.total_checks, 31);
        assert!((t.checks_per_minute - 2.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_verdict_before_window() {
        let stats = tracker();
        for _ in 0..200 {
            stats.increment_checks();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!stats.check_degradation().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degradation_ignored_during_startup() {
        let stats = tracker();
        for _ in 0..5 {
            stats.increment_checks();
        }
        tokio::time::advance(Duration::from_secs(120)).await;
        // Slow, but cumulative checks have not reached the minimum.
        assert!(!stats.check_degradation().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degradation_detected_after_stall() {
        let stats = tracker();
        for _ in 0..150 {
            stats.increment_checks();
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        // 150 checks in the first minute: healthy.
        assert!(!stats.check_degradation().await);

        for _ in 0..3 {
            stats.increment_checks();
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(stats.check_degradation().await);
    }
}
