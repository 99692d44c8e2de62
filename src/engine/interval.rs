//! Adaptive polling interval.
//!
//! Each hunter loop owns one `AdaptiveInterval`. It starts at the base
//! interval, backs off on rate limits and repeated errors, tightens
//! when cycles are fast, and drifts back to base after a streak of
//! clean cycles. The interval never leaves `[min, max]`.

use std::time::Duration;

/// Tuning for [`AdaptiveInterval`].
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    pub base: Duration,
    /// Floor.
    pub min: Duration,
    /// Ceiling.
    pub max: Duration,
    /// Enables fast/slow cycle adjustments.
    pub adaptive: bool,
    /// Cycles quicker than this shrink the interval.
    pub fast_cycle: Duration,
    /// Cycles slower than this grow the interval.
    pub slow_cycle: Duration,
    pub shrink_factor: f64,
    pub grow_factor: f64,
    pub recovery_factor: f64,
    pub flood_factor: f64,
    pub error_factor: f64,
    /// Clean cycles needed before decaying toward base.
    pub recovery_streak: u32,
    /// Consecutive errors tolerated before backing off.
    pub error_threshold: u32,
    /// Lower bound for any single sleep.
    pub min_sleep: Duration,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            min: Duration::from_millis(300),
            max: Duration::from_secs(30),
            adaptive: true,
            fast_cycle: Duration::from_millis(300),
            slow_cycle: Duration::from_secs(3),
            shrink_factor: 0.9,
            grow_factor: 1.2,
            recovery_factor: 0.95,
            flood_factor: 2.0,
            error_factor: 1.5,
            recovery_streak: 10,
            error_threshold: 3,
            min_sleep: Duration::from_millis(100),
        }
    }
}

pub struct AdaptiveInterval {
    config: IntervalConfig,
    base: Duration,
    current: Duration,
    success_streak: u32,
    consecutive_errors: u32,
}

impl AdaptiveInterval {
    pub fn new(config: IntervalConfig) -> Self {
        let (min, max) = if config.min <= config.max {
            (config.min, config.max)
        } else {
            (config.max, config.min)
        };
        let config = IntervalConfig { min, max, ..config };
        let base = config.base.clamp(min, max);
        Self {
            config,
            base,
            current: base,
            success_streak: 0,
            consecutive_errors: 0,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// A cycle completed normally in `cycle`.
    pub fn on_success(&mut self, cycle: Duration) {
        self.consecutive_errors = 0;
        self.success_streak = self.success_streak.saturating_add(1);

        if self.success_streak > self.config.recovery_streak && self.current > self.base {
            self.current = self.scaled(self.config.recovery_factor).max(self.base);
        }

        if self.config.adaptive {
            if cycle < self.config.fast_cycle {
                self.current = self.scaled(self.config.shrink_factor);
            } else if cycle > self.config.slow_cycle {
                self.current = self.scaled(self.config.grow_factor);
            }
        }
    }

    /// The platform demanded a cooldown.
    pub fn on_rate_limited(&mut self) {
        self.success_streak = 0;
        self.current = self.scaled(self.config.flood_factor);
    }

    pub fn on_error(&mut self) {
        self.success_streak = 0;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.consecutive_errors > self.config.error_threshold {
            self.current = self.scaled(self.config.error_factor);
        }
    }

    /// Time to sleep after a cycle that took `elapsed`, plus `jitter`.
    pub fn sleep_after(&self, elapsed: Duration, jitter: Duration) -> Duration {
        self.current
            .saturating_sub(elapsed)
            .max(self.config.min_sleep)
            + jitter
    }

    fn scaled(&self, factor: f64) -> Duration {
        self.current
            .mul_f64(factor)
            .clamp(self.config.min, self.config.max)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
