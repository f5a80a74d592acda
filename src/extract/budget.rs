//! Attempt budgets and the polling/probing schedules
//!
//! The numeric defaults mirror the behavior the remote site was tuned against
//! (30 attempts/60 s for text, 60 attempts/120 s for image generation), but
//! they are configuration defaults, not contracts. Override them in
//! `config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Read-only per-run budget, fixed at run start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttemptBudget {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_deadline_ms")]
    pub overall_deadline_ms: u64,
}

fn default_max_attempts() -> u32 {
    30
}
fn default_deadline_ms() -> u64 {
    60_000
}

impl AttemptBudget {
    pub const fn new(max_attempts: u32, overall_deadline_ms: u64) -> Self {
        Self {
            max_attempts,
            overall_deadline_ms,
        }
    }

    /// Default budget for text requests: short answers usually render fast.
    pub const fn text() -> Self {
        Self::new(30, 60_000)
    }

    /// Default budget for image generation: the remote side renders slowly.
    pub const fn image() -> Self {
        Self::new(60, 120_000)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }
}

impl Default for AttemptBudget {
    fn default() -> Self {
        Self::text()
    }
}

/// Sleep before the next extraction attempt.
///
/// Front-loaded: the common case is an answer rendering within 1-2 s, so the
/// first attempts come fast; once a response is clearly slow we stop hammering
/// the page.
pub fn poll_delay(attempt: u32, elapsed: Duration) -> Duration {
    let ms = match attempt {
        0..=3 => 100,
        4..=8 => 200,
        9..=15 if elapsed < Duration::from_secs(8) => 400,
        _ if elapsed < Duration::from_secs(15) => 600,
        _ => 1000,
    };
    Duration::from_millis(ms)
}

/// Interval between completion-detector probes.
///
/// Starts fast to catch quick answers, widens at the same elapsed-time
/// thresholds the poll schedule uses.
pub fn probe_interval(elapsed: Duration) -> Duration {
    let ms = if elapsed < Duration::from_secs(10) {
        200
    } else if elapsed < Duration::from_secs(15) {
        500
    } else {
        1000
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_schedule_is_front_loaded() {
        let early = Duration::from_secs(1);
        assert_eq!(poll_delay(1, early), Duration::from_millis(100));
        assert_eq!(poll_delay(3, early), Duration::from_millis(100));
        assert_eq!(poll_delay(4, early), Duration::from_millis(200));
        assert_eq!(poll_delay(8, early), Duration::from_millis(200));
        assert_eq!(poll_delay(9, early), Duration::from_millis(400));
        assert_eq!(poll_delay(15, early), Duration::from_millis(400));
    }

    #[test]
    fn poll_schedule_widens_with_elapsed_time() {
        // Past the 8s mark, mid attempts slow to 600ms.
        assert_eq!(
            poll_delay(10, Duration::from_secs(9)),
            Duration::from_millis(600)
        );
        assert_eq!(
            poll_delay(20, Duration::from_secs(14)),
            Duration::from_millis(600)
        );
        assert_eq!(
            poll_delay(20, Duration::from_secs(15)),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn probe_interval_steps_at_10_and_15_seconds() {
        assert_eq!(probe_interval(Duration::ZERO), Duration::from_millis(200));
        assert_eq!(
            probe_interval(Duration::from_secs(9)),
            Duration::from_millis(200)
        );
        assert_eq!(
            probe_interval(Duration::from_secs(10)),
            Duration::from_millis(500)
        );
        assert_eq!(
            probe_interval(Duration::from_secs(15)),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn image_budget_is_larger_than_text() {
        let text = AttemptBudget::text();
        let image = AttemptBudget::image();
        assert!(image.max_attempts > text.max_attempts);
        assert!(image.overall_deadline() > text.overall_deadline());
    }
}
