// SPDX-License-Identifier: GPL-3.0-only

//! Capture schedule bookkeeping
//!
//! A schedule is finished after `total_shots` capture *attempts*. Failed
//! attempts count towards the total but not towards `shots_taken`, so a
//! flaky camera can never keep a schedule running forever.

use crate::constants::{
    MAX_INTERVAL_SECONDS, MAX_TOTAL_SHOTS, MIN_INTERVAL_SECONDS, MIN_TOTAL_SHOTS,
    is_valid_interval, is_valid_shot_count,
};
use crate::errors::{HardwareError, OrchestratorError, OrchestratorResult};
use std::time::Duration;
use tokio::time::Instant;

/// Check the arguments of a start request
pub fn validate(interval_seconds: u32, total_shots: u32) -> OrchestratorResult<()> {
    if !is_valid_interval(interval_seconds) {
        return Err(OrchestratorError::InvalidArgument(format!(
            "interval must be between {} and {} seconds, got {}",
            MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS, interval_seconds
        )));
    }
    if !is_valid_shot_count(total_shots) {
        return Err(OrchestratorError::InvalidArgument(format!(
            "total shots must be between {} and {}, got {}",
            MIN_TOTAL_SHOTS, MAX_TOTAL_SHOTS, total_shots
        )));
    }
    Ok(())
}

/// Why a schedule ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Every attempt was made
    Completed,
    /// Stopped by request
    Stopped,
    /// Stopped by request, reported as a forced stop
    ForceStopped,
    /// The camera faulted mid-schedule
    AbortedByFault(HardwareError),
}

impl std::fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleOutcome::Completed => write!(f, "completed"),
            ScheduleOutcome::Stopped => write!(f, "stopped"),
            ScheduleOutcome::ForceStopped => write!(f, "force stopped"),
            ScheduleOutcome::AbortedByFault(e) => write!(f, "aborted: {}", e),
        }
    }
}

/// Final numbers of a finished schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub outcome: ScheduleOutcome,
    pub shots_taken: u32,
    pub total_shots: u32,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl ScheduleSummary {
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

impl std::fmt::Display for ScheduleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{} shots in {}",
            self.outcome,
            self.shots_taken,
            self.total_shots,
            self.elapsed_label()
        )
    }
}

/// Format a duration as "42s", "3m 5s" or "1h 2m 3s"
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// A running schedule
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub interval_seconds: u32,
    pub total_shots: u32,
    pub shots_taken: u32,
    pub attempts: u32,
    pub started_at: Instant,
}

impl ScheduleState {
    /// Create a schedule; arguments must already be validated
    pub fn new(interval_seconds: u32, total_shots: u32, started_at: Instant) -> Self {
        Self {
            interval_seconds,
            total_shots,
            shots_taken: 0,
            attempts: 0,
            started_at,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.total_shots
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn record_success(&mut self) {
        self.shots_taken = (self.shots_taken + 1).min(self.total_shots);
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Close the schedule with an outcome
    pub fn finish(self, outcome: ScheduleOutcome) -> ScheduleSummary {
        ScheduleSummary {
            elapsed: self.elapsed(),
            outcome,
            shots_taken: self.shots_taken,
            total_shots: self.total_shots,
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(validate(1, 1).is_ok());
        assert!(validate(3600, 1000).is_ok());
        assert!(matches!(
            validate(0, 10),
            Err(OrchestratorError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate(3601, 10),
            Err(OrchestratorError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate(5, 0),
            Err(OrchestratorError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate(5, 1001),
            Err(OrchestratorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "0s");
        assert_eq!(format_elapsed(Duration::from_millis(59_900)), "59s");
        assert_eq!(format_elapsed(Duration::from_secs(185)), "3m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 2m 3s");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1h 0m 0s");
    }

    #[test]
    fn test_attempts_bound_the_schedule() {
        let mut schedule = ScheduleState::new(5, 2, Instant::now());
        assert!(!schedule.is_exhausted());

        schedule.record_attempt();
        schedule.record_success();
        schedule.record_attempt();
        assert!(schedule.is_exhausted());

        let summary = schedule.finish(ScheduleOutcome::Completed);
        assert_eq!(summary.shots_taken, 1);
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.total_shots, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_follows_the_clock() {
        let schedule = ScheduleState::new(5, 3, Instant::now());
        tokio::time::advance(Duration::from_secs(65)).await;
        let summary = schedule.finish(ScheduleOutcome::Stopped);
        assert_eq!(summary.elapsed_label(), "1m 5s");
        assert_eq!(summary.to_string(), "stopped: 0/3 shots in 1m 5s");
    }
}
