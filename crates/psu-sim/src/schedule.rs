//! Tick scheduling
//!
//! Two independent periodic jobs share one control thread: polling the
//! actual readings and applying noise. [`TickSchedule`] tracks both deadlines
//! and reports which jobs are due at a given instant.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Schedule configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Interval between `poll_actual` calls
    pub poll_interval_ms: u64,
    /// Interval between noise ticks
    pub noise_interval_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            noise_interval_ms: 1000,
        }
    }
}

/// Jobs due at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DueTicks {
    pub poll: bool,
    pub noise: bool,
}

impl DueTicks {
    /// Returns true if any job is due
    pub fn any(&self) -> bool {
        self.poll || self.noise
    }
}

/// Deadlines for the poll and noise jobs
#[derive(Debug, Clone)]
pub struct TickSchedule {
    poll_interval: Duration,
    noise_interval: Duration,
    next_poll: Instant,
    next_noise: Instant,
}

impl TickSchedule {
    /// Start a schedule at `start`; both jobs are first due one interval later
    pub fn new(config: ScheduleConfig, start: Instant) -> Self {
        // Zero would make the job due forever
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        let noise_interval = Duration::from_millis(config.noise_interval_ms.max(1));

        Self {
            poll_interval,
            noise_interval,
            next_poll: start + poll_interval,
            next_noise: start + noise_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn noise_interval(&self) -> Duration {
        self.noise_interval
    }

    /// The earliest instant at which a job becomes due
    pub fn next_deadline(&self) -> Instant {
        self.next_poll.min(self.next_noise)
    }

    /// Report which jobs are due at `now` and advance their deadlines
    ///
    /// A job that fell several intervals behind fires once and is
    /// rescheduled relative to `now`, so a slow transport never causes a
    /// burst of catch-up ticks.
    pub fn due(&mut self, now: Instant) -> DueTicks {
        DueTicks {
            poll: advance(&mut self.next_poll, self.poll_interval, now),
            noise: advance(&mut self.next_noise, self.noise_interval, now),
        }
    }
}

fn advance(deadline: &mut Instant, interval: Duration, now: Instant) -> bool {
    if now < *deadline {
        return false;
    }
    let next = *deadline + interval;
    *deadline = if next > now { next } else { now + interval };
    true
}
