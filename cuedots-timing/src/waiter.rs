use std::time::Duration;

use crate::timer::Clock;

/// Result of [`StaticPeriod::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No period was running.
    Idle,
    /// The deadline was still ahead; the caller slept for `waited`.
    OnTime { waited: Duration },
    /// Work between `start` and `complete` outlasted the period by `by`.
    Overrun { by: Duration },
}

impl Completion {
    pub fn is_overrun(&self) -> bool {
        matches!(self, Completion::Overrun { .. })
    }
}

/// Countdown anchored at `start` that `complete` blocks on.
///
/// Anything the caller does between the two calls (drawing, persisting a
/// record) is absorbed by the countdown instead of being added to it. With a
/// refresh rate, the deadline is pulled in by one frame period, so the flip
/// issued right after `complete` is shown at the refresh due at the
/// requested time rather than one frame later.
#[derive(Debug, Clone)]
pub struct StaticPeriod<C: Clock> {
    clock: C,
    frame_period: Duration,
    lead: Duration,
    deadline: Option<Duration>,
}

impl<C: Clock> StaticPeriod<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            frame_period: Duration::ZERO,
            lead: Duration::ZERO,
            deadline: None,
        }
    }

    pub fn for_refresh_rate(clock: C, refresh_hz: f64) -> Self {
        let frame_period = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            Duration::from_secs_f64(1.0 / refresh_hz)
        } else {
            Duration::ZERO
        };
        Self {
            clock,
            frame_period,
            lead: frame_period,
            deadline: None,
        }
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Starts a new period, replacing any period still running.
    pub fn start(&mut self, duration: Duration) {
        let wait = duration.saturating_sub(self.lead);
        self.deadline = Some(self.clock.now() + wait);
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_sub(self.clock.now()))
    }

    pub fn complete(&mut self) -> Completion {
        let Some(deadline) = self.deadline.take() else {
            return Completion::Idle;
        };
        let now = self.clock.now();
        if now > deadline {
            let by = now - deadline;
            tracing::warn!(
                overrun_ms = by.as_secs_f64() * 1e3,
                "static period overran its deadline"
            );
            return Completion::Overrun { by };
        }
        let waited = deadline - now;
        self.clock.sleep(waited);
        Completion::OnTime { waited }
    }
}
