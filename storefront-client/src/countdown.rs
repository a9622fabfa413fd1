use std::time::Instant;

use shared::{WARNING_FIRST_SECS, WARNING_SECOND_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    WarningThreeMinutes,
    WarningOneMinute,
    Expired,
}

/// Tracks the hold window on the buyer's side. Remaining time is always
/// derived from the last server-reported value plus locally elapsed
/// monotonic time, never from accumulated tick decrements, so repeated
/// polling cannot drift the clock.
///
/// The two warnings and the expiry event each fire exactly once for the
/// lifetime of the reservation; re-anchoring from a status poll does not
/// re-arm them.
#[derive(Debug)]
pub struct Countdown {
    anchor: Instant,
    remaining_at_anchor: i64,
    warned_three_minutes: bool,
    warned_one_minute: bool,
    expired: bool,
}

impl Countdown {
    pub fn new(time_remaining: i64) -> Self {
        Self::anchored(time_remaining, Instant::now())
    }

    pub fn anchored(time_remaining: i64, now: Instant) -> Self {
        Countdown {
            anchor: now,
            remaining_at_anchor: time_remaining.max(0),
            warned_three_minutes: false,
            warned_one_minute: false,
            expired: false,
        }
    }

    /// Seconds left on the hold, clamped at zero.
    pub fn remaining(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.anchor).as_secs() as i64;
        (self.remaining_at_anchor - elapsed).max(0)
    }

    /// Re-anchor from a fresh server-reported value. Warning flags are
    /// deliberately left alone.
    pub fn resync(&mut self, time_remaining: i64, now: Instant) {
        self.anchor = now;
        self.remaining_at_anchor = time_remaining.max(0);
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Advance the countdown. Returns at most one newly-due event; callers
    /// tick once per frame or timer interval and surface whatever comes out.
    pub fn tick(&mut self, now: Instant) -> Option<CountdownEvent> {
        let remaining = self.remaining(now);

        if remaining == 0 {
            if self.expired {
                return None;
            }
            self.expired = true;
            return Some(CountdownEvent::Expired);
        }

        if remaining <= WARNING_SECOND_SECS && !self.warned_one_minute {
            self.warned_one_minute = true;
            // skipping straight past the earlier threshold must not fire it late
            self.warned_three_minutes = true;
            return Some(CountdownEvent::WarningOneMinute);
        }

        if remaining <= WARNING_FIRST_SECS && !self.warned_three_minutes {
            self.warned_three_minutes = true;
            return Some(CountdownEvent::WarningThreeMinutes);
        }

        None
    }
}
