//! Countdown clock

use crate::{CoreError, CoreResult};

/// Signal produced by [`Clock::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Remaining time reached zero. Emitted once per clock.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    Idle,
    Ticking,
    Stopped,
    Expired,
}

/// Converts a fixed duration into a whole-second countdown and a single
/// expiry signal.
///
/// The clock does not own a timer. The caller invokes [`tick`](Self::tick)
/// once per elapsed second.
#[derive(Debug)]
pub struct Clock {
    state: ClockState,
    remaining: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            state: ClockState::Idle,
            remaining: 0,
        }
    }

    /// Begin counting down from `duration_seconds`.
    ///
    /// A clock can be started once; later calls fail even after it stops.
    pub fn start(&mut self, duration_seconds: u64) -> CoreResult<()> {
        if self.state != ClockState::Idle {
            return Err(CoreError::AlreadyStarted);
        }
        self.remaining = duration_seconds;
        self.state = ClockState::Ticking;
        Ok(())
    }

    /// Advance by one second.
    ///
    /// Returns `Some(Expired)` on the tick that reaches zero. Inert
    /// afterwards, and while idle or stopped.
    pub fn tick(&mut self) -> Option<ClockEvent> {
        if self.state != ClockState::Ticking {
            return None;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = ClockState::Expired;
            return Some(ClockEvent::Expired);
        }
        None
    }

    /// Halt without emitting `Expired`. Idempotent.
    pub fn stop(&mut self) {
        if self.state == ClockState::Ticking {
            self.state = ClockState::Stopped;
        }
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Ticking
    }

    pub fn has_expired(&self) -> bool {
        self.state == ClockState::Expired
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_once_after_duration_ticks() {
        for duration in 1..=20u64 {
            let mut clock = Clock::new();
            clock.start(duration).unwrap();

            let expiries = (0..duration)
                .filter_map(|_| clock.tick())
                .filter(|e| *e == ClockEvent::Expired)
                .count();

            assert_eq!(expiries, 1, "duration {}", duration);
            assert_eq!(clock.remaining_seconds(), 0);
            assert!(clock.has_expired());

            // Ticking past expiry is a no-op
            for _ in 0..5 {
                assert_eq!(clock.tick(), None);
            }
            assert_eq!(clock.remaining_seconds(), 0);
        }
    }

    #[test]
    fn expiry_only_on_final_tick() {
        let mut clock = Clock::new();
        clock.start(3).unwrap();

        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining_seconds(), 2);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.tick(), Some(ClockEvent::Expired));
    }

    #[test]
    fn start_twice_fails() {
        let mut clock = Clock::new();
        clock.start(10).unwrap();
        assert_eq!(clock.start(10), Err(CoreError::AlreadyStarted));

        clock.stop();
        assert_eq!(clock.start(10), Err(CoreError::AlreadyStarted));
    }

    #[test]
    fn stop_is_silent_and_idempotent() {
        let mut clock = Clock::new();
        clock.start(2).unwrap();
        clock.tick();

        clock.stop();
        clock.stop();

        assert!(!clock.is_running());
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining_seconds(), 1);
        assert!(!clock.has_expired());
    }

    #[test]
    fn unstarted_clock_is_inert() {
        let mut clock = Clock::new();
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining_seconds(), 0);
    }

    #[test]
    fn zero_duration_expires_on_first_tick() {
        let mut clock = Clock::new();
        clock.start(0).unwrap();
        assert_eq!(clock.tick(), Some(ClockEvent::Expired));
        assert_eq!(clock.tick(), None);
    }
}
