//! Pause/resume state machine gating delivery.
//!
//! Two states: Active and Paused. A pause records its start instant and
//! auto-expires after a fixed duration; the expiry check runs at the start
//! of every poll cycle and is one-shot per pause.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Default auto-resume window: 12 hours.
pub const DEFAULT_PAUSE_DURATION_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Default)]
struct PauseState {
    paused: bool,
    // Invariant: is_some() iff paused.
    since: Option<DateTime<Utc>>,
}

/// Serializes pause state mutations from the command listener, the poll
/// loop and the expiry checker behind a single lock.
#[derive(Debug)]
pub struct PauseController {
    duration: Duration,
    state: Mutex<PauseState>,
}

/// Snapshot of pause state for status rendering and the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseSnapshot {
    pub paused: bool,
    pub remaining_secs: Option<i64>,
}

impl PauseController {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Mutex::new(PauseState::default()),
        }
    }

    /// Whether delivery is currently allowed.
    pub fn is_active(&self) -> bool {
        !self.state.lock().unwrap().paused
    }

    /// Enter the Paused state. Returns `true` if the state changed,
    /// `false` if already paused (idempotent no-op).
    pub fn pause(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.paused {
            return false;
        }
        state.paused = true;
        state.since = Some(now);
        true
    }

    /// Return to the Active state. Returns `true` if the state changed.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.paused {
            return false;
        }
        state.paused = false;
        state.since = None;
        true
    }

    /// One-shot expiry check: if the pause window has elapsed, flip back to
    /// Active and return `true` exactly once. Callers emit the auto-resume
    /// notification on `true`.
    pub fn check_expired(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(since) = state.since else {
            return false;
        };
        if now - since < self.duration {
            return false;
        }
        state.paused = false;
        state.since = None;
        true
    }

    /// Time left until auto-resume, `None` when active. Clamped to zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        state
            .since
            .map(|since| (self.duration - (now - since)).max(Duration::zero()))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> PauseSnapshot {
        PauseSnapshot {
            paused: !self.is_active(),
            remaining_secs: self.remaining(now).map(|d| d.num_seconds()),
        }
    }
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_PAUSE_DURATION_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PauseController {
        PauseController::new(Duration::hours(12))
    }

    #[test]
    fn starts_active() {
        let pc = controller();
        assert!(pc.is_active());
        assert_eq!(pc.remaining(Utc::now()), None);
    }

    #[test]
    fn pause_then_is_active_false() {
        let pc = controller();
        assert!(pc.pause(Utc::now()));
        assert!(!pc.is_active());
    }

    #[test]
    fn pause_is_idempotent() {
        let pc = controller();
        let now = Utc::now();
        assert!(pc.pause(now));
        assert!(!pc.pause(now + Duration::minutes(1)));
        assert!(!pc.is_active());
    }

    #[test]
    fn resume_is_idempotent() {
        let pc = controller();
        assert!(!pc.resume());
        pc.pause(Utc::now());
        assert!(pc.resume());
        assert!(!pc.resume());
        assert!(pc.is_active());
    }

    #[test]
    fn expiry_flips_exactly_once() {
        let pc = controller();
        let start = Utc::now();
        pc.pause(start);

        // Not expired just before the window.
        assert!(!pc.check_expired(start + Duration::hours(11)));
        assert!(!pc.is_active());

        // Expired exactly at the window boundary, once.
        assert!(pc.check_expired(start + Duration::hours(12)));
        assert!(pc.is_active());
        assert!(!pc.check_expired(start + Duration::hours(13)));
    }

    #[test]
    fn manual_resume_disarms_expiry() {
        let pc = controller();
        let start = Utc::now();
        pc.pause(start);
        pc.resume();
        assert!(!pc.check_expired(start + Duration::hours(13)));
    }

    #[test]
    fn remaining_counts_down_and_clamps() {
        let pc = controller();
        let start = Utc::now();
        pc.pause(start);

        assert_eq!(
            pc.remaining(start + Duration::hours(4)),
            Some(Duration::hours(8))
        );
        // Past the window (expiry not yet checked) clamps to zero.
        assert_eq!(
            pc.remaining(start + Duration::hours(13)),
            Some(Duration::zero())
        );
    }

    #[test]
    fn snapshot_reflects_state() {
        let pc = controller();
        let start = Utc::now();

        let snap = pc.snapshot(start);
        assert!(!snap.paused);
        assert_eq!(snap.remaining_secs, None);

        pc.pause(start);
        let snap = pc.snapshot(start + Duration::hours(2));
        assert!(snap.paused);
        assert_eq!(snap.remaining_secs, Some(10 * 60 * 60));
    }
}
