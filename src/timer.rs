//! Cancellable one-shot deadlines driven by the host clock.
//!
//! Time is plain seconds as `f64` (egui's `i.time`, or any monotonic clock the
//! host prefers). Nothing fires on its own: the owner calls [`Deadline::fire`]
//! from its event loop, so a cancelled or replaced deadline can never run late.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Deadline {
    at: Option<f64>,
}

impl Deadline {
    /// Arm (or re-arm) to expire `secs` after `now`.
    pub fn start(&mut self, now: f64, secs: f64) {
        self.at = Some(now + secs);
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Seconds until expiry, if armed.
    pub fn remaining(&self, now: f64) -> Option<f64> {
        self.at.map(|at| (at - now).max(0.0))
    }

    /// Returns `true` exactly once when `now` has reached the deadline, and
    /// disarms it.
    pub fn fire(&mut self, now: f64) -> bool {
        match self.at {
            Some(at) if now >= at => {
                self.at = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_expiry() {
        let mut d = Deadline::default();
        d.start(10.0, 3.0);
        assert!(!d.fire(12.9));
        assert!(d.fire(13.0));
        assert!(!d.fire(20.0));
    }

    #[test]
    fn cancelled_deadline_never_fires() {
        let mut d = Deadline::default();
        d.start(0.0, 1.0);
        d.cancel();
        assert!(!d.fire(5.0));
        assert_eq!(d.remaining(5.0), None);
    }

    #[test]
    fn restart_replaces_previous_deadline() {
        let mut d = Deadline::default();
        d.start(0.0, 1.0);
        d.start(0.5, 3.0);
        assert!(!d.fire(1.5));
        assert_eq!(d.remaining(2.5), Some(1.0));
    }
}
