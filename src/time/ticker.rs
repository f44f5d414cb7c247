use std::time::Duration;

// -------------------------------------------------------------------------------------------------

/// A re-arming wall-clock interval timer.
///
/// The ticker does not own a thread: the host polls [`Self::is_due`] from its control loop and
/// calls [`Self::rearm`] after doing its work, which schedules the next firing `interval` seconds
/// after the given time.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    interval: f64,
    next_fire: Option<f64>,
}

impl Ticker {
    /// Create a new, disarmed ticker with the given re-arm interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.as_secs_f64(),
            next_fire: None,
        }
    }

    /// The re-arm interval in seconds.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Time in seconds when the ticker fires next. None when disarmed.
    pub fn next_fire(&self) -> Option<f64> {
        self.next_fire
    }

    pub fn is_armed(&self) -> bool {
        self.next_fire.is_some()
    }

    /// Arm the ticker so that it's immediately due at `now`.
    pub fn arm(&mut self, now: f64) {
        self.next_fire = Some(now);
    }

    /// Cancel the pending firing.
    pub fn disarm(&mut self) {
        self.next_fire = None;
    }

    /// Returns true when the ticker is armed and its firing time has been reached.
    pub fn is_due(&self, now: f64) -> bool {
        self.next_fire.is_some_and(|time| now >= time)
    }

    /// Schedule the next firing one interval after `now`.
    pub fn rearm(&mut self, now: f64) {
        self.next_fire = Some(now + self.interval);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_and_rearm() {
        let mut ticker = Ticker::new(Duration::from_millis(25));
        assert!(!ticker.is_armed());
        assert!(!ticker.is_due(10.0));

        ticker.arm(1.0);
        assert!(ticker.is_due(1.0));
        assert!(!ticker.is_due(0.5));

        ticker.rearm(1.0);
        assert!(!ticker.is_due(1.01));
        assert!(ticker.is_due(1.025));

        ticker.disarm();
        assert!(!ticker.is_due(2.0));
        assert_eq!(ticker.next_fire(), None);
    }
}
