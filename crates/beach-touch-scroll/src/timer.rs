use std::time::{Duration, Instant};

/// Owned handle for the single pending flush. Cancelling clears the deadline,
/// so a cancelled flush can never fire.
#[derive(Debug, Default)]
pub struct FlushTimer {
    deadline: Option<Instant>,
}

impl FlushTimer {
    /// Arms the timer unless an earlier deadline is already pending.
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        let deadline = now + delay;
        if self.deadline.is_some_and(|pending| pending <= deadline) {
            return;
        }
        self.deadline = Some(deadline);
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarms and returns true when the deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
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
    fn repeated_arms_coalesce() {
        let now = Instant::now();
        let mut timer = FlushTimer::default();
        timer.arm(now, Duration::from_millis(16));
        timer.arm(now + Duration::from_millis(4), Duration::from_millis(16));
        assert_eq!(timer.deadline(), Some(now + Duration::from_millis(16)));
    }

    #[test]
    fn earlier_deadline_replaces_pending_arm() {
        let now = Instant::now();
        let mut timer = FlushTimer::default();
        timer.arm(now, Duration::from_millis(50));
        timer.arm(now, Duration::from_millis(10));
        assert_eq!(timer.deadline(), Some(now + Duration::from_millis(10)));
        assert!(timer.take_due(now + Duration::from_millis(10)));
        assert!(!timer.take_due(now + Duration::from_millis(50)));
    }

    #[test]
    fn take_due_respects_deadline() {
        let now = Instant::now();
        let mut timer = FlushTimer::default();
        timer.arm(now, Duration::from_millis(16));
        assert!(!timer.take_due(now + Duration::from_millis(15)));
        assert!(timer.take_due(now + Duration::from_millis(16)));
        assert!(!timer.take_due(now + Duration::from_millis(17)));
    }

    #[test]
    fn cancel_disarms() {
        let now = Instant::now();
        let mut timer = FlushTimer::default();
        assert!(!timer.cancel());
        timer.arm(now, Duration::ZERO);
        assert!(timer.cancel());
        assert_eq!(timer.deadline(), None);
        assert!(!timer.take_due(now + Duration::from_secs(1)));
    }
}
