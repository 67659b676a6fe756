use serde_json::json;
use std::time::{Duration, Instant};

/// Counters summarised into at most one telemetry line per interval.
#[derive(Debug, Default)]
pub struct ScrollTelemetry {
    last_report: Option<Instant>,
    batches: u64,
    lines: u64,
    acks: u64,
    stale_acks: u64,
    deferred_flushes: u64,
    entry_requests: u64,
}

impl ScrollTelemetry {
    pub fn record_batch(&mut self, lines: u64) {
        self.batches += 1;
        self.lines += lines;
    }

    pub fn record_ack(&mut self) {
        self.acks += 1;
    }

    pub fn record_stale_ack(&mut self) {
        self.stale_acks += 1;
    }

    pub fn record_deferred(&mut self) {
        self.deferred_flushes += 1;
    }

    pub fn record_entry_request(&mut self) {
        self.entry_requests += 1;
    }

    /// Returns a summary when `interval` has passed since the last one.
    /// Counters are cumulative for the life of the controller.
    pub fn maybe_report(
        &mut self,
        now: Instant,
        interval: Duration,
        rtt_estimate_ms: f64,
        backlog: f64,
    ) -> Option<String> {
        if let Some(last) = self.last_report {
            if now.saturating_duration_since(last) < interval {
                return None;
            }
        }
        self.last_report = Some(now);
        let payload = json!({
            "batches": self.batches,
            "lines": self.lines,
            "acks": self.acks,
            "stale_acks": self.stale_acks,
            "deferred_flushes": self.deferred_flushes,
            "entry_requests": self.entry_requests,
            "rtt_ms": (rtt_estimate_ms * 10.0).round() / 10.0,
            "backlog": (backlog * 100.0).round() / 100.0,
        });
        Some(format!("touch_scroll {payload}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_throttled() {
        let start = Instant::now();
        let interval = Duration::from_millis(1000);
        let mut telemetry = ScrollTelemetry::default();
        telemetry.record_batch(25);
        let first = telemetry.maybe_report(start, interval, 80.0, 1.5).unwrap();
        assert!(first.contains("\"batches\":1"));
        assert!(first.contains("\"lines\":25"));
        assert!(telemetry
            .maybe_report(start + Duration::from_millis(999), interval, 80.0, 0.0)
            .is_none());
        assert!(telemetry
            .maybe_report(start + Duration::from_millis(1000), interval, 80.0, 0.0)
            .is_some());
    }
}
