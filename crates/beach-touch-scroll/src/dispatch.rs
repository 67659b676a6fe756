//! Paces backlog drain against the observed round trip.

use crate::config::ScrollConfig;
use crate::event::ScrollDirection;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::trace;

const BASE_PAGES_PER_FLUSH: u32 = 2;
const BACKLOG_PAGES_PER_EXTRA_PAGE: f64 = 4.0;
const SLOW_LINK_RTT_MS: f64 = 120.0;
const VERY_SLOW_LINK_RTT_MS: f64 = 250.0;
const MAX_IN_FLIGHT: usize = 64;

#[derive(Debug)]
pub struct DispatchState {
    pub rtt_estimate_ms: f64,
    pub last_flush: Option<Instant>,
    pub in_flight: VecDeque<Instant>,
    next_seq: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushPlan {
    Idle,
    /// Recent unconfirmed flush and a small backlog; try again later.
    Defer(Duration),
    Send {
        direction: ScrollDirection,
        pages: u32,
        lines: u32,
    },
}

impl DispatchState {
    pub fn new(initial_rtt_ms: f64) -> Self {
        Self {
            rtt_estimate_ms: initial_rtt_ms,
            last_flush: None,
            in_flight: VecDeque::new(),
            next_seq: 1,
        }
    }

    /// Drops pacing history and restores the RTT estimate to its seed.
    /// Sequence numbers keep counting.
    pub fn reset(&mut self, initial_rtt_ms: f64) {
        self.rtt_estimate_ms = initial_rtt_ms;
        self.last_flush = None;
        self.in_flight.clear();
    }

    pub fn target_interval(&self, config: &ScrollConfig) -> Duration {
        let half_rtt = (self.rtt_estimate_ms / 2.0)
            .clamp(config.min_flush_ms as f64, config.max_flush_ms as f64);
        Duration::from_micros((half_rtt * 1000.0).round() as u64)
    }

    pub fn dynamic_max_pages(&self, config: &ScrollConfig, backlog_pages: f64) -> u32 {
        let mut pages = BASE_PAGES_PER_FLUSH.min(config.max_pages_per_flush);
        pages += (backlog_pages / BACKLOG_PAGES_PER_EXTRA_PAGE).floor().max(0.0) as u32;
        if self.rtt_estimate_ms > SLOW_LINK_RTT_MS {
            pages += 1;
        }
        if self.rtt_estimate_ms > VERY_SLOW_LINK_RTT_MS {
            pages += 1;
        }
        pages.min(config.max_pages_per_flush)
    }

    pub fn plan(
        &self,
        config: &ScrollConfig,
        pending: i64,
        page_step: u32,
        force: bool,
        now: Instant,
    ) -> FlushPlan {
        let Some(direction) = ScrollDirection::from_sign(pending) else {
            return FlushPlan::Idle;
        };
        let magnitude = pending.unsigned_abs();
        let page_step = u64::from(page_step.max(1));

        if !force && !self.in_flight.is_empty() && magnitude < page_step {
            let target = self.target_interval(config);
            let elapsed = self
                .last_flush
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or(Duration::MAX);
            if elapsed < target {
                return FlushPlan::Defer(target - elapsed);
            }
        }

        let backlog_pages = magnitude as f64 / page_step as f64;
        let max_pages = u64::from(self.dynamic_max_pages(config, backlog_pages));
        let pages = max_pages.min(magnitude / page_step);
        let remainder = magnitude - pages * page_step;
        let lines = remainder.min(u64::from(config.max_extra_lines));

        if pages == 0 && lines == 0 {
            return FlushPlan::Idle;
        }
        FlushPlan::Send {
            direction,
            pages: pages as u32,
            lines: lines as u32,
        }
    }

    /// Records a dispatched batch and returns its sequence number.
    pub fn record_dispatch(&mut self, now: Instant) -> u64 {
        if self.in_flight.len() >= MAX_IN_FLIGHT {
            self.in_flight.pop_front();
            trace!("in-flight queue full; dropping oldest unacknowledged flush");
        }
        self.in_flight.push_back(now);
        self.last_flush = Some(now);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    /// Matches a write confirmation against the oldest in-flight flush and
    /// folds the sample into the estimate. Returns the sample in milliseconds.
    pub fn record_ack(&mut self, alpha: f64, now: Instant) -> Option<f64> {
        let sent_at = self.in_flight.pop_front()?;
        let sample_ms = now.saturating_duration_since(sent_at).as_secs_f64() * 1000.0;
        self.rtt_estimate_ms = self.rtt_estimate_ms * (1.0 - alpha) + sample_ms * alpha;
        Some(sample_ms)
    }
}
