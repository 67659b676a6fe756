//! Converts drag distance into a fractional line backlog.
//!
//! Positive lines move back into history (the finger drags content down),
//! negative lines move toward the live tail.

use crate::config::ScrollConfig;
use std::time::{Duration, Instant};

const MIN_SAMPLE_INTERVAL_MS: f64 = 8.0;
const REVERSAL_DAMP_WINDOW: Duration = Duration::from_millis(80);
const REVERSAL_DAMP_FACTOR: f64 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineMetrics {
    pub px_per_line: f64,
    pub page_step: u32,
}

impl LineMetrics {
    pub fn backlog_bound(&self, config: &ScrollConfig) -> f64 {
        f64::from(config.max_backlog_pages) * f64::from(self.page_step)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateState {
    pub desired_lines: f64,
    pub sent_lines: f64,
    pub velocity_ewma: f64,
    pub last_direction: i8,
    pub last_direction_change: Option<Instant>,
}

impl RateState {
    pub fn backlog(&self) -> f64 {
        self.desired_lines - self.sent_lines
    }

    /// Whole lines not yet dispatched, truncated toward zero.
    pub fn pending_whole_lines(&self) -> i64 {
        self.backlog().trunc() as i64
    }

    pub fn record_sent(&mut self, lines: i64) {
        self.sent_lines += lines as f64;
    }

    pub fn reset(&mut self) {
        *self = RateState::default();
    }

    /// Forgets speed and direction from the previous gesture. The backlog is
    /// left alone so an undrained remainder still flushes.
    pub fn reset_motion(&mut self) {
        self.velocity_ewma = 0.0;
        self.last_direction = 0;
        self.last_direction_change = None;
    }
}

pub struct RateController;

impl RateController {
    /// Feeds one drag sample and returns the line delta actually added to the
    /// backlog after multipliers and the backlog clamp.
    pub fn apply(
        state: &mut RateState,
        config: &ScrollConfig,
        metrics: LineMetrics,
        delta_y: f64,
        dt: Duration,
        now: Instant,
    ) -> f64 {
        if !delta_y.is_finite() || metrics.px_per_line <= 0.0 {
            return 0.0;
        }

        let direction = if config.invert_scroll { -1.0 } else { 1.0 };
        let base_lines = delta_y * direction / metrics.px_per_line;

        let dt_ms = (dt.as_secs_f64() * 1000.0).max(MIN_SAMPLE_INTERVAL_MS);
        let speed = delta_y.abs() / dt_ms;
        state.velocity_ewma += (speed - state.velocity_ewma) * config.velocity_smoothing;

        let sign = if base_lines > 0.0 {
            1
        } else if base_lines < 0.0 {
            -1
        } else {
            0
        };
        if sign != 0 && sign != state.last_direction {
            if state.last_direction != 0 {
                state.velocity_ewma = 0.0;
                state.last_direction_change = Some(now);
            }
            state.last_direction = sign;
        }

        let mut multiplier = 1.0;
        if config.velocity_multiplier_enabled && state.velocity_ewma > config.velocity_threshold {
            let boost = config.velocity_boost * (state.velocity_ewma - config.velocity_threshold);
            multiplier += boost.min(config.velocity_boost_max);
        }

        if config.backlog_multiplier_enabled {
            let reference = config.backlog_boost_ref_pages * f64::from(metrics.page_step);
            if reference > 0.0 {
                let backlog_boost =
                    (state.backlog().abs() / reference).min(config.backlog_boost_max);
                multiplier *= 1.0 + backlog_boost;
            }
        }

        if let Some(changed_at) = state.last_direction_change {
            if now.saturating_duration_since(changed_at) < REVERSAL_DAMP_WINDOW {
                multiplier *= REVERSAL_DAMP_FACTOR;
            }
        }

        let delta_lines = base_lines * multiplier;
        let bound = metrics.backlog_bound(config);
        let target = (state.desired_lines + delta_lines)
            .clamp(state.sent_lines - bound, state.sent_lines + bound);
        let applied = target - state.desired_lines;
        state.desired_lines = target;
        applied
    }
}
