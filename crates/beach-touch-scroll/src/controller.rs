//! One controller per terminal surface. Contact callbacks and timer polls are
//! the only entry points; everything they decide is queued as [`ScrollEvent`]s
//! for the host to drain.

use crate::arbiter::{
    FixedGeometry, GeometryProvider, NoSelection, SelectionArbiter, page_step_for_rows,
};
use crate::config::ScrollConfig;
use crate::dispatch::{DispatchState, FlushPlan};
use crate::error::ScrollResult;
use crate::event::{EntryRequest, ScrollBatch, ScrollEvent, ScrollbackPhase};
use crate::gesture::{ContactEvent, ContactPhase, GestureState, GestureTracker, Point};
use crate::keys::{self, KeySequence};
use crate::mode::{AckOutcome, Confidence, CopyMode, EntryIntent, ExitOutcome, ModeNegotiator};
use crate::rate::{LineMetrics, RateController, RateState};
use crate::telemetry::ScrollTelemetry;
use crate::timer::FlushTimer;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitRequest {
    /// Send keys to leave copy mode. `false` when the remote already left.
    pub emit_exit: bool,
    /// Echoed on the resulting mode-change notification.
    pub request_id: Option<u64>,
}

pub struct ScrollController<G = FixedGeometry, A = NoSelection> {
    config: ScrollConfig,
    cancel_key: Option<KeySequence>,
    geometry: G,
    arbiter: A,
    metrics: LineMetrics,
    gesture: GestureTracker,
    rate: RateState,
    dispatch: DispatchState,
    mode: ModeNegotiator,
    timer: FlushTimer,
    telemetry: ScrollTelemetry,
    events: Vec<ScrollEvent>,
}

impl ScrollController {
    /// Loads a TOML config, applies `BEACH_TOUCH_SCROLL_*` overrides and
    /// builds a controller over static geometry.
    pub fn from_config_file<P: AsRef<Path>>(path: P, rows: u16) -> ScrollResult<Self> {
        let config = ScrollConfig::load(path)?.apply_env()?;
        Ok(Self::with_defaults(config, rows))
    }

    pub fn with_defaults(config: ScrollConfig, rows: u16) -> Self {
        Self::new(
            config,
            FixedGeometry {
                rows,
                line_height_px: None,
            },
            NoSelection,
        )
    }
}

impl<G: GeometryProvider, A: SelectionArbiter> ScrollController<G, A> {
    pub fn new(config: ScrollConfig, geometry: G, arbiter: A) -> Self {
        let config = config.sanitized();
        let dispatch = DispatchState::new(config.initial_rtt_ms);
        let mut controller = Self {
            config,
            cancel_key: None,
            geometry,
            arbiter,
            metrics: LineMetrics {
                px_per_line: 1.0,
                page_step: page_step_for_rows(0),
            },
            gesture: GestureTracker::default(),
            rate: RateState::default(),
            dispatch,
            mode: ModeNegotiator::default(),
            timer: FlushTimer::default(),
            telemetry: ScrollTelemetry::default(),
            events: Vec::new(),
        };
        controller.refresh_cancel_key();
        controller.update_geometry();
        controller
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    pub fn gesture_state(&self) -> GestureState {
        self.gesture.state()
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.mode.mode()
    }

    pub fn confidence(&self) -> Confidence {
        self.mode.confidence()
    }

    pub fn entry_intent(&self) -> EntryIntent {
        self.mode.intent()
    }

    pub fn rate_state(&self) -> &RateState {
        &self.rate
    }

    pub fn dispatch_state(&self) -> &DispatchState {
        &self.dispatch
    }

    pub fn page_step(&self) -> u32 {
        self.metrics.page_step
    }

    pub fn px_per_line(&self) -> f64 {
        self.metrics.px_per_line
    }

    pub fn geometry_mut(&mut self) -> &mut G {
        &mut self.geometry
    }

    /// Deadline of the pending flush timer, if armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn drain_events(&mut self) -> Vec<ScrollEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_config(&mut self, next: ScrollConfig) {
        let next = next.sanitized();

        if !next.enabled {
            if self.config.enabled {
                self.disable();
            }
            self.config = next;
            return;
        }

        let reenabled = !self.config.enabled;
        let keys_changed = next.keys != self.config.keys;
        self.config = next;
        self.refresh_cancel_key();
        self.update_geometry();

        if reenabled {
            self.mode.reset();
            self.note("touch scroll enabled");
        } else if keys_changed {
            self.reset_flow();
            self.mode.reset_confidence();
            self.note("key bindings changed; copy mode confidence reset");
        }
    }

    /// Re-reads rows and line height from the geometry provider.
    pub fn update_geometry(&mut self) {
        let rows = self.geometry.visible_rows();
        let metrics = LineMetrics {
            px_per_line: self
                .config
                .effective_px_per_line(self.geometry.line_height_px()),
            page_step: page_step_for_rows(rows),
        };
        if metrics != self.metrics {
            trace!(
                rows,
                page_step = metrics.page_step,
                px_per_line = metrics.px_per_line,
                "geometry updated"
            );
        }
        self.metrics = metrics;

        let bound = self.metrics.backlog_bound(&self.config);
        self.rate.desired_lines = self
            .rate
            .desired_lines
            .clamp(self.rate.sent_lines - bound, self.rate.sent_lines + bound);
    }

    /// Routes a raw surface event. Secondary contacts and mouse drags are
    /// left to the surface's other recognizers.
    pub fn handle_contact(&mut self, event: ContactEvent) {
        if !event.is_scroll_candidate() {
            trace!(
                id = event.id,
                kind = ?event.kind,
                primary = event.is_primary,
                "ignoring contact"
            );
            return;
        }
        match event.phase {
            ContactPhase::Down => self.on_contact_down(event.id, event.position, event.time),
            ContactPhase::Move => self.on_contact_move(event.id, event.position, event.time),
            ContactPhase::Up => self.on_contact_up(event.id, event.time),
            ContactPhase::Cancel => self.on_contact_cancel(event.id, event.time),
        }
    }

    pub fn on_contact_down(&mut self, id: u64, position: Point, now: Instant) {
        if !self.config.enabled {
            return;
        }
        if self.arbiter.is_competing_gesture_active() {
            trace!(id, "selection gesture active; contact not claimed");
            return;
        }
        let scrollback_active = self.mode.mode().is_on();
        if !self.gesture.acquire(id, position, now, scrollback_active) {
            trace!(id, "surface already owned; ignoring contact");
            return;
        }
        trace!(id, x = position.x, y = position.y, "contact tracking");
    }

    pub fn on_contact_move(&mut self, id: u64, position: Point, now: Instant) {
        if !self.config.enabled || !self.gesture.owns(id) {
            return;
        }

        match self.gesture.state() {
            GestureState::Tracking => {
                let travelled = self.gesture.displacement(position).unwrap_or(0.0);
                if travelled < self.config.slop_px {
                    return;
                }
                self.begin_scrolling();
                // The distance covered inside the slop still counts.
                self.accumulate(position, now);
            }
            GestureState::Scrolling => self.accumulate(position, now),
            GestureState::Idle | GestureState::ScrollbackActive => {}
        }
    }

    pub fn on_contact_up(&mut self, id: u64, now: Instant) {
        if !self.gesture.owns(id) {
            return;
        }
        self.gesture.release();

        match self.gesture.state() {
            GestureState::Scrolling if self.mode.mode().is_on() => {
                self.gesture.set_state(GestureState::ScrollbackActive);
                self.notify(true, ScrollbackPhase::Active, None);
                self.flush(true, now);
            }
            GestureState::Scrolling if self.mode.pending_request_id().is_some() => {
                // Entry still in flight; the acknowledgement settles the state.
                self.gesture.set_pending_release(true);
                self.note("released before copy mode confirmed");
            }
            GestureState::Scrolling => {
                self.reset_flow();
                self.gesture.set_state(GestureState::Idle);
                self.notify(false, ScrollbackPhase::Inactive, None);
            }
            GestureState::Tracking => {
                let active = self.gesture.active_before_gesture() || self.mode.mode().is_on();
                let resting = self.gesture.resting_state(active);
                self.gesture.set_state(resting);
            }
            GestureState::Idle | GestureState::ScrollbackActive => {}
        }
    }

    /// Abandons the gesture. Never sends keys. When the remote is already in
    /// copy mode the surface rests in scrollback, matching a release.
    pub fn on_contact_cancel(&mut self, id: u64, _now: Instant) {
        if !self.gesture.owns(id) {
            return;
        }
        let was_scrolling = self.gesture.state() == GestureState::Scrolling;
        self.gesture.release();
        self.gesture.set_pending_release(false);
        self.reset_flow();

        let active = self.gesture.active_before_gesture() || self.mode.mode().is_on();
        let resting = self.gesture.resting_state(active);
        self.gesture.set_state(resting);
        if was_scrolling {
            let phase = if active {
                ScrollbackPhase::Active
            } else {
                ScrollbackPhase::Inactive
            };
            self.notify(active, phase, None);
        }
        self.note("contact cancelled");
    }

    pub fn handle_entry_ack(&mut self, request_id: u64, now: Instant) {
        if !self.config.enabled {
            return;
        }

        match self.mode.handle_ack(request_id) {
            AckOutcome::Stale => {
                self.telemetry.record_stale_ack();
            }
            AckOutcome::Entered => self.on_entered(request_id, now),
            AckOutcome::Recovered => {
                self.reset_flow();
                if let Some(key) = self.cancel_key.clone() {
                    self.events.push(ScrollEvent::RawKeystroke(key));
                }
                if !self.gesture.is_owned() {
                    self.gesture.set_state(GestureState::Idle);
                }
                self.gesture.set_pending_release(false);
                self.notify(false, ScrollbackPhase::Inactive, Some(request_id));
            }
        }
    }

    pub fn exit_scrollback(&mut self, request: ExitRequest, _now: Instant) {
        self.gesture.release();
        self.gesture.set_pending_release(false);
        self.gesture.set_state(GestureState::Idle);
        self.reset_flow();

        if !self.config.enabled {
            return;
        }

        if !request.emit_exit {
            self.mode.force_off();
            self.notify(false, ScrollbackPhase::Inactive, request.request_id);
            return;
        }

        let Some(cancel_key) = self.cancel_key.clone() else {
            if self.mode.mode() != CopyMode::Off {
                warn!("cancel key unusable; leaving copy mode without sending a keystroke");
            }
            self.mode.force_off();
            self.notify(false, ScrollbackPhase::Inactive, request.request_id);
            return;
        };

        match self.mode.request_exit() {
            ExitOutcome::Direct => {
                self.events.push(ScrollEvent::RawKeystroke(cancel_key));
                self.notify(false, ScrollbackPhase::Inactive, request.request_id);
            }
            ExitOutcome::Recovery { request_id } => {
                self.note("exit requested without proof of copy mode; re-entering first");
                self.emit_entry_request(request_id, EntryIntent::Recovery);
            }
            ExitOutcome::Deferred => {
                self.note("exit deferred until outstanding entry is acknowledged");
            }
            ExitOutcome::AlreadyOff => {
                self.notify(false, ScrollbackPhase::Inactive, request.request_id);
            }
        }
    }

    /// Write/render confirmation from the transport; drives RTT sampling.
    pub fn on_ack_signal(&mut self, now: Instant) {
        let Some(sample_ms) = self.dispatch.record_ack(self.config.rtt_ewma_alpha, now) else {
            return;
        };
        self.telemetry.record_ack();
        trace!(sample_ms, rtt_ms = self.dispatch.rtt_estimate_ms, "flush acknowledged");
        if self.dispatch.in_flight.is_empty() {
            self.flush(false, now);
        }
        self.maybe_report(now);
    }

    /// Arms the coalescing flush timer (default delay: `coalesce_ms`).
    pub fn schedule_flush(&mut self, delay: Option<Duration>, now: Instant) {
        let delay = delay.unwrap_or_else(|| self.config.coalesce());
        self.timer.arm(now, delay);
    }

    /// Fires the pending flush when due. Returns true if it fired.
    pub fn poll_timer(&mut self, now: Instant) -> bool {
        if !self.timer.take_due(now) {
            return false;
        }
        self.flush(false, now);
        self.maybe_report(now);
        true
    }

    pub fn flush(&mut self, force: bool, now: Instant) {
        if !self.config.enabled || !self.mode.mode().is_on() {
            return;
        }

        let pending = self.rate.pending_whole_lines();
        match self
            .dispatch
            .plan(&self.config, pending, self.metrics.page_step, force, now)
        {
            FlushPlan::Idle => {}
            FlushPlan::Defer(wait) => {
                self.telemetry.record_deferred();
                trace!(pending, wait_ms = wait.as_millis() as u64, "flush deferred");
                self.timer.arm(now, wait);
            }
            FlushPlan::Send {
                direction,
                pages,
                lines,
            } => {
                let total = u64::from(pages) * u64::from(self.metrics.page_step) + u64::from(lines);
                self.rate.record_sent(direction.sign() * total as i64);
                let seq = self.dispatch.record_dispatch(now);
                self.mode.mark_confident();
                self.telemetry.record_batch(total);
                debug!(seq, direction = direction.as_str(), pages, lines, "scroll batch");
                self.events.push(ScrollEvent::ScrollBatch(ScrollBatch {
                    direction,
                    pages,
                    lines,
                    seq,
                    timestamp: now,
                }));
                if self.rate.pending_whole_lines() != 0 {
                    self.schedule_flush(None, now);
                }
            }
        }
    }

    fn begin_scrolling(&mut self) {
        self.arbiter.cancel_competing_gesture();
        self.gesture.set_state(GestureState::Scrolling);
        self.rate.reset_motion();
        self.mode.reset_confidence();
        if let Some(request_id) = self.mode.begin_entry(EntryIntent::Scroll) {
            self.emit_entry_request(request_id, EntryIntent::Scroll);
        }
        let request_id = self.mode.pending_request_id();
        self.notify(true, ScrollbackPhase::Dragging, request_id);
    }

    fn accumulate(&mut self, position: Point, now: Instant) {
        let Some((delta_y, dt)) = self.gesture.advance(position, now) else {
            return;
        };
        let applied =
            RateController::apply(&mut self.rate, &self.config, self.metrics, delta_y, dt, now);
        trace!(delta_y, applied, backlog = self.rate.backlog(), "drag accumulated");
        self.schedule_flush(None, now);
    }

    fn on_entered(&mut self, request_id: u64, now: Instant) {
        if self.gesture.pending_release() {
            self.gesture.set_pending_release(false);
            if !self.gesture.is_owned() {
                self.gesture.set_state(GestureState::ScrollbackActive);
            }
            self.notify(true, ScrollbackPhase::Active, Some(request_id));
            self.flush(true, now);
            return;
        }

        match self.gesture.state() {
            GestureState::Scrolling => {
                self.notify(true, ScrollbackPhase::Dragging, Some(request_id));
                self.flush(false, now);
            }
            GestureState::Tracking => {
                self.notify(true, ScrollbackPhase::Active, Some(request_id));
            }
            GestureState::Idle | GestureState::ScrollbackActive => {
                self.gesture.set_state(GestureState::ScrollbackActive);
                self.notify(true, ScrollbackPhase::Active, Some(request_id));
            }
        }
    }

    fn emit_entry_request(&mut self, request_id: u64, intent: EntryIntent) {
        let bindings = &self.config.keys;
        let request = EntryRequest {
            request_id,
            intent,
            prefix: keys::parse_key(&bindings.prefix_key),
            copy_mode: keys::parse_key(&bindings.copy_mode_key),
            exit: keys::parse_key(&bindings.exit_key),
            enter_delay: self.config.enter_delay(),
        };
        if request.prefix.is_none() || request.copy_mode.is_none() {
            warn!(
                prefix = %bindings.prefix_key,
                copy_mode = %bindings.copy_mode_key,
                "copy mode entry keys did not parse"
            );
        }
        self.telemetry.record_entry_request();
        self.events.push(ScrollEvent::EntryRequest(request));
    }

    fn disable(&mut self) {
        let was_active = self.mode.mode() != CopyMode::Off
            || matches!(
                self.gesture.state(),
                GestureState::Scrolling | GestureState::ScrollbackActive
            );
        self.gesture.reset();
        self.reset_flow();
        self.mode.reset();
        if was_active {
            self.notify(false, ScrollbackPhase::Inactive, None);
        }
        self.note("touch scroll disabled");
    }

    fn reset_flow(&mut self) {
        self.timer.cancel();
        self.rate.reset();
        self.dispatch.reset(self.config.initial_rtt_ms);
    }

    fn refresh_cancel_key(&mut self) {
        match keys::validate_cancel_key(&self.config.keys.cancel_key) {
            Ok(key) => self.cancel_key = Some(key),
            Err(reason) => {
                self.cancel_key = None;
                warn!(%reason, "automatic copy mode exit disabled");
                let message = format!("automatic exit disabled: {reason}");
                self.events.push(ScrollEvent::Debug(message));
            }
        }
    }

    fn notify(&mut self, active: bool, phase: ScrollbackPhase, request_id: Option<u64>) {
        debug!(active, phase = phase.as_str(), ?request_id, "scrollback mode changed");
        self.events.push(ScrollEvent::ScrollbackModeChanged {
            active,
            phase,
            request_id,
        });
    }

    fn note(&mut self, message: &str) {
        debug!("{message}");
        if self.config.debug {
            self.events.push(ScrollEvent::Debug(message.to_string()));
        }
    }

    fn maybe_report(&mut self, now: Instant) {
        if let Some(line) = self.telemetry.maybe_report(
            now,
            self.config.telemetry_interval(),
            self.dispatch.rtt_estimate_ms,
            self.rate.backlog(),
        ) {
            self.events.push(ScrollEvent::Telemetry(line));
        }
    }
}
