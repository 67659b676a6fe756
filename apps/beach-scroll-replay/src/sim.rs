//! Drives a controller through a trace against a simulated remote.
//!
//! The simulated executor confirms copy-mode entry `enter_delay +
//! entry_latency` after each request and confirms every scroll batch one RTT
//! after it is written. Everything runs on a virtual clock.

use crate::trace::{TraceAction, TraceStep};
use anyhow::{Result, bail};
use beach_touch_scroll::{
    ExitRequest, FixedGeometry, NoSelection, Point, ScrollConfig, ScrollController, ScrollEvent,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_STEPS: usize = 1_000_000;

#[derive(Clone, Copy, Debug)]
pub struct RemoteModel {
    pub entry_latency: Duration,
    pub rtt: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum RemoteAction {
    EntryAck(u64),
    WriteAck,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    at: Instant,
    order: u64,
    action: RemoteAction,
}

#[derive(Clone, Debug)]
pub struct TimedEvent {
    pub t_ms: u64,
    pub event: ScrollEvent,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Summary {
    pub batches: u64,
    pub pages: u64,
    pub lines: u64,
    pub total_lines: u64,
    pub entry_requests: u64,
    pub keystrokes: u64,
    pub final_gesture: String,
    pub final_copy_mode: String,
    pub rtt_estimate_ms: f64,
    pub end_ms: u64,
}

pub struct Simulation {
    controller: ScrollController<FixedGeometry, NoSelection>,
    remote: RemoteModel,
    base: Instant,
    scheduled: BinaryHeap<Reverse<Scheduled>>,
    next_order: u64,
    events: Vec<TimedEvent>,
    summary: Summary,
}

impl Simulation {
    pub fn new(config: ScrollConfig, geometry: FixedGeometry, remote: RemoteModel) -> Self {
        let mut simulation = Self {
            controller: ScrollController::new(config, geometry, NoSelection),
            remote,
            base: Instant::now(),
            scheduled: BinaryHeap::new(),
            next_order: 0,
            events: Vec::new(),
            summary: Summary::default(),
        };
        let base = simulation.base;
        simulation.collect(base);
        simulation
    }

    pub fn run(mut self, steps: Vec<TraceStep>) -> Result<(Vec<TimedEvent>, Summary)> {
        let mut steps = steps.into_iter().peekable();
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > MAX_STEPS {
                bail!("replay did not settle after {MAX_STEPS} steps");
            }

            let next_step = steps.peek().map(|step| self.at(step.t_ms));
            let next_remote = self.scheduled.peek().map(|Reverse(item)| item.at);
            let next_timer = self.controller.next_deadline();
            let Some(now) = [next_step, next_remote, next_timer].into_iter().flatten().min() else {
                break;
            };

            if next_timer == Some(now) {
                self.controller.poll_timer(now);
            } else if next_remote == Some(now) {
                if let Some(Reverse(item)) = self.scheduled.pop() {
                    self.deliver(item.action, now);
                }
            } else if let Some(step) = steps.next() {
                self.apply(step.action, now);
            }
            self.collect(now);
        }

        let summary = self.finish();
        Ok((self.events, summary))
    }

    fn at(&self, t_ms: u64) -> Instant {
        self.base + Duration::from_millis(t_ms)
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.base).as_millis() as u64
    }

    fn schedule(&mut self, at: Instant, action: RemoteAction) {
        self.next_order += 1;
        self.scheduled.push(Reverse(Scheduled {
            at,
            order: self.next_order,
            action,
        }));
    }

    fn apply(&mut self, action: TraceAction, now: Instant) {
        let controller = &mut self.controller;
        match action {
            TraceAction::Down { id, x, y } => controller.on_contact_down(id, Point::new(x, y), now),
            TraceAction::Move { id, x, y } => controller.on_contact_move(id, Point::new(x, y), now),
            TraceAction::Up { id } => controller.on_contact_up(id, now),
            TraceAction::Cancel { id } => controller.on_contact_cancel(id, now),
            TraceAction::Exit { emit_exit } => controller.exit_scrollback(
                ExitRequest {
                    emit_exit,
                    request_id: None,
                },
                now,
            ),
            TraceAction::Config { config } => controller.set_config(config),
            TraceAction::Resize { rows, line_height } => {
                let geometry = controller.geometry_mut();
                geometry.rows = rows;
                if line_height.is_some() {
                    geometry.line_height_px = line_height;
                }
                controller.update_geometry();
            }
        }
    }

    fn deliver(&mut self, action: RemoteAction, now: Instant) {
        match action {
            RemoteAction::EntryAck(request_id) => self.controller.handle_entry_ack(request_id, now),
            RemoteAction::WriteAck => self.controller.on_ack_signal(now),
        }
    }

    fn collect(&mut self, now: Instant) {
        let t_ms = self.elapsed_ms(now);
        for event in self.controller.drain_events() {
            match &event {
                ScrollEvent::EntryRequest(request) => {
                    self.summary.entry_requests += 1;
                    if request.prefix.is_some() && request.copy_mode.is_some() {
                        let at = now + request.enter_delay + self.remote.entry_latency;
                        self.schedule(at, RemoteAction::EntryAck(request.request_id));
                    } else {
                        warn!(
                            request_id = request.request_id,
                            "entry keys unusable; remote never confirms"
                        );
                    }
                }
                ScrollEvent::ScrollBatch(batch) => {
                    self.summary.batches += 1;
                    self.summary.pages += u64::from(batch.pages);
                    self.summary.lines += u64::from(batch.lines);
                    self.summary.total_lines += batch.total_lines(self.controller.page_step());
                    self.schedule(now + self.remote.rtt, RemoteAction::WriteAck);
                }
                ScrollEvent::RawKeystroke(_) => self.summary.keystrokes += 1,
                _ => {}
            }
            debug!(t_ms, kind = event.kind(), "replay event");
            self.events.push(TimedEvent { t_ms, event });
        }
    }

    fn finish(&mut self) -> Summary {
        let mut summary = std::mem::take(&mut self.summary);
        summary.final_gesture = format!("{:?}", self.controller.gesture_state());
        summary.final_copy_mode = format!("{:?}", self.controller.copy_mode());
        summary.rtt_estimate_ms = self.controller.dispatch_state().rtt_estimate_ms;
        summary.end_ms = self.events.last().map(|event| event.t_ms).unwrap_or(0);
        summary
    }
}

pub fn event_json(event: &TimedEvent) -> Value {
    let t_ms = event.t_ms;
    match &event.event {
        ScrollEvent::Debug(message) => json!({"t_ms": t_ms, "kind": "debug", "message": message}),
        ScrollEvent::ScrollbackModeChanged {
            active,
            phase,
            request_id,
        } => json!({
            "t_ms": t_ms,
            "kind": "scrollback_mode_changed",
            "active": active,
            "phase": phase.as_str(),
            "request_id": request_id,
        }),
        ScrollEvent::EntryRequest(request) => json!({
            "t_ms": t_ms,
            "kind": "entry_request",
            "request_id": request.request_id,
            "intent": format!("{:?}", request.intent),
            "prefix": request.prefix.as_ref().map(ToString::to_string),
            "copy_mode": request.copy_mode.as_ref().map(ToString::to_string),
            "enter_delay_ms": request.enter_delay.as_millis() as u64,
        }),
        ScrollEvent::RawKeystroke(keys) => {
            json!({"t_ms": t_ms, "kind": "raw_keystroke", "keys": keys.to_string()})
        }
        ScrollEvent::ScrollBatch(batch) => json!({
            "t_ms": t_ms,
            "kind": "scroll_batch",
            "direction": batch.direction.as_str(),
            "pages": batch.pages,
            "lines": batch.lines,
            "seq": batch.seq,
        }),
        ScrollEvent::Telemetry(line) => json!({"t_ms": t_ms, "kind": "telemetry", "message": line}),
    }
}

pub fn event_text(event: &TimedEvent) -> String {
    let detail = match &event.event {
        ScrollEvent::Debug(message) => message.clone(),
        ScrollEvent::ScrollbackModeChanged {
            active,
            phase,
            request_id,
        } => match request_id {
            Some(id) => format!("active={active} phase={} request={id}", phase.as_str()),
            None => format!("active={active} phase={}", phase.as_str()),
        },
        ScrollEvent::EntryRequest(request) => {
            format!("request={} intent={:?}", request.request_id, request.intent)
        }
        ScrollEvent::RawKeystroke(keys) => keys.to_string(),
        ScrollEvent::ScrollBatch(batch) => format!(
            "{} pages={} lines={} seq={}",
            batch.direction.as_str(),
            batch.pages,
            batch.lines,
            batch.seq
        ),
        ScrollEvent::Telemetry(line) => line.clone(),
    };
    format!("[{:>7}ms] {:<24} {detail}", event.t_ms, event.event.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace;

    fn remote() -> RemoteModel {
        RemoteModel {
            entry_latency: Duration::from_millis(40),
            rtt: Duration::from_millis(80),
        }
    }

    fn linear_config() -> ScrollConfig {
        ScrollConfig {
            px_per_line: Some(10.0),
            velocity_multiplier_enabled: false,
            backlog_multiplier_enabled: false,
            ..ScrollConfig::default()
        }
    }

    #[test_timeout::timeout]
    fn drag_and_release_settles_in_scrollback() {
        let steps = trace::parse(
            r#"[
                {"t_ms": 0, "kind": "down", "id": 1, "x": 50, "y": 100},
                {"t_ms": 16, "kind": "move", "id": 1, "x": 50, "y": 200},
                {"t_ms": 32, "kind": "move", "id": 1, "x": 50, "y": 300},
                {"t_ms": 48, "kind": "up", "id": 1}
            ]"#,
        )
        .unwrap();
        let simulation = Simulation::new(linear_config(), FixedGeometry::new(24, 10.0), remote());
        let (events, summary) = simulation.run(steps).unwrap();

        assert_eq!(summary.entry_requests, 1);
        assert_eq!(summary.total_lines, 20);
        assert_eq!(summary.final_gesture, "ScrollbackActive");
        assert_eq!(summary.final_copy_mode, "On");
        assert_eq!(summary.keystrokes, 0);

        // entry at 16ms, confirmed after 30ms delay + 40ms latency
        let first_batch = events
            .iter()
            .find(|event| matches!(event.event, ScrollEvent::ScrollBatch(_)))
            .unwrap();
        assert_eq!(first_batch.t_ms, 86);
    }

    #[test_timeout::timeout]
    fn exit_after_scrolling_sends_cancel_key() {
        let steps = trace::parse(
            r#"[
                {"t_ms": 0, "kind": "down", "id": 1, "x": 50, "y": 100},
                {"t_ms": 16, "kind": "move", "id": 1, "x": 50, "y": 160},
                {"t_ms": 200, "kind": "up", "id": 1},
                {"t_ms": 1000, "kind": "exit"}
            ]"#,
        )
        .unwrap();
        let simulation = Simulation::new(linear_config(), FixedGeometry::new(24, 10.0), remote());
        let (events, summary) = simulation.run(steps).unwrap();

        assert_eq!(summary.keystrokes, 1);
        assert_eq!(summary.final_copy_mode, "Off");
        assert_eq!(summary.final_gesture, "Idle");
        let keystroke = events
            .iter()
            .find(|event| matches!(event.event, ScrollEvent::RawKeystroke(_)))
            .unwrap();
        assert_eq!(keystroke.t_ms, 1000);
        assert!(event_text(keystroke).contains("raw_keystroke"));
    }

    #[test]
    fn batches_render_as_json_lines() {
        let steps = trace::parse(
            r#"[
                {"t_ms": 0, "kind": "down", "id": 1, "x": 0, "y": 0},
                {"t_ms": 16, "kind": "move", "id": 1, "x": 0, "y": 50}
            ]"#,
        )
        .unwrap();
        let simulation = Simulation::new(linear_config(), FixedGeometry::new(24, 10.0), remote());
        let (events, _) = simulation.run(steps).unwrap();
        let rendered: Vec<Value> = events.iter().map(event_json).collect();
        let batch = rendered
            .iter()
            .find(|value| value["kind"] == "scroll_batch")
            .unwrap();
        assert_eq!(batch["direction"], "up");
        assert_eq!(batch["lines"], 5);
        assert_eq!(batch["seq"], 1);
    }
}
