use crate::keys::KeySequence;
use crate::mode::EntryIntent;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Back into history.
    Up,
    /// Toward the live tail.
    Down,
}

impl ScrollDirection {
    pub fn from_sign(lines: i64) -> Option<Self> {
        match lines.signum() {
            1 => Some(ScrollDirection::Up),
            -1 => Some(ScrollDirection::Down),
            _ => None,
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            ScrollDirection::Up => 1,
            ScrollDirection::Down => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollbackPhase {
    /// A finger is on the surface and driving the scroll.
    Dragging,
    /// Released; the remote stays in copy mode until exit.
    Active,
    Inactive,
}

impl ScrollbackPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollbackPhase::Dragging => "dragging",
            ScrollbackPhase::Active => "active",
            ScrollbackPhase::Inactive => "inactive",
        }
    }
}

/// One atomic navigation command for the remote copy mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrollBatch {
    pub direction: ScrollDirection,
    pub pages: u32,
    pub lines: u32,
    pub seq: u64,
    pub timestamp: Instant,
}

impl ScrollBatch {
    pub fn total_lines(&self, page_step: u32) -> u64 {
        u64::from(self.pages) * u64::from(page_step) + u64::from(self.lines)
    }
}

/// Ask the executor to put the remote into copy mode and call back with
/// `handle_entry_ack(request_id)` once the keys are delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryRequest {
    pub request_id: u64,
    pub intent: EntryIntent,
    pub prefix: Option<KeySequence>,
    pub copy_mode: Option<KeySequence>,
    /// Lets the executor back out if it cannot finish the entry.
    pub exit: Option<KeySequence>,
    /// Pause between the prefix and the copy-mode key.
    pub enter_delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScrollEvent {
    Debug(String),
    ScrollbackModeChanged {
        active: bool,
        phase: ScrollbackPhase,
        request_id: Option<u64>,
    },
    EntryRequest(EntryRequest),
    RawKeystroke(KeySequence),
    ScrollBatch(ScrollBatch),
    Telemetry(String),
}

impl ScrollEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ScrollEvent::Debug(_) => "debug",
            ScrollEvent::ScrollbackModeChanged { .. } => "scrollback_mode_changed",
            ScrollEvent::EntryRequest(_) => "entry_request",
            ScrollEvent::RawKeystroke(_) => "raw_keystroke",
            ScrollEvent::ScrollBatch(_) => "scroll_batch",
            ScrollEvent::Telemetry(_) => "telemetry",
        }
    }
}
