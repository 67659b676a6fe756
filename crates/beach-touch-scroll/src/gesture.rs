//! Pointer-contact bookkeeping: which contact owns the surface and how far it
//! has travelled.

use std::time::Instant;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactKind {
    Touch,
    Pen,
    /// Mice scroll with the wheel; drags belong to selection.
    Mouse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// Raw contact event as delivered by the input surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactEvent {
    pub id: u64,
    pub kind: ContactKind,
    pub phase: ContactPhase,
    pub is_primary: bool,
    pub position: Point,
    pub time: Instant,
}

impl ContactEvent {
    pub fn is_scroll_candidate(&self) -> bool {
        self.is_primary && matches!(self.kind, ContactKind::Touch | ContactKind::Pen)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    Tracking,
    Scrolling,
    ScrollbackActive,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSession {
    pub contact_id: u64,
    pub start: Point,
    pub last: Point,
    pub last_move_time: Instant,
}

#[derive(Debug)]
pub struct GestureTracker {
    state: GestureState,
    session: Option<PointerSession>,
    /// Released while copy-mode entry was still outstanding.
    pending_release: bool,
    /// Resting state to return to if this gesture is abandoned.
    active_before_gesture: bool,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self {
            state: GestureState::Idle,
            session: None,
            pending_release: false,
            active_before_gesture: false,
        }
    }
}

impl GestureTracker {
    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn set_state(&mut self, state: GestureState) {
        self.state = state;
    }

    pub fn owns(&self, contact_id: u64) -> bool {
        self.session.is_some_and(|s| s.contact_id == contact_id)
    }

    pub fn is_owned(&self) -> bool {
        self.session.is_some()
    }

    pub fn pending_release(&self) -> bool {
        self.pending_release
    }

    pub fn set_pending_release(&mut self, pending: bool) {
        self.pending_release = pending;
    }

    pub fn active_before_gesture(&self) -> bool {
        self.active_before_gesture
    }

    /// Opens a session for `contact_id`. Fails when another contact owns the
    /// surface. A release left over from the previous gesture is dropped.
    pub fn acquire(
        &mut self,
        contact_id: u64,
        position: Point,
        now: Instant,
        scrollback_active: bool,
    ) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.active_before_gesture =
            scrollback_active || self.state == GestureState::ScrollbackActive;
        self.pending_release = false;
        self.session = Some(PointerSession {
            contact_id,
            start: position,
            last: position,
            last_move_time: now,
        });
        self.state = GestureState::Tracking;
        true
    }

    /// Records a move and returns `(delta_y, dt)` since the previous sample.
    pub fn advance(&mut self, position: Point, now: Instant) -> Option<(f64, std::time::Duration)> {
        let session = self.session.as_mut()?;
        let delta_y = position.y - session.last.y;
        let dt = now.saturating_duration_since(session.last_move_time);
        session.last = position;
        session.last_move_time = now;
        Some((delta_y, dt))
    }

    /// Vertical travel from the contact-down position.
    pub fn displacement(&self, position: Point) -> Option<f64> {
        self.session.map(|s| (position.y - s.start.y).abs())
    }

    pub fn release(&mut self) -> Option<PointerSession> {
        self.session.take()
    }

    pub fn resting_state(&self, scrollback_active: bool) -> GestureState {
        if scrollback_active {
            GestureState::ScrollbackActive
        } else {
            GestureState::Idle
        }
    }

    pub fn reset(&mut self) {
        *self = GestureTracker::default();
    }
}
