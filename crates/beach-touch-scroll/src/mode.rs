//! Copy-mode handshake with the remote multiplexer.
//!
//! Entry is asynchronous: `Entering` carries the request id and
//! [`ModeNegotiator::handle_ack`] is the resumption point. A bare exit key is
//! only sent once a dispatched batch has proven the remote is in copy mode;
//! otherwise the negotiator re-enters first so the exit lands in a known mode.

use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyMode {
    Off,
    Entering { request_id: u64 },
    On,
}

impl CopyMode {
    pub fn is_on(self) -> bool {
        matches!(self, CopyMode::On)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    Uncertain,
    Confident,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryIntent {
    None,
    Scroll,
    Recovery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Scroll entry confirmed; batches may flow.
    Entered,
    /// Recovery entry confirmed; the exit key must go out now.
    Recovered,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Remote is provably in copy mode; send the exit key.
    Direct,
    /// Re-entering first; the exit follows the acknowledgement.
    Recovery { request_id: u64 },
    /// Entry already outstanding; it now completes as a recovery.
    Deferred,
    AlreadyOff,
}

#[derive(Debug)]
pub struct ModeNegotiator {
    mode: CopyMode,
    confidence: Confidence,
    intent: EntryIntent,
    next_request_id: u64,
}

impl Default for ModeNegotiator {
    fn default() -> Self {
        Self {
            mode: CopyMode::Off,
            confidence: Confidence::Uncertain,
            intent: EntryIntent::None,
            next_request_id: 1,
        }
    }
}

impl ModeNegotiator {
    pub fn mode(&self) -> CopyMode {
        self.mode
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn intent(&self) -> EntryIntent {
        self.intent
    }

    pub fn pending_request_id(&self) -> Option<u64> {
        match self.mode {
            CopyMode::Entering { request_id } => Some(request_id),
            _ => None,
        }
    }

    /// Starts an entry round trip. Returns the id to put on the wire when a
    /// new request is needed.
    pub fn begin_entry(&mut self, intent: EntryIntent) -> Option<u64> {
        match (self.mode, intent) {
            (_, EntryIntent::None) => None,
            (CopyMode::Off, _) | (CopyMode::On, EntryIntent::Recovery) => {
                let request_id = self.allocate_request_id();
                debug!(request_id, ?intent, "copy mode entry requested");
                self.mode = CopyMode::Entering { request_id };
                self.intent = intent;
                Some(request_id)
            }
            (CopyMode::Entering { request_id }, _) => {
                if self.intent != intent {
                    debug!(
                        request_id,
                        from = ?self.intent,
                        to = ?intent,
                        "entry intent changed while pending"
                    );
                    self.intent = intent;
                }
                None
            }
            (CopyMode::On, EntryIntent::Scroll) => {
                self.intent = EntryIntent::Scroll;
                None
            }
        }
    }

    pub fn handle_ack(&mut self, request_id: u64) -> AckOutcome {
        match self.mode {
            CopyMode::Entering { request_id: pending } if pending == request_id => {
                if self.intent == EntryIntent::Recovery {
                    debug!(request_id, "recovery entry acknowledged");
                    self.mode = CopyMode::Off;
                    self.intent = EntryIntent::None;
                    self.confidence = Confidence::Uncertain;
                    AckOutcome::Recovered
                } else {
                    debug!(request_id, "copy mode entry acknowledged");
                    self.mode = CopyMode::On;
                    AckOutcome::Entered
                }
            }
            mode => {
                trace!(request_id, ?mode, "ignoring stale entry acknowledgement");
                AckOutcome::Stale
            }
        }
    }

    pub fn request_exit(&mut self) -> ExitOutcome {
        match self.mode {
            CopyMode::Off => ExitOutcome::AlreadyOff,
            CopyMode::On if self.confidence == Confidence::Confident => {
                self.force_off();
                ExitOutcome::Direct
            }
            CopyMode::On => match self.begin_entry(EntryIntent::Recovery) {
                Some(request_id) => ExitOutcome::Recovery { request_id },
                None => ExitOutcome::Deferred,
            },
            CopyMode::Entering { .. } => {
                self.intent = EntryIntent::Recovery;
                ExitOutcome::Deferred
            }
        }
    }

    pub fn mark_confident(&mut self) {
        if self.confidence != Confidence::Confident {
            trace!("copy mode confidence established");
        }
        self.confidence = Confidence::Confident;
    }

    pub fn reset_confidence(&mut self) {
        self.confidence = Confidence::Uncertain;
    }

    /// Drops to `Off` without touching the remote. Request ids keep counting
    /// so late acknowledgements of abandoned requests stay stale.
    pub fn force_off(&mut self) {
        self.mode = CopyMode::Off;
        self.intent = EntryIntent::None;
    }

    pub fn reset(&mut self) {
        self.force_off();
        self.confidence = Confidence::Uncertain;
    }

    fn allocate_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }
}
