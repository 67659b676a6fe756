//! Tokio task that owns a [`ScrollController`] and its flush timer.
//!
//! Hosts talk to the task through a cloneable [`ScrollHandle`]; everything the
//! controller emits comes back on the event receiver returned by [`spawn`].
//! Time is read from `tokio::time`, so paused-clock tests drive it
//! deterministically.

use crate::arbiter::{GeometryProvider, SelectionArbiter};
use crate::config::ScrollConfig;
use crate::controller::{ExitRequest, ScrollController};
use crate::error::{ScrollError, ScrollResult};
use crate::event::ScrollEvent;
use crate::gesture::{ContactEvent, ContactKind, ContactPhase, GestureState, Point};
use crate::mode::{Confidence, CopyMode};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriverSnapshot {
    pub gesture: GestureState,
    pub copy_mode: CopyMode,
    pub confidence: Confidence,
    pub backlog: f64,
    pub rtt_estimate_ms: f64,
}

#[derive(Debug)]
enum Command {
    Contact {
        id: u64,
        kind: ContactKind,
        phase: ContactPhase,
        is_primary: bool,
        position: Point,
    },
    EntryAck(u64),
    AckSignal,
    Exit(ExitRequest),
    SetConfig(Box<ScrollConfig>),
    RefreshGeometry,
    Snapshot(oneshot::Sender<DriverSnapshot>),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct ScrollHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ScrollHandle {
    fn send(&self, command: Command) -> ScrollResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ScrollError::DriverClosed)
    }

    /// Primary touch contact. Use [`ScrollHandle::contact`] for other kinds.
    pub fn touch(&self, id: u64, phase: ContactPhase, position: Point) -> ScrollResult<()> {
        self.contact(id, ContactKind::Touch, phase, true, position)
    }

    pub fn contact(
        &self,
        id: u64,
        kind: ContactKind,
        phase: ContactPhase,
        is_primary: bool,
        position: Point,
    ) -> ScrollResult<()> {
        self.send(Command::Contact {
            id,
            kind,
            phase,
            is_primary,
            position,
        })
    }

    pub fn entry_ack(&self, request_id: u64) -> ScrollResult<()> {
        self.send(Command::EntryAck(request_id))
    }

    pub fn ack_signal(&self) -> ScrollResult<()> {
        self.send(Command::AckSignal)
    }

    pub fn exit_scrollback(&self, request: ExitRequest) -> ScrollResult<()> {
        self.send(Command::Exit(request))
    }

    pub fn set_config(&self, config: ScrollConfig) -> ScrollResult<()> {
        self.send(Command::SetConfig(Box::new(config)))
    }

    /// Asks the controller to re-read its geometry provider.
    pub fn refresh_geometry(&self) -> ScrollResult<()> {
        self.send(Command::RefreshGeometry)
    }

    pub async fn snapshot(&self) -> ScrollResult<DriverSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        response.await.map_err(|_| ScrollError::DriverClosed)
    }

    pub fn shutdown(&self) -> ScrollResult<()> {
        self.send(Command::Shutdown)
    }
}

/// Spawns the driver task on the current runtime.
pub fn spawn<G, A>(
    controller: ScrollController<G, A>,
) -> (ScrollHandle, mpsc::UnboundedReceiver<ScrollEvent>)
where
    G: GeometryProvider + 'static,
    A: SelectionArbiter + 'static,
{
    let (handle, events, _task) = spawn_with_task(controller);
    (handle, events)
}

pub fn spawn_with_task<G, A>(
    controller: ScrollController<G, A>,
) -> (ScrollHandle, mpsc::UnboundedReceiver<ScrollEvent>, JoinHandle<()>)
where
    G: GeometryProvider + 'static,
    A: SelectionArbiter + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(controller, command_rx, event_tx));
    (
        ScrollHandle {
            commands: command_tx,
        },
        event_rx,
        task,
    )
}

async fn run<G, A>(
    mut controller: ScrollController<G, A>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ScrollEvent>,
) where
    G: GeometryProvider,
    A: SelectionArbiter,
{
    debug!("touch scroll driver started");
    loop {
        for event in controller.drain_events() {
            if events.send(event).is_err() {
                trace!("event receiver dropped");
            }
        }

        let deadline = controller.next_deadline();
        let wake = deadline.map(Instant::from_std).unwrap_or_else(Instant::now);

        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => apply(&mut controller, command),
                }
            }
            _ = sleep_until(wake), if deadline.is_some() => {
                controller.poll_timer(Instant::now().into_std());
            }
        }
    }
    debug!("touch scroll driver stopped");
}

fn apply<G, A>(controller: &mut ScrollController<G, A>, command: Command)
where
    G: GeometryProvider,
    A: SelectionArbiter,
{
    let now = Instant::now().into_std();
    match command {
        Command::Contact {
            id,
            kind,
            phase,
            is_primary,
            position,
        } => controller.handle_contact(ContactEvent {
            id,
            kind,
            phase,
            is_primary,
            position,
            time: now,
        }),
        Command::EntryAck(request_id) => controller.handle_entry_ack(request_id, now),
        Command::AckSignal => controller.on_ack_signal(now),
        Command::Exit(request) => controller.exit_scrollback(request, now),
        Command::SetConfig(config) => controller.set_config(*config),
        Command::RefreshGeometry => controller.update_geometry(),
        Command::Snapshot(reply) => {
            let snapshot = DriverSnapshot {
                gesture: controller.gesture_state(),
                copy_mode: controller.copy_mode(),
                confidence: controller.confidence(),
                backlog: controller.rate_state().backlog(),
                rtt_estimate_ms: controller.dispatch_state().rtt_estimate_ms,
            };
            let _ = reply.send(snapshot);
        }
        Command::Shutdown => {}
    }
}
