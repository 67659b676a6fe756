//! Beach touch scroll: turns drag gestures on the terminal surface into paced
//! copy-mode navigation for the remote multiplexer.
//!
//! Responsibilities:
//! - classifying contacts as scroll drags and arbitrating against text selection
//! - accumulating drag distance into a bounded line backlog
//! - negotiating copy-mode entry/exit with the remote before any batch is sent
//! - draining the backlog in page/line batches paced by the observed round trip
//!
//! The core [`ScrollController`] is sans-IO: every operation takes an explicit
//! `Instant` and results are collected as [`ScrollEvent`]s. [`driver`] runs a
//! controller on a tokio task for hosts that prefer channels.

pub mod arbiter;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod event;
pub mod gesture;
pub mod keys;
pub mod mode;
pub mod rate;
pub mod telemetry;
pub mod timer;

pub use arbiter::{FixedGeometry, GeometryProvider, NoSelection, SelectionArbiter};
pub use config::{ConfigError, KeyBindings, ScrollConfig};
pub use controller::{ExitRequest, ScrollController};
pub use driver::{DriverSnapshot, ScrollHandle};
pub use error::{ScrollError, ScrollResult};
pub use event::{EntryRequest, ScrollBatch, ScrollDirection, ScrollEvent, ScrollbackPhase};
pub use gesture::{ContactEvent, ContactKind, ContactPhase, GestureState, Point};
pub use keys::KeySequence;
pub use mode::{Confidence, CopyMode, EntryIntent};
