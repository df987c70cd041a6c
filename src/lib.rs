//! Conveyor - feed many byte sources, one at a time, into one reusable sink

pub mod binding;
pub mod conveyor;
pub mod destination;
pub mod error;
pub mod event_log;
pub mod options;
pub mod queue;
pub mod scheduler;
pub mod source;

pub use binding::{Binding, BoxSink, SettleFn};
pub use conveyor::{Completion, Conveyor, ConveyorHandle};
pub use destination::{AdapterState, Destination, Signal};
pub use error::{ConveyorError, FixSuggestion, Result};
pub use event_log::{Event, EventKind, EventLog};
pub use options::{ConveyorOptions, OutputBoundary, PipeOptions};
pub use queue::BindingQueue;
pub use scheduler::{Lifecycle, Position, Scheduler, SegmentId};
pub use source::{Source, SourceState};
