//! Scheduler - the conveyor's synchronous state machine
//!
//! Owns the pending queue, the lifecycle state and the identity of the
//! binding currently attached to the destination. It performs no I/O: every
//! transition that needs the destination returns a [`Step`] for the driver
//! task to execute, and the driver reports back through [`Scheduler::settle`].
//!
//! ```text
//!   Processing ──pause()──▶ Paused ──resume()──▶ Processing
//!        │                    │
//!        └──────end()─────────┴──▶ Ending ──drained──▶ Ended
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binding::Binding;
use crate::error::{ConveyorError, Result};
use crate::options::ConveyorOptions;
use crate::queue::BindingQueue;

/// Monotonic id assigned to each admitted binding (starts at 1)
pub type SegmentId = u64;

/// Lifecycle state of a conveyor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Processing,
    Paused,
    Ending,
    /// Terminal
    Ended,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Processing => "processing",
            Lifecycle::Paused => "paused",
            Lifecycle::Ending => "ending",
            Lifecycle::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Where a new binding enters the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// `push`: after everything already queued
    Tail,
    /// `unshift`: before everything already queued
    Head,
}

/// Work the driver must perform on the destination
#[derive(Debug)]
pub enum Step {
    /// Attach this binding to the destination
    Attach(Binding),
    /// Permanently close the destination and announce completion
    Finalize,
}

/// Outcome of a lifecycle request (`resume`, `end`)
#[derive(Debug)]
pub enum Transition {
    /// Not valid from the current state; nothing changed
    Ignored,
    /// State changed; the driver must run the step, if any
    Applied(Option<Step>),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn into_step(self) -> Option<Step> {
        match self {
            Transition::Applied(step) => step,
            Transition::Ignored => None,
        }
    }
}

/// Result of offering a binding to the scheduler
#[derive(Debug)]
pub enum Admission {
    Accepted {
        segment: SegmentId,
        step: Option<Step>,
    },
    /// Queue at capacity; nothing changed
    Full,
}

#[derive(Debug)]
pub struct Scheduler {
    queue: BindingQueue,
    lifecycle: Lifecycle,
    current: Option<SegmentId>,
    next_id: SegmentId,
    settled: u64,
}

impl Scheduler {
    pub fn new(options: &ConveyorOptions) -> Self {
        Self {
            queue: BindingQueue::new(options.max),
            lifecycle: if options.start_paused {
                Lifecycle::Paused
            } else {
                Lifecycle::Processing
            },
            current: None,
            next_id: 1,
            settled: 0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Segment currently attached to the destination
    pub fn current(&self) -> Option<SegmentId> {
        self.current
    }

    /// Number of queued, not yet attached bindings
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of bindings that settled successfully
    pub fn settled(&self) -> u64 {
        self.settled
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Offer a binding. Capacity is checked before readability.
    pub fn admit(&mut self, mut binding: Binding, position: Position) -> Result<Admission> {
        if matches!(self.lifecycle, Lifecycle::Ending | Lifecycle::Ended) {
            return Err(ConveyorError::Closed {
                lifecycle: self.lifecycle,
            });
        }
        if self.queue.is_full() {
            return Ok(Admission::Full);
        }
        if !binding.source.is_readable() {
            return Err(ConveyorError::SourceNotReadable {
                label: binding.display_name(),
            });
        }

        let segment = self.next_id;
        binding.id = segment;
        let queued = match position {
            Position::Tail => self.queue.enqueue_tail(binding),
            Position::Head => self.queue.enqueue_head(binding),
        };
        if queued.is_err() {
            return Ok(Admission::Full);
        }
        self.next_id += 1;
        debug!(segment, ?position, pending = self.queue.len(), "binding admitted");

        Ok(Admission::Accepted {
            segment,
            step: self.advance(),
        })
    }

    /// Move to the next binding when idle.
    ///
    /// Returns `None` while paused, busy, ended, or idle with nothing to do.
    pub fn advance(&mut self) -> Option<Step> {
        if matches!(self.lifecycle, Lifecycle::Paused | Lifecycle::Ended) {
            return None;
        }
        if self.current.is_some() {
            return None;
        }

        match self.queue.dequeue_head() {
            Some(binding) => {
                self.current = Some(binding.id);
                Some(Step::Attach(binding))
            }
            None if self.lifecycle == Lifecycle::Ending => {
                self.lifecycle = Lifecycle::Ended;
                Some(Step::Finalize)
            }
            None => None,
        }
    }

    /// The attached segment finished; clear it and advance
    pub fn settle(&mut self, segment: SegmentId) -> Option<Step> {
        if self.current != Some(segment) {
            debug!(segment, current = ?self.current, "ignoring settle for detached segment");
            return None;
        }
        self.current = None;
        self.settled += 1;
        self.advance()
    }

    /// Freeze advancement. Only valid while processing.
    pub fn pause(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Processing {
            return false;
        }
        self.lifecycle = Lifecycle::Paused;
        true
    }

    /// Unfreeze advancement. Only valid while paused.
    pub fn resume(&mut self) -> Transition {
        if self.lifecycle != Lifecycle::Paused {
            return Transition::Ignored;
        }
        self.lifecycle = Lifecycle::Processing;
        Transition::Applied(self.advance())
    }

    /// Request finalization once drained. A repeated call is ignored.
    pub fn end(&mut self) -> Transition {
        if matches!(self.lifecycle, Lifecycle::Ending | Lifecycle::Ended) {
            return Transition::Ignored;
        }
        self.lifecycle = Lifecycle::Ending;
        Transition::Applied(self.advance())
    }

    /// Halt after a transport failure; returns the bindings that will never run
    pub fn halt(&mut self) -> Vec<Binding> {
        self.lifecycle = Lifecycle::Ended;
        self.current = None;
        self.queue.drain()
    }
}
