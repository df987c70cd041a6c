//! Conveyor - feeds sources into one reusable destination, one at a time
//!
//! The public surface is split in two:
//! - [`Conveyor`]: owns the driver task and gives the destination back on
//!   [`Conveyor::finish`]
//! - [`ConveyorHandle`]: cheap, cloneable control surface (`push`,
//!   `unshift`, `pause`, `resume`, `end`), usable from settle callbacks
//!
//! Control calls take the scheduler lock, mutate the state machine and hand
//! any resulting [`Step`] to the driver over an unbounded channel. The driver
//! is the only code touching the destination, so at most one segment is ever
//! attached.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binding::Binding;
use crate::destination::{Destination, Signal};
use crate::error::{ConveyorError, Result};
use crate::event_log::{EventKind, EventLog};
use crate::options::ConveyorOptions;
use crate::scheduler::{Admission, Lifecycle, Position, Scheduler, SegmentId, Step};

type Outcome = Option<Result<()>>;

struct Shared {
    scheduler: Mutex<Scheduler>,
    steps: mpsc::UnboundedSender<Step>,
    events: EventLog,
    has_output: bool,
}

/// Cloneable control surface of a running conveyor
#[derive(Clone)]
pub struct ConveyorHandle {
    shared: Arc<Shared>,
    completion: Completion,
}

impl ConveyorHandle {
    /// Queue a binding after everything already queued.
    ///
    /// `Ok(false)` when the queue is at capacity.
    pub fn push(&self, binding: impl Into<Binding>) -> Result<bool> {
        self.enqueue(binding.into(), Position::Tail)
    }

    /// Queue a binding before everything already queued (but never ahead of
    /// the segment in flight).
    pub fn unshift(&self, binding: impl Into<Binding>) -> Result<bool> {
        self.enqueue(binding.into(), Position::Head)
    }

    /// Stop attaching new segments; the one in flight still completes
    pub fn pause(&self) -> bool {
        let paused = self.shared.scheduler.lock().pause();
        if paused {
            debug!("conveyor paused");
            self.shared.events.emit(EventKind::Paused);
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let mut scheduler = self.shared.scheduler.lock();
        let transition = scheduler.resume();
        let resumed = transition.is_applied();
        if resumed {
            debug!("conveyor resumed");
            self.shared.events.emit(EventKind::Resumed);
        }
        self.dispatch(transition.into_step());
        resumed
    }

    /// Finalize once every queued and in-flight binding settled.
    ///
    /// Idempotent. Completion is observed through [`Completion::wait`].
    pub fn end(&self) {
        let mut scheduler = self.shared.scheduler.lock();
        let transition = scheduler.end();
        if transition.is_applied() {
            let pending = scheduler.pending();
            debug!(pending, "end requested");
            self.shared.events.emit(EventKind::EndRequested { pending });
        }
        self.dispatch(transition.into_step());
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.scheduler.lock().lifecycle()
    }

    /// Queued bindings not yet attached
    pub fn pending(&self) -> usize {
        self.shared.scheduler.lock().pending()
    }

    /// Segment currently attached to the destination
    pub fn current(&self) -> Option<SegmentId> {
        self.shared.scheduler.lock().current()
    }

    pub fn events(&self) -> &EventLog {
        &self.shared.events
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    fn enqueue(&self, binding: Binding, position: Position) -> Result<bool> {
        if binding.has_secondary() && !self.shared.has_output {
            return Err(ConveyorError::NoOutputSide);
        }
        let label = binding.label.clone();

        let mut scheduler = self.shared.scheduler.lock();
        match scheduler.admit(binding, position)? {
            Admission::Full => {
                debug!(?position, "queue full, binding rejected");
                Ok(false)
            }
            Admission::Accepted { segment, step } => {
                self.shared.events.emit(EventKind::SegmentQueued {
                    segment,
                    label,
                    position,
                    pending: scheduler.pending(),
                });
                self.dispatch(step);
                Ok(true)
            }
        }
    }

    /// Hand a step to the driver. Called with the scheduler lock held so
    /// steps reach the driver in state-machine order.
    fn dispatch(&self, step: Option<Step>) {
        if let Some(step) = step {
            if self.shared.steps.send(step).is_err() {
                warn!("conveyor driver is gone; step dropped");
            }
        }
    }
}

impl std::fmt::Debug for ConveyorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConveyorHandle")
            .field("lifecycle", &self.lifecycle())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Overall-completion notification; resolves exactly once for every observer
#[derive(Clone, Debug)]
pub struct Completion {
    rx: watch::Receiver<Outcome>,
}

impl Completion {
    /// Wait until the conveyor ended (`Ok`) or halted on an error
    pub async fn wait(&mut self) -> Result<()> {
        let outcome = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ConveyorError::Detached {
                reason: "driver dropped before completing".into(),
            })?;
        let result = (*outcome).clone();
        result.unwrap_or(Ok(()))
    }

    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// A conveyor bound to one destination writer
pub struct Conveyor<W> {
    handle: ConveyorHandle,
    driver: JoinHandle<W>,
}

impl<W> Conveyor<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    /// Spawns the driver task; must be called inside a tokio runtime
    pub fn new(writer: W, options: ConveyorOptions) -> Self {
        Self::spawn(Destination::new(writer), options)
    }

    /// Duplex destination whose output can be chained into secondary sinks
    pub fn with_output<R>(writer: W, output: R, options: ConveyorOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::spawn(Destination::with_output(writer, output), options)
    }

    fn spawn(destination: Destination<W>, options: ConveyorOptions) -> Self {
        let (steps, step_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let shared = Arc::new(Shared {
            scheduler: Mutex::new(Scheduler::new(&options)),
            steps,
            events: EventLog::new(),
            has_output: destination.has_output(),
        });
        debug!(max = ?options.max, start_paused = options.start_paused, "conveyor created");

        let driver = Driver {
            shared: Arc::clone(&shared),
            steps: step_rx,
            destination,
            outcome: outcome_tx,
        };

        Self {
            handle: ConveyorHandle {
                shared,
                completion: Completion { rx: outcome_rx },
            },
            driver: tokio::spawn(driver.run()),
        }
    }

    pub fn handle(&self) -> ConveyorHandle {
        self.handle.clone()
    }

    pub fn push(&self, binding: impl Into<Binding>) -> Result<bool> {
        self.handle.push(binding)
    }

    pub fn unshift(&self, binding: impl Into<Binding>) -> Result<bool> {
        self.handle.unshift(binding)
    }

    pub fn pause(&self) -> bool {
        self.handle.pause()
    }

    pub fn resume(&self) -> bool {
        self.handle.resume()
    }

    pub fn end(&self) {
        self.handle.end()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.handle.lifecycle()
    }

    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    pub fn current(&self) -> Option<SegmentId> {
        self.handle.current()
    }

    pub fn events(&self) -> &EventLog {
        self.handle.events()
    }

    pub fn completion(&self) -> Completion {
        self.handle.completion()
    }

    /// Call `end()`, wait for the drain and return the (closed) writer
    pub async fn finish(self) -> Result<W> {
        self.handle.end();
        let outcome = self.handle.completion().wait().await;
        let writer = self.driver.await.map_err(|e| ConveyorError::Detached {
            reason: e.to_string(),
        })?;
        outcome.map(|()| writer)
    }
}

impl<W> std::fmt::Debug for Conveyor<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conveyor")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Executes scheduler steps against the destination
struct Driver<W> {
    shared: Arc<Shared>,
    steps: mpsc::UnboundedReceiver<Step>,
    destination: Destination<W>,
    outcome: watch::Sender<Outcome>,
}

impl<W> Driver<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn run(mut self) -> W {
        let mut next: Option<Step> = None;
        loop {
            let step = match next.take() {
                Some(step) => step,
                None => match self.steps.recv().await {
                    Some(step) => step,
                    None => break,
                },
            };

            match step {
                Step::Attach(binding) => match self.run_segment(binding).await {
                    Ok(step) => next = step,
                    Err(err) => {
                        self.halt(err).await;
                        break;
                    }
                },
                Step::Finalize => {
                    self.finalize().await;
                    break;
                }
            }
        }
        self.destination.into_inner()
    }

    /// Attach one binding, fire its callback and return the next step
    async fn run_segment(&mut self, mut binding: Binding) -> Result<Option<Step>> {
        let segment = binding.id();
        debug!(segment, name = %binding.display_name(), "attaching segment");
        self.shared.events.emit(EventKind::SegmentAttached { segment });
        let started = Instant::now();

        let signal = self
            .destination
            .attach(&mut binding)
            .await
            .map_err(|e| ConveyorError::transport(segment, &e))?;
        let bytes = settled_bytes(segment, signal)?;

        self.shared.events.emit(EventKind::SegmentSettled {
            segment,
            bytes,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        debug!(segment, bytes, "segment settled");

        // Outside the lock: the callback may push more work
        if let Some(callback) = binding.take_callback() {
            callback();
        }
        drop(binding);

        let next = self.shared.scheduler.lock().settle(segment);
        Ok(next)
    }

    async fn finalize(&mut self) {
        let settled = self.shared.scheduler.lock().settled();
        let result = match self.destination.close().await {
            Ok(_) => {
                info!(settled, "conveyor ended");
                self.shared
                    .events
                    .emit(EventKind::ConveyorEnded { settled });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to close destination");
                Err(ConveyorError::CloseFailed {
                    reason: e.to_string(),
                })
            }
        };
        self.outcome.send_replace(Some(result));
    }

    /// Segment failure: stop everything and report the error
    async fn halt(&mut self, err: ConveyorError) {
        let (segment, dropped) = {
            let mut scheduler = self.shared.scheduler.lock();
            (scheduler.current().unwrap_or_default(), scheduler.halt())
        };
        warn!(segment, dropped = dropped.len(), error = %err, "conveyor halted");
        self.shared.events.emit(EventKind::SegmentFailed {
            segment,
            error: err.to_string(),
            dropped: dropped.len(),
        });
        drop(dropped);

        if let Err(e) = self.destination.close().await {
            debug!(error = %e, "destination close after failure also failed");
        }
        self.outcome.send_replace(Some(Err(err)));
    }
}

/// Bytes of a finished segment. A suppressed edge means the destination was
/// closed under the segment, which leaves nothing to settle.
fn settled_bytes(segment: SegmentId, signal: Signal) -> Result<u64> {
    match signal {
        Signal::Finished { bytes } => Ok(bytes),
        Signal::Suppressed => Err(ConveyorError::Detached {
            reason: format!("destination closed while segment #{segment} was attached"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn suppressed_edge_does_not_settle() {
        assert_eq!(settled_bytes(2, Signal::Finished { bytes: 7 }), Ok(7));

        let err = settled_bytes(2, Signal::Suppressed).unwrap_err();
        assert!(matches!(err, ConveyorError::Detached { .. }));
        assert!(err.to_string().contains("segment #2"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn end_before_any_work_finalizes() {
        let conveyor = Conveyor::new(Vec::<u8>::new(), ConveyorOptions::default());
        let mut completion = conveyor.completion();

        conveyor.end();
        assert_eq!(conveyor.lifecycle(), Lifecycle::Ended);

        completion.wait().await.unwrap();
        assert!(completion.is_complete());
        let out = conveyor.finish().await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn finish_returns_concatenated_output() {
        let conveyor = Conveyor::new(Vec::<u8>::new(), ConveyorOptions::default());
        for part in ["A", "B", "C"] {
            assert!(conveyor.push(Source::from_bytes(part)).unwrap());
        }

        let out = conveyor.finish().await.unwrap();
        assert_eq!(out, b"ABC");
    }

    #[tokio::test]
    async fn callback_can_push_through_handle() {
        let conveyor = Conveyor::new(Vec::<u8>::new(), ConveyorOptions::default());
        let handle = conveyor.handle();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let first = Binding::new(Source::from_bytes("first ")).on_settled(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            handle.push(Source::from_bytes("second")).unwrap();
            handle.end();
        });
        conveyor.push(first).unwrap();

        conveyor.completion().wait().await.unwrap();
        let out = conveyor.finish().await.unwrap();
        assert_eq!(out, b"first second");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn secondary_sink_requires_output_side() {
        let conveyor = Conveyor::new(Vec::<u8>::new(), ConveyorOptions::default());
        let binding = Binding::new(Source::from_bytes("x"))
            .chain(Vec::<u8>::new(), crate::options::PipeOptions::default());

        assert_eq!(conveyor.push(binding), Err(ConveyorError::NoOutputSide));
        assert_eq!(conveyor.pending(), 0);
    }

    #[tokio::test]
    async fn events_trace_a_segment() {
        let conveyor = Conveyor::new(Vec::<u8>::new(), ConveyorOptions::default());
        conveyor
            .push(Binding::new(Source::from_bytes("abc")).label("only"))
            .unwrap();
        let events = conveyor.events().clone();
        conveyor.finish().await.unwrap();

        let kinds: Vec<EventKind> = events.filter_segment(1).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(
            &kinds[0],
            EventKind::SegmentQueued { label: Some(l), position: Position::Tail, .. } if &**l == "only"
        ));
        assert_eq!(kinds[1], EventKind::SegmentAttached { segment: 1 });
        assert!(matches!(
            kinds[2],
            EventKind::SegmentSettled { segment: 1, bytes: 3, .. }
        ));
        assert_eq!(
            events.count(|k| matches!(k, EventKind::ConveyorEnded { settled: 1 })),
            1
        );
    }
}
