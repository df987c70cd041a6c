//! Destination adapter - one shared sink reused across segments
//!
//! Wraps the caller's writer (and, for duplex destinations, its output side)
//! behind an explicit lifecycle:
//!
//! ```text
//!   Idle ──attach──▶ Attached ──source drained + flushed──▶ Finishing
//!                        ▲                                     │ mark_reusable (now)
//!                        └──────────attach────────── Reusable ◀┘ mark_reusable (after yield)
//!
//!   any ──close──▶ Closed   (terminal)
//! ```
//!
//! Each segment ends with exactly one completion edge, reported as a
//! [`Signal`]. Closing the destination produces a completion edge too; the
//! manual-end flag marks it so it surfaces as [`Signal::Suppressed`] instead
//! of a finished segment.

use std::io;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, trace};

use crate::binding::{Binding, Secondary};
use crate::options::OutputBoundary;
use crate::source::{BoxReader, Source};

/// Adapter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Never attached
    Idle,
    /// A source is flowing into the writer
    Attached,
    /// Source drained; completion edge fired, reset pending
    Finishing,
    /// Ready for the next attach
    Reusable,
    /// Permanently closed
    Closed,
}

/// Completion edge raised by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The attached segment was fully consumed and flushed
    Finished { bytes: u64 },
    /// Self-inflicted by `close()`; not a segment completion
    Suppressed,
}

pub struct Destination<W> {
    writer: W,
    output: Option<BoxReader>,
    state: AdapterState,
    manual_end: bool,
}

impl<W> Destination<W>
where
    W: AsyncWrite + Send + Unpin,
{
    /// Write-only destination
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            output: None,
            state: AdapterState::Idle,
            manual_end: false,
        }
    }

    /// Duplex destination: bytes written to `writer` come back out of `output`
    /// and can be relayed into a binding's secondary sink
    pub fn with_output<R>(writer: W, output: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            output: Some(Box::new(output)),
            ..Self::new(writer)
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Run one segment: pipe the binding's source into the writer (and the
    /// output into its secondary sink) until the source is exhausted.
    ///
    /// Returns only after both resets ran, so the next attach always sees a
    /// reusable adapter.
    #[instrument(skip_all, fields(segment = binding.id()))]
    pub async fn attach(&mut self, binding: &mut Binding) -> io::Result<Signal> {
        match self.state {
            AdapterState::Idle | AdapterState::Reusable => {}
            state => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("destination cannot accept a segment while {state:?}"),
                ))
            }
        }
        self.state = AdapterState::Attached;

        let bytes = match binding.secondary.as_mut() {
            Some(secondary) => self.pump_chained(&mut binding.source, secondary).await?,
            None => pump(&mut binding.source, &mut self.writer).await?,
        };

        self.state = AdapterState::Finishing;
        let signal = self.completion_edge(bytes);

        // Second reset after yielding; the state may have been touched while
        // other tasks observed the edge.
        tokio::task::yield_now().await;
        self.mark_reusable();

        trace!(?signal, "segment finished");
        Ok(signal)
    }

    /// Clear the finished bookkeeping so another segment can attach.
    /// Returns `false` once closed.
    pub fn mark_reusable(&mut self) -> bool {
        match self.state {
            AdapterState::Closed => false,
            AdapterState::Attached => false,
            AdapterState::Idle => true,
            AdapterState::Finishing | AdapterState::Reusable => {
                self.state = AdapterState::Reusable;
                true
            }
        }
    }

    /// Permanently close the writer. The completion edge this produces is
    /// consumed by the manual-end flag.
    pub async fn close(&mut self) -> io::Result<Signal> {
        if self.state == AdapterState::Closed {
            return Ok(Signal::Suppressed);
        }
        self.manual_end = true;
        let result = self.writer.shutdown().await;
        self.state = AdapterState::Closed;
        let signal = self.completion_edge(0);
        debug!("destination closed");
        result.map(|()| signal)
    }

    /// The sink's one-shot completion edge
    fn completion_edge(&mut self, bytes: u64) -> Signal {
        if self.manual_end {
            self.manual_end = false;
            return Signal::Suppressed;
        }
        self.mark_reusable();
        Signal::Finished { bytes }
    }

    /// Source → writer while output → secondary, until the segment's output
    /// boundary is reached; then flush and (optionally) shut the secondary.
    /// Both pipe connections are dropped when this returns.
    async fn pump_chained(
        &mut self,
        source: &mut Source,
        secondary: &mut Secondary,
    ) -> io::Result<u64> {
        let Self { writer, output, .. } = self;
        let Some(output) = output.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "destination has no output side",
            ));
        };

        let boundary = secondary.options.boundary;
        let mut buf = vec![0u8; secondary.options.chunk_size.max(1)];
        let mut output_open = true;
        let mut relayed = 0u64;
        let mut flushed = None;
        let forward = pump(source, writer);
        tokio::pin!(forward);

        let written = loop {
            if let Some(total) = flushed {
                if !output_open || !boundary.awaits_more(relayed, total) {
                    break total;
                }
            }
            let progress = tokio::select! {
                res = &mut forward, if flushed.is_none() => Relay::Written(res?),
                res = output.read(&mut buf), if output_open => Relay::Read(res?),
            };
            match progress {
                Relay::Written(total) => flushed = Some(total),
                Relay::Read(0) => output_open = false,
                Relay::Read(n) => {
                    secondary.sink.write_all(&buf[..n]).await?;
                    relayed += n as u64;
                }
            }
        };

        if boundary == OutputBoundary::Ready && output_open {
            // Relay whatever the destination has already produced
            tokio::task::yield_now().await;
            loop {
                match output.read(&mut buf).now_or_never() {
                    Some(Ok(0)) | None => break,
                    Some(Ok(n)) => {
                        secondary.sink.write_all(&buf[..n]).await?;
                        relayed += n as u64;
                    }
                    Some(Err(e)) => return Err(e),
                }
            }
        }
        trace!(written, relayed, "chained segment relayed");

        secondary.sink.flush().await?;
        if secondary.options.end {
            secondary.sink.shutdown().await?;
        }
        Ok(written)
    }
}

/// One step of the chained relay loop
enum Relay {
    /// The source is drained and the writer flushed
    Written(u64),
    /// Bytes read from the output side (0 = EOF)
    Read(usize),
}

/// Copy until EOF, then flush
async fn pump<W>(source: &mut Source, writer: &mut W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = tokio::io::copy(source, writer).await?;
    writer.flush().await?;
    Ok(bytes)
}

impl<W> std::fmt::Debug for Destination<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("state", &self.state)
            .field("has_output", &self.output.is_some())
            .field("manual_end", &self.manual_end)
            .finish()
    }
}
