//! Byte sources fed into the conveyor
//!
//! A `Source` wraps any `AsyncRead` and remembers whether it can still
//! produce bytes. Once a read reports EOF (or the source is closed) it is no
//! longer readable, and the conveyor refuses to enqueue it.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Boxed reader accepted by [`Source::new`]
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Readability of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Can still produce bytes (or EOF)
    Readable,
    /// A read already returned EOF
    Exhausted,
    /// Closed by its owner before EOF
    Closed,
}

/// An owned, single-use byte producer
pub struct Source {
    reader: BoxReader,
    state: SourceState,
    bytes_read: u64,
}

impl Source {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            state: SourceState::Readable,
            bytes_read: 0,
        }
    }

    /// In-memory source that yields `bytes` then EOF
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(io::Cursor::new(bytes.into()))
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn is_readable(&self) -> bool {
        self.state == SourceState::Readable
    }

    /// Bytes produced so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Stop producing bytes; further reads report EOF
    pub fn close(&mut self) {
        if self.state == SourceState::Readable {
            self.state = SourceState::Closed;
        }
    }
}

impl AsyncRead for Source {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.state != SourceState::Readable {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        let wanted = buf.remaining() > 0;
        match Pin::new(&mut this.reader).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n == 0 && wanted {
                    this.state = SourceState::Exhausted;
                }
                this.bytes_read += n as u64;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("state", &self.state)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}
