//! Binding - one scheduled source → destination transfer
//!
//! Built once at the call boundary with a small builder:
//!
//! ```text
//! Binding::new(source)
//!     .label("part-1")                       // optional, for logs/events
//!     .chain(sink, PipeOptions::default())   // optional secondary sink
//!     .on_settled(|| println!("done"))       // optional callback
//! ```

use std::sync::Arc;

use tokio::io::AsyncWrite;

use crate::options::PipeOptions;
use crate::scheduler::SegmentId;
use crate::source::Source;

/// Boxed secondary sink
pub type BoxSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback fired exactly once when a binding settles
pub type SettleFn = Box<dyn FnOnce() + Send>;

/// Sink chained after the destination for the lifetime of one binding
pub struct Secondary {
    pub sink: BoxSink,
    pub options: PipeOptions,
}

/// One unit of work: a source, optional secondary sink and callback
pub struct Binding {
    pub(crate) id: SegmentId,
    pub(crate) label: Option<Arc<str>>,
    pub(crate) source: Source,
    pub(crate) secondary: Option<Secondary>,
    pub(crate) on_settled: Option<SettleFn>,
}

impl Binding {
    pub fn new(source: Source) -> Self {
        Self {
            id: 0,
            label: None,
            source,
            secondary: None,
            on_settled: None,
        }
    }

    /// Human readable name used in logs and events
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Relay the destination's output into `sink` while this binding is attached
    pub fn chain<S>(mut self, sink: S, options: PipeOptions) -> Self
    where
        S: AsyncWrite + Send + Unpin + 'static,
    {
        self.secondary = Some(Secondary {
            sink: Box::new(sink),
            options,
        });
        self
    }

    pub fn on_settled<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_settled = Some(Box::new(callback));
        self
    }

    /// Segment id assigned on admission (0 before)
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn label_str(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Label if present, otherwise `#<id>`
    pub(crate) fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.to_string(),
            None => format!("#{}", self.id),
        }
    }

    /// Take the callback so it can run outside the scheduler lock
    pub(crate) fn take_callback(&mut self) -> Option<SettleFn> {
        self.on_settled.take()
    }
}

impl From<Source> for Binding {
    fn from(source: Source) -> Self {
        Binding::new(source)
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("source", &self.source)
            .field("secondary", &self.secondary.is_some())
            .field("on_settled", &self.on_settled.is_some())
            .finish()
    }
}
