//! Error types with fix suggestions
//!
//! Error code ranges:
//! - CONV-001-009: Admission errors (push/unshift preconditions)
//! - CONV-010-019: Transport errors (in-flight segments, final close)
//! - CONV-020-029: Runtime and configuration errors

use std::io;

use thiserror::Error;

use crate::scheduler::{Lifecycle, SegmentId};

pub type Result<T> = std::result::Result<T, ConveyorError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// `Clone` so that every `Completion` observer can receive the same
/// halting error; I/O failures are flattened into kind + message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConveyorError {
    // ─────────────────────────────────────────────────────────────
    // Admission errors (CONV-001 to CONV-003)
    // ─────────────────────────────────────────────────────────────
    #[error("CONV-001: Source '{label}' is not readable (already exhausted or closed)")]
    SourceNotReadable { label: String },

    #[error("CONV-002: Secondary sink given but the destination has no output side")]
    NoOutputSide,

    #[error("CONV-003: Conveyor no longer accepts bindings (state: {lifecycle})")]
    Closed { lifecycle: Lifecycle },

    // ─────────────────────────────────────────────────────────────
    // Transport errors (CONV-010 to CONV-011)
    // ─────────────────────────────────────────────────────────────
    #[error("CONV-010: Segment #{segment} failed ({kind:?}): {reason}")]
    Transport {
        segment: SegmentId,
        kind: io::ErrorKind,
        reason: String,
    },

    #[error("CONV-011: Failed to close destination: {reason}")]
    CloseFailed { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Runtime / configuration errors (CONV-020 to CONV-022)
    // ─────────────────────────────────────────────────────────────
    #[error("CONV-020: Conveyor driver stopped unexpectedly: {reason}")]
    Detached { reason: String },

    #[error("CONV-021: Invalid conveyor configuration: {reason}")]
    Config { reason: String },

    #[error("CONV-022: IO error ({kind:?}): {reason}")]
    Io { kind: io::ErrorKind, reason: String },
}

impl ConveyorError {
    /// Build a transport error for the segment that was in flight
    pub fn transport(segment: SegmentId, err: &io::Error) -> Self {
        Self::Transport {
            segment,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    /// Whether this error halted the conveyor (as opposed to rejecting a call)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::CloseFailed { .. } | Self::Detached { .. }
        )
    }
}

impl From<io::Error> for ConveyorError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

impl FixSuggestion for ConveyorError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ConveyorError::SourceNotReadable { .. } => {
                Some("Push a fresh source; a source that reached EOF cannot be replayed")
            }
            ConveyorError::NoOutputSide => {
                Some("Build the conveyor with Conveyor::with_output to chain a secondary sink")
            }
            ConveyorError::Closed { .. } => {
                Some("Queue every binding before calling end(), or create a new conveyor")
            }
            ConveyorError::Transport { .. } => {
                Some("Check the source and destination streams; the conveyor halts on I/O errors")
            }
            ConveyorError::CloseFailed { .. } => Some("Check that the destination is still writable"),
            ConveyorError::Detached { .. } => {
                Some("Keep the tokio runtime alive until the conveyor completes")
            }
            ConveyorError::Config { .. } => {
                Some("Check YAML syntax: expected keys are 'max' and 'start_paused'")
            }
            ConveyorError::Io { .. } => Some("Check file paths and permissions"),
        }
    }
}
