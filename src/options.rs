//! Conveyor and pipe configuration
//!
//! Both structs deserialize from YAML with every field optional:
//!
//! ```yaml
//! max: 16            # omit (or ~) for an unbounded queue
//! start_paused: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConveyorError, Result};

/// Default relay buffer for secondary sinks (8 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Construction options for a conveyor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConveyorOptions {
    /// Maximum number of queued (not yet attached) bindings; `None` is unbounded
    pub max: Option<usize>,

    /// Start in the paused state instead of processing
    pub start_paused: bool,
}

impl ConveyorOptions {
    /// Bound the queue length
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Start paused; nothing attaches until `resume()`
    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }

    /// Parse options from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConveyorError::Config {
            reason: e.to_string(),
        })
    }

    /// Load options from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConveyorError::Config {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&content)
    }
}

/// Where a chained segment's destination output stops
///
/// The destination may emit its output later than it accepts input, so the
/// relay needs to know when everything belonging to the segment came back.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputBoundary {
    /// Relay until as many bytes as were written have come back out (or the
    /// output side hits EOF). Suits pass-through and re-chunking
    /// destinations; a destination that emits fewer bytes than it receives
    /// holds the segment open until it is closed.
    #[default]
    Echo,
    /// Relay only what is ready once the writer is flushed, after one yield.
    /// For size-changing destinations whose output is produced synchronously.
    Ready,
}

impl OutputBoundary {
    /// Whether the relay should keep reading after `relayed` of `written` bytes
    pub fn awaits_more(self, relayed: u64, written: u64) -> bool {
        match self {
            OutputBoundary::Echo => relayed < written,
            OutputBoundary::Ready => false,
        }
    }
}

/// Options for the destination → secondary sink pipe of one binding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipeOptions {
    /// Shut the secondary sink down when the segment settles
    pub end: bool,

    /// Relay buffer size in bytes
    pub chunk_size: usize,

    /// When the segment's output is considered complete
    pub boundary: OutputBoundary,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            end: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            boundary: OutputBoundary::Echo,
        }
    }
}

impl PipeOptions {
    /// Leave the secondary sink open after the segment settles
    pub fn keep_open(mut self) -> Self {
        self.end = false;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_boundary(mut self, boundary: OutputBoundary) -> Self {
        self.boundary = boundary;
        self
    }
}
