//! Reversible command abstraction.
//!
//! # Overview
//!
//! A [`Command`] is the atomic unit of undoable work: it performs an edit
//! against a [`Surface`], can reverse exactly that edit, and reports the
//! byte cost of whatever before/after state it retains for the reversal.
//! Commands are constructed by editing tools, executed once when recorded
//! by the engine, and re-executed on redo.
//!
//! Optional capabilities — merge coalescing and serialization — are
//! modeled as defaulted trait methods. A command that does not override
//! them simply does not have the capability; the engine probes via the
//! defaults instead of assuming every command implements every hook.
//!
//! Identifiers come from a [`CommandIdGenerator`] owned by whichever
//! factory builds the commands. There is no process-wide counter.

use std::any::Any;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::{Surface, SurfaceError};

/// Opaque unique command identifier, stable for the command's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId {
    tag: u32,
    seq: u64,
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{:08x}-{}", self.tag, self.seq)
    }
}

/// Per-factory generator of [`CommandId`]s.
///
/// Combines a monotonically increasing sequence with a random tag drawn
/// at construction, so identifiers from independently created generators
/// do not collide. Each command-building context (a tool, the engine's
/// group bookkeeping) owns its own generator.
#[derive(Debug)]
pub struct CommandIdGenerator {
    tag: u32,
    next_seq: u64,
}

impl CommandIdGenerator {
    /// Create a generator with a fresh random tag.
    pub fn new() -> Self {
        Self {
            tag: rand::random(),
            next_seq: 0,
        }
    }

    /// Hand out the next identifier.
    pub fn next_id(&mut self) -> CommandId {
        let id = CommandId {
            tag: self.tag,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        id
    }
}

impl Default for CommandIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind tag and payload supplied by a command's serialize capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPayload {
    /// Kind tag identifying the concrete command type.
    pub kind: String,
    /// Kind-specific payload.
    pub data: serde_json::Value,
}

/// Plain descriptive record of a recorded command.
///
/// Assembled by the engine for history inspection and host UI: the
/// command supplies kind and payload via [`Command::serialize`] (or gets
/// the `"Unknown"` fallback), the engine fills in identifier, label, and
/// a timestamp normalized to milliseconds since engine construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedCommand {
    /// Command identifier in its `Display` form.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Creation time, milliseconds since the engine was constructed.
    pub timestamp_ms: u64,
    /// Kind tag; `"Unknown"` for commands without a serialize capability.
    pub kind: String,
    /// Kind-specific payload; `null` for the fallback record.
    pub payload: serde_json::Value,
}

/// Errors reported by command execution or reversal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The surface refused or failed an operation the command needed.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    /// Command-specific failure.
    #[error("{0}")]
    Other(String),
}

/// The atomic unit of undoable work.
///
/// A command owns any captured state (for example before/after pixel
/// regions) it privately needs to undo itself; that state is distinct
/// from the engine-level snapshot store and must not include shared
/// mutable references into the surface.
pub trait Command {
    /// Stable identifier assigned at construction.
    fn id(&self) -> CommandId;

    /// Human-readable label (UI display, serialization).
    fn name(&self) -> &str;

    /// Creation time on the monotonic clock; drives merge-window decisions.
    fn timestamp(&self) -> Instant;

    /// Perform (or re-perform) the edit.
    ///
    /// Re-executing after an undo must reproduce the same observable end
    /// state.
    fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError>;

    /// Reverse exactly the effect of the most recent
    /// [`execute`](Command::execute).
    fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError>;

    /// Byte estimate of retained state.
    ///
    /// Recomputed by the command itself; may grow once `execute` has
    /// captured before/after data.
    fn memory_footprint(&self) -> usize;

    /// Whether the command's backing context still exists.
    ///
    /// Returns `false` once the owning surface or tool has been torn
    /// down; the engine refuses to undo or redo stale commands.
    fn is_valid(&self) -> bool {
        true
    }

    /// Merge capability probe. Pure predicate, no side effects.
    ///
    /// `other` is the command recorded *after* `self`. The typical policy
    /// is: same concrete kind, and `other`'s creation time within a fixed
    /// window of `self`'s.
    fn can_merge_with(&self, _other: &dyn Command) -> bool {
        false
    }

    /// Produce a new command combining `self` (earlier) with `other`
    /// (later).
    ///
    /// Neither input is mutated. The merged command must undo to `self`'s
    /// before-state and redo to `other`'s after-state. Returning `None`
    /// declines the merge and the engine records `other` as its own
    /// entry.
    fn merge_with(&self, _other: &dyn Command) -> Option<Box<dyn Command>> {
        None
    }

    /// Serialize capability: kind tag plus payload for inspection records.
    fn serialize(&self) -> Option<CommandPayload> {
        None
    }

    /// Concrete-type escape hatch, used by merge implementations to
    /// inspect the partner command.
    fn as_any(&self) -> &dyn Any;
}
