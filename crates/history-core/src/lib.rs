#![warn(missing_docs)]
//! History Core - Headless Reversible-Edit Engine
//!
//! # Overview
//!
//! `history-core` is an in-process engine for reversible edits on an
//! interactive editing surface. It records discrete edits as commands,
//! undoes and redoes them, groups related edits into atomic units, merges
//! rapid-fire edits of the same kind into single undo steps, and bounds
//! its own memory footprint by snapshotting surface state at intervals
//! and evicting the oldest entries.
//!
//! It is headless: rendering, input dispatch, and the concrete editing
//! tools live in the upper layer. The engine sees the surface only
//! through the [`Surface`] collaborator trait, and tools hand it
//! ready-made [`Command`] values.
//!
//! # Core Features
//!
//! - **Linear, branchable timeline**: recording after undos discards the
//!   redoable tail; history is never a DAG
//! - **Atomic grouping**: composite commands executed in order, undone in
//!   reverse order
//! - **Merge coalescing**: consecutive same-kind commands within a time
//!   window collapse into one undo step
//! - **Snapshot-bounded recovery**: a failed undo restores the nearest
//!   full-state snapshot and replays forward
//! - **Memory budgeting**: entry-count and byte ceilings enforced by
//!   oldest-first eviction
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  HistoryEngine (orchestration + events)     │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Timeline & CompositeCommand                │  ← Ordering
//! ├─────────────────────────────────────────────┤
//! │  SnapshotStore & MemoryAccountant           │  ← Budget & Recovery
//! ├─────────────────────────────────────────────┤
//! │  Command / Surface traits                   │  ← Collaborator Seams
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use history_core::{Command, CommandError, CommandId, CommandIdGenerator};
//! use history_core::{HistoryEngine, RasterData, Surface, SurfaceError};
//! use std::time::Instant;
//!
//! # struct Fill { id: CommandId, at: Instant, value: u8, previous: Option<u8> }
//! # impl Command for Fill {
//! #     fn id(&self) -> CommandId { self.id }
//! #     fn name(&self) -> &str { "Fill" }
//! #     fn timestamp(&self) -> Instant { self.at }
//! #     fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
//! #         self.previous = Some(surface.capture()?.pixels[0]);
//! #         surface.restore(&RasterData { width: 1, height: 1, pixels: vec![self.value; 4] })?;
//! #         Ok(())
//! #     }
//! #     fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
//! #         let value = self.previous.expect("executed");
//! #         surface.restore(&RasterData { width: 1, height: 1, pixels: vec![value; 4] })?;
//! #         Ok(())
//! #     }
//! #     fn memory_footprint(&self) -> usize { std::mem::size_of::<Self>() }
//! #     fn as_any(&self) -> &dyn std::any::Any { self }
//! # }
//! # struct OnePixel { value: u8 }
//! # impl Surface for OnePixel {
//! #     fn capture(&self) -> Result<RasterData, SurfaceError> {
//! #         Ok(RasterData { width: 1, height: 1, pixels: vec![self.value; 4] })
//! #     }
//! #     fn capture_encoded(&self) -> Result<String, SurfaceError> { Ok(self.value.to_string()) }
//! #     fn restore(&mut self, data: &RasterData) -> Result<(), SurfaceError> {
//! #         self.value = data.pixels[0];
//! #         Ok(())
//! #     }
//! #     fn decode(&self, encoded: &str) -> Result<RasterData, SurfaceError> {
//! #         let value: u8 = encoded.parse().map_err(|_| SurfaceError::Decode(encoded.into()))?;
//! #         Ok(RasterData { width: 1, height: 1, pixels: vec![value; 4] })
//! #     }
//! # }
//! let mut engine = HistoryEngine::default();
//! let mut surface = OnePixel { value: 0 };
//! let mut ids = CommandIdGenerator::new();
//!
//! let fill = Fill { id: ids.next_id(), at: Instant::now(), value: 7, previous: None };
//! engine.execute_command(Box::new(fill), &mut surface).unwrap();
//! assert_eq!(surface.value, 7);
//! assert!(engine.can_undo());
//!
//! assert!(engine.undo(&mut surface));
//! assert_eq!(surface.value, 0);
//! assert!(engine.redo(&mut surface));
//! assert_eq!(surface.value, 7);
//! ```
//!
//! # Module Description
//!
//! - [`command`] - Reversible command trait and identifiers
//! - [`composite`] - Ordered command groups undone as one unit
//! - [`timeline`] - Cursor-addressed entry list with the branch rule
//! - [`snapshot`] - Timeline-indexed full-state captures
//! - [`memory`] - Incremental byte accounting
//! - [`surface`] - Rendering-surface collaborator contract
//! - [`engine`] - The orchestrating history engine
//!
//! # Concurrency Model
//!
//! One engine instance per surface; mutating operations take `&mut self`
//! and therefore never overlap. Callers that receive operations from
//! concurrent sources queue them in their own event loop before calling
//! in.

pub mod command;
pub mod composite;
pub mod engine;
pub mod memory;
pub mod snapshot;
pub mod surface;
pub mod timeline;

pub use command::{
    Command, CommandError, CommandId, CommandIdGenerator, CommandPayload, SerializedCommand,
};
pub use composite::CompositeCommand;
pub use engine::{
    HistoryConfig, HistoryEngine, HistoryError, HistoryEvent, HistoryEventCallback, HistoryState,
};
pub use memory::MemoryAccountant;
pub use snapshot::{Snapshot, SnapshotStore};
pub use surface::{RasterData, Surface, SurfaceData, SurfaceError};
pub use timeline::Timeline;
