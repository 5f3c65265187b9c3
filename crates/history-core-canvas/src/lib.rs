#![warn(missing_docs)]
//! `history-core-canvas` - In-memory raster surface and reference commands for `history-core`.
//!
//! This crate is intended for hosts that want a ready-made [`Surface`]
//! implementation (tests, headless pipelines, examples) and for tool
//! authors looking for worked command implementations, including one that
//! carries the merge capability.
//!
//! [`Surface`]: history_core::Surface
//!
//! # Example
//!
//! ```rust
//! use history_core::{CommandIdGenerator, HistoryEngine};
//! use history_core_canvas::{AdjustBrightness, RasterCanvas};
//!
//! let mut engine = HistoryEngine::default();
//! let mut canvas = RasterCanvas::new(4, 4);
//! let mut ids = CommandIdGenerator::new();
//!
//! engine
//!     .execute_command(Box::new(AdjustBrightness::new(&mut ids, 16)), &mut canvas)
//!     .unwrap();
//! assert_eq!(canvas.pixel(0, 0), Some([16, 16, 16, 0]));
//!
//! assert!(engine.undo(&mut canvas));
//! assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));
//! ```

mod canvas;
mod commands;

pub use canvas::RasterCanvas;
pub use commands::{AdjustBrightness, FillRegion, MERGE_WINDOW};
