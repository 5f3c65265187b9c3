//! Surface collaborator contract.
//!
//! The engine never talks to a concrete rendering surface. Commands and the
//! snapshot subsystem see the upper layer through the [`Surface`] trait,
//! which exposes synchronous read/write primitives: capture the full
//! surface state, write a previously captured state back, and translate
//! between the structured and encoded representations.
//!
//! The primitives must be callable in any order relative to each other;
//! the engine performs no locking around them.

use thiserror::Error;

/// Structured pixel capture of a surface (RGBA8, row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Packed RGBA8 bytes, `width * height * 4` long.
    pub pixels: Vec<u8>,
}

impl RasterData {
    /// Byte estimate used by memory accounting.
    pub fn memory_usage(&self) -> usize {
        self.pixels.len() + std::mem::size_of::<Self>()
    }
}

/// Captured surface state in one of its two representations.
///
/// The raster form is the cheap, preferred representation. The encoded
/// form is the fallback for surfaces that refuse structured reads; it is
/// charged at twice its byte length because restoring it requires a
/// decode pass that re-inflates the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceData {
    /// Structured pixel buffer.
    Raster(RasterData),
    /// Opaque encoded string produced by [`Surface::capture_encoded`].
    Encoded(String),
}

impl SurfaceData {
    /// Byte estimate used by memory accounting.
    pub fn memory_usage(&self) -> usize {
        match self {
            SurfaceData::Raster(raster) => raster.memory_usage(),
            SurfaceData::Encoded(encoded) => encoded.len() * 2,
        }
    }
}

/// Errors reported by a surface collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The surface has been torn down and can no longer be read or written.
    #[error("surface is no longer available")]
    Unavailable,
    /// A structured capture was refused or failed.
    #[error("surface capture failed: {0}")]
    Capture(String),
    /// An encoded representation could not be decoded back into pixels.
    #[error("encoded surface data could not be decoded: {0}")]
    Decode(String),
    /// The surface rejected a state write.
    #[error("surface write failed: {0}")]
    Write(String),
}

/// Read/write primitives the engine requires from a rendering surface.
///
/// Implemented by the host; `history-core-canvas` ships an in-memory
/// reference implementation.
pub trait Surface {
    /// Capture the current surface state as a structured pixel buffer.
    fn capture(&self) -> Result<RasterData, SurfaceError>;

    /// Capture the current surface state in the encoded fallback form.
    ///
    /// Called when [`capture`](Surface::capture) fails, e.g. when the
    /// backing store refuses structured reads.
    fn capture_encoded(&self) -> Result<String, SurfaceError>;

    /// Overwrite the surface with previously captured pixels.
    fn restore(&mut self, data: &RasterData) -> Result<(), SurfaceError>;

    /// Decode an encoded representation produced by
    /// [`capture_encoded`](Surface::capture_encoded).
    fn decode(&self, encoded: &str) -> Result<RasterData, SurfaceError>;
}
