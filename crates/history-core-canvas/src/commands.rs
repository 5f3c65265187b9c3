//! Reference command implementations over the raster canvas.
//!
//! [`FillRegion`] shows the plain shape: capture what the edit will
//! overwrite, apply, and restore the saved bytes on undo. Its footprint
//! grows once the first execute has captured the region.
//!
//! [`AdjustBrightness`] additionally carries the merge capability so
//! rapid slider drags collapse into a single undo step, and the
//! serialize capability for history inspection.

use std::any::Any;
use std::time::{Duration, Instant};

use history_core::{
    Command, CommandError, CommandId, CommandIdGenerator, CommandPayload, RasterData, Surface,
};

/// Same-kind commands created within this window coalesce.
pub const MERGE_WINDOW: Duration = Duration::from_millis(500);

/// Fill a rectangle with one color.
pub struct FillRegion {
    id: CommandId,
    created_at: Instant,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    color: [u8; 4],
    /// Bytes the fill overwrote, captured on execute. The stored rect is
    /// the clamped one actually written.
    saved: Option<SavedRegion>,
}

struct SavedRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl FillRegion {
    /// Create a fill over `(x, y, width, height)` with `color`.
    pub fn new(
        ids: &mut CommandIdGenerator,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        color: [u8; 4],
    ) -> Self {
        Self {
            id: ids.next_id(),
            created_at: Instant::now(),
            x,
            y,
            width,
            height,
            color,
            saved: None,
        }
    }

    fn clamped(&self, raster: &RasterData) -> (u32, u32, u32, u32) {
        let x = self.x.min(raster.width);
        let y = self.y.min(raster.height);
        let width = self.x.saturating_add(self.width).min(raster.width) - x;
        let height = self.y.saturating_add(self.height).min(raster.height) - y;
        (x, y, width, height)
    }
}

impl Command for FillRegion {
    fn id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &str {
        "Fill region"
    }

    fn timestamp(&self) -> Instant {
        self.created_at
    }

    fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        let mut raster = surface.capture()?;
        let (x, y, width, height) = self.clamped(&raster);

        let mut bytes = Vec::with_capacity((width * height * 4) as usize);
        for row in y..y + height {
            let offset = ((row * raster.width + x) * 4) as usize;
            bytes.extend_from_slice(&raster.pixels[offset..offset + (width * 4) as usize]);
        }
        self.saved = Some(SavedRegion {
            x,
            y,
            width,
            height,
            bytes,
        });

        for row in y..y + height {
            for col in x..x + width {
                let offset = ((row * raster.width + col) * 4) as usize;
                raster.pixels[offset..offset + 4].copy_from_slice(&self.color);
            }
        }
        surface.restore(&raster)?;
        Ok(())
    }

    fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        let saved = self
            .saved
            .as_ref()
            .ok_or_else(|| CommandError::Other("fill was never executed".to_string()))?;
        let mut raster = surface.capture()?;
        if saved.x + saved.width > raster.width || saved.y + saved.height > raster.height {
            return Err(CommandError::Other(
                "surface dimensions changed since the fill".to_string(),
            ));
        }

        let row_bytes = (saved.width * 4) as usize;
        for (index, row) in (saved.y..saved.y + saved.height).enumerate() {
            let offset = ((row * raster.width + saved.x) * 4) as usize;
            let start = index * row_bytes;
            raster.pixels[offset..offset + row_bytes]
                .copy_from_slice(&saved.bytes[start..start + row_bytes]);
        }
        surface.restore(&raster)?;
        Ok(())
    }

    fn memory_footprint(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .saved
                .as_ref()
                .map_or(0, |saved| saved.bytes.len())
    }

    fn serialize(&self) -> Option<CommandPayload> {
        Some(CommandPayload {
            kind: "FillRegion".to_string(),
            data: serde_json::json!({
                "x": self.x,
                "y": self.y,
                "width": self.width,
                "height": self.height,
                "color": self.color,
            }),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Add a brightness delta to every pixel's color channels.
///
/// Keeps the full before-image, since channel clamping makes the
/// adjustment non-invertible arithmetically. Consecutive adjustments
/// within [`MERGE_WINDOW`] merge into one entry whose undo returns to
/// the state before the first adjustment.
pub struct AdjustBrightness {
    id: CommandId,
    created_at: Instant,
    delta: i16,
    before: Option<RasterData>,
}

impl AdjustBrightness {
    /// Create an adjustment by `delta` (positive brightens).
    pub fn new(ids: &mut CommandIdGenerator, delta: i16) -> Self {
        Self {
            id: ids.next_id(),
            created_at: Instant::now(),
            delta,
            before: None,
        }
    }

    /// The adjustment delta.
    pub fn delta(&self) -> i16 {
        self.delta
    }
}

impl Command for AdjustBrightness {
    fn id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &str {
        "Adjust brightness"
    }

    fn timestamp(&self) -> Instant {
        self.created_at
    }

    fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        let raster = surface.capture()?;
        self.before = Some(raster.clone());

        let mut out = raster;
        for pixel in out.pixels.chunks_exact_mut(4) {
            for channel in &mut pixel[..3] {
                *channel = (i32::from(*channel) + i32::from(self.delta)).clamp(0, 255) as u8;
            }
        }
        surface.restore(&out)?;
        Ok(())
    }

    fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        let before = self
            .before
            .as_ref()
            .ok_or_else(|| CommandError::Other("adjustment was never executed".to_string()))?;
        surface.restore(before)?;
        Ok(())
    }

    fn memory_footprint(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .before
                .as_ref()
                .map_or(0, |before| before.pixels.len())
    }

    fn can_merge_with(&self, other: &dyn Command) -> bool {
        other
            .as_any()
            .downcast_ref::<AdjustBrightness>()
            .is_some_and(|later| {
                later.created_at.saturating_duration_since(self.created_at) <= MERGE_WINDOW
            })
    }

    fn merge_with(&self, other: &dyn Command) -> Option<Box<dyn Command>> {
        let later = other.as_any().downcast_ref::<AdjustBrightness>()?;
        Some(Box::new(AdjustBrightness {
            id: self.id,
            created_at: self.created_at,
            delta: self.delta.saturating_add(later.delta),
            before: self.before.clone(),
        }))
    }

    fn serialize(&self) -> Option<CommandPayload> {
        Some(CommandPayload {
            kind: "AdjustBrightness".to_string(),
            data: serde_json::json!({ "delta": self.delta }),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
