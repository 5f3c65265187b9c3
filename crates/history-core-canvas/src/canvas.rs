//! In-memory RGBA8 canvas implementing the surface contract.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use history_core::{RasterData, Surface, SurfaceError};

const ENCODED_PREFIX: &str = "raster:";

/// A width × height RGBA8 pixel buffer.
///
/// The encoded representation is `raster:{width}:{height}:` followed by
/// the base64 pixel payload. A canvas can be switched to refuse
/// structured captures, which forces the engine's snapshot subsystem
/// onto the encoded fallback path the way an unreadable host surface
/// would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    deny_raw_capture: bool,
}

impl RasterCanvas {
    /// Create a transparent canvas of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
            deny_raw_capture: false,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel bytes, row-major RGBA8.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at `(x, y)`, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        Some([
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ])
    }

    /// Set the RGBA value at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
    }

    /// Fill a rectangle with one color. The rectangle is clamped to the
    /// canvas bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let x_end = (x + width).min(self.width);
        let y_end = (y + height).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                let offset = ((row * self.width + col) * 4) as usize;
                self.pixels[offset..offset + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Refuse structured captures, as an unreadable host surface would.
    pub fn set_deny_raw_capture(&mut self, deny: bool) {
        self.deny_raw_capture = deny;
    }
}

impl Surface for RasterCanvas {
    fn capture(&self) -> Result<RasterData, SurfaceError> {
        if self.deny_raw_capture {
            return Err(SurfaceError::Capture(
                "structured pixel reads are denied".to_string(),
            ));
        }
        Ok(RasterData {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        })
    }

    fn capture_encoded(&self) -> Result<String, SurfaceError> {
        Ok(format!(
            "{ENCODED_PREFIX}{}:{}:{}",
            self.width,
            self.height,
            BASE64.encode(&self.pixels)
        ))
    }

    fn restore(&mut self, data: &RasterData) -> Result<(), SurfaceError> {
        let expected = (data.width * data.height * 4) as usize;
        if data.pixels.len() != expected {
            return Err(SurfaceError::Write(format!(
                "pixel payload is {} bytes, expected {expected}",
                data.pixels.len()
            )));
        }
        self.width = data.width;
        self.height = data.height;
        self.pixels = data.pixels.clone();
        Ok(())
    }

    fn decode(&self, encoded: &str) -> Result<RasterData, SurfaceError> {
        let body = encoded
            .strip_prefix(ENCODED_PREFIX)
            .ok_or_else(|| SurfaceError::Decode("missing raster header".to_string()))?;
        let mut parts = body.splitn(3, ':');
        let width = parse_dimension(parts.next())?;
        let height = parse_dimension(parts.next())?;
        let payload = parts
            .next()
            .ok_or_else(|| SurfaceError::Decode("missing pixel payload".to_string()))?;
        let pixels = BASE64
            .decode(payload)
            .map_err(|err| SurfaceError::Decode(err.to_string()))?;
        if pixels.len() != (width * height * 4) as usize {
            return Err(SurfaceError::Decode(format!(
                "pixel payload is {} bytes for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(RasterData {
            width,
            height,
            pixels,
        })
    }
}

fn parse_dimension(part: Option<&str>) -> Result<u32, SurfaceError> {
    part.ok_or_else(|| SurfaceError::Decode("missing dimension".to_string()))?
        .parse()
        .map_err(|_| SurfaceError::Decode("malformed dimension".to_string()))
}
