use crate::foundation::error::{AnimFrameError, AnimFrameResult};

/// Integer pixel rectangle `[x, x + width) x [y, y + height)` in image space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Create a rectangle from its origin and size.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Return `true` when the rectangle covers no pixels.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Number of pixels covered.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Return `true` when `other` lies entirely inside `self`.
    ///
    /// An empty rectangle is contained by anything.
    pub fn contains_rect(self, other: Self) -> bool {
        if other.is_empty() {
            return true;
        }
        i64::from(self.x) <= i64::from(other.x)
            && i64::from(self.y) <= i64::from(other.y)
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlapping part of two rectangles; empty when they are disjoint.
    pub fn intersect(self, other: Self) -> Self {
        let x0 = i64::from(self.x).max(i64::from(other.x));
        let y0 = i64::from(self.y).max(i64::from(other.y));
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Self::default();
        }
        // Both origins come from i32 inputs, and the extents from u32 widths.
        Self::new(x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

/// RGBA8 pixels (straight alpha) covering `bounds`, row-major, tightly packed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FramePixels {
    /// Image-space area the pixels cover.
    pub bounds: PixelRect,
    /// `bounds.width * bounds.height * 4` bytes.
    pub data: Vec<u8>,
}

impl FramePixels {
    /// Wrap an existing RGBA8 buffer, checking its size against `bounds`.
    pub fn new(bounds: PixelRect, data: Vec<u8>) -> AnimFrameResult<Self> {
        let expected = bounds.area().saturating_mul(4);
        if data.len() as u64 != expected {
            return Err(AnimFrameError::validation(format!(
                "FramePixels buffer must hold {expected} bytes for {}x{}, got {}",
                bounds.width,
                bounds.height,
                data.len()
            )));
        }
        Ok(Self { bounds, data })
    }

    /// Transparent pixels covering `bounds`.
    pub fn transparent(bounds: PixelRect) -> Self {
        Self {
            bounds,
            data: vec![0; (bounds.area() as usize).saturating_mul(4)],
        }
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Copy out the part of these pixels that lies inside `region`.
    pub fn crop(&self, region: PixelRect) -> Self {
        let area = self.bounds.intersect(region);
        if area.is_empty() {
            return Self::transparent(area);
        }
        let src_stride = self.bounds.width as usize * 4;
        let row_bytes = area.width as usize * 4;
        let dx = (area.x - self.bounds.x) as usize * 4;
        let dy = (area.y - self.bounds.y) as usize;

        let mut data = Vec::with_capacity(row_bytes * area.height as usize);
        for row in 0..area.height as usize {
            let start = (dy + row) * src_stride + dx;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Self { bounds: area, data }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
