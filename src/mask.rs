//! Contracts for the two external pixel oracles the codec consults.
//!
//! A pixel reported by either oracle is skipped by the residual coder on
//! both sides. The mask contract requires that every covered pixel of the
//! source image actually equals the mask color, and an LZ-covered pixel is
//! reproduced exactly by the LZ decoder; spatial prediction reads those
//! pixels as neighbors and relies on both sides seeing the same values.

/// Dominant-color background oracle.
pub trait DominantMask {
    fn has_rgb(&self, x: u32, y: u32) -> bool;

    /// The RGBA value the decoder writes at every covered pixel.
    fn color(&self) -> [u8; 4];

    /// Coverage bitmap for row `y`, one entry per column; the decoder's
    /// fast path. An empty slice sends callers back to per-pixel
    /// [`has_rgb`](Self::has_rgb) queries.
    fn next_scanline(&self, _y: u32) -> &[bool] {
        &[]
    }
}

/// 2-D LZ exact-match oracle. Payload writing is external to the core.
pub trait LzOracle {
    fn visited(&self, x: u32, y: u32) -> bool;
}

/// Mask that covers nothing.
pub struct NoMask;

impl DominantMask for NoMask {
    fn has_rgb(&self, _x: u32, _y: u32) -> bool {
        false
    }

    fn color(&self) -> [u8; 4] {
        [0, 0, 0, 0]
    }
}

/// LZ oracle that covers nothing.
pub struct NoLz;

impl LzOracle for NoLz {
    fn visited(&self, _x: u32, _y: u32) -> bool {
        false
    }
}

/// Concrete per-pixel coverage bitmap with a single mask color.
pub struct BitmapMask {
    color: [u8; 4],
    width: u32,
    bits: Vec<bool>,
}

impl BitmapMask {
    pub fn new(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            color,
            width,
            bits: vec![false; (width * height) as usize],
        }
    }

    pub fn cover(&mut self, x: u32, y: u32) {
        self.bits[(x + y * self.width) as usize] = true;
    }

    pub fn cover_all(&mut self) {
        self.bits.fill(true);
    }
}

impl DominantMask for BitmapMask {
    fn has_rgb(&self, x: u32, y: u32) -> bool {
        self.bits[(x + y * self.width) as usize]
    }

    fn color(&self) -> [u8; 4] {
        self.color
    }

    fn next_scanline(&self, y: u32) -> &[bool] {
        let start = (y * self.width) as usize;
        &self.bits[start..start + self.width as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_oracles_cover_nothing() {
        assert!(!NoMask.has_rgb(0, 0));
        assert!(!NoLz.visited(123, 456));
    }

    #[test]
    fn bitmap_mask_tracks_coverage() {
        let mut m = BitmapMask::new(4, 4, [1, 2, 3, 4]);
        assert!(!m.has_rgb(2, 3));
        m.cover(2, 3);
        assert!(m.has_rgb(2, 3));
        assert!(!m.has_rgb(3, 2));
        assert_eq!(m.color(), [1, 2, 3, 4]);
    }

    #[test]
    fn scanline_slices_one_row() {
        let mut m = BitmapMask::new(4, 2, [0; 4]);
        m.cover(1, 0);
        m.cover(3, 1);
        assert_eq!(m.next_scanline(0), &[false, true, false, false][..]);
        assert_eq!(m.next_scanline(1), &[false, false, false, true][..]);
    }

    #[test]
    fn scanline_defaults_to_empty() {
        assert!(NoMask.next_scanline(0).is_empty());
    }
}
