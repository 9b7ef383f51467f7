//! In-memory ink plane for the GDEY0154Z90.

use crate::protocol::{BUFFER_SIZE, HEIGHT, LINE_BYTES, WIDTH};

/// Logical orientation applied by [`FrameBuffer::set_pixel`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Maps logical coordinates onto controller RAM coordinates.
    #[inline]
    pub const fn to_physical(self, x: usize, y: usize) -> (usize, usize) {
        match self {
            Self::Deg0 => (x, y),
            Self::Deg90 => (WIDTH - 1 - y, x),
            Self::Deg180 => (WIDTH - 1 - x, HEIGHT - 1 - y),
            Self::Deg270 => (y, HEIGHT - 1 - x),
        }
    }
}

/// 1bpp plane where a set bit means "ink" (black or red depending on the
/// plane it is written to).
///
/// Bit mapping within one row byte: bit 7 is the first pixel in that byte.
#[derive(Clone)]
pub struct FrameBuffer {
    bytes: [u8; BUFFER_SIZE],
    rotation: Rotation,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Creates an empty plane.
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; BUFFER_SIZE],
            rotation: Rotation::Deg0,
        }
    }

    pub fn bytes(&self) -> &[u8; BUFFER_SIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; BUFFER_SIZE] {
        &mut self.bytes
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Clears the plane to no ink (`ink = false`) or full ink.
    pub fn clear(&mut self, ink: bool) {
        self.bytes.fill(if ink { 0xFF } else { 0x00 });
    }

    /// Sets a pixel in logical (rotated) coordinates.
    ///
    /// Returns `true` when pixel is in bounds, `false` otherwise.
    pub fn set_pixel(&mut self, x: usize, y: usize, ink: bool) -> bool {
        let Some((index, mask)) = self.locate(x, y) else {
            return false;
        };

        if ink {
            self.bytes[index] |= mask;
        } else {
            self.bytes[index] &= !mask;
        }
        true
    }

    /// Reads a pixel in logical (rotated) coordinates.
    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        self.locate(x, y)
            .map(|(index, mask)| self.bytes[index] & mask != 0)
    }

    /// Byte index and bit mask (MSB = leftmost pixel) of a logical pixel.
    fn locate(&self, x: usize, y: usize) -> Option<(usize, u8)> {
        if x >= WIDTH || y >= HEIGHT {
            return None;
        }
        let (px, py) = self.rotation.to_physical(x, y);
        Some((py * LINE_BYTES + px / 8, 0x80 >> (px % 8)))
    }

    /// Returns controller row 0..HEIGHT.
    pub fn row(&self, row: usize) -> Option<&[u8]> {
        if row >= HEIGHT {
            return None;
        }

        let start = row * LINE_BYTES;
        Some(&self.bytes[start..start + LINE_BYTES])
    }

    /// Returns `true` when no pixel carries ink.
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|byte| *byte == 0)
    }
}
