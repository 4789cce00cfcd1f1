use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;

/// A decoded image in the representation model services consume.
///
/// Pixels are tightly packed 8-bit RGB triples in row-major order. The
/// buffer is reference-counted, so cloning a handle never copies pixels.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl ImageHandle {
    /// Creates a handle from raw RGB8 pixels.
    ///
    /// Returns `None` if the buffer length doesn't match the dimensions,
    /// or if either dimension is zero.
    pub fn from_rgb8<B: Into<Bytes>>(
        width: u32,
        height: u32,
        pixels: B,
    ) -> Option<Self> {
        let pixels = pixels.into();
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(3)?;
        if expected == 0 || pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Returns the width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the packed RGB8 pixels.
    #[inline]
    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }
}

impl Debug for ImageHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
