//! Pixel-buffer transcoding between row-major RGB and the printer's
//! planar-by-column wire layout.
//!
//! The wire format walks the canvas column by column, writing all red bytes
//! of a column, then all green, then all blue. The transform is bit-exact
//! and invertible; the printer rejects anything else.

use crate::error::{Error, Result};

/// Fixed print dimensions in wire orientation (width is the long edge for
/// rectangular models).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// SP-2 canvas: 800x600 in wire orientation.
    pub const SP2: Canvas = Canvas { width: 800, height: 600 };
    /// Square canvas used by the SQ-format models.
    pub const SQUARE: Canvas = Canvas { width: 800, height: 800 };

    /// Total wire-image length in bytes.
    pub fn wire_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn dimensions_match(&self, width: u32, height: u32) -> bool {
        (width == self.width && height == self.height) || (width == self.height && height == self.width)
    }

    /// Transcode a row-major RGB buffer into the wire layout.
    ///
    /// The buffer may arrive in either orientation; a buffer whose width is
    /// not the canvas width is rotated 90° first. Square canvases get one
    /// extra rotation, the convention the device expects for an aspect
    /// ratio that cannot disambiguate itself.
    pub fn encode_image(&self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        if !self.dimensions_match(width, height) || rgb.len() != width as usize * height as usize * 3 {
            return Err(Error::InvalidImageDimensions {
                width,
                height,
                canvas_width: self.width,
                canvas_height: self.height,
            });
        }

        let mut oriented;
        if width != self.width {
            oriented = rotate_cw(rgb, width as usize, height as usize);
        } else {
            oriented = rgb.to_vec();
        }
        if self.width == self.height {
            oriented = rotate_cw(&oriented, self.width as usize, self.height as usize);
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let mut wire = vec![0u8; self.wire_len()];
        for h in 0..height {
            for w in 0..width {
                let src = (h * width + w) * 3;
                let base = w * height * 3;
                wire[base + h] = oriented[src];
                wire[base + height + h] = oriented[src + 1];
                wire[base + 2 * height + h] = oriented[src + 2];
            }
        }
        Ok(wire)
    }

    /// Reverse the wire layout back into a display-oriented row-major RGB
    /// buffer (the inverse of [`Canvas::encode_image`]).
    pub fn decode_image(&self, wire: &[u8]) -> Result<Vec<u8>> {
        if wire.len() != self.wire_len() {
            return Err(Error::InvalidImageDimensions {
                width: 0,
                height: 0,
                canvas_width: self.width,
                canvas_height: self.height,
            });
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let mut rgb = vec![0u8; self.wire_len()];
        for h in 0..height {
            for w in 0..width {
                let dst = (h * width + w) * 3;
                let base = w * height * 3;
                rgb[dst] = wire[base + h];
                rgb[dst + 1] = wire[base + height + h];
                rgb[dst + 2] = wire[base + 2 * height + h];
            }
        }
        Ok(rotate_ccw(&rgb, width, height))
    }
}

/// Rotate a row-major RGB buffer 90° clockwise.
fn rotate_cw(src: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    let out_width = height;
    for y in 0..height {
        for x in 0..width {
            let s = (y * width + x) * 3;
            let d = (x * out_width + (height - 1 - y)) * 3;
            out[d..d + 3].copy_from_slice(&src[s..s + 3]);
        }
    }
    out
}

/// Rotate a row-major RGB buffer 90° counter-clockwise.
fn rotate_ccw(src: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    let out_width = height;
    for y in 0..height {
        for x in 0..width {
            let s = (y * width + x) * 3;
            let d = ((width - 1 - x) * out_width + y) * 3;
            out[d..d + 3].copy_from_slice(&src[s..s + 3]);
        }
    }
    out
}
