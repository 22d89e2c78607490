use std::path::Path;

use image::{imageops, GrayImage, Luma, Rgba, RgbaImage};

use super::util::Color;
use crate::error::RenderError;

/// Color grid the rasterizer writes into. Rgba8 pixels, (0, 0) is the bottom left pixel.
pub struct FrameBuffer {
    image: RgbaImage,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        return Self {
            image: RgbaImage::new(width, height),
        };
    }

    pub fn width(&self) -> u32 {
        return self.image.width();
    }

    pub fn height(&self) -> u32 {
        return self.image.height();
    }

    /// Out of range coordinates panic.
    pub fn get(&self, x: u32, y: u32) -> Color {
        return *self.image.get_pixel(x, y);
    }

    /// Out of range coordinates panic.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.image.put_pixel(x, y, color);
    }

    pub fn clear(&mut self, color: Color) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    pub fn as_image(&self) -> &RgbaImage {
        return &self.image;
    }

    /// Row major rgba8 bytes, row 0 first.
    pub(super) fn as_raw_mut(&mut self) -> &mut [u8] {
        return &mut self.image;
    }

    /// Writes the image with row 0 at the bottom. Encoding is picked by the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        imageops::flip_vertical(&self.image).save(path)?;
        return Ok(());
    }
}

/// Per pixel depth, larger value wins.
pub struct DepthBuffer {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl DepthBuffer {
    /// Value of a cell nothing was drawn to.
    pub const CLEAR: f64 = f64::MIN;

    pub fn new(width: u32, height: u32) -> Self {
        let n_pixels = (width * height) as usize;
        return Self {
            width,
            height,
            data: vec![Self::CLEAR; n_pixels],
        };
    }

    pub fn width(&self) -> u32 {
        return self.width;
    }

    pub fn height(&self) -> u32 {
        return self.height;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "depth buffer access out of range");
        return (x + y * self.width) as usize;
    }

    pub fn get(&self, x: u32, y: u32) -> f64 {
        return self.data[self.index(x, y)];
    }

    pub fn set(&mut self, x: u32, y: u32, z: f64) {
        let index = self.index(x, y);
        self.data[index] = z;
    }

    pub fn clear(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[f64] {
        return &self.data[..];
    }

    pub(super) fn as_mut_slice(&mut self) -> &mut [f64] {
        return &mut self.data[..];
    }

    /// Grayscale picture of the buffer, normalized over the cells that were drawn to.
    /// Untouched cells are black, row 0 is the bottom row.
    pub fn to_image(&self) -> GrayImage {
        let written = || self.as_slice().iter().copied().filter(|z| *z != Self::CLEAR);
        let z_max = written().fold(f64::MIN, f64::max);
        let z_min = written().fold(f64::MAX, f64::min);
        let scale = if z_max > z_min { z_max - z_min } else { 1.0 };

        let mut image = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let z = self.get(x, y);
                let value = if z == Self::CLEAR {
                    0
                } else {
                    // Keeping 1..=255 for drawn cells, so they differ from the background.
                    (1.0 + (z - z_min) / scale * 254.0) as u8
                };
                image.put_pixel(x, self.height - 1 - y, Luma([value]));
            }
        }
        return image;
    }
}

/// Opaque black, the default background.
pub const BLACK: Color = Rgba([0, 0, 0, 255]);
