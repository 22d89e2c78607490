pub mod buffer;
pub mod model;
pub mod rasterizer;
pub mod shader;
pub mod transform;
pub mod util;

use std::path::Path;

use buffer::{DepthBuffer, FrameBuffer};
use rasterizer::Rasterizer;
use shader::Shader;
use transform::Transform;
use util::Color;

use crate::error::RenderError;

/// Counters for one `Scene::draw` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub triangles: usize, // Submitted to the rasterizer.
    pub rejected: usize,  // Culled, degenerate or fully hidden.
    pub pixels: usize,    // Written to the frame buffer.
}

/// Scene, holding the frame buffer, the z-buffer and the rasterizer filling them.
/// (0, 0) is the bottom left coordinate.
pub struct Scene {
    framebuffer: FrameBuffer,
    z_buffer: DepthBuffer,
    rasterizer: Rasterizer,
}

impl Scene {
    pub fn new(width: u32, height: u32, threads: usize) -> Scene {
        return Scene {
            framebuffer: FrameBuffer::new(width, height),
            z_buffer: DepthBuffer::new(width, height),
            rasterizer: Rasterizer::new(threads),
        };
    }

    /// Resets every pixel to `background` and the z-buffer to "nothing drawn".
    pub fn clear(&mut self, background: Color) {
        self.framebuffer.clear(background);
        self.z_buffer.clear(DepthBuffer::CLEAR);
    }

    /// Draws `triangles` faces through `shader`: three vertex stage calls assemble a triangle,
    /// which is rasterized before the next one is assembled.
    pub fn draw<S: Shader>(&mut self, shader: &mut S, triangles: usize, transform: &Transform) -> FrameStats {
        let mut stats = FrameStats::default();
        for face in 0..triangles {
            let clip = [shader.vertex(face, 0), shader.vertex(face, 1), shader.vertex(face, 2)];
            let written = self.rasterizer.rasterize(
                &clip,
                &*shader,
                transform.viewport(),
                &mut self.framebuffer,
                &mut self.z_buffer,
            );
            stats.triangles += 1;
            stats.pixels += written;
            if written == 0 {
                stats.rejected += 1;
            }
        }
        log::debug!(
            "drew {} triangles ({} without pixels), {} pixels",
            stats.triangles,
            stats.rejected,
            stats.pixels
        );
        return stats;
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        return &self.framebuffer;
    }

    pub fn z_buffer(&self) -> &DepthBuffer {
        return &self.z_buffer;
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        self.framebuffer.save(path)?;
        log::info!("frame written to {}", path.display());
        return Ok(());
    }

    /// Writes the z-buffer as a grayscale picture.
    pub fn save_depth(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        self.z_buffer.to_image().save(path)?;
        log::info!("depth written to {}", path.display());
        return Ok(());
    }
}
