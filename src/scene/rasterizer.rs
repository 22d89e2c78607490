use std::panic;
use std::thread;

use super::buffer::{DepthBuffer, FrameBuffer};
use super::shader::Shader;
use super::transform::{clip_to_ndc, ndc_to_screen};
use super::util::{Mat4, Vec2, Vec3, Vec4};

/// Three clip space vertices. Counterclockwise on screen means front facing.
pub type Triangle = [Vec4; 3];

/// Screen positions are snapped to 1/256 of a pixel. With integer pixel positions this keeps
/// the edge functions exact for buffers up to several thousand pixels across.
const SUBPIXEL: f64 = 256.0;

fn snap(v: f64) -> f64 {
    return (v * SUBPIXEL).round() / SUBPIXEL;
}

/// Twice the signed area of (a, b, p), positive when counterclockwise.
fn edge(a: &Vec2, b: &Vec2, p: &Vec2) -> f64 {
    return (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
}

/// Inclusive pixel bounds, already clamped to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    x0: usize,
    x1: usize,
    y0: usize,
    y1: usize,
}

/// Everything the pixel loop needs about one accepted triangle.
struct TriangleSetup {
    screen: [Vec2; 3],
    area: f64,    // Determinant of the (sx, sy, 1) rows, twice the signed area.
    depths: Vec3, // NDC z of each vertex.
}

impl TriangleSetup {
    /// None when the triangle is behind the camera, back facing or covers less than a pixel.
    fn new(clip: &Triangle, viewport: &Mat4) -> Option<Self> {
        if clip.iter().any(|v| !(v.w > 0.0)) {
            return None;
        }
        let ndc = clip.map(clip_to_ndc);
        let screen = ndc.map(|p| ndc_to_screen(viewport, p).map(snap));
        let area = edge(&screen[0], &screen[1], &screen[2]);
        // Negative is a back face, below one is sub-pixel. NaN and infinity go too.
        if !(area >= 1.0) || !area.is_finite() {
            return None;
        }
        return Some(Self {
            screen,
            area,
            depths: Vec3::new(ndc[0].z, ndc[1].z, ndc[2].z),
        });
    }

    /// Barycentric weights of pixel `p`, None outside. Edges and corners are inside, so
    /// triangles sharing an edge leave no gap between them.
    fn barycentric(&self, p: &Vec2) -> Option<Vec3> {
        let [a, b, c] = &self.screen;
        let weights = Vec3::new(edge(b, c, p), edge(c, a, p), edge(a, b, p));
        if !(weights.x >= 0.0 && weights.y >= 0.0 && weights.z >= 0.0) {
            return None;
        }
        return Some(weights / self.area);
    }

    fn bounding_box(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let xs = self.screen.map(|s| s.x);
        let ys = self.screen.map(|s| s.y);
        let min_x = xs.iter().copied().fold(f64::MAX, f64::min).floor().max(0.0);
        let max_x = xs.iter().copied().fold(f64::MIN, f64::max).floor().min(width as f64 - 1.0);
        let min_y = ys.iter().copied().fold(f64::MAX, f64::min).floor().max(0.0);
        let max_y = ys.iter().copied().fold(f64::MIN, f64::max).floor().min(height as f64 - 1.0);
        if min_x > max_x || min_y > max_y {
            return None;
        }
        return Some(BoundingBox {
            x0: min_x as usize,
            x1: max_x as usize,
            y0: min_y as usize,
            y1: max_y as usize,
        });
    }

    /// Pixel loop over the rows starting at `y_start`, one row of `width` pixels per chunk of
    /// `color` (rgba8) and `depth`. Returns the number of pixels written.
    fn fill<S: Shader>(
        &self,
        shader: &S,
        bbox: &BoundingBox,
        y_start: usize,
        color: &mut [u8],
        depth: &mut [f64],
        width: usize,
    ) -> usize {
        let mut written = 0;
        let rows = color.chunks_mut(4 * width).zip(depth.chunks_mut(width));
        for (dy, (color_row, depth_row)) in rows.enumerate() {
            let y = (y_start + dy) as f64;
            for x in bbox.x0..=bbox.x1 {
                let Some(bar) = self.barycentric(&Vec2::new(x as f64, y)) else {
                    continue;
                };
                let z = bar.dot(&self.depths);
                if z <= depth_row[x] {
                    continue;
                }
                let Some(fragment_color) = shader.fragment(bar) else {
                    continue;
                };
                depth_row[x] = z;
                color_row[4 * x..4 * x + 4].copy_from_slice(&fragment_color.0);
                written += 1;
            }
        }
        return written;
    }
}

/// Triangle rasterizer with depth test. With more than one thread the bounding box is cut into
/// horizontal bands of whole rows, each band owned by one scoped worker.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    threads: usize,
}

impl Rasterizer {
    /// Triangles shorter than two bands are filled on the calling thread.
    const MIN_BAND_ROWS: usize = 8;

    pub fn new(threads: usize) -> Self {
        return Self { threads: threads.max(1) };
    }

    /// Draws one triangle. Every covered pixel passing the depth test gets the fragment stage's
    /// color and the interpolated depth, both or neither. Returns the number of pixels written.
    pub fn rasterize<S: Shader>(
        &self,
        clip: &Triangle,
        shader: &S,
        viewport: &Mat4,
        framebuffer: &mut FrameBuffer,
        zbuffer: &mut DepthBuffer,
    ) -> usize {
        debug_assert!(
            framebuffer.width() == zbuffer.width() && framebuffer.height() == zbuffer.height(),
            "frame and depth buffers differ in size"
        );
        let setup = match TriangleSetup::new(clip, viewport) {
            Some(setup) => setup,
            None => return 0,
        };
        let bbox = match setup.bounding_box(framebuffer.width(), framebuffer.height()) {
            Some(bbox) => bbox,
            None => return 0,
        };

        let width = framebuffer.width() as usize;
        let color = &mut framebuffer.as_raw_mut()[4 * width * bbox.y0..4 * width * (bbox.y1 + 1)];
        let depth = &mut zbuffer.as_mut_slice()[width * bbox.y0..width * (bbox.y1 + 1)];
        let rows = bbox.y1 - bbox.y0 + 1;
        if self.threads == 1 || rows < 2 * Self::MIN_BAND_ROWS {
            return setup.fill(shader, &bbox, bbox.y0, color, depth, width);
        }

        // Bands never share a row, so workers never touch the same cell.
        let band = rows.div_ceil(self.threads).max(Self::MIN_BAND_ROWS);
        return thread::scope(|scope| {
            let setup = &setup;
            let bbox = &bbox;
            let workers: Vec<_> = color
                .chunks_mut(4 * width * band)
                .zip(depth.chunks_mut(width * band))
                .enumerate()
                .map(|(i, (color_band, depth_band))| {
                    let y_start = bbox.y0 + i * band;
                    scope.spawn(move || setup.fill(shader, bbox, y_start, color_band, depth_band, width))
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .sum()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::transform::build_viewport;
    use crate::scene::util::Color;
    use image::Rgba;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const SIZE: u32 = 20;
    const RED: Color = Rgba([255, 0, 0, 255]);
    const GREEN: Color = Rgba([0, 255, 0, 255]);

    struct ConstantShader(Color);

    impl Shader for ConstantShader {
        fn vertex(&mut self, _face: usize, _corner: usize) -> Vec4 {
            return Vec4::zeros();
        }
        fn fragment(&self, _bar: Vec3) -> Option<Color> {
            return Some(self.0);
        }
    }

    struct DiscardShader;

    impl Shader for DiscardShader {
        fn vertex(&mut self, _face: usize, _corner: usize) -> Vec4 {
            return Vec4::zeros();
        }
        fn fragment(&self, _bar: Vec3) -> Option<Color> {
            return None;
        }
    }

    #[derive(Default)]
    struct RecordingShader {
        seen: Mutex<Vec<Vec3>>,
    }

    impl Shader for RecordingShader {
        fn vertex(&mut self, _face: usize, _corner: usize) -> Vec4 {
            return Vec4::zeros();
        }
        fn fragment(&self, bar: Vec3) -> Option<Color> {
            self.seen.lock().unwrap().push(bar);
            return Some(RED);
        }
    }

    /// Viewport mapping NDC [-1, 1] onto the whole 20x20 buffer.
    fn viewport() -> Mat4 {
        return build_viewport(0.0, 0.0, SIZE as f64, SIZE as f64);
    }

    /// Clip space vertex landing on screen point (sx, sy) under `viewport()`.
    fn at(sx: f64, sy: f64, z: f64) -> Vec4 {
        return Vec4::new(sx / 10.0 - 1.0, sy / 10.0 - 1.0, z, 1.0);
    }

    fn buffers() -> (FrameBuffer, DepthBuffer) {
        return (FrameBuffer::new(SIZE, SIZE), DepthBuffer::new(SIZE, SIZE));
    }

    fn covered(framebuffer: &FrameBuffer) -> HashSet<(u32, u32)> {
        let mut pixels = HashSet::new();
        for y in 0..framebuffer.height() {
            for x in 0..framebuffer.width() {
                if framebuffer.get(x, y)[3] != 0 {
                    pixels.insert((x, y));
                }
            }
        }
        return pixels;
    }

    #[test]
    fn right_triangle_covers_exactly_the_inside_pixels() {
        let (mut frame, mut depth) = buffers();
        // Legs of 10 pixels, corners a quarter pixel off the grid so no pixel center is on an edge.
        let triangle = [at(0.25, 0.25, 0.0), at(10.25, 0.25, 0.0), at(0.25, 10.25, 0.0)];
        let written = Rasterizer::new(1).rasterize(&triangle, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);

        let mut expected = HashSet::new();
        for x in 1..SIZE {
            for y in 1..SIZE {
                if x + y <= 10 {
                    expected.insert((x, y));
                }
            }
        }
        assert_eq!(expected.len(), 45);
        assert_eq!(written, 45);
        assert_eq!(covered(&frame), expected);
    }

    #[test]
    fn pixels_on_edges_and_corners_are_inside() {
        let (mut frame, mut depth) = buffers();
        // Every corner sits on a pixel, the hypotenuse runs through 11 pixels.
        let triangle = [at(3.0, 4.0, 0.0), at(13.0, 4.0, 0.0), at(3.0, 14.0, 0.0)];
        let written = Rasterizer::new(1).rasterize(&triangle, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);

        let mut expected = HashSet::new();
        for x in 3..=13 {
            for y in 4..=14 {
                if (x - 3) + (y - 4) <= 10 {
                    expected.insert((x, y));
                }
            }
        }
        assert_eq!(expected.len(), 66);
        assert_eq!(written, 66);
        assert_eq!(covered(&frame), expected);
    }

    #[test]
    fn triangles_sharing_an_edge_leave_no_holes() {
        for ox in 0..8 {
            for oy in 0..8 {
                let (x, y) = (ox as f64, oy as f64);
                let lower = [at(x, y, 0.0), at(x + 10.0, y, 0.0), at(x, y + 10.0, 0.0)];
                let upper = [at(x + 10.0, y, 0.0), at(x + 10.0, y + 10.0, 0.0), at(x, y + 10.0, 0.0)];
                let (mut frame, mut depth) = buffers();
                let rasterizer = Rasterizer::new(1);
                rasterizer.rasterize(&lower, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
                rasterizer.rasterize(&upper, &ConstantShader(GREEN), &viewport(), &mut frame, &mut depth);

                let mut square = HashSet::new();
                for px in ox..=ox + 10 {
                    for py in oy..=oy + 10 {
                        square.insert((px, py));
                    }
                }
                assert_eq!(covered(&frame), square, "offset ({}, {})", ox, oy);
            }
        }
    }

    #[test]
    fn barycentric_weights_are_non_negative_and_sum_to_one() {
        let (mut frame, mut depth) = buffers();
        let shader = RecordingShader::default();
        let triangle = [at(1.3, 2.1, 0.1), at(17.9, 4.4, -0.3), at(6.2, 18.7, 0.5)];
        let written = Rasterizer::new(1).rasterize(&triangle, &shader, &viewport(), &mut frame, &mut depth);

        let seen = shader.seen.into_inner().unwrap();
        assert!(written > 0);
        assert_eq!(seen.len(), written);
        for bar in seen {
            assert!(bar.x >= 0.0 && bar.y >= 0.0 && bar.z >= 0.0);
            assert!((bar.x + bar.y + bar.z - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn sub_pixel_and_back_facing_triangles_write_nothing() {
        let (mut frame, mut depth) = buffers();
        let rasterizer = Rasterizer::new(1);
        let shader = ConstantShader(RED);

        let tiny = [at(5.0, 5.0, 0.0), at(5.5, 5.0, 0.0), at(5.0, 5.5, 0.0)];
        assert_eq!(rasterizer.rasterize(&tiny, &shader, &viewport(), &mut frame, &mut depth), 0);

        let back = [at(0.25, 0.25, 0.0), at(0.25, 10.25, 0.0), at(10.25, 0.25, 0.0)];
        assert_eq!(rasterizer.rasterize(&back, &shader, &viewport(), &mut frame, &mut depth), 0);

        let degenerate = [at(1.0, 1.0, 0.0), at(5.0, 5.0, 0.0), at(9.0, 9.0, 0.0)];
        assert_eq!(rasterizer.rasterize(&degenerate, &shader, &viewport(), &mut frame, &mut depth), 0);

        assert!(covered(&frame).is_empty());
        assert!(depth.as_slice().iter().all(|z| *z == DepthBuffer::CLEAR));
    }

    #[test]
    fn triangles_behind_the_camera_are_rejected() {
        let (mut frame, mut depth) = buffers();
        let mut triangle = [at(0.25, 0.25, 0.0), at(10.25, 0.25, 0.0), at(0.25, 10.25, 0.0)];
        triangle[1] *= -1.0;
        let written = Rasterizer::new(1).rasterize(&triangle, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
        assert_eq!(written, 0);
        assert!(covered(&frame).is_empty());
    }

    #[test]
    fn nearer_triangle_wins_in_either_order() {
        let rasterizer = Rasterizer::new(1);
        let near = [at(0.0, 0.0, 0.5), at(12.0, 0.0, 0.5), at(0.0, 12.0, 0.5)];
        let far = [at(2.0, 2.0, -0.5), at(15.0, 2.0, -0.5), at(2.0, 15.0, -0.5)];

        let (mut frame, mut depth) = buffers();
        rasterizer.rasterize(&near, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
        rasterizer.rasterize(&far, &ConstantShader(GREEN), &viewport(), &mut frame, &mut depth);
        assert_eq!(frame.get(3, 3), RED);
        assert!((depth.get(3, 3) - 0.5).abs() < 1e-9);
        // Only the far triangle covers this one.
        assert_eq!(frame.get(10, 4), GREEN);

        let (mut frame, mut depth) = buffers();
        rasterizer.rasterize(&far, &ConstantShader(GREEN), &viewport(), &mut frame, &mut depth);
        assert_eq!(frame.get(3, 3), GREEN);
        rasterizer.rasterize(&near, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
        assert_eq!(frame.get(3, 3), RED);
        assert!((depth.get(3, 3) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn discarding_fragments_leaves_buffers_untouched() {
        let (mut frame, mut depth) = buffers();
        let rasterizer = Rasterizer::new(1);
        let background = [at(0.0, 0.0, -0.9), at(40.0, 0.0, -0.9), at(0.0, 40.0, -0.9)];
        rasterizer.rasterize(&background, &ConstantShader(GREEN), &viewport(), &mut frame, &mut depth);
        let colors = frame.as_image().as_raw().clone();
        let depths = depth.as_slice().to_vec();

        let triangle = [at(1.0, 1.0, 0.2), at(18.0, 3.0, 0.4), at(4.0, 17.0, 0.9)];
        let written = rasterizer.rasterize(&triangle, &DiscardShader, &viewport(), &mut frame, &mut depth);
        assert_eq!(written, 0);
        assert_eq!(frame.as_image().as_raw(), &colors);
        assert_eq!(depth.as_slice(), &depths[..]);
    }

    #[test]
    fn drawing_the_same_triangle_twice_changes_nothing() {
        let (mut frame, mut depth) = buffers();
        let rasterizer = Rasterizer::new(1);
        let triangle = [at(1.0, 1.0, 0.2), at(18.0, 3.0, 0.4), at(4.0, 17.0, 0.9)];
        let first = rasterizer.rasterize(&triangle, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
        let colors = frame.as_image().as_raw().clone();
        let depths = depth.as_slice().to_vec();

        let second = rasterizer.rasterize(&triangle, &ConstantShader(GREEN), &viewport(), &mut frame, &mut depth);
        assert!(first > 0);
        assert_eq!(second, 0);
        assert_eq!(frame.as_image().as_raw(), &colors);
        assert_eq!(depth.as_slice(), &depths[..]);
    }

    #[test]
    fn bounding_box_is_clamped_to_the_buffer() {
        let (mut frame, mut depth) = buffers();
        let triangle = [at(-30.0, -30.0, 0.0), at(100.0, -30.0, 0.0), at(-30.0, 100.0, 0.0)];
        let written = Rasterizer::new(1).rasterize(&triangle, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
        assert_eq!(written, (SIZE * SIZE) as usize);

        let (mut frame, mut depth) = buffers();
        let offscreen = [at(30.0, 30.0, 0.0), at(40.0, 30.0, 0.0), at(30.0, 40.0, 0.0)];
        let written = Rasterizer::new(1).rasterize(&offscreen, &ConstantShader(RED), &viewport(), &mut frame, &mut depth);
        assert_eq!(written, 0);
    }

    #[test]
    fn banded_workers_match_the_sequential_loop() {
        let triangles = [
            [at(1.0, 1.0, 0.2), at(18.0, 3.0, 0.4), at(4.0, 17.0, 0.9)],
            [at(0.0, 8.0, 0.6), at(19.0, 9.0, -0.2), at(10.0, 19.5, 0.1)],
        ];
        let render = |threads: usize| {
            let (mut frame, mut depth) = buffers();
            let rasterizer = Rasterizer::new(threads);
            let mut written = 0;
            for (i, triangle) in triangles.iter().enumerate() {
                let shader = ConstantShader(if i == 0 { RED } else { GREEN });
                written += rasterizer.rasterize(triangle, &shader, &viewport(), &mut frame, &mut depth);
            }
            (written, frame.as_image().as_raw().clone(), depth.as_slice().to_vec())
        };

        let sequential = render(1);
        for threads in [2, 3, 7, 64] {
            assert_eq!(render(threads), sequential);
        }
    }
}
