use na::matrix;
use nalgebra as na;

use super::util::{
    from_hom_point, from_hom_vector, normalized, to_hom_point, to_hom_vector, MatrixExt, Mat4, Vec2, Vec3, Vec4,
};

/// View matrix: rotates world axes into the camera basis {l, m, n} and moves the eye to the origin.
/// The camera looks down -z of the new basis. `up` must not be parallel to `eye - center`.
pub fn build_view(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    let n = normalized(eye - center);
    let l = normalized(up.cross(&n));
    let m = normalized(n.cross(&l));
    let rotation = matrix![l.x, l.y, l.z, 0.0;
                           m.x, m.y, m.z, 0.0;
                           n.x, n.y, n.z, 0.0;
                           0.0, 0.0, 0.0, 1.0];
    let translation = matrix![1.0, 0.0, 0.0, -eye.x;
                              0.0, 1.0, 0.0, -eye.y;
                              0.0, 0.0, 1.0, -eye.z;
                              0.0, 0.0, 0.0, 1.0];
    return rotation * translation;
}

/// Perspective matrix, giving w = 1 - z / f after application. `f` must be nonzero.
pub fn build_projection(focal_distance: f64) -> Mat4 {
    debug_assert!(focal_distance != 0.0, "focal distance must be nonzero");
    return matrix![1.0, 0.0, 0.0,                   0.0;
                   0.0, 1.0, 0.0,                   0.0;
                   0.0, 0.0, 1.0,                   0.0;
                   0.0, 0.0, -1.0 / focal_distance, 1.0];
}

/// Viewport matrix, mapping [-1, 1] x/y onto the [x, x + w] x [y, y + h] screen rectangle.
/// z passes through untouched.
pub fn build_viewport(x: f64, y: f64, w: f64, h: f64) -> Mat4 {
    debug_assert!(w > 0.0 && h > 0.0, "viewport must have positive extent");
    return matrix![w / 2.0, 0.0,     0.0, x + w / 2.0;
                   0.0,     h / 2.0, 0.0, y + h / 2.0;
                   0.0,     0.0,     1.0, 0.0;
                   0.0,     0.0,     0.0, 1.0];
}

/// Screen rectangle the normalized device coordinates are mapped to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl ViewportRect {
    /// Rectangle inset by 1/16 of the image on every side.
    pub fn inset(width: u32, height: u32) -> Self {
        let (width, height) = (width as f64, height as f64);
        return Self {
            x: width / 16.0,
            y: height / 16.0,
            w: width * 7.0 / 8.0,
            h: height * 7.0 / 8.0,
        };
    }
}

/// Mutable description of a frame's camera, set up before any triangle is drawn.
/// `build` freezes it into a `Transform`, which is all the pipeline ever sees.
#[derive(Debug, Clone)]
pub struct FrameSetup {
    eye: Vec3,
    center: Vec3,
    up: Vec3,
    focal_distance: Option<f64>, // None means distance from eye to center.
    viewport: ViewportRect,
}

impl FrameSetup {
    pub fn new(width: u32, height: u32) -> Self {
        return Self {
            eye: Vec3::new(-1.0, 0.0, 2.0),
            center: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            focal_distance: None,
            viewport: ViewportRect::inset(width, height),
        };
    }

    pub fn set_view(&mut self, eye: Vec3, center: Vec3, up: Vec3) -> &mut Self {
        self.eye = eye;
        self.center = center;
        self.up = up;
        return self;
    }

    pub fn set_projection(&mut self, focal_distance: f64) -> &mut Self {
        self.focal_distance = Some(focal_distance);
        return self;
    }

    pub fn set_viewport(&mut self, x: f64, y: f64, w: f64, h: f64) -> &mut Self {
        self.viewport = ViewportRect { x, y, w, h };
        return self;
    }

    pub fn build(&self) -> Transform {
        let focal_distance = self
            .focal_distance
            .unwrap_or_else(|| (self.eye - self.center).norm());
        let ViewportRect { x, y, w, h } = self.viewport;
        return Transform::new(
            build_view(self.eye, self.center, self.up),
            build_projection(focal_distance),
            build_viewport(x, y, w, h),
        );
    }
}

/// Frame constant transforms. Immutable once built, shared by the vertex stage and the rasterizer.
#[derive(Debug, Clone)]
pub struct Transform {
    model_view: Mat4,
    projection: Mat4,
    viewport: Mat4,
    normal_matrix: Mat4, // Inverse transpose of model_view, applied to normals.
}

impl Transform {
    pub fn new(model_view: Mat4, projection: Mat4, viewport: Mat4) -> Self {
        return Self {
            model_view,
            projection,
            viewport,
            normal_matrix: model_view.invert_transpose(),
        };
    }

    pub fn projection(&self) -> &Mat4 {
        return &self.projection;
    }

    pub fn viewport(&self) -> &Mat4 {
        return &self.viewport;
    }

    /// Object space point to eye space, homogenous.
    pub fn object_to_eye(&self, v: Vec3) -> Vec4 {
        return self.model_view * to_hom_point(v);
    }

    /// Object space point to clip space. Projection always goes after model-view.
    pub fn object_to_clip(&self, v: Vec3) -> Vec4 {
        return self.projection * self.object_to_eye(v);
    }

    /// Object space normal to a unit eye space normal.
    pub fn normal_to_eye(&self, n: Vec3) -> Vec3 {
        return normalized(from_hom_vector(self.normal_matrix * to_hom_vector(n)));
    }

    /// World space direction (light, for instance) to a unit eye space direction.
    pub fn direction_to_eye(&self, d: Vec3) -> Vec3 {
        return normalized(from_hom_vector(self.model_view * to_hom_vector(d)));
    }
}

/// Perspective divide. w must be nonzero.
pub fn clip_to_ndc(clip: Vec4) -> Vec3 {
    return from_hom_point(clip);
}

/// NDC point to screen pixel coordinates, dropping depth.
pub fn ndc_to_screen(viewport: &Mat4, ndc: Vec3) -> Vec2 {
    return (viewport * to_hom_point(ndc)).xy();
}
