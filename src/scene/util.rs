use image::Rgba;
use na::{Matrix2, Matrix3, Matrix4, SMatrix, SVector, Vector2, Vector3, Vector4};
use nalgebra as na;

pub type Vec2 = Vector2<f64>;
pub type Vec3 = Vector3<f64>;
pub type Vec4 = Vector4<f64>;
pub type Mat<const R: usize, const C: usize> = SMatrix<f64, R, C>;
pub type Mat2 = Matrix2<f64>;
pub type Mat3 = Matrix3<f64>;
pub type Mat4 = Matrix4<f64>;

/// Raw rgba8 pixel value.
pub type Color = Rgba<u8>;

/// Transformation of a point to homogenous coordinates.
pub fn to_hom_point(v: Vec3) -> Vec4 {
    return Vec4::new(v.x, v.y, v.z, 1.0);
}

/// Transformation of a vector to homogenous coordinates.
pub fn to_hom_vector(v: Vec3) -> Vec4 {
    return Vec4::new(v.x, v.y, v.z, 0.0);
}

/// Transformation of a point from homogenous coordinates.
/// Points at infinity (w == 0) are not allowed here.
pub fn from_hom_point(v: Vec4) -> Vec3 {
    debug_assert!(v.w != 0.0, "point at infinity has no cartesian form");
    return Vec3::new(v.x / v.w, v.y / v.w, v.z / v.w);
}

/// Transformation of a vector from homogenous coordinates.
pub fn from_hom_vector(v: Vec4) -> Vec3 {
    return v.xyz();
}

/// Divides a vector by its euclidean norm. Zero vectors are the caller's problem.
pub fn normalized<const D: usize>(v: SVector<f64, D>) -> SVector<f64, D> {
    let norm = v.norm();
    debug_assert!(norm > 0.0, "normalizing a zero-length vector");
    return v / norm;
}

/// Inversion helpers for the square matrices used by the pipeline.
pub trait MatrixExt: Sized {
    /// Inverse of the matrix. Singular input is a precondition violation: debug builds
    /// panic, release builds get a matrix full of NaN.
    fn invert(&self) -> Self;

    /// Inverse of the transposed matrix, the usual normal and barycentric transform.
    fn invert_transpose(&self) -> Self;
}

macro_rules! impl_matrix_ext {
    ($($mat:ty),*) => {
        $(
            impl MatrixExt for $mat {
                fn invert(&self) -> Self {
                    return self.try_inverse().unwrap_or_else(|| {
                        debug_assert!(false, "inverting a singular matrix");
                        <$mat>::repeat(f64::NAN)
                    });
                }

                fn invert_transpose(&self) -> Self {
                    return self.invert().transpose();
                }
            }
        )*
    };
}

impl_matrix_ext!(Mat2, Mat3, Mat4);

/// Scales rgb channels of a color by a non-negative intensity, saturating at 255; alpha is kept.
pub fn shade(color: Color, intensity: f64) -> Color {
    let t = intensity.max(0.0);
    return Rgba([
        (t * color[0] as f64).min(255.0) as u8,
        (t * color[1] as f64).min(255.0) as u8,
        (t * color[2] as f64).min(255.0) as u8,
        color[3],
    ]);
}
