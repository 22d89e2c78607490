use std::str::FromStr;

use image::Rgba;

use super::model::Model;
use super::transform::Transform;
use super::util::{normalized, shade, Color, Mat, Mat2, Mat3, Vec3, Vec4};
use crate::error::RenderError;

/// Programmable part of the pipeline.
///
/// For every triangle `vertex` is called for corners 0, 1 and 2, after which the rasterizer calls
/// `fragment` once per covered pixel. `fragment` only reads what the three `vertex` calls stored,
/// so pixels of one triangle may be shaded from several threads at once.
pub trait Shader: Sync {
    /// Transforms `corner` (0..3) of `face` to clip space, storing varyings for the fragment stage.
    fn vertex(&mut self, face: usize, corner: usize) -> Vec4;

    /// Color of the fragment with barycentric coordinates `bar`, None to leave the pixel untouched.
    fn fragment(&self, bar: Vec3) -> Option<Color>;
}

/// Shading schemes selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Random,
    Default,
    Phong,
    Mapped,
}

impl FromStr for ShaderKind {
    type Err = RenderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        return match name {
            "random" => Ok(ShaderKind::Random),
            "default" => Ok(ShaderKind::Default),
            "phong" => Ok(ShaderKind::Phong),
            "mapped" => Ok(ShaderKind::Mapped),
            _ => Err(RenderError::UnknownShader(name.to_string())),
        };
    }
}

const AMBIENT: f64 = 0.3;

/// Reflection of the light direction `l` about the normal `n`, both unit.
fn reflect(n: Vec3, l: Vec3) -> Vec3 {
    return normalized(n * (2.0 * n.dot(&l)) - l);
}

/// Flat color per face. Colors look random but only depend on the face index.
pub struct RandomShader<'a> {
    model: &'a Model,
    transform: &'a Transform,
    color: Color,
}

impl<'a> RandomShader<'a> {
    pub fn new(model: &'a Model, transform: &'a Transform) -> Self {
        return Self { model, transform, color: Rgba([0, 0, 0, 255]) };
    }
}

/// splitmix64 finalizer, enough to scatter consecutive face indices over the palette.
fn face_color(face: usize) -> Color {
    let mut z = (face as u64).wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^= z >> 31;
    return Rgba([z as u8, (z >> 8) as u8, (z >> 16) as u8, 255]);
}

impl Shader for RandomShader<'_> {
    fn vertex(&mut self, face: usize, corner: usize) -> Vec4 {
        debug_assert!(corner < 3);
        self.color = face_color(face);
        return self.transform.object_to_clip(self.model.vertex(face, corner));
    }

    fn fragment(&self, _bar: Vec3) -> Option<Color> {
        return Some(self.color);
    }
}

/// Diffuse texture lit by the geometric face normal.
pub struct FlatShader<'a> {
    model: &'a Model,
    transform: &'a Transform,
    light: Vec3,           // Eye space light direction.
    positions: Mat3,       // Eye space vertex positions as columns.
    uvs: Mat<2, 3>,        // Vertex uvs as columns.
}

impl<'a> FlatShader<'a> {
    pub fn new(model: &'a Model, transform: &'a Transform, light_direction: Vec3) -> Self {
        return Self {
            model,
            transform,
            light: transform.direction_to_eye(light_direction),
            positions: Mat3::zeros(),
            uvs: Mat::<2, 3>::zeros(),
        };
    }
}

impl Shader for FlatShader<'_> {
    fn vertex(&mut self, face: usize, corner: usize) -> Vec4 {
        debug_assert!(corner < 3);
        let position = self.model.vertex(face, corner);
        let eye = self.transform.object_to_eye(position);
        self.positions.set_column(corner, &eye.xyz());
        self.uvs.set_column(corner, &self.model.uv(face, corner));
        return self.transform.projection() * eye;
    }

    fn fragment(&self, bar: Vec3) -> Option<Color> {
        let a = self.positions.column(0);
        let edge_1 = self.positions.column(1) - a;
        let edge_2 = self.positions.column(2) - a;
        let intensity = edge_1
            .cross(&edge_2)
            .try_normalize(f64::EPSILON)
            .map_or(0.0, |n| n.dot(&self.light));
        let uv = self.uvs * bar;
        return Some(shade(self.model.diffuse(uv), intensity));
    }
}

/// Phong (reflected light vector) with vertex normals interpolated over the triangle.
pub struct PhongShader<'a> {
    model: &'a Model,
    transform: &'a Transform,
    light: Vec3,
    normals: Mat3,   // Eye space vertex normals as columns.
    uvs: Mat<2, 3>,
}

impl<'a> PhongShader<'a> {
    const DIFFUSE: f64 = 0.4;
    const SPECULAR: f64 = 0.9;
    const SHININESS: f64 = 35.0;

    pub fn new(model: &'a Model, transform: &'a Transform, light_direction: Vec3) -> Self {
        return Self {
            model,
            transform,
            light: transform.direction_to_eye(light_direction),
            normals: Mat3::zeros(),
            uvs: Mat::<2, 3>::zeros(),
        };
    }
}

impl Shader for PhongShader<'_> {
    fn vertex(&mut self, face: usize, corner: usize) -> Vec4 {
        debug_assert!(corner < 3);
        let normal = self.transform.normal_to_eye(self.model.normal(face, corner));
        self.normals.set_column(corner, &normal);
        self.uvs.set_column(corner, &self.model.uv(face, corner));
        return self.transform.object_to_clip(self.model.vertex(face, corner));
    }

    fn fragment(&self, bar: Vec3) -> Option<Color> {
        let color = self.model.diffuse(self.uvs * bar);
        let n = match (self.normals * bar).try_normalize(f64::EPSILON) {
            Some(n) => n,
            None => return Some(shade(color, AMBIENT)),
        };
        let diffuse = n.dot(&self.light).max(0.0);
        // The viewer looks along -z in eye space.
        let specular = reflect(n, self.light).z.max(0.0).powf(Self::SHININESS);
        let intensity = AMBIENT + Self::DIFFUSE * diffuse + Self::SPECULAR * specular;
        return Some(shade(color, intensity));
    }
}

/// Phong driven by the texture maps: tangent space normal map, diffuse map and specular map.
pub struct MappedShader<'a> {
    model: &'a Model,
    transform: &'a Transform,
    light: Vec3,
    positions: Mat3, // Eye space vertex positions as columns.
    normals: Mat3,   // Eye space vertex normals as columns.
    uvs: Mat<2, 3>,
}

impl<'a> MappedShader<'a> {
    const AMBIENT: f64 = 0.1;
    const SPECULAR: f64 = 0.6;
    const BASE_SHININESS: f64 = 5.0;

    pub fn new(model: &'a Model, transform: &'a Transform, light_direction: Vec3) -> Self {
        return Self {
            model,
            transform,
            light: transform.direction_to_eye(light_direction),
            positions: Mat3::zeros(),
            normals: Mat3::zeros(),
            uvs: Mat::<2, 3>::zeros(),
        };
    }

    /// Maps a tangent space normal to eye space through the Darboux frame of the triangle.
    /// None if the triangle's uv mapping is degenerate.
    fn darboux(&self, normal: Vec3, tangent_normal: Vec3) -> Option<Vec3> {
        let p0 = self.positions.column(0);
        let edges = Mat::<2, 3>::from_rows(&[
            (self.positions.column(1) - p0).transpose(),
            (self.positions.column(2) - p0).transpose(),
        ]);
        let uv0 = self.uvs.column(0);
        let uv1 = self.uvs.column(1) - uv0;
        let uv2 = self.uvs.column(2) - uv0;
        let uv_edges = Mat2::new(uv1.x, uv1.y, uv2.x, uv2.y);
        let tb = uv_edges.try_inverse()? * edges;
        let tangent = tb.row(0).transpose().try_normalize(f64::EPSILON)?;
        let bitangent = tb.row(1).transpose().try_normalize(f64::EPSILON)?;
        let frame = Mat3::from_columns(&[tangent, bitangent, normal]);
        return (frame * tangent_normal).try_normalize(f64::EPSILON);
    }
}

impl Shader for MappedShader<'_> {
    fn vertex(&mut self, face: usize, corner: usize) -> Vec4 {
        debug_assert!(corner < 3);
        let eye = self.transform.object_to_eye(self.model.vertex(face, corner));
        self.positions.set_column(corner, &eye.xyz());
        let normal = self.transform.normal_to_eye(self.model.normal(face, corner));
        self.normals.set_column(corner, &normal);
        self.uvs.set_column(corner, &self.model.uv(face, corner));
        return self.transform.projection() * eye;
    }

    fn fragment(&self, bar: Vec3) -> Option<Color> {
        let uv = self.uvs * bar;
        let color = self.model.diffuse(uv);
        let interpolated = match (self.normals * bar).try_normalize(f64::EPSILON) {
            Some(n) => n,
            None => return Some(shade(color, Self::AMBIENT)),
        };
        let n = self
            .model
            .normal_from_map(uv)
            .and_then(|tangent_normal| self.darboux(interpolated, tangent_normal))
            .unwrap_or(interpolated);

        let diffuse = n.dot(&self.light).max(0.0);
        let shininess = Self::BASE_SHININESS + self.model.specular(uv);
        let specular = reflect(n, self.light).z.max(0.0).powf(shininess);
        let intensity = Self::AMBIENT + diffuse + Self::SPECULAR * specular;
        return Some(shade(color, intensity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::transform::FrameSetup;
    use image::RgbaImage;

    const QUAD: &str = "\
v -0.5 -0.5 0
v 0.5 -0.5 0
v 0.5 0.5 0
v -0.5 0.5 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

    fn quad() -> Model {
        return Model::from_reader(QUAD.as_bytes()).unwrap();
    }

    /// Camera on +z looking at the origin, so eye space axes match world axes.
    fn front_transform() -> Transform {
        let mut setup = FrameSetup::new(64, 64);
        setup.set_view(Vec3::new(0.0, 0.0, 3.0), Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0));
        return setup.build();
    }

    fn run_vertices(shader: &mut impl Shader, face: usize) -> [Vec4; 3] {
        return [0, 1, 2].map(|corner| shader.vertex(face, corner));
    }

    fn center() -> Vec3 {
        return Vec3::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
    }

    #[test]
    fn shader_names_parse() {
        assert_eq!("phong".parse::<ShaderKind>().unwrap(), ShaderKind::Phong);
        assert_eq!("default".parse::<ShaderKind>().unwrap(), ShaderKind::Default);
        assert!(matches!(
            "toon".parse::<ShaderKind>(),
            Err(RenderError::UnknownShader(name)) if name == "toon"
        ));
    }

    #[test]
    fn vertex_stage_returns_clip_position() {
        let model = quad();
        let transform = front_transform();
        let mut shader = RandomShader::new(&model, &transform);
        let clip = run_vertices(&mut shader, 0);
        for corner in 0..3 {
            assert_eq!(clip[corner], transform.object_to_clip(model.vertex(0, corner)));
        }
    }

    #[test]
    fn random_colors_are_per_face_and_reproducible() {
        let model = quad();
        let transform = front_transform();
        let mut shader = RandomShader::new(&model, &transform);
        run_vertices(&mut shader, 0);
        let first = shader.fragment(center()).unwrap();
        assert_eq!(shader.fragment(Vec3::new(1.0, 0.0, 0.0)).unwrap(), first);
        run_vertices(&mut shader, 1);
        assert_ne!(shader.fragment(center()).unwrap(), first);
        run_vertices(&mut shader, 0);
        assert_eq!(shader.fragment(center()).unwrap(), first);
    }

    #[test]
    fn flat_shader_uses_face_orientation() {
        let model = quad();
        let transform = front_transform();
        let mut lit = FlatShader::new(&model, &transform, Vec3::new(0.0, 0.0, 1.0));
        run_vertices(&mut lit, 0);
        assert_eq!(lit.fragment(center()).unwrap(), Rgba([255, 255, 255, 255]));

        let mut unlit = FlatShader::new(&model, &transform, Vec3::new(0.0, 0.0, -1.0));
        run_vertices(&mut unlit, 0);
        assert_eq!(unlit.fragment(center()).unwrap(), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn specular_uses_the_reflected_light_vector() {
        let n = Vec3::z();
        let l = normalized(Vec3::new(1.0, 0.0, 1.0));
        let r = reflect(n, l);
        assert!((r - normalized(Vec3::new(-1.0, 0.0, 1.0))).norm() < 1e-12);
        // Light along the normal reflects onto the viewer.
        assert!((reflect(n, n) - n).norm() < 1e-12);
    }

    #[test]
    fn phong_highlight_and_ambient() {
        let model = quad();
        let transform = front_transform();
        let mut lit = PhongShader::new(&model, &transform, Vec3::new(0.0, 0.0, 1.0));
        run_vertices(&mut lit, 1);
        assert_eq!(lit.fragment(center()).unwrap(), Rgba([255, 255, 255, 255]));

        let mut unlit = PhongShader::new(&model, &transform, Vec3::new(0.0, 0.0, -1.0));
        run_vertices(&mut unlit, 1);
        let ambient = (AMBIENT * 255.0) as u8;
        assert_eq!(unlit.fragment(center()).unwrap(), Rgba([ambient, ambient, ambient, 255]));
    }

    #[test]
    fn phong_interpolates_diffuse_texture() {
        let mut diffuse = RgbaImage::new(2, 1);
        diffuse.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        diffuse.put_pixel(1, 0, Rgba([0, 0, 200, 255]));
        let model = quad().with_diffuse_map(diffuse);
        let transform = front_transform();
        // Grazing light, so neither diffuse nor specular saturates.
        let mut shader = PhongShader::new(&model, &transform, Vec3::new(1.0, 0.0, 0.0));
        run_vertices(&mut shader, 0);
        // Corner 0 has uv (0, 0), corner 1 has uv (1, 0).
        let left = shader.fragment(Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let right = shader.fragment(Vec3::new(0.0, 1.0, 0.0)).unwrap();
        assert!(left[0] > 0 && left[2] == 0);
        assert!(right[2] > 0 && right[0] == 0);
    }

    #[test]
    fn mapped_shader_follows_normal_map() {
        let mut flat_normals = RgbaImage::new(1, 1);
        flat_normals.put_pixel(0, 0, Rgba([128, 128, 255, 255]));
        let mut tilted_normals = RgbaImage::new(1, 1);
        // Tangent space normal pointing along +u, away from a light on +z.
        tilted_normals.put_pixel(0, 0, Rgba([255, 128, 128, 255]));
        let transform = front_transform();
        let light = Vec3::new(0.0, 0.0, 1.0);

        let flat_model = quad().with_normal_map(flat_normals);
        let mut flat = MappedShader::new(&flat_model, &transform, light);
        run_vertices(&mut flat, 0);
        let flat_color = flat.fragment(center()).unwrap();

        let tilted_model = quad().with_normal_map(tilted_normals);
        let mut tilted = MappedShader::new(&tilted_model, &transform, light);
        run_vertices(&mut tilted, 0);
        let tilted_color = tilted.fragment(center()).unwrap();

        assert_eq!(flat_color, Rgba([255, 255, 255, 255]));
        assert!(tilted_color[0] < 64);
    }

    #[test]
    fn mapped_shader_without_maps_uses_vertex_normals() {
        let model = quad();
        let transform = front_transform();
        let mut shader = MappedShader::new(&model, &transform, Vec3::new(0.0, 0.0, -1.0));
        run_vertices(&mut shader, 0);
        let ambient = (MappedShader::AMBIENT * 255.0) as u8;
        assert_eq!(shader.fragment(center()).unwrap(), Rgba([ambient, ambient, ambient, 255]));
    }
}
