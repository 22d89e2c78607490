use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use obj::raw::object::Polygon;
use obj::raw::{parse_obj, RawObj};

use super::util::{Color, Vec2, Vec3};
use crate::error::RenderError;

const WHITE: Color = Rgba([255, 255, 255, 255]);

/// Indices of a triangle corner into the position, uv and normal lists.
#[derive(Debug, Clone, Copy)]
struct Corner {
    position: usize,
    uv: usize,
    normal: usize,
}

/// Triangulated mesh together with its optional texture maps.
pub struct Model {
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    normals: Vec<Vec3>,
    faces: Vec<[Corner; 3]>,
    diffuse_map: Option<RgbaImage>,
    normal_map: Option<RgbaImage>,  // Tangent space normals.
    specular_map: Option<RgbaImage>,
}

impl Model {
    /// Loads an obj file and the texture maps lying next to it:
    /// `<stem>_diffuse.tga`, `<stem>_nm_tangent.tga` and `<stem>_spec.tga`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let mut model = Self::from_reader(BufReader::new(File::open(path)?))?;
        log::info!(
            "loaded {}: {} vertices, {} triangles",
            path.display(),
            model.vertex_count(),
            model.triangle_count()
        );

        if let Some(map) = load_map(path, "_diffuse.tga")? {
            model = model.with_diffuse_map(map);
        }
        if let Some(map) = load_map(path, "_nm_tangent.tga")? {
            model = model.with_normal_map(map);
        }
        if let Some(map) = load_map(path, "_spec.tga")? {
            model = model.with_specular_map(map);
        }
        return Ok(model);
    }

    /// Parses obj data. Every face has to be a triangle; missing normals are replaced with
    /// the face normal and missing uvs with (0, 0).
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RenderError> {
        let raw: RawObj = parse_obj(reader)?;

        let positions: Vec<Vec3> = raw
            .positions
            .iter()
            .map(|p| Vec3::new(p.0 as f64, p.1 as f64, p.2 as f64))
            .collect();
        let mut uvs: Vec<Vec2> = raw
            .tex_coords
            .iter()
            .map(|t| Vec2::new(t.0 as f64, t.1 as f64))
            .collect();
        let mut normals: Vec<Vec3> = raw
            .normals
            .iter()
            .map(|n| {
                Vec3::new(n.0 as f64, n.1 as f64, n.2 as f64)
                    .try_normalize(f64::EPSILON)
                    .unwrap_or_else(Vec3::z)
            })
            .collect();

        let mut missing_uv: Option<usize> = None;
        let mut generated_normals = 0;
        let mut faces = Vec::with_capacity(raw.polygons.len());
        for (face, polygon) in raw.polygons.iter().enumerate() {
            // (position, uv, normal) per corner.
            let corners: Vec<(usize, Option<usize>, Option<usize>)> = match polygon {
                Polygon::P(c) => c.iter().map(|&p| (p, None, None)).collect(),
                Polygon::PT(c) => c.iter().map(|&(p, t)| (p, Some(t), None)).collect(),
                Polygon::PN(c) => c.iter().map(|&(p, n)| (p, None, Some(n))).collect(),
                Polygon::PTN(c) => c.iter().map(|&(p, t, n)| (p, Some(t), Some(n))).collect(),
            };
            if corners.len() != 3 {
                return Err(RenderError::NotTriangulated { face, corners: corners.len() });
            }
            let in_range = corners.iter().all(|&(p, t, n)| {
                p < positions.len()
                    && t.map_or(true, |t| t < uvs.len())
                    && n.map_or(true, |n| n < normals.len())
            });
            if !in_range {
                return Err(RenderError::BadIndex { face });
            }

            let face_normal = if corners.iter().any(|c| c.2.is_none()) {
                let [a, b, c] = [0, 1, 2].map(|i| positions[corners[i].0]);
                normals.push((b - a).cross(&(c - a)).try_normalize(f64::EPSILON).unwrap_or_else(Vec3::z));
                generated_normals += 1;
                Some(normals.len() - 1)
            } else {
                None
            };

            let mut triangle = [Corner { position: 0, uv: 0, normal: 0 }; 3];
            for (i, &(position, uv, normal)) in corners.iter().enumerate() {
                let uv = match uv {
                    Some(uv) => uv,
                    None => *missing_uv.get_or_insert_with(|| {
                        uvs.push(Vec2::zeros());
                        uvs.len() - 1
                    }),
                };
                // Face normal exists whenever some corner lacks its own.
                let normal = normal.or(face_normal).unwrap_or_default();
                triangle[i] = Corner { position, uv, normal };
            }
            faces.push(triangle);
        }

        if generated_normals > 0 {
            log::debug!("{} faces without vertex normals, using face normals", generated_normals);
        }
        if missing_uv.is_some() {
            log::debug!("some faces have no texture coordinates, using (0, 0)");
        }

        return Ok(Self {
            positions,
            uvs,
            normals,
            faces,
            diffuse_map: None,
            normal_map: None,
            specular_map: None,
        });
    }

    pub fn with_diffuse_map(mut self, map: RgbaImage) -> Self {
        self.diffuse_map = Some(map);
        return self;
    }

    pub fn with_normal_map(mut self, map: RgbaImage) -> Self {
        self.normal_map = Some(map);
        return self;
    }

    pub fn with_specular_map(mut self, map: RgbaImage) -> Self {
        self.specular_map = Some(map);
        return self;
    }

    pub fn vertex_count(&self) -> usize {
        return self.positions.len();
    }

    pub fn triangle_count(&self) -> usize {
        return self.faces.len();
    }

    /// Position of the `corner`-th (0..3) vertex of a face.
    pub fn vertex(&self, face: usize, corner: usize) -> Vec3 {
        return self.positions[self.faces[face][corner].position];
    }

    /// Unit normal at a face corner.
    pub fn normal(&self, face: usize, corner: usize) -> Vec3 {
        return self.normals[self.faces[face][corner].normal];
    }

    pub fn uv(&self, face: usize, corner: usize) -> Vec2 {
        return self.uvs[self.faces[face][corner].uv];
    }

    /// Tangent space normal from the normal map, if there is one.
    pub fn normal_from_map(&self, uv: Vec2) -> Option<Vec3> {
        let c = sample(self.normal_map.as_ref()?, uv);
        let n = Vec3::new(c[0] as f64, c[1] as f64, c[2] as f64) * (2.0 / 255.0)
            - Vec3::new(1.0, 1.0, 1.0);
        return n.try_normalize(f64::EPSILON);
    }

    /// Albedo at uv, white without a diffuse map.
    pub fn diffuse(&self, uv: Vec2) -> Color {
        return match &self.diffuse_map {
            Some(map) => sample(map, uv),
            None => WHITE,
        };
    }

    /// Specular exponent at uv, zero without a specular map.
    pub fn specular(&self, uv: Vec2) -> f64 {
        return match &self.specular_map {
            Some(map) => sample(map, uv)[0] as f64,
            None => 0.0,
        };
    }
}

/// Nearest texel lookup. v goes up, image rows go down.
fn sample(map: &RgbaImage, uv: Vec2) -> Color {
    let (w, h) = (map.width(), map.height());
    let x = ((uv.x * w as f64) as i64).clamp(0, w as i64 - 1) as u32;
    let y = (((1.0 - uv.y) * h as f64) as i64).clamp(0, h as i64 - 1) as u32;
    return *map.get_pixel(x, y);
}

fn map_path(obj_path: &Path, suffix: &str) -> Option<PathBuf> {
    let stem = obj_path.file_stem()?.to_str()?;
    return Some(obj_path.with_file_name(format!("{stem}{suffix}")));
}

fn load_map(obj_path: &Path, suffix: &str) -> Result<Option<RgbaImage>, RenderError> {
    let path = match map_path(obj_path, suffix) {
        Some(path) if path.exists() => path,
        _ => {
            log::warn!("no {} map for {}", suffix, obj_path.display());
            return Ok(None);
        }
    };
    let map = image::open(&path)?.to_rgba8();
    log::info!("texture {} - {}x{}", path.display(), map.width(), map.height());
    return Ok(Some(map));
}
