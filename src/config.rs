//! Render configuration.
//!
//! Sources, lowest priority first:
//! 1. built in defaults,
//! 2. `tiny_renderer.toml` in the working directory, or the file given with `-c`,
//! 3. environment variables prefixed with `TINY_` (`TINY_WIDTH=320`, `TINY_EYE=[0,0,3]`),
//! 4. command line flags.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::scene::buffer::BLACK;
use crate::scene::shader::ShaderKind;
use crate::scene::transform::FrameSetup;
use crate::scene::util::{Color, Vec3};

pub const DEFAULT_CONFIG_FILE: &str = "tiny_renderer.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Obj file, or a directory holding one.
    pub asset_path: PathBuf,
    /// One of `random`, `default`, `phong`, `mapped`.
    pub shader: String,
    pub output: PathBuf,
    /// Grayscale z-buffer picture, skipped when unset.
    pub depth_output: Option<PathBuf>,
    pub eye: [f64; 3],
    pub center: [f64; 3],
    pub up: [f64; 3],
    /// World space direction towards the light.
    pub light: [f64; 3],
    /// Defaults to the eye to center distance.
    pub focal_distance: Option<f64>,
    /// Screen rectangle `[x, y, w, h]` for NDC, defaults to the image inset by 1/16 per side.
    pub viewport: Option<[f64; 4]>,
    pub threads: usize,
    pub background: [u8; 4],
    pub window: bool,
    pub print_fps: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        return Self {
            width: 800,
            height: 800,
            asset_path: PathBuf::from("assets/diablo"),
            shader: String::from("default"),
            output: PathBuf::from("output.tga"),
            depth_output: None,
            eye: [-1.0, 0.0, 2.0],
            center: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            light: [1.0, 1.0, 1.0],
            focal_distance: None,
            viewport: None,
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            background: BLACK.0,
            window: false,
            print_fps: false,
        };
    }
}

impl RenderConfig {
    /// Merges defaults, the config file and the environment. An explicit `path` has to exist,
    /// the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, RenderError> {
        let mut figment = Figment::from(Serialized::defaults(RenderConfig::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(RenderError::InvalidConfig(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
            }
        }
        figment = figment.merge(Env::prefixed("TINY_"));

        let config: RenderConfig = figment.extract()?;
        log::debug!("loaded configuration: {:?}", config);
        return Ok(config);
    }

    /// Applies command line flags on top of the loaded values. `-c` is consumed by `config_path`.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), RenderError> {
        for (flag, value) in scan_flags(args)? {
            match (flag, value) {
                ("-w", _) => self.window = true,
                ("-f", _) => self.print_fps = true,
                ("-p", Some(value)) => self.asset_path = PathBuf::from(value),
                ("-s", Some(value)) => self.shader = value.to_string(),
                ("-o", Some(value)) => self.output = PathBuf::from(value),
                ("-d", Some(value)) => self.depth_output = Some(PathBuf::from(value)),
                ("-t", Some(value)) => {
                    self.threads = value.parse().map_err(|_| {
                        RenderError::InvalidConfig(format!("thread count '{}' is not a number", value))
                    })?;
                }
                ("-c", _) => (),
                (flag, _) => log::warn!("ignoring unknown argument '{}'", flag),
            }
        }
        return Ok(());
    }

    /// Value of the `-c` flag, if any. Arguments are walked the same way `apply_args` walks them,
    /// so a `-c` given as another flag's value does not count.
    pub fn config_path(args: &[String]) -> Option<PathBuf> {
        return scan_flags(args)
            .ok()?
            .into_iter()
            .find(|(flag, _)| *flag == "-c")
            .and_then(|(_, value)| value.map(PathBuf::from));
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "image size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.threads == 0 {
            return Err(RenderError::InvalidConfig(String::from("thread count has to be at least 1")));
        }
        if let Some(focal_distance) = self.focal_distance {
            if focal_distance == 0.0 || !focal_distance.is_finite() {
                return Err(RenderError::InvalidConfig(format!(
                    "focal distance {} is not usable",
                    focal_distance
                )));
            }
        }
        if let Some([x, y, w, h]) = self.viewport {
            if !(w > 0.0 && h > 0.0) || ![x, y, w, h].iter().all(|v| v.is_finite()) {
                return Err(RenderError::InvalidConfig(format!(
                    "viewport {}x{} at ({}, {}) is not usable",
                    w, h, x, y
                )));
            }
        }
        let view = self.center() - self.eye();
        if view.norm() == 0.0 {
            return Err(RenderError::InvalidConfig(String::from("eye and center coincide")));
        }
        if view.cross(&self.up()).norm() <= f64::EPSILON * view.norm() * self.up().norm() {
            return Err(RenderError::InvalidConfig(String::from(
                "up vector is parallel to the view direction",
            )));
        }
        if Vec3::from(self.light).norm() == 0.0 {
            return Err(RenderError::InvalidConfig(String::from("light direction is zero")));
        }
        self.shader_kind()?;
        return Ok(());
    }

    pub fn shader_kind(&self) -> Result<ShaderKind, RenderError> {
        return self.shader.parse();
    }

    pub fn eye(&self) -> Vec3 {
        return Vec3::from(self.eye);
    }

    pub fn center(&self) -> Vec3 {
        return Vec3::from(self.center);
    }

    pub fn up(&self) -> Vec3 {
        return Vec3::from(self.up);
    }

    pub fn light(&self) -> Vec3 {
        return Vec3::from(self.light).normalize();
    }

    pub fn background(&self) -> Color {
        return Rgba(self.background);
    }

    /// Camera and viewport described by the configuration.
    pub fn frame_setup(&self) -> FrameSetup {
        let mut setup = FrameSetup::new(self.width, self.height);
        setup.set_view(self.eye(), self.center(), self.up());
        if let Some(focal_distance) = self.focal_distance {
            setup.set_projection(focal_distance);
        }
        if let Some([x, y, w, h]) = self.viewport {
            setup.set_viewport(x, y, w, h);
        }
        return setup;
    }
}

/// Flags taking a value; `-w` and `-f` are switches.
const VALUE_FLAGS: [&str; 6] = ["-p", "-s", "-o", "-d", "-t", "-c"];

/// Splits arguments into (flag, value) pairs. Unknown arguments come back without a value.
fn scan_flags(args: &[String]) -> Result<Vec<(&str, Option<&str>)>, RenderError> {
    let mut flags = Vec::new();
    let mut rest = args.iter();
    while let Some(flag) = rest.next() {
        if VALUE_FLAGS.contains(&flag.as_str()) {
            let value = rest
                .next()
                .ok_or_else(|| RenderError::InvalidConfig(format!("flag {} expects a value", flag)))?;
            flags.push((flag.as_str(), Some(value.as_str())));
        } else {
            flags.push((flag.as_str(), None));
        }
    }
    return Ok(flags);
}
