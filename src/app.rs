use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::scene::model::Model;
use crate::scene::shader::{FlatShader, MappedShader, PhongShader, RandomShader, ShaderKind};
use crate::scene::transform::Transform;
use crate::scene::util::Vec3;
use crate::scene::{FrameStats, Scene};

/// Picks the obj file to load: the path itself, `<path>.obj`, or the first obj file
/// (by name) inside a directory.
pub fn resolve_model_path(asset_path: &Path) -> Result<PathBuf, RenderError> {
    if asset_path.is_file() {
        return Ok(asset_path.to_path_buf());
    }
    if asset_path.is_dir() {
        let mut objs: Vec<PathBuf> = fs::read_dir(asset_path)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("obj")))
            .collect();
        objs.sort();
        return objs.into_iter().next().ok_or_else(|| {
            RenderError::InvalidConfig(format!("no obj file in {}", asset_path.display()))
        });
    }
    let with_extension = asset_path.with_extension("obj");
    if with_extension.is_file() {
        return Ok(with_extension);
    }
    return Err(RenderError::InvalidConfig(format!(
        "asset path {} is neither an obj file nor a directory",
        asset_path.display()
    )));
}

/// Draws every triangle of `model` with the shader named by `kind`.
pub fn render_frame(
    scene: &mut Scene,
    kind: ShaderKind,
    model: &Model,
    transform: &Transform,
    light: Vec3,
) -> FrameStats {
    let triangles = model.triangle_count();
    return match kind {
        ShaderKind::Random => scene.draw(&mut RandomShader::new(model, transform), triangles, transform),
        ShaderKind::Default => scene.draw(&mut FlatShader::new(model, transform, light), triangles, transform),
        ShaderKind::Phong => scene.draw(&mut PhongShader::new(model, transform, light), triangles, transform),
        ShaderKind::Mapped => scene.draw(&mut MappedShader::new(model, transform, light), triangles, transform),
    };
}

/// Renders the configured model once and writes the requested images.
/// With the `window` feature and `window` set, shows an orbiting preview instead.
pub fn run(config: RenderConfig) -> Result<(), RenderError> {
    config.validate()?;
    let kind = config.shader_kind()?;
    let model = Model::load(resolve_model_path(&config.asset_path)?)?;
    let mut scene = Scene::new(config.width, config.height, config.threads);
    log::info!(
        "rendering {}x{} with the {} shader on {} thread(s)",
        config.width,
        config.height,
        config.shader,
        config.threads
    );

    if config.window {
        return show_preview(&config, kind, &model, &mut scene);
    }
    return render_to_files(&config, kind, &model, &mut scene);
}

fn render_to_files(config: &RenderConfig, kind: ShaderKind, model: &Model, scene: &mut Scene) -> Result<(), RenderError> {
    let transform = config.frame_setup().build();
    scene.clear(config.background());
    let stats = render_frame(scene, kind, model, &transform, config.light());
    log::info!(
        "{} of {} triangles produced no pixels, {} pixels written",
        stats.rejected,
        stats.triangles,
        stats.pixels
    );

    scene.save(&config.output)?;
    if let Some(depth_output) = &config.depth_output {
        scene.save_depth(depth_output)?;
    }
    return Ok(());
}

#[cfg(feature = "window")]
fn show_preview(config: &RenderConfig, kind: ShaderKind, model: &Model, scene: &mut Scene) -> Result<(), RenderError> {
    return preview::run(config, kind, model, scene);
}

#[cfg(not(feature = "window"))]
fn show_preview(config: &RenderConfig, kind: ShaderKind, model: &Model, scene: &mut Scene) -> Result<(), RenderError> {
    log::warn!("built without the window feature, writing {} instead", config.output.display());
    return render_to_files(config, kind, model, scene);
}

#[cfg(feature = "window")]
mod preview {
    use std::time;

    use image::imageops;
    use show_image::{create_window, event, ImageInfo, ImageView, WindowOptions};

    use super::render_frame;
    use crate::config::RenderConfig;
    use crate::error::RenderError;
    use crate::scene::model::Model;
    use crate::scene::shader::ShaderKind;
    use crate::scene::util::Vec3;
    use crate::scene::Scene;

    /// Radians per second.
    const ORBIT_SPEED: f64 = 0.5;

    /// Helper, defining exit event to be an Escape key press.
    fn is_exit_event(window_event: event::WindowEvent) -> bool {
        if let event::WindowEvent::KeyboardInput(event) = window_event {
            if event.input.key_code == Some(event::VirtualKeyCode::Escape) && event.input.state.is_released() {
                return true;
            }
        }

        return false;
    }

    /// Eye rotated by `angle` around the vertical axis through `center`.
    fn orbit(eye: Vec3, center: Vec3, angle: f64) -> Vec3 {
        let offset = eye - center;
        let (sin, cos) = angle.sin_cos();
        return center + Vec3::new(cos * offset.x + sin * offset.z, offset.y, -sin * offset.x + cos * offset.z);
    }

    fn window_error(err: impl std::fmt::Display) -> RenderError {
        return RenderError::Window(err.to_string());
    }

    /// Re-renders the model with an orbiting camera until Escape is pressed.
    pub(super) fn run(
        config: &RenderConfig,
        kind: ShaderKind,
        model: &Model,
        scene: &mut Scene,
    ) -> Result<(), RenderError> {
        let window_options = WindowOptions {
            size: Some([config.width, config.height]),
            ..Default::default()
        };
        let window = create_window("output", window_options).map_err(window_error)?;
        let event_channel = window.event_channel().map_err(window_error)?;

        let mut setup = config.frame_setup();
        let time_begin = time::Instant::now();
        let mut frame_counter_time_begin = time::Instant::now();
        let mut frame_counter: u32 = 0;
        loop {
            let angle = ORBIT_SPEED * time_begin.elapsed().as_secs_f64();
            setup.set_view(orbit(config.eye(), config.center(), angle), config.center(), config.up());
            let transform = setup.build();

            scene.clear(config.background());
            render_frame(scene, kind, model, &transform, config.light());

            // Row 0 is the bottom of the scene but the top of the window.
            let flipped = imageops::flip_vertical(scene.framebuffer().as_image());
            let image_data = ImageView::new(ImageInfo::rgba8(config.width, config.height), flipped.as_raw());
            window.set_image("image", image_data).map_err(window_error)?;

            // Draining everything that piled up in the channel, looking for the exit event.
            if event_channel.try_iter().fold(false, |exit, event| is_exit_event(event) || exit) {
                return Ok(());
            }

            if config.print_fps {
                frame_counter += 1;
                if frame_counter_time_begin.elapsed().as_secs_f32() > 1.0 {
                    log::info!("FPS --- {}", frame_counter);
                    frame_counter_time_begin = time::Instant::now();
                    frame_counter = 0;
                }
            }
        }
    }

}
