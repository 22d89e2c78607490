mod app;
mod config;
mod error;
mod scene;

use std::env;

use config::RenderConfig;

/// `RUST_LOG` wins when set, otherwise info and above are shown.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg_attr(feature = "window", show_image::main)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // -p <asset path> -s <shader> -o <output> -d <depth output> -t <threads> -c <config> -w -f
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config = RenderConfig::load(RenderConfig::config_path(&args).as_deref())?;
    config.apply_args(&args)?;

    app::run(config)?;

    return Ok(());
}
