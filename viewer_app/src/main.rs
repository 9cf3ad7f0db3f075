//! Mesh viewer
//!
//! Displays a glTF scene through the deferred renderer with a fly camera.
//!
//! ```text
//! mesh_viewer <scene.gltf> [-vulkan-validation] [--config <viewer.toml>]
//! ```

mod app;
mod camera_controller;
mod config;
mod error;
mod loader;
mod overlay;

use render_engine::config::Config;
use render_engine::foundation::logging;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::app::App;
use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};

const USAGE: &str = "usage: mesh_viewer <scene.gltf> [-vulkan-validation] [--config <file>]";

/// Parsed command line
#[derive(Debug, PartialEq, Eq)]
struct Args {
    scene: PathBuf,
    validation: bool,
    config: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> ViewerResult<Args> {
    let mut scene = None;
    let mut validation = false;
    let mut config = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-vulkan-validation" | "--vulkan-validation" => validation = true,
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| ViewerError::Usage(format!("--config needs a path\n{USAGE}")))?;
                config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with('-') => {
                return Err(ViewerError::Usage(format!("unknown option {flag}\n{USAGE}")));
            }
            _ if scene.is_none() => scene = Some(PathBuf::from(arg)),
            _ => return Err(ViewerError::Usage(format!("unexpected argument {arg}\n{USAGE}"))),
        }
    }

    let scene = scene.ok_or_else(|| ViewerError::Usage(USAGE.to_string()))?;
    Ok(Args {
        scene,
        validation,
        config,
    })
}

fn run() -> ViewerResult<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => ViewerConfig::load_from_file(path)?,
        None => ViewerConfig::default(),
    };
    if args.validation {
        config.renderer.enable_validation = true;
    }

    let mut app = App::new(&args.scene, config)?;
    app.run()
}

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(ViewerError::Usage(message)) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
