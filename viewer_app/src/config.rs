//! Viewer configuration file

use render_engine::config::{Config, RendererConfig};
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Title bar text
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Mesh Viewer".to_string(),
        }
    }
}

/// Fly camera tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Initial vertical field of view in radians
    pub fov: f32,
    /// Radians per pixel of mouse movement
    pub sensitivity: f32,
    /// Units per frame at full speed
    pub speed: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: FRAC_PI_2,
            sensitivity: 0.01,
            speed: 0.02,
        }
    }
}

/// Everything `mesh_viewer` reads from `--config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Window section
    pub window: WindowSettings,
    /// Renderer section
    pub renderer: RendererConfig,
    /// Camera section
    pub camera: CameraSettings,
}

impl Config for ViewerConfig {}
