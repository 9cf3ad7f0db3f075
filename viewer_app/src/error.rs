//! Viewer error type

use render_engine::config::ConfigError;
use render_engine::render::vulkan::{VulkanError, WindowError};
use thiserror::Error;

/// Anything that stops the viewer
#[derive(Error, Debug)]
pub enum ViewerError {
    /// Vulkan failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Bad configuration file
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Window system failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Unreadable glTF file
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// glTF content the viewer cannot display
    #[error("Unsupported scene content: {0}")]
    Unsupported(String),

    /// Bad command line
    #[error("{0}")]
    Usage(String),
}

/// Result type for the viewer
pub type ViewerResult<T> = Result<T, ViewerError>;
