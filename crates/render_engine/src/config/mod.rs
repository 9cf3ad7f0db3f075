//! Configuration system

pub use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Renderer settings shared by every frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Enable the Khronos validation layer and debug messenger
    pub enable_validation: bool,
    /// Directory holding the compiled SPIR-V shaders
    pub shader_dir: PathBuf,
    /// Bounded fence wait used by the frame pacer before it yields back to the event loop
    pub frame_poll_timeout_ms: u64,
    /// Capacity of the material descriptor pool
    pub max_material_sets: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Mesh Viewer".to_string(),
            enable_validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("target/shaders"),
            frame_poll_timeout_ms: 1,
            max_material_sets: 256,
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Resolve a compiled shader file inside [`Self::shader_dir`]
    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.shader_dir.join(name)
    }

    /// Poll timeout as a [`std::time::Duration`]
    pub const fn frame_poll_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_config_toml_roundtrip() {
        let config = RendererConfig {
            enable_validation: true,
            frame_poll_timeout_ms: 4,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_renderer_config_partial_file_uses_defaults() {
        let parsed: RendererConfig = toml::from_str("shader_dir = \"shaders/spv\"").unwrap();
        assert_eq!(parsed.shader_dir, PathBuf::from("shaders/spv"));
        assert_eq!(parsed.max_material_sets, RendererConfig::default().max_material_sets);
        assert_eq!(parsed.shader_path("tonemap.spv"), PathBuf::from("shaders/spv/tonemap.spv"));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let result = RendererConfig::load_from_file("renderer.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
        let result = RendererConfig::default().save_to_file(std::env::temp_dir().join("renderer.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_ron_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("render_engine_config_{}.ron", std::process::id()));
        let config = RendererConfig {
            application_name: "ron test".to_string(),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
