//! # Unified Configuration System
//!
//! Configuration consumed by the frame queue and the engine around it.
//!
//! ## Configuration Categories
//!
//! - **Frame Queue Config**: ring size, descriptor heap sizing, upload memory
//! - **Engine Config**: logging behaviour
//! - **Application Config**: the two above combined, loadable from TOML or RON

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Frame Queue Configuration
///
/// Sizing of the in-flight frame ring and of the per-frame transient
/// allocators. The circular descriptor reserve sits at the end of the shader
/// descriptor heap and is split evenly between the frames in flight; the
/// descriptors before it are handed out once for persistent tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameQueueConfig {
    /// Number of frames the CPU may record ahead of the GPU
    pub frame_queue_size: u32,
    /// Total descriptors in the shader-visible heap
    pub shader_descriptor_capacity: u32,
    /// Descriptors reserved for per-frame circular allocation
    pub shader_descriptor_circular_reserve: u32,
    /// Bytes of transient upload memory available to each frame
    pub upload_buffer_size_per_frame: u64,
    /// Minimum placement alignment of constant buffer data
    pub constant_buffer_alignment: u32,
}

impl FrameQueueConfig {
    /// Create a configuration with default sizing
    pub fn new() -> Self {
        Self {
            frame_queue_size: 3,
            shader_descriptor_capacity: 4096,
            shader_descriptor_circular_reserve: 3072,
            upload_buffer_size_per_frame: 1 << 20,
            constant_buffer_alignment: 256,
        }
    }

    /// Set the number of frames in flight
    pub fn with_frame_queue_size(mut self, frames: u32) -> Self {
        self.frame_queue_size = frames;
        self
    }

    /// Set the descriptor heap capacity and its circular reserve
    pub fn with_descriptors(mut self, capacity: u32, circular_reserve: u32) -> Self {
        self.shader_descriptor_capacity = capacity;
        self.shader_descriptor_circular_reserve = circular_reserve;
        self
    }

    /// Set the upload memory available to each frame
    pub fn with_upload_buffer_size(mut self, bytes_per_frame: u64) -> Self {
        self.upload_buffer_size_per_frame = bytes_per_frame;
        self
    }

    /// Set the constant buffer placement alignment
    pub fn with_constant_buffer_alignment(mut self, alignment: u32) -> Self {
        self.constant_buffer_alignment = alignment;
        self
    }

    /// Descriptors each frame may allocate from the circular region
    pub fn circular_descriptors_per_frame(&self) -> u32 {
        if self.frame_queue_size == 0 {
            return 0;
        }
        self.shader_descriptor_circular_reserve / self.frame_queue_size
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_queue_size == 0 {
            return Err(ConfigError::Invalid("frame queue size must be at least 1".to_string()));
        }

        if self.frame_queue_size > 8 {
            return Err(ConfigError::Invalid(format!(
                "frame queue size {} exceeds the supported maximum of 8",
                self.frame_queue_size
            )));
        }

        if self.shader_descriptor_circular_reserve > self.shader_descriptor_capacity {
            return Err(ConfigError::Invalid(format!(
                "circular descriptor reserve {} exceeds heap capacity {}",
                self.shader_descriptor_circular_reserve, self.shader_descriptor_capacity
            )));
        }

        if self.circular_descriptors_per_frame() == 0 {
            return Err(ConfigError::Invalid(
                "circular descriptor reserve leaves no descriptors per frame".to_string(),
            ));
        }

        if !self.constant_buffer_alignment.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "constant buffer alignment {} is not a power of two",
                self.constant_buffer_alignment
            )));
        }

        if self.upload_buffer_size_per_frame < u64::from(self.constant_buffer_alignment) {
            return Err(ConfigError::Invalid(
                "upload buffer cannot hold a single constant buffer".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FrameQueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Engine Configuration
///
/// Core behaviour that affects every subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration applications load from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Frame queue configuration
    pub frame_queue: FrameQueueConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame_queue.validate()
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FrameQueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.circular_descriptors_per_frame(), 1024);
    }

    #[test]
    fn test_rejects_zero_frames() {
        let config = FrameQueueConfig::default().with_frame_queue_size(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_reserve_larger_than_heap() {
        let config = FrameQueueConfig::default().with_descriptors(128, 256);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_power_of_two_alignment() {
        let config = FrameQueueConfig::default().with_constant_buffer_alignment(200);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = std::env::temp_dir().join(format!("frame_pipeline_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("app.toml");

        let config = ApplicationConfig {
            engine: EngineConfig::new().with_log_level("debug"),
            frame_queue: FrameQueueConfig::new().with_frame_queue_size(2),
        };
        config.save_to_file(&path).unwrap();

        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let loaded: ApplicationConfig =
            ron::from_str("(frame_queue: (frame_queue_size: 2))").unwrap();
        assert_eq!(loaded.frame_queue.frame_queue_size, 2);
        assert_eq!(loaded.frame_queue.constant_buffer_alignment, 256);
        assert_eq!(loaded.engine.log_level, "info");
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = ApplicationConfig::default().save_to_file("config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
