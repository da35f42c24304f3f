//! # Core Module
//!
//! Shared configuration types used by the frame queue and applications
//! driving it.

pub mod config;

pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    ApplicationConfig,
    EngineConfig,
    FrameQueueConfig,
    Config,
    ConfigError,
};
