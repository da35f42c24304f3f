//! Backend implementations of the frame pipeline traits
//!
//! The recording backend runs everywhere and captures command streams. The
//! Vulkan backend supplies the timeline-semaphore fence.

pub mod recording;
pub mod vulkan;
