//! Vulkan backend pieces
//!
//! The frame queue's fence maps onto a Vulkan 1.2 timeline semaphore.

pub mod context;
pub mod fence;

pub use context::{HeadlessContext, VulkanError, VulkanResult};
pub use fence::TimelineFence;
