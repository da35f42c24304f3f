//! Timeline semaphore fence
//!
//! A Vulkan timeline semaphore behaves exactly like the monotonically
//! increasing fence the frame queue expects: the host can read the counter,
//! block until it reaches a value, and queues can signal new values.

use ash::{vk, Device};

use crate::render::backend::GpuFence;
use crate::render::backends::vulkan::context::{VulkanError, VulkanResult};
use crate::render::RenderResult;

/// Fence backed by a timeline semaphore, with RAII cleanup
pub struct TimelineFence {
    device: Device,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    /// Create a timeline semaphore starting at `initial_value`
    pub fn new(device: Device, initial_value: u64) -> VulkanResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);

        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Set the counter to `value` from the host
    pub fn signal_from_host(&self, value: u64) -> VulkanResult<()> {
        let signal_info = vk::SemaphoreSignalInfo::builder()
            .semaphore(self.semaphore)
            .value(value);
        unsafe { self.device.signal_semaphore(&signal_info) }.map_err(VulkanError::Api)
    }

    /// Have `queue` set the counter to `value` after all prior submissions
    pub fn signal_on_queue(&self, queue: vk::Queue, value: u64) -> VulkanResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::builder()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device
                .queue_submit(queue, &[submit.build()], vk::Fence::null())
                .map_err(VulkanError::Api)
        }
    }

    /// Block until the counter reaches `value` or `timeout_ns` elapses
    pub fn wait(&self, value: u64, timeout_ns: u64) -> VulkanResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) }.map_err(VulkanError::Api)
    }
}

impl GpuFence for TimelineFence {
    fn completed_value(&self) -> RenderResult<u64> {
        let value = unsafe { self.device.get_semaphore_counter_value(self.semaphore) }.map_err(VulkanError::Api)?;
        Ok(value)
    }

    fn wait_for_value(&self, value: u64) -> RenderResult<()> {
        if self.completed_value()? >= value {
            return Ok(());
        }
        self.wait(value, u64::MAX)?;
        Ok(())
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::context::HeadlessContext;

    fn context() -> Option<HeadlessContext> {
        match HeadlessContext::new("timeline_fence_test") {
            Ok(context) => Some(context),
            Err(e) => {
                eprintln!("skipping Vulkan test: {e}");
                None
            }
        }
    }

    #[test]
    fn test_timeline_fence_signal_and_wait() {
        let Some(context) = context() else {
            return;
        };
        let fence = TimelineFence::new(context.device.clone(), 1).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 1);

        // Waiting on a reached value returns immediately
        fence.wait_for_value(0).unwrap();
        fence.wait_for_value(1).unwrap();

        fence.signal_from_host(2).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 2);

        fence.signal_on_queue(context.graphics_queue, 5).unwrap();
        fence.wait_for_value(5).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 5);
    }
}
