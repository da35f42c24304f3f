//! Headless Vulkan context
//!
//! Instance, physical device and a logical device with timeline semaphores
//! enabled, plus the graphics queue. No surface or swap chain is created.

use std::ffi::CString;

use ash::{vk, Device, Entry, Instance};
use thiserror::Error;

use crate::render::RenderError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device offers what the frame pipeline needs
    #[error("No suitable device: {0}")]
    NoSuitableDevice(String),
}

impl From<VulkanError> for RenderError {
    fn from(error: VulkanError) -> Self {
        Self::Device(error.to_string())
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Instance, device and graphics queue without presentation support
pub struct HeadlessContext {
    /// Vulkan entry point (keeps the loader alive)
    _entry: Entry,
    /// Vulkan instance
    pub instance: Instance,
    /// Selected physical device
    pub physical_device: vk::PhysicalDevice,
    /// Logical device with timeline semaphores enabled
    pub device: Device,
    /// Graphics queue family index
    pub graphics_family: u32,
    /// Graphics queue
    pub graphics_queue: vk::Queue,
}

impl HeadlessContext {
    /// Load Vulkan and create a 1.2 device with timeline semaphores
    pub fn new(app_name: &str) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name = CString::new("frame_pipeline")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        match Self::create_device(&instance) {
            Ok((physical_device, device, graphics_family)) => {
                let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
                log::info!("Created headless Vulkan device (graphics family {})", graphics_family);
                Ok(Self {
                    _entry: entry,
                    instance,
                    physical_device,
                    device,
                    graphics_family,
                    graphics_queue,
                })
            }
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    fn create_device(instance: &Instance) -> VulkanResult<(vk::PhysicalDevice, Device, u32)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        for physical_device in physical_devices {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            if vk::api_version_minor(properties.api_version) < 2 && vk::api_version_major(properties.api_version) <= 1 {
                continue;
            }

            let mut timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
            let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut timeline);
            unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
            if timeline.timeline_semaphore == vk::FALSE {
                continue;
            }

            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let Some(graphics_family) = families
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            else {
                continue;
            };
            let graphics_family = graphics_family as u32;

            let priorities = [1.0f32];
            let queue_info = [vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(graphics_family)
                .queue_priorities(&priorities)
                .build()];
            let mut enabled_timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::builder().timeline_semaphore(true);
            let device_info = vk::DeviceCreateInfo::builder()
                .queue_create_infos(&queue_info)
                .push_next(&mut enabled_timeline);

            let device = unsafe { instance.create_device(physical_device, &device_info, None) }
                .map_err(VulkanError::Api)?;
            return Ok((physical_device, device, graphics_family));
        }

        Err(VulkanError::NoSuitableDevice(
            "no Vulkan 1.2 device with timeline semaphores and a graphics queue".to_string(),
        ))
    }
}

impl Drop for HeadlessContext {
    fn drop(&mut self) {
        unsafe {
            // Nothing may be in flight once the device is destroyed
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
