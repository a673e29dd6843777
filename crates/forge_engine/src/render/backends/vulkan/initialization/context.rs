//! Vulkan context management
//!
//! [`VulkanContext`] owns the objects created once per renderer: instance, surface,
//! logical device, swapchain and the command pool used for blocking uploads.
//! Creation runs instance → surface → device → swapchain; drop runs the reverse,
//! which Rust guarantees through the declaration order of the struct's fields.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use super::device::{queried_candidates, select_device, DeviceCandidate, LogicalDevice};
use super::surface::Surface;
use crate::config::VulkanRendererConfig;
use crate::render::backends::vulkan::rendering::commands::CommandPool;
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::window::Window;

/// Name of the Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device passed the suitability checks
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Image layout transition outside the supported table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// The swapchain no longer matches the surface and must be recreated
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// File access failed (e.g. reading SPIR-V)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

fn to_cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value)
        .map_err(|_| VulkanError::InitializationFailed(format!("Name contains NUL byte: {value:?}")))
}

/// Names in `required` that are absent from `available`
pub fn missing_names(required: &[String], available: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .cloned()
        .collect()
}

/// Convert a fixed-size, NUL-terminated name array returned by Vulkan
pub(crate) fn vk_name_to_string(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Debug utilities extension and messenger, when validation is enabled
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Vulkan entry point
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create a new Vulkan instance
    ///
    /// Every extension in `required_extensions` (and the validation layer, when
    /// `enable_validation` is set) must be available; otherwise creation fails
    /// before `vkCreateInstance` is called.
    pub fn new(
        required_extensions: &[String],
        app_name: &str,
        app_version: (u32, u32, u32),
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let mut extensions = required_extensions.to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().to_string_lossy().into_owned());
        }

        let available_extensions: Vec<String> = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| vk_name_to_string(&ext.extension_name))
            .collect();
        let missing = missing_names(&extensions, &available_extensions);
        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Missing instance extensions: {}",
                missing.join(", ")
            )));
        }

        let layers: Vec<String> = if enable_validation {
            vec![VALIDATION_LAYER.to_string()]
        } else {
            Vec::new()
        };
        let available_layers: Vec<String> = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?
            .iter()
            .map(|layer| vk_name_to_string(&layer.layer_name))
            .collect();
        let missing = missing_names(&layers, &available_layers);
        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Missing instance layers: {}",
                missing.join(", ")
            )));
        }

        let app_name_cstr = to_cstring(app_name)?;
        let engine_name_cstr = to_cstring("ForgeEngine")?;
        let (major, minor, patch) = app_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_cstrs = extensions
            .iter()
            .map(|name| to_cstring(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let extension_ptrs: Vec<*const c_char> = extension_cstrs.iter().map(|s| s.as_ptr()).collect();
        let layer_cstrs = layers
            .iter()
            .map(|name| to_cstring(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let layer_ptrs: Vec<*const c_char> = layer_cstrs.iter().map(|s| s.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation {})",
            app_name,
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self { debug, instance, entry })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(VulkanError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Field order is drop order: the upload pool and swapchain go first, then the
/// logical device, then the surface, and the instance last.
pub struct VulkanContext {
    upload_pool: CommandPool,
    swapchain: Swapchain,
    /// Logical device and its queues
    pub device: LogicalDevice,
    /// Capability snapshot of the selected physical device
    pub physical_device: DeviceCandidate,
    /// Presentation surface
    pub surface: Surface,
    /// Vulkan instance and debug messenger
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a context rendering to `window`
    pub fn new(window: &Window, config: &VulkanRendererConfig) -> VulkanResult<Self> {
        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let instance = VulkanInstance::new(
            &required_extensions,
            &config.application_name,
            config.application_version,
            config.validation_enabled(),
        )?;

        let surface = Surface::new(&instance, window)?;

        let physical_devices = unsafe { instance.instance.enumerate_physical_devices() }
            .map_err(VulkanError::Api)?;
        let candidates = queried_candidates(
            physical_devices
                .into_iter()
                .map(|pd| (pd, DeviceCandidate::query(&instance.instance, pd, &surface))),
        );

        let required_device_extensions = LogicalDevice::required_extensions();
        let physical_device =
            select_device(candidates, &required_device_extensions, config.device_selection)?;
        log::info!(
            "Selected GPU: {} ({:?})",
            physical_device.name,
            physical_device.device_type
        );

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        let swapchain = Swapchain::new(
            &device,
            &surface,
            &physical_device,
            window.framebuffer_size(),
            config.prefer_mailbox,
            vk::SwapchainKHR::null(),
        )?;
        let upload_pool = CommandPool::new(device.device.clone(), device.graphics_family)?;

        Ok(Self {
            upload_pool,
            swapchain,
            device,
            physical_device,
            surface,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the raw Device handle
    pub fn raw_device(&self) -> &ash::Device {
        &self.device.device
    }

    /// Get the current swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Memory heaps and types of the selected GPU
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Format capabilities of the selected GPU
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device.handle, format)
        }
    }

    /// Record commands with `record`, submit them to the graphics queue and block until done
    pub fn one_time_submit<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        self.upload_pool.one_time_submit(self.device.graphics_queue, record)
    }

    /// Recreate the swapchain for a new framebuffer size
    ///
    /// Waits for the device to go idle, re-queries surface support, creates the
    /// replacement passing the old handle, then swaps it in as one unit.
    pub fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32), prefer_mailbox: bool) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::Api)?;

        let new_swapchain = Swapchain::new(
            &self.device,
            &self.surface,
            &self.physical_device,
            framebuffer_size,
            prefer_mailbox,
            self.swapchain.handle(),
        )?;
        self.swapchain = new_swapchain;

        log::info!(
            "Swapchain recreated: {}x{}, {} images",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_names_reports_only_absent_entries() {
        let required = vec!["VK_KHR_surface".to_string(), "VK_KHR_xcb_surface".to_string()];
        let available = vec!["VK_KHR_surface".to_string(), "VK_EXT_debug_utils".to_string()];
        assert_eq!(missing_names(&required, &available), vec!["VK_KHR_xcb_surface".to_string()]);
        assert!(missing_names(&[], &available).is_empty());
    }

    #[test]
    fn test_vk_name_conversion_stops_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"GPU\0junk") {
            *dst = *src as c_char;
        }
        assert_eq!(vk_name_to_string(&raw), "GPU");
    }

    #[test]
    fn test_nul_in_name_is_rejected() {
        assert!(to_cstring("bad\0name").is_err());
    }
}
