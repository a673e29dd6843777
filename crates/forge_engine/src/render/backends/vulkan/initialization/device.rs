//! Physical device selection and logical device creation
//!
//! Selection works on [`DeviceCandidate`] snapshots so that the suitability rules
//! can be exercised without a GPU. Snapshots are taken fresh each time devices are
//! enumerated.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use serde::{Deserialize, Serialize};

use super::context::{vk_name_to_string, VulkanError, VulkanResult};
use super::surface::Surface;

/// How to choose among several suitable devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// First suitable device in enumeration order
    #[default]
    FirstSuitable,
    /// Suitable device with the largest device-local heap
    MostVideoMemory,
}

/// Queue family indices needed for rendering and presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics commands
    pub graphics: Option<u32>,
    /// Family able to present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Pick graphics and present families
    ///
    /// A family that supports both is preferred; otherwise the first of each kind.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> VulkanResult<bool>,
    ) -> VulkanResult<Self> {
        let mut indices = Self::default();
        for (index, family) in (0u32..).zip(families) {
            let graphics = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(index)?;

            if graphics && present {
                return Ok(Self {
                    graphics: Some(index),
                    present: Some(index),
                });
            }
            if graphics && indices.graphics.is_none() {
                indices.graphics = Some(index);
            }
            if present && indices.present.is_none() {
                indices.present = Some(index);
            }
        }
        Ok(indices)
    }

    /// Both families were found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices (one entry when graphics and present alias)
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.iter().chain(self.present.iter()).copied().collect();
        families.dedup();
        families
    }
}

/// Surface capabilities, formats and present modes of a device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    /// Surface capabilities (extents, image counts, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query support for `physical_device` on `surface`
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> VulkanResult<Self> {
        Ok(Self {
            capabilities: surface.capabilities(physical_device)?,
            formats: surface.formats(physical_device)?,
            present_modes: surface.present_modes(physical_device)?,
        })
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Per-criterion result of a suitability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuitabilityReport {
    /// Discrete or integrated GPU
    pub gpu_type: bool,
    /// A graphics queue family exists
    pub graphics_queue: bool,
    /// A present queue family exists
    pub present_queue: bool,
    /// Every required device extension is supported
    pub extensions: bool,
    /// Formats and present modes are both non-empty
    pub swapchain: bool,
    /// Anisotropic sampling is supported
    pub sampler_anisotropy: bool,
}

impl SuitabilityReport {
    /// All criteria passed
    pub fn is_suitable(&self) -> bool {
        self.failures().is_empty()
    }

    /// Names of the criteria that failed
    pub fn failures(&self) -> Vec<&'static str> {
        [
            (self.gpu_type, "not a discrete or integrated GPU"),
            (self.graphics_queue, "no graphics queue family"),
            (self.present_queue, "no present queue family"),
            (self.extensions, "missing required device extensions"),
            (self.swapchain, "no surface formats or present modes"),
            (self.sampler_anisotropy, "no anisotropic sampling"),
        ]
        .into_iter()
        .filter_map(|(passed, reason)| (!passed).then_some(reason))
        .collect()
    }
}

/// Capability snapshot of one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    /// Vulkan physical device handle
    pub handle: vk::PhysicalDevice,
    /// Marketing name reported by the driver
    pub name: String,
    /// Discrete, integrated, virtual, CPU or other
    pub device_type: vk::PhysicalDeviceType,
    /// Graphics and present queue families
    pub queue_families: QueueFamilyIndices,
    /// Supported device extension names
    pub extensions: Vec<String>,
    /// Surface support for this device
    pub swapchain_support: SwapchainSupport,
    /// `samplerAnisotropy` feature
    pub sampler_anisotropy: bool,
    /// Device limits
    pub limits: vk::PhysicalDeviceLimits,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceCandidate {
    /// Snapshot the capabilities of `handle` against `surface`
    pub fn query(instance: &Instance, handle: vk::PhysicalDevice, surface: &Surface) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let features = unsafe { instance.get_physical_device_features(handle) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(handle) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(handle) };

        let queue_families =
            QueueFamilyIndices::find(&families, |index| surface.supports_present(handle, index))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(handle) }
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| vk_name_to_string(&ext.extension_name))
            .collect();

        Ok(Self {
            handle,
            name: vk_name_to_string(&properties.device_name),
            device_type: properties.device_type,
            queue_families,
            extensions,
            swapchain_support: SwapchainSupport::query(surface, handle)?,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            limits: properties.limits,
            memory_properties,
        })
    }

    /// Evaluate every suitability criterion
    pub fn suitability(&self, required_extensions: &[String]) -> SuitabilityReport {
        SuitabilityReport {
            gpu_type: matches!(
                self.device_type,
                vk::PhysicalDeviceType::DISCRETE_GPU | vk::PhysicalDeviceType::INTEGRATED_GPU
            ),
            graphics_queue: self.queue_families.graphics.is_some(),
            present_queue: self.queue_families.present.is_some(),
            extensions: required_extensions.iter().all(|ext| self.extensions.contains(ext)),
            swapchain: self.swapchain_support.is_adequate(),
            sampler_anisotropy: self.sampler_anisotropy,
        }
    }

    /// Whether this device can run the renderer
    pub fn is_suitable(&self, required_extensions: &[String]) -> bool {
        self.suitability(required_extensions).is_suitable()
    }

    /// Total size of device-local memory heaps
    pub fn device_local_memory(&self) -> u64 {
        let heap_count = self.memory_properties.memory_heap_count as usize;
        self.memory_properties.memory_heaps[..heap_count.min(vk::MAX_MEMORY_HEAPS)]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Highest sample count usable for both colour and depth attachments
    pub fn max_sample_count(&self) -> vk::SampleCountFlags {
        max_usable_sample_count(&self.limits)
    }
}

/// Highest of 8/4/2/1 samples supported by both colour and depth framebuffers
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Keep the adapters whose capability query succeeded
///
/// A failing adapter is logged and skipped so the others can still be selected.
pub fn queried_candidates<T>(results: impl IntoIterator<Item = (vk::PhysicalDevice, VulkanResult<T>)>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|(handle, result)| match result {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                log::warn!("Skipping physical device {:?}: capability query failed: {}", handle, e);
                None
            }
        })
        .collect()
}

/// Choose a device from `candidates`
///
/// Every candidate's suitability report is logged. Fails with
/// [`VulkanError::NoSuitableDevice`] when none pass.
pub fn select_device(
    candidates: Vec<DeviceCandidate>,
    required_extensions: &[String],
    policy: SelectionPolicy,
) -> VulkanResult<DeviceCandidate> {
    let mut rejected = Vec::new();
    let mut suitable = Vec::new();

    for candidate in candidates {
        let report = candidate.suitability(required_extensions);
        if report.is_suitable() {
            log::debug!("GPU '{}' is suitable", candidate.name);
            suitable.push(candidate);
        } else {
            let reasons = report.failures().join(", ");
            log::debug!("GPU '{}' rejected: {}", candidate.name, reasons);
            rejected.push(format!("{} ({reasons})", candidate.name));
        }
    }

    let chosen = match policy {
        SelectionPolicy::FirstSuitable => suitable.into_iter().next(),
        SelectionPolicy::MostVideoMemory => {
            suitable.into_iter().rev().max_by_key(DeviceCandidate::device_local_memory)
        }
    };

    chosen.ok_or_else(|| {
        if rejected.is_empty() {
            VulkanError::NoSuitableDevice("no Vulkan devices found".to_string())
        } else {
            VulkanError::NoSuitableDevice(rejected.join("; "))
        }
    })
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Vulkan logical device handle
    pub device: Device,
}

impl LogicalDevice {
    /// Device extensions the renderer cannot run without
    pub fn required_extensions() -> Vec<String> {
        vec![SwapchainLoader::name().to_string_lossy().into_owned()]
    }

    /// Create a logical device with one queue per unique family
    pub fn new(instance: &Instance, candidate: &DeviceCandidate) -> VulkanResult<Self> {
        let (Some(graphics_family), Some(present_family)) =
            (candidate.queue_families.graphics, candidate.queue_families.present)
        else {
            return Err(VulkanError::InitializationFailed(format!(
                "{} has incomplete queue families",
                candidate.name
            )));
        };

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = candidate
            .queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(candidate.handle, &create_info, None) }
            .map_err(VulkanError::Api)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!(
            "Created logical device (graphics family {}, present family {})",
            graphics_family,
            present_family
        );

        Ok(Self {
            swapchain_loader,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
            device,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn suitable_candidate(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            handle: vk::PhysicalDevice::null(),
            name: name.to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            extensions: LogicalDevice::required_extensions(),
            swapchain_support: SwapchainSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
            sampler_anisotropy: true,
            limits: vk::PhysicalDeviceLimits::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
        }
    }

    fn with_local_memory(mut candidate: DeviceCandidate, size: u64) -> DeviceCandidate {
        candidate.memory_properties.memory_heap_count = 1;
        candidate.memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        candidate
    }

    fn required() -> Vec<String> {
        LogicalDevice::required_extensions()
    }

    #[test]
    fn test_complete_candidate_is_suitable() {
        assert!(suitable_candidate("gpu").is_suitable(&required()));
        assert!(suitable_candidate("gpu").suitability(&required()).failures().is_empty());
    }

    #[test]
    fn test_each_criterion_fails_independently() {
        let mutations: Vec<(&str, fn(&mut DeviceCandidate))> = vec![
            ("not a discrete or integrated GPU", |c| c.device_type = vk::PhysicalDeviceType::CPU),
            ("no graphics queue family", |c| c.queue_families.graphics = None),
            ("no present queue family", |c| c.queue_families.present = None),
            ("missing required device extensions", |c| c.extensions.clear()),
            ("no surface formats or present modes", |c| c.swapchain_support.formats.clear()),
            ("no surface formats or present modes", |c| c.swapchain_support.present_modes.clear()),
            ("no anisotropic sampling", |c| c.sampler_anisotropy = false),
        ];

        for (expected, mutate) in mutations {
            let mut candidate = suitable_candidate("gpu");
            mutate(&mut candidate);
            let report = candidate.suitability(&required());
            assert!(!report.is_suitable(), "{expected} should make the device unsuitable");
            assert_eq!(report.failures(), vec![expected]);
        }
    }

    #[test]
    fn test_integrated_gpu_is_accepted_but_virtual_is_not() {
        let mut candidate = suitable_candidate("igpu");
        candidate.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert!(candidate.is_suitable(&required()));

        candidate.device_type = vk::PhysicalDeviceType::VIRTUAL_GPU;
        assert!(!candidate.is_suitable(&required()));
    }

    #[test]
    fn test_first_suitable_policy_keeps_enumeration_order() {
        let mut broken = suitable_candidate("broken");
        broken.sampler_anisotropy = false;
        let candidates = vec![
            broken,
            with_local_memory(suitable_candidate("small"), 1 << 30),
            with_local_memory(suitable_candidate("big"), 8 << 30),
        ];

        let chosen = select_device(candidates, &required(), SelectionPolicy::FirstSuitable).unwrap();
        assert_eq!(chosen.name, "small");
    }

    #[test]
    fn test_most_video_memory_policy() {
        let candidates = vec![
            with_local_memory(suitable_candidate("small"), 1 << 30),
            with_local_memory(suitable_candidate("big"), 8 << 30),
            with_local_memory(suitable_candidate("also big"), 8 << 30),
        ];

        let chosen = select_device(candidates, &required(), SelectionPolicy::MostVideoMemory).unwrap();
        assert_eq!(chosen.name, "big");
    }

    #[test]
    fn test_no_suitable_device_is_an_error() {
        let mut cpu = suitable_candidate("llvmpipe");
        cpu.device_type = vk::PhysicalDeviceType::CPU;

        let err = select_device(vec![cpu], &required(), SelectionPolicy::FirstSuitable).unwrap_err();
        assert!(matches!(err, VulkanError::NoSuitableDevice(ref msg) if msg.contains("llvmpipe")));

        assert!(matches!(
            select_device(Vec::new(), &required(), SelectionPolicy::FirstSuitable),
            Err(VulkanError::NoSuitableDevice(_))
        ));
    }

    #[test]
    fn test_queue_family_search_prefers_combined_family() {
        let graphics_only = vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS,
            queue_count: 1,
            ..Default::default()
        };
        let transfer_only = vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::TRANSFER,
            queue_count: 1,
            ..Default::default()
        };

        let families = [graphics_only, transfer_only, graphics_only];
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i >= 1)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(2), present: Some(2) });
        assert_eq!(indices.unique(), vec![2]);

        let families = [graphics_only, transfer_only];
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(0), present: Some(1) });
        assert!(indices.is_complete());
        assert_eq!(indices.unique(), vec![0, 1]);

        let indices = QueueFamilyIndices::find(&[transfer_only], |_| Ok(true)).unwrap();
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_max_usable_sample_count_uses_colour_and_depth_intersection() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            max_usable_sample_count(&vk::PhysicalDeviceLimits::default()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_failed_adapter_query_is_skipped() {
        let results = vec![
            (
                vk::PhysicalDevice::null(),
                Err(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED)),
            ),
            (vk::PhysicalDevice::null(), Ok(suitable_candidate("Working GPU"))),
        ];

        let candidates = queried_candidates(results);
        assert_eq!(candidates.len(), 1);

        let chosen = select_device(
            candidates,
            &LogicalDevice::required_extensions(),
            SelectionPolicy::FirstSuitable,
        )
        .unwrap();
        assert_eq!(chosen.name, "Working GPU");
    }
}
