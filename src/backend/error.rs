// Error taxonomy for the Vulkan backend
//
// Every failure is one of three kinds:
// - Configuration: the platform can't give us what we need (fatal at init)
// - ResourceExhaustion: an allocation failed (fatal where it happens)
// - Outdated: swapchain no longer matches the surface (recoverable in principle)

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`RenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ResourceExhaustion,
    Outdated,
}

/// Backend errors.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("No Vulkan-capable GPU found")]
    NoPhysicalDevice,

    #[error("No queue family supports both graphics and presentation")]
    NoSuitableQueueFamily,

    #[error("Validation layer {0} is not available")]
    ValidationLayerMissing(String),

    #[error("Unsupported window system: {0}")]
    UnsupportedPlatform(String),

    #[error("Surface does not support format {format:?} / {color_space:?}")]
    UnsupportedSurfaceFormat {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    #[error("Device was created without a surface")]
    Headless,

    #[error("Swapchain has {actual} images, expected exactly {expected}")]
    SwapchainImageCount { expected: u32, actual: u32 },

    #[error("Swapchain image index {index} is outside 0..{count}")]
    ImageIndexOutOfRange { index: u32, count: u32 },

    #[error("No memory type matches filter {type_filter:#b} with flags {flags:?}")]
    NoCompatibleMemoryType {
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("Buffer size must be non-zero")]
    EmptyBuffer,

    #[error("Upload of {actual} bytes does not fit a {expected} byte resource")]
    UploadSizeMismatch {
        expected: vk::DeviceSize,
        actual: vk::DeviceSize,
    },

    #[error("No texel size known for format {0:?}")]
    UnsupportedTextureFormat(vk::Format),

    #[error("Invalid layout transition {from:?} -> {to:?}")]
    LayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    #[error("Failed to read shader binary {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shader binary {0:?} is empty")]
    EmptyShader(PathBuf),

    #[error("Invalid SPIR-V: {0}")]
    InvalidSpirv(#[source] std::io::Error),

    #[error("Frame sequence violated: {0}")]
    FrameSequence(#[from] crate::frame::SequenceError),

    #[error("Queue rejected draw submission: {0}")]
    SubmitRejected(vk::Result),

    #[error("Swapchain is out of date")]
    Outdated,

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCompatibleMemoryType { .. } | Self::SwapchainImageCount { .. } => {
                ErrorKind::ResourceExhaustion
            }
            Self::Outdated => ErrorKind::Outdated,
            Self::Vulkan { result, .. } => classify(*result),
            _ => ErrorKind::Configuration,
        }
    }

    pub fn is_outdated(&self) -> bool {
        self.kind() == ErrorKind::Outdated
    }
}

/// Map a raw Vulkan error code onto the taxonomy.
pub fn classify(result: vk::Result) -> ErrorKind {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_TOO_MANY_OBJECTS
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL => ErrorKind::ResourceExhaustion,
        vk::Result::ERROR_OUT_OF_DATE_KHR => ErrorKind::Outdated,
        _ => ErrorKind::Configuration,
    }
}

/// Attach the name of the failing call to a raw `VkResult`.
pub trait VkResultExt<T> {
    fn vk_context(self, call: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn vk_context(self, call: &'static str) -> Result<T> {
        self.map_err(|result| RenderError::Vulkan { call, result })
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_errors_are_resource_exhaustion() {
        for result in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        ] {
            let err = RenderError::Vulkan { call: "vkAllocateMemory", result };
            assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
        }
    }

    #[test]
    fn out_of_date_is_outdated() {
        let err: Result<()> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR).vk_context("vkQueuePresentKHR");
        assert!(err.unwrap_err().is_outdated());
        assert!(RenderError::Outdated.is_outdated());
    }

    #[test]
    fn selection_failures_are_configuration() {
        assert_eq!(RenderError::NoPhysicalDevice.kind(), ErrorKind::Configuration);
        assert_eq!(RenderError::NoSuitableQueueFamily.kind(), ErrorKind::Configuration);
        assert_eq!(
            RenderError::SubmitRejected(vk::Result::ERROR_DEVICE_LOST).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            RenderError::Vulkan {
                call: "vkCreateGraphicsPipelines",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            }
            .kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn allocation_failures_are_resource_exhaustion() {
        let err = RenderError::NoCompatibleMemoryType {
            type_filter: 0b101,
            flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
        let err = RenderError::SwapchainImageCount { expected: 2, actual: 3 };
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    }

    #[test]
    fn bad_upload_requests_are_configuration() {
        assert_eq!(RenderError::EmptyBuffer.kind(), ErrorKind::Configuration);
        let err = RenderError::UploadSizeMismatch { expected: 16, actual: 32 };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "Upload of 32 bytes does not fit a 16 byte resource"
        );
        assert_eq!(
            RenderError::UnsupportedTextureFormat(vk::Format::D32_SFLOAT).kind(),
            ErrorKind::Configuration
        );
    }
}
