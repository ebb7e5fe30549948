// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with typed errors and explicit ownership.
// Leaf-first: instance -> surface -> device -> swapchain -> context, then the
// resource helpers (buffer, image, command, upload), shader/pipeline and sync.

pub mod buffer;
pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use context::GraphicsContext;
pub use device::VulkanDevice;
pub use error::{ErrorKind, RenderError};
pub use swapchain::Swapchain;
