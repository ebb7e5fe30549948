//! Vulkan bootstrap that renders a 2x2 checker-textured quad.
//!
//! The library holds everything that can be exercised without a window:
//! device bring-up, staged uploads, the pipeline, and a GPU-agnostic frame
//! loop. The binary wires these to a winit window.

pub mod backend;
pub mod config;
pub mod frame;
pub mod quad;
pub mod renderer;
pub mod window;
