//! # RedLilium GL
//!
//! OpenGL, OpenGL ES and WebGL rendering backend for RedLilium.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GlRhi`] - The backend context: capability detection, frame bracket,
//!   resource and pipeline factories
//! - [`CommandBuffer`] - Records passes, draws, dispatches and resource
//!   updates without touching the driver
//! - [`CommandExecutor`] - Replays recorded commands on the context thread
//! - [`GlDriver`] - The narrow driver seam, with [`GlowDriver`] for real
//!   contexts and `DummyDriver` (feature `dummy`) for tests
//! - [`platform`] - Context and surface traits the windowing layer implements
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_gl::{GlRhi, RhiParameters, FrameOpResult};
//!
//! let mut rhi = GlRhi::create(RhiParameters::from_env(), driver, context, Some(&*surface))?;
//! let mut swapchain = rhi.create_swapchain(surface, SwapchainDescriptor::new());
//! swapchain.create_or_resize(&mut rhi)?;
//!
//! loop {
//!     match rhi.begin_frame(&mut swapchain) {
//!         FrameOpResult::Success => {}
//!         FrameOpResult::Error => continue,
//!         FrameOpResult::DeviceLost => break, // recreate everything
//!     }
//!     let target = swapchain.render_target();
//!     let cb = swapchain.command_buffer_mut();
//!     cb.begin_pass(&target, [0.1, 0.1, 0.1, 1.0], Default::default(), None);
//!     cb.end_pass(None);
//!     rhi.end_frame(&mut swapchain);
//! }
//! ```

pub mod bindings;
pub mod cache;
pub mod caps;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod profiling;
pub mod release;
pub mod resources;
pub mod rhi;
pub mod shader;
pub mod swapchain;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use bindings::{Binding, BindingResource, ShaderResourceBindings, ShaderStageFlags};
pub use cache::{DiskShaderCache, PipelineBlobCache, PipelineCacheKey, ShaderBinaryCache};
pub use caps::{Capabilities, Feature, GlVersion, ResourceLimit};
pub use command::{
    Command, CommandBuffer, CommandExecutor, ExecutionStats, PassType, ResourceUpdateBatch,
};
pub use config::{RhiParameters, SurfaceFormat};
pub use driver::{GlDriver, GlHandle};
#[cfg(not(target_arch = "wasm32"))]
pub use driver::GlowDriver;
pub use error::{FrameOpResult, GraphicsError};
pub use pipeline::{
    ComputePipeline, ComputePipelineDescriptor, GraphicsPipeline, GraphicsPipelineDescriptor,
};
pub use platform::{ContextProvider, HeadlessContext, HeadlessSurface, Surface};
pub use release::{DeferredRelease, DeferredReleaseQueue};
pub use resources::{Buffer, RenderBuffer, RenderTarget, Sampler, Texture, TextureRenderTarget};
pub use rhi::{GlRhi, RhiStatistics};
pub use swapchain::{Swapchain, SwapchainDescriptor};
pub use types::{
    BufferDescriptor, BufferType, BufferUsage, SamplerDescriptor, TextureDescriptor,
    TextureFlags, TextureFormat,
};

/// Backend library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
