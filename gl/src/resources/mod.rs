//! GPU resources.
//!
//! This module contains the resource types created through [`GlRhi`]:
//! - [`Buffer`] - vertex, index and storage buffers, or host-side uniform data
//! - [`Texture`] - textures, including imported foreign handles
//! - [`RenderBuffer`] - storage-only depth/stencil or multisample color
//! - [`Sampler`] - immutable sampling state
//! - [`TextureRenderTarget`] - a framebuffer object over textures and renderbuffers
//!
//! Resources are reference-counted with [`Arc`] and can be shared across
//! threads. Each owned driver handle goes to the backend's
//! [`DeferredReleaseQueue`](crate::release::DeferredReleaseQueue) on
//! `destroy()` or drop; nothing is deleted synchronously.
//!
//! [`GlRhi`]: crate::GlRhi
//! [`Arc`]: std::sync::Arc

use std::sync::atomic::{AtomicU64, Ordering};

mod buffer;
mod render_target;
mod renderbuffer;
mod sampler;
mod texture;

pub use buffer::Buffer;
pub use render_target::{
    ColorAttachment, DepthStencilAttachment, RenderPassDescriptor, RenderTarget,
    SwapchainRenderTarget, TextureRenderTarget, TextureRenderTargetDescriptor,
    TextureRenderTargetFlags,
};
pub use renderbuffer::{RenderBuffer, RenderBufferDescriptor, RenderBufferKind};
pub use sampler::{GlSamplerState, Sampler};
pub use texture::{NativeTexture, Texture, TexturePlan};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique resource identity.
///
/// Identities never repeat, unlike GL names which the driver recycles, so
/// the usage tracker and the elision state key on them.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}
