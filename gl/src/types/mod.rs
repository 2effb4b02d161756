//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the backend.

mod buffer;
mod common;
mod sampler;
mod texture;

pub use buffer::{BufferDescriptor, BufferType, BufferUsage, IndexFormat};
pub use common::{ClearColor, DepthStencilClearValue, ScissorRect, Viewport};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
pub use texture::{GlFormat, TextureDescriptor, TextureFlags, TextureFormat, mip_size};
