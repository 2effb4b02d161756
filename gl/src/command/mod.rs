//! Command recording and replay.
//!
//! Nothing recorded into a [`CommandBuffer`] touches the driver. Every call
//! appends a [`Command`], a plain value carrying raw GL names and `Arc`
//! snapshots of immutable pipeline state, and variable-length payloads go
//! into side pools owned by the buffer. The [`CommandExecutor`] later
//! replays the stream in order on the thread that has the context current.
//!
//! ```text
//!   record (any thread)                       replay (context thread)
//!  ┌─────────────────────┐                 ┌──────────────────────────┐
//!  │ CommandBuffer        │   end_frame    │ CommandExecutor           │
//!  │  commands: Vec<..>   │ ─────────────► │  transient bind state     │
//!  │  pools: bytes,       │                │  sampler-state cache      │
//!  │   uniform snapshots, │                │  core-profile VAO         │
//!  │   texture units,     │                └──────────────────────────┘
//!  │   trackers, ...      │
//!  └─────────────────────┘
//! ```
//!
//! Payload indices stay valid until [`CommandBuffer::reset_commands`].

mod buffer;
mod executor;
mod pool;
mod updates;

pub use buffer::{CommandBuffer, PassType};
pub use executor::{CommandExecutor, ExecutionStats};
pub use updates::{
    BufferReadbackCallback, BufferReadbackResult, ResourceUpdate, ResourceUpdateBatch,
    TextureCopyDescription, TextureCopyLocation, TextureReadbackCallback,
    TextureReadbackDescription, TextureReadbackResult, TextureSubresourceUpload,
    TextureUploadDescription, TextureUploadEntry,
};

pub(crate) use pool::{
    CommandPools, PendingReadback, ResourceSet, StorageBinding, TextureUnitBinding, UnitKind,
    UniformSnapshot,
};

use std::sync::Arc;

use crate::driver::GlHandle;
use crate::pipeline::{ComputePipelineState, GraphicsPipelineState};
use crate::tracker::MemoryBarriers;
use crate::types::{ClearColor, ScissorRect, TextureFormat, Viewport};

/// One texture subresource addressed by raw GL name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRef {
    pub handle: GlHandle,
    /// Bind target of the whole texture.
    pub target: u32,
    pub level: u32,
    /// Cube face, array layer or 3D slice.
    pub layer: u32,
}

impl TextureRef {
    /// Target of per-image calls: the face target for cube maps.
    pub fn image_target(&self) -> u32 {
        if self.target == glow::TEXTURE_CUBE_MAP {
            glow::TEXTURE_CUBE_MAP_POSITIVE_X + self.layer.min(5)
        } else {
            self.target
        }
    }

    /// Whether layers are addressed through a z coordinate.
    pub fn is_layered(&self) -> bool {
        matches!(
            self.target,
            glow::TEXTURE_3D | glow::TEXTURE_2D_ARRAY | glow::TEXTURE_CUBE_MAP_ARRAY
        )
    }
}

/// Where a pixel readback reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// A texture subresource, attached to a temporary framebuffer.
    Texture(TextureRef),
    /// The color buffer of a surface's framebuffer.
    Framebuffer(GlHandle),
}

/// A recorded operation.
///
/// Variants carry raw GL names and plain values only. Payload fields named
/// `data`, `set` or `readback` index the owning buffer's side pools.
#[derive(Debug, Clone)]
pub enum Command {
    /// Start of a frame; resets transient replay state.
    BeginFrame,
    EndFrame,
    /// Start of an offscreen frame or a `finish()` batch; resets transient
    /// replay state like `BeginFrame`.
    ResetFrame,
    Viewport(Viewport),
    Scissor(ScissorRect),
    BlendConstants(ClearColor),
    StencilRef(u32),
    BindVertexBuffer {
        buffer: GlHandle,
        offset: u32,
        binding: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        buffer: GlHandle,
        index_type: u32,
        /// Byte offset of the first index.
        offset: u32,
        index_count: u32,
        instance_count: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    BindGraphicsPipeline(Arc<GraphicsPipelineState>),
    BindShaderResources {
        set: usize,
    },
    BindFramebuffer {
        framebuffer: GlHandle,
        is_default: bool,
        color_attachment_count: u32,
        srgb: bool,
    },
    Clear {
        mask: u32,
        color: ClearColor,
        depth: f32,
        stencil: u32,
    },
    BufferSubData {
        target: u32,
        buffer: GlHandle,
        offset: u32,
        data: usize,
    },
    GetBufferSubData {
        target: u32,
        buffer: GlHandle,
        offset: u32,
        size: u32,
        readback: usize,
    },
    CopyTex {
        src: TextureRef,
        src_origin: [i32; 2],
        dst: TextureRef,
        dst_origin: [i32; 2],
        size: [i32; 2],
    },
    ReadPixels {
        source: ReadSource,
        width: u32,
        height: u32,
        format: TextureFormat,
        gl_format: u32,
        gl_type: u32,
        readback: usize,
    },
    SubImage {
        texture: TextureRef,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        /// Needed to respecify 1D levels, which have no sub-image call.
        internal_format: u32,
        format: u32,
        ty: u32,
        data: usize,
    },
    CompressedImage {
        texture: TextureRef,
        internal_format: u32,
        width: u32,
        height: u32,
        /// Slices of 3D textures or layers of arrays, 1 otherwise.
        depth: u32,
        data: usize,
    },
    CompressedSubImage {
        texture: TextureRef,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        internal_format: u32,
        data: usize,
    },
    BlitFromRenderbuffer {
        renderbuffer: GlHandle,
        width: u32,
        height: u32,
        dst: TextureRef,
    },
    BlitFromTexture {
        src: TextureRef,
        width: u32,
        height: u32,
        dst: TextureRef,
    },
    GenMip {
        texture: GlHandle,
        target: u32,
    },
    BindComputePipeline(Arc<ComputePipelineState>),
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    /// Barrier decision for the pass whose tracker is `tracker`.
    BarriersForPass {
        tracker: usize,
    },
    Barrier(MemoryBarriers),
    /// Discard the depth-stencil contents of the bound framebuffer.
    InvalidateFramebuffer {
        is_default: bool,
    },
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}

impl Command {
    /// Variant name for logs and tests.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeginFrame => "BeginFrame",
            Self::EndFrame => "EndFrame",
            Self::ResetFrame => "ResetFrame",
            Self::Viewport(_) => "Viewport",
            Self::Scissor(_) => "Scissor",
            Self::BlendConstants(_) => "BlendConstants",
            Self::StencilRef(_) => "StencilRef",
            Self::BindVertexBuffer { .. } => "BindVertexBuffer",
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
            Self::BindGraphicsPipeline(_) => "BindGraphicsPipeline",
            Self::BindShaderResources { .. } => "BindShaderResources",
            Self::BindFramebuffer { .. } => "BindFramebuffer",
            Self::Clear { .. } => "Clear",
            Self::BufferSubData { .. } => "BufferSubData",
            Self::GetBufferSubData { .. } => "GetBufferSubData",
            Self::CopyTex { .. } => "CopyTex",
            Self::ReadPixels { .. } => "ReadPixels",
            Self::SubImage { .. } => "SubImage",
            Self::CompressedImage { .. } => "CompressedImage",
            Self::CompressedSubImage { .. } => "CompressedSubImage",
            Self::BlitFromRenderbuffer { .. } => "BlitFromRenderbuffer",
            Self::BlitFromTexture { .. } => "BlitFromTexture",
            Self::GenMip { .. } => "GenMip",
            Self::BindComputePipeline(_) => "BindComputePipeline",
            Self::Dispatch { .. } => "Dispatch",
            Self::BarriersForPass { .. } => "BarriersForPass",
            Self::Barrier(_) => "Barrier",
            Self::InvalidateFramebuffer { .. } => "InvalidateFramebuffer",
            Self::PushDebugGroup(_) => "PushDebugGroup",
            Self::PopDebugGroup => "PopDebugGroup",
            Self::InsertDebugMarker(_) => "InsertDebugMarker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_face_image_target() {
        let face = TextureRef {
            handle: 3,
            target: glow::TEXTURE_CUBE_MAP,
            level: 0,
            layer: 2,
        };
        assert_eq!(face.image_target(), glow::TEXTURE_CUBE_MAP_POSITIVE_X + 2);
        assert!(!face.is_layered());

        let slice = TextureRef {
            target: glow::TEXTURE_2D_ARRAY,
            ..face
        };
        assert_eq!(slice.image_target(), glow::TEXTURE_2D_ARRAY);
        assert!(slice.is_layered());
    }
}
