//! The command buffer: pass state machine and recording.

use std::sync::Arc;

use super::pool::{CommandPools, ResourceSet, StorageBinding, TextureUnitBinding, UnitKind, UniformSnapshot};
use super::updates::ResourceUpdateBatch;
use super::{Command, TextureRef};
use crate::bindings::{BindingResource, ShaderResourceBindings, ShaderStageFlags};
use crate::driver::GlHandle;
use crate::pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineState};
use crate::resources::{
    Buffer, DepthStencilAttachment, RenderTarget, SwapchainRenderTarget, Texture,
    TextureRenderTargetFlags,
};
use crate::tracker::{BufferAccess, ComputePassState, MemoryBarriers, PassStage, TextureAccess};
use crate::types::{ClearColor, DepthStencilClearValue, IndexFormat, ScissorRect, Viewport};

/// Which kind of pass is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassType {
    #[default]
    None,
    Render,
    Compute,
}

/// Everything that decides whether a shader resource bind is redundant.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SrbKey {
    srb: u64,
    generation: u64,
    pipeline: (u64, u64),
    dynamic_offsets: Vec<(i32, u32)>,
    uniform_generations: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexBinding {
    buffer: GlHandle,
    offset: u32,
    format: IndexFormat,
}

/// Recording-time state. Only used to validate calls and elide repeats.
#[derive(Debug, Default)]
struct RecordingState {
    pass: PassType,
    target: Option<RenderTarget>,
    tracker: Option<usize>,
    graphics_pipeline: Option<(u64, u64)>,
    graphics_state: Option<Arc<GraphicsPipelineState>>,
    compute_pipeline: Option<(u64, u64)>,
    srb: Option<SrbKey>,
    /// Per slot: buffer identity and offset.
    vertex_buffers: Vec<Option<(u64, u32)>>,
    index: Option<IndexBinding>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    blend_constants: Option<ClearColor>,
    stencil_ref: Option<u32>,
    compute: ComputePassState,
    /// Storage accesses of the bound resources, checked at each dispatch.
    storage_buffers: Vec<(u64, BufferAccess)>,
    storage_textures: Vec<(u64, TextureAccess)>,
}

impl RecordingState {
    /// Forget bind state at a pass boundary.
    fn reset_binds(&mut self) {
        self.graphics_pipeline = None;
        self.graphics_state = None;
        self.compute_pipeline = None;
        self.srb = None;
        self.vertex_buffers.clear();
        self.index = None;
        self.viewport = None;
        self.scissor = None;
        self.blend_constants = None;
        self.stencil_ref = None;
        self.compute.reset();
        self.storage_buffers.clear();
        self.storage_textures.clear();
    }
}

/// An append-only stream of commands for one frame.
///
/// Recording never touches the driver, so a command buffer can be filled on
/// any thread. Passes follow a strict state machine:
///
/// ```text
///   None ──begin_pass──► Render ──end_pass──► None
///   None ──begin_compute_pass──► Compute ──end_compute_pass──► None
/// ```
///
/// Calls that break it (nested passes, draws outside a render pass,
/// dispatches outside a compute pass) log a warning and are ignored.
///
/// Binding calls are elided when they would repeat the previously recorded
/// state of the same pass.
pub struct CommandBuffer {
    pub(super) commands: Vec<Command>,
    pub(super) pools: CommandPools,
    /// Surface of the frame being recorded, for back buffer readbacks.
    pub(super) back_buffer: Option<SwapchainRenderTarget>,
    state: RecordingState,
    debug_markers: bool,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            pools: CommandPools::default(),
            back_buffer: None,
            state: RecordingState::default(),
            debug_markers: false,
        }
    }

    /// Record debug groups and markers.
    pub fn with_debug_markers(mut self, enabled: bool) -> Self {
        self.debug_markers = enabled;
        self
    }

    pub(crate) fn set_back_buffer(&mut self, target: Option<SwapchainRenderTarget>) {
        self.back_buffer = target;
    }

    pub fn pass_type(&self) -> PassType {
        self.state.pass
    }

    /// Recorded commands, in replay order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Bytes held in side pools for upload commands and uniform snapshots.
    pub fn retained_bytes(&self) -> usize {
        self.pools.retained_bytes()
    }

    /// Number of pass trackers of the current recording.
    pub fn pass_count(&self) -> usize {
        self.pools.active_trackers
    }

    /// Drop every command and pooled payload, keeping allocations.
    pub fn reset_commands(&mut self) {
        if self.state.pass != PassType::None {
            log::warn!("CommandBuffer: reset with a {:?} pass open", self.state.pass);
        }
        self.commands.clear();
        self.pools.reset();
        self.state.pass = PassType::None;
        self.state.target = None;
        self.state.tracker = None;
        self.state.reset_binds();
    }

    pub(crate) fn mark_frame_begin(&mut self, offscreen: bool) {
        self.commands.push(if offscreen {
            Command::ResetFrame
        } else {
            Command::BeginFrame
        });
    }

    pub(crate) fn mark_frame_end(&mut self) {
        if self.state.pass != PassType::None {
            log::warn!("CommandBuffer: frame ended with a {:?} pass open", self.state.pass);
        }
        self.commands.push(Command::EndFrame);
    }

    pub(crate) fn parts_mut(&mut self) -> (&[Command], &mut CommandPools) {
        (&self.commands, &mut self.pools)
    }

    // ========================================================================
    // Passes
    // ========================================================================

    /// Open a render pass on `target`.
    ///
    /// `updates` are recorded first. Color is cleared unless the target
    /// preserves color contents, depth-stencil unless it preserves
    /// depth-stencil contents.
    pub fn begin_pass(
        &mut self,
        target: &RenderTarget,
        clear_color: ClearColor,
        depth_stencil: DepthStencilClearValue,
        updates: Option<ResourceUpdateBatch>,
    ) {
        if self.state.pass != PassType::None {
            log::warn!("CommandBuffer: begin_pass inside a {:?} pass ignored", self.state.pass);
            return;
        }
        if let Some(updates) = updates {
            self.enqueue_resource_updates(updates);
        }

        let tracker = self.pools.next_tracker();
        self.commands.push(Command::BarriersForPass { tracker });
        self.state.tracker = Some(tracker);
        self.state.pass = PassType::Render;
        self.state.reset_binds();

        self.commands.push(Command::BindFramebuffer {
            framebuffer: target.framebuffer(),
            is_default: target.is_default(),
            color_attachment_count: target.color_attachment_count() as u32,
            srgb: target.srgb_update(),
        });

        let mut mask = glow::COLOR_BUFFER_BIT;
        if let RenderTarget::Texture(rt) = target {
            if rt.flags().contains(TextureRenderTargetFlags::PRESERVE_COLOR_CONTENTS) {
                mask = 0;
            }
            for attachment in rt.color_attachments() {
                if let Some(texture) = &attachment.texture {
                    self.register_texture(texture, TextureAccess::Framebuffer, Some(PassStage::Fragment));
                }
            }
            if let Some(DepthStencilAttachment::Texture(texture)) = rt.depth_stencil() {
                self.register_texture(texture, TextureAccess::Framebuffer, Some(PassStage::Fragment));
            }
        }
        if target.has_depth_stencil() && !target.preserves_depth_stencil() {
            mask |= glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT;
        }
        if mask != 0 {
            self.commands.push(Command::Clear {
                mask,
                color: clear_color,
                depth: depth_stencil.depth,
                stencil: depth_stencil.stencil,
            });
        }
        self.state.target = Some(target.clone());
    }

    /// Close the render pass, resolving multisample attachments, then
    /// record `updates`.
    pub fn end_pass(&mut self, updates: Option<ResourceUpdateBatch>) {
        if self.state.pass != PassType::Render {
            log::warn!("CommandBuffer: end_pass without an open render pass ignored");
            return;
        }
        if let Some(target) = self.state.target.take() {
            if target.has_depth_stencil() && !target.preserves_depth_stencil() {
                self.commands.push(Command::InvalidateFramebuffer {
                    is_default: target.is_default(),
                });
            }
            if let RenderTarget::Texture(rt) = &target {
                for attachment in rt.color_attachments() {
                    let Some(resolve) = &attachment.resolve_texture else {
                        continue;
                    };
                    let dst = TextureRef {
                        handle: resolve.handle(),
                        target: resolve.target(),
                        level: attachment.resolve_level,
                        layer: attachment.resolve_layer,
                    };
                    if let Some(rb) = &attachment.renderbuffer {
                        let (width, height) = rb.pixel_size();
                        self.commands.push(Command::BlitFromRenderbuffer {
                            renderbuffer: rb.handle(),
                            width,
                            height,
                            dst,
                        });
                    } else if let Some(texture) = &attachment.texture {
                        let (width, height) = texture.plan().level_size(attachment.level);
                        self.commands.push(Command::BlitFromTexture {
                            src: TextureRef {
                                handle: texture.handle(),
                                target: texture.target(),
                                level: attachment.level,
                                layer: attachment.layer,
                            },
                            width,
                            height,
                            dst,
                        });
                    }
                    self.register_texture(resolve, TextureAccess::Framebuffer, None);
                }
            }
        }
        self.state.pass = PassType::None;
        self.state.tracker = None;
        if let Some(updates) = updates {
            self.enqueue_resource_updates(updates);
        }
    }

    pub fn begin_compute_pass(&mut self, updates: Option<ResourceUpdateBatch>) {
        if self.state.pass != PassType::None {
            log::warn!(
                "CommandBuffer: begin_compute_pass inside a {:?} pass ignored",
                self.state.pass
            );
            return;
        }
        if let Some(updates) = updates {
            self.enqueue_resource_updates(updates);
        }
        let tracker = self.pools.next_tracker();
        self.commands.push(Command::BarriersForPass { tracker });
        self.state.tracker = Some(tracker);
        self.state.pass = PassType::Compute;
        self.state.reset_binds();
    }

    pub fn end_compute_pass(&mut self, updates: Option<ResourceUpdateBatch>) {
        if self.state.pass != PassType::Compute {
            log::warn!("CommandBuffer: end_compute_pass without an open compute pass ignored");
            return;
        }
        self.state.pass = PassType::None;
        self.state.tracker = None;
        if let Some(updates) = updates {
            self.enqueue_resource_updates(updates);
        }
    }

    /// Record updates between passes.
    pub fn resource_update(&mut self, updates: ResourceUpdateBatch) {
        if self.state.pass != PassType::None {
            log::warn!(
                "CommandBuffer: resource_update inside a {:?} pass ignored",
                self.state.pass
            );
            return;
        }
        self.enqueue_resource_updates(updates);
    }

    pub(crate) fn enqueue_resource_updates(&mut self, updates: ResourceUpdateBatch) {
        for update in updates.into_updates() {
            self.record_update(update);
        }
    }

    // ========================================================================
    // Render pass state
    // ========================================================================

    fn in_render_pass(&self, what: &str) -> bool {
        if self.state.pass == PassType::Render {
            true
        } else {
            log::warn!("CommandBuffer: {what} outside a render pass ignored");
            false
        }
    }

    pub fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        if !self.in_render_pass("set_graphics_pipeline") {
            return;
        }
        if pipeline.program() == 0 {
            log::warn!("CommandBuffer: pipeline {:?} was destroyed", pipeline.label());
            return;
        }
        let key = (pipeline.id(), pipeline.generation());
        if self.state.graphics_pipeline == Some(key) {
            return;
        }
        self.state.graphics_pipeline = Some(key);
        self.state.graphics_state = Some(Arc::clone(pipeline.state()));
        // Attribute setup and uniform uploads depend on the pipeline.
        self.state.srb = None;
        self.state.vertex_buffers.clear();
        self.commands
            .push(Command::BindGraphicsPipeline(Arc::clone(pipeline.state())));
    }

    /// Bind vertex buffers starting at slot `start_binding`, and optionally
    /// an index buffer.
    pub fn set_vertex_input(
        &mut self,
        start_binding: u32,
        bindings: &[(&Buffer, u32)],
        index: Option<(&Buffer, u32, IndexFormat)>,
    ) {
        if !self.in_render_pass("set_vertex_input") {
            return;
        }
        if self.state.graphics_state.is_none() {
            log::warn!("CommandBuffer: set_vertex_input before set_graphics_pipeline ignored");
            return;
        }
        for (i, (buffer, offset)) in bindings.iter().enumerate() {
            let slot = start_binding as usize + i;
            if self.state.vertex_buffers.len() <= slot {
                self.state.vertex_buffers.resize(slot + 1, None);
            }
            let key = Some((buffer.id(), *offset));
            if self.state.vertex_buffers[slot] == key {
                continue;
            }
            self.state.vertex_buffers[slot] = key;
            self.register_buffer(buffer, BufferAccess::Vertex, Some(PassStage::Vertex));
            self.commands.push(Command::BindVertexBuffer {
                buffer: buffer.handle(),
                offset: *offset,
                binding: slot as u32,
            });
        }
        if let Some((buffer, offset, format)) = index {
            self.register_buffer(buffer, BufferAccess::Index, Some(PassStage::Vertex));
            self.state.index = Some(IndexBinding {
                buffer: buffer.handle(),
                offset,
                format,
            });
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if !self.in_render_pass("set_viewport") || self.state.viewport == Some(viewport) {
            return;
        }
        self.state.viewport = Some(viewport);
        self.commands.push(Command::Viewport(viewport));
    }

    /// Enable scissoring with `rect` for the rest of the pass.
    pub fn set_scissor(&mut self, rect: ScissorRect) {
        if !self.in_render_pass("set_scissor") || self.state.scissor == Some(rect) {
            return;
        }
        self.state.scissor = Some(rect);
        self.commands.push(Command::Scissor(rect));
    }

    pub fn set_blend_constants(&mut self, color: ClearColor) {
        if !self.in_render_pass("set_blend_constants") || self.state.blend_constants == Some(color) {
            return;
        }
        self.state.blend_constants = Some(color);
        self.commands.push(Command::BlendConstants(color));
    }

    pub fn set_stencil_ref(&mut self, reference: u32) {
        if !self.in_render_pass("set_stencil_ref") || self.state.stencil_ref == Some(reference) {
            return;
        }
        self.state.stencil_ref = Some(reference);
        self.commands.push(Command::StencilRef(reference));
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        if !self.in_render_pass("draw") {
            return;
        }
        if self.state.graphics_state.is_none() {
            log::warn!("CommandBuffer: draw without a graphics pipeline ignored");
            return;
        }
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if !self.in_render_pass("draw_indexed") {
            return;
        }
        if self.state.graphics_state.is_none() {
            log::warn!("CommandBuffer: draw_indexed without a graphics pipeline ignored");
            return;
        }
        let Some(index) = self.state.index else {
            log::warn!("CommandBuffer: draw_indexed without an index buffer ignored");
            return;
        };
        // The executor hands the byte offset to GL as a signed pointer offset.
        let offset = first_index
            .checked_mul(index.format.size())
            .and_then(|bytes| bytes.checked_add(index.offset))
            .filter(|&offset| offset <= i32::MAX as u32);
        let Some(offset) = offset else {
            log::warn!(
                "CommandBuffer: draw_indexed with first index {} past the addressable range ignored",
                first_index
            );
            return;
        };
        self.commands.push(Command::DrawIndexed {
            buffer: index.buffer,
            index_type: index.format.gl_type(),
            offset,
            index_count,
            instance_count,
            base_vertex: vertex_offset,
            first_instance,
        });
    }

    // ========================================================================
    // Compute pass state
    // ========================================================================

    pub fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline) {
        if self.state.pass != PassType::Compute {
            log::warn!("CommandBuffer: set_compute_pipeline outside a compute pass ignored");
            return;
        }
        if pipeline.program() == 0 {
            log::warn!("CommandBuffer: pipeline {:?} was destroyed", pipeline.label());
            return;
        }
        let key = (pipeline.id(), pipeline.generation());
        if self.state.compute_pipeline == Some(key) {
            return;
        }
        self.state.compute_pipeline = Some(key);
        self.state.srb = None;
        self.commands
            .push(Command::BindComputePipeline(Arc::clone(pipeline.state())));
    }

    /// Record a dispatch, preceded by a storage barrier when it touches
    /// resources written by an earlier dispatch of this pass.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if self.state.pass != PassType::Compute {
            log::warn!("CommandBuffer: dispatch outside a compute pass ignored");
            return;
        }
        if self.state.compute_pipeline.is_none() {
            log::warn!("CommandBuffer: dispatch without a compute pipeline ignored");
            return;
        }
        let state = &mut self.state;
        let bits = state
            .compute
            .access_dispatch(&state.storage_buffers, &state.storage_textures);
        if !bits.is_empty() {
            self.commands.push(Command::Barrier(bits));
        }
        self.commands.push(Command::Dispatch { x, y, z });
    }

    // ========================================================================
    // Shader resources
    // ========================================================================

    /// Bind a binding table for the following draws or dispatches.
    ///
    /// Uniform buffer contents are captured now; later writes need another
    /// call. `dynamic_offsets` pairs a binding number with the byte offset
    /// replacing that binding's offset.
    pub fn set_shader_resources(&mut self, srb: &ShaderResourceBindings, dynamic_offsets: &[(i32, u32)]) {
        let pipeline = match self.state.pass {
            PassType::Render => self.state.graphics_pipeline,
            PassType::Compute => self.state.compute_pipeline,
            PassType::None => {
                log::warn!("CommandBuffer: set_shader_resources outside a pass ignored");
                return;
            }
        };
        let Some(pipeline) = pipeline else {
            log::warn!("CommandBuffer: set_shader_resources before a pipeline ignored");
            return;
        };
        if !srb.is_valid() {
            log::warn!("CommandBuffer: shader resource bindings were not created");
            return;
        }

        let uniform_generations = srb
            .bindings()
            .iter()
            .filter_map(|b| match &b.resource {
                BindingResource::UniformBuffer { buffer, .. } => Some(buffer.data_generation()),
                _ => None,
            })
            .collect();
        let key = SrbKey {
            srb: srb.id(),
            generation: srb.generation(),
            pipeline,
            dynamic_offsets: dynamic_offsets.to_vec(),
            uniform_generations,
        };
        if self.state.srb.as_ref() == Some(&key) {
            return;
        }
        self.state.srb = Some(key);
        self.state.storage_buffers.clear();
        self.state.storage_textures.clear();

        let compute = self.state.pass == PassType::Compute;
        let mut set = ResourceSet {
            uniforms: self.pools.uniforms.len()..self.pools.uniforms.len(),
            textures: self.pools.textures.len()..self.pools.textures.len(),
            storage: self.pools.storage.len()..self.pools.storage.len(),
        };

        for binding in srb.bindings() {
            let stage = pass_stage(binding.stages, compute);
            match &binding.resource {
                BindingResource::UniformBuffer {
                    buffer,
                    offset,
                    size,
                    dynamic_offset,
                } => {
                    let offset = if *dynamic_offset {
                        dynamic_offsets
                            .iter()
                            .find(|(b, _)| *b == binding.binding)
                            .map_or(*offset, |(_, o)| *o)
                    } else {
                        *offset
                    };
                    let size = if *size == 0 {
                        buffer.size().saturating_sub(offset)
                    } else {
                        *size
                    };
                    self.register_buffer(buffer, BufferAccess::Uniform, stage);
                    self.pools.uniforms.push(UniformSnapshot {
                        binding: binding.binding,
                        data: buffer.read_host(offset, size),
                    });
                }
                BindingResource::SampledTexture { textures } => {
                    for (i, (texture, sampler)) in textures.iter().enumerate() {
                        self.register_texture(texture, TextureAccess::Sample, stage);
                        self.pools.textures.push(TextureUnitBinding {
                            binding: binding.binding,
                            array_index: i as u32,
                            kind: UnitKind::Combined,
                            texture: texture.handle(),
                            texture_id: texture.id(),
                            target: texture.target(),
                            sampler: Some(sampler.gl_state()),
                        });
                    }
                }
                BindingResource::Texture { textures } => {
                    for (i, texture) in textures.iter().enumerate() {
                        self.register_texture(texture, TextureAccess::Sample, stage);
                        self.pools.textures.push(TextureUnitBinding {
                            binding: binding.binding,
                            array_index: i as u32,
                            kind: UnitKind::TextureOnly,
                            texture: texture.handle(),
                            texture_id: texture.id(),
                            target: texture.target(),
                            sampler: None,
                        });
                    }
                }
                BindingResource::Sampler { samplers } => {
                    for (i, sampler) in samplers.iter().enumerate() {
                        self.pools.textures.push(TextureUnitBinding {
                            binding: binding.binding,
                            array_index: i as u32,
                            kind: UnitKind::SamplerOnly,
                            texture: 0,
                            texture_id: 0,
                            target: 0,
                            sampler: Some(sampler.gl_state()),
                        });
                    }
                }
                BindingResource::ImageLoad { texture, level } => {
                    self.bind_image(binding.binding, texture, *level, TextureAccess::StorageRead, stage);
                }
                BindingResource::ImageStore { texture, level } => {
                    self.bind_image(binding.binding, texture, *level, TextureAccess::StorageWrite, stage);
                }
                BindingResource::ImageLoadStore { texture, level } => {
                    self.bind_image(
                        binding.binding,
                        texture,
                        *level,
                        TextureAccess::StorageReadWrite,
                        stage,
                    );
                }
                BindingResource::BufferLoad {
                    buffer,
                    offset,
                    size,
                } => self.bind_storage_buffer(
                    binding.binding,
                    buffer,
                    *offset,
                    *size,
                    BufferAccess::StorageRead,
                    stage,
                ),
                BindingResource::BufferStore {
                    buffer,
                    offset,
                    size,
                } => self.bind_storage_buffer(
                    binding.binding,
                    buffer,
                    *offset,
                    *size,
                    BufferAccess::StorageWrite,
                    stage,
                ),
                BindingResource::BufferLoadStore {
                    buffer,
                    offset,
                    size,
                } => self.bind_storage_buffer(
                    binding.binding,
                    buffer,
                    *offset,
                    *size,
                    BufferAccess::StorageReadWrite,
                    stage,
                ),
            }
        }

        set.uniforms.end = self.pools.uniforms.len();
        set.textures.end = self.pools.textures.len();
        set.storage.end = self.pools.storage.len();
        self.pools.sets.push(set);
        self.commands.push(Command::BindShaderResources {
            set: self.pools.sets.len() - 1,
        });
    }

    fn bind_image(
        &mut self,
        binding: i32,
        texture: &Texture,
        level: u32,
        access: TextureAccess,
        stage: Option<PassStage>,
    ) {
        let plan = texture.plan();
        let gl_access = match access {
            TextureAccess::StorageRead => glow::READ_ONLY,
            TextureAccess::StorageWrite => glow::WRITE_ONLY,
            _ => glow::READ_WRITE,
        };
        self.pools.storage.push(StorageBinding::Image {
            binding: binding as u32,
            texture: texture.handle(),
            level,
            layered: plan.is_layered() || plan.is_cube(),
            access: gl_access,
            format: plan.format.sized_internal_format,
        });
        self.register_texture(texture, access, stage);
        self.state.storage_textures.push((texture.id(), access));
    }

    fn bind_storage_buffer(
        &mut self,
        binding: i32,
        buffer: &Buffer,
        offset: u32,
        size: u32,
        access: BufferAccess,
        stage: Option<PassStage>,
    ) {
        let size = if size == 0 {
            buffer.size().saturating_sub(offset)
        } else {
            size
        };
        self.pools.storage.push(StorageBinding::Buffer {
            binding: binding as u32,
            buffer: buffer.handle(),
            offset,
            size,
        });
        self.register_buffer(buffer, access, stage);
        self.state.storage_buffers.push((buffer.id(), access));
    }

    fn register_buffer(&mut self, buffer: &Buffer, access: BufferAccess, stage: Option<PassStage>) {
        if let Some(tracker) = self.state.tracker.and_then(|i| self.pools.tracker_mut(i)) {
            tracker.register_buffer(buffer, access, stage);
        }
    }

    fn register_texture(&mut self, texture: &Texture, access: TextureAccess, stage: Option<PassStage>) {
        if let Some(tracker) = self.state.tracker.and_then(|i| self.pools.tracker_mut(i)) {
            tracker.register_texture(texture, access, stage);
        }
    }

    /// Barrier issued right away, outside of any pass tracker.
    pub fn memory_barrier(&mut self, bits: MemoryBarriers) {
        if !bits.is_empty() {
            self.commands.push(Command::Barrier(bits));
            self.state.compute.barrier_issued(bits);
        }
    }

    // ========================================================================
    // Debug markers
    // ========================================================================

    pub fn debug_mark_begin(&mut self, name: &str) {
        if self.debug_markers {
            self.commands.push(Command::PushDebugGroup(name.to_owned()));
        }
    }

    pub fn debug_mark_end(&mut self) {
        if self.debug_markers {
            self.commands.push(Command::PopDebugGroup);
        }
    }

    pub fn debug_mark_msg(&mut self, message: &str) {
        if self.debug_markers {
            self.commands.push(Command::InsertDebugMarker(message.to_owned()));
        }
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("commands", &self.commands.len())
            .field("pass", &self.state.pass)
            .field("retained_bytes", &self.pools.retained_bytes())
            .finish()
    }
}

// Ensure CommandBuffer is Send
static_assertions::assert_impl_all!(CommandBuffer: Send);

/// Earliest stage that sees a binding.
fn pass_stage(stages: ShaderStageFlags, compute: bool) -> Option<PassStage> {
    if compute {
        return Some(PassStage::Compute);
    }
    [
        (ShaderStageFlags::VERTEX, PassStage::Vertex),
        (ShaderStageFlags::TESSELLATION_CONTROL, PassStage::TessControl),
        (ShaderStageFlags::TESSELLATION_EVALUATION, PassStage::TessEval),
        (ShaderStageFlags::GEOMETRY, PassStage::Geometry),
        (ShaderStageFlags::FRAGMENT, PassStage::Fragment),
    ]
    .into_iter()
    .find(|(flag, _)| stages.contains(*flag))
    .map(|(_, stage)| stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_stage_picks_earliest() {
        assert_eq!(
            pass_stage(ShaderStageFlags::vertex_fragment(), false),
            Some(PassStage::Vertex)
        );
        assert_eq!(pass_stage(ShaderStageFlags::FRAGMENT, false), Some(PassStage::Fragment));
        assert_eq!(pass_stage(ShaderStageFlags::FRAGMENT, true), Some(PassStage::Compute));
    }

    #[test]
    fn test_calls_outside_passes_are_ignored() {
        let mut cb = CommandBuffer::new();
        cb.draw(3, 1, 0, 0);
        cb.set_viewport(Viewport::from_dimensions(4, 4));
        cb.dispatch(1, 1, 1);
        cb.end_pass(None);
        cb.end_compute_pass(None);
        assert!(cb.is_empty());
        assert_eq!(cb.pass_type(), PassType::None);
    }

    #[test]
    fn test_nested_pass_is_ignored() {
        let target = RenderTarget::Default(SwapchainRenderTarget {
            framebuffer: 0,
            pixel_size: (8, 8),
            sample_count: 1,
            srgb: false,
        });
        let mut cb = CommandBuffer::new();
        cb.begin_pass(&target, [0.0; 4], DepthStencilClearValue::default(), None);
        let recorded = cb.len();
        cb.begin_compute_pass(None);
        cb.begin_pass(&target, [0.0; 4], DepthStencilClearValue::default(), None);
        assert_eq!(cb.len(), recorded);
        assert_eq!(cb.pass_type(), PassType::Render);
        assert_eq!(cb.pass_count(), 1);
    }

    #[test]
    fn test_default_target_pass_shape() {
        let target = RenderTarget::Default(SwapchainRenderTarget {
            framebuffer: 0,
            pixel_size: (8, 8),
            sample_count: 1,
            srgb: false,
        });
        let mut cb = CommandBuffer::new();
        cb.begin_pass(&target, [0.1, 0.2, 0.3, 1.0], DepthStencilClearValue::default(), None);
        cb.set_viewport(Viewport::from_dimensions(8, 8));
        cb.set_viewport(Viewport::from_dimensions(8, 8));
        cb.end_pass(None);

        let names: Vec<_> = cb.commands().iter().map(Command::name).collect();
        assert_eq!(
            names,
            [
                "BarriersForPass",
                "BindFramebuffer",
                "Clear",
                "Viewport",
                "InvalidateFramebuffer"
            ]
        );
        match &cb.commands()[2] {
            Command::Clear { mask, color, .. } => {
                assert_eq!(
                    *mask,
                    glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT
                );
                assert_eq!(*color, [0.1, 0.2, 0.3, 1.0]);
            }
            other => panic!("unexpected {other:?}"),
        }

        cb.reset_commands();
        assert!(cb.is_empty());
        assert_eq!(cb.pass_count(), 0);
    }
}
