//! Replays command buffers against the driver.

use std::collections::HashMap;
use std::sync::Arc;

use redlilium_core::profiling::profile_scope;

use super::buffer::CommandBuffer;
use super::pool::{CommandPools, PendingReadback, ResourceSet, StorageBinding, UnitKind};
use super::updates::{BufferReadbackResult, TextureReadbackResult};
use super::{Command, ReadSource, TextureRef};
use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle};
use crate::pipeline::{
    ColorWrites, ComputePipelineState, CullMode, FrontFace, GraphicsPipelineState, PolygonMode,
    PrimitiveTopology, SamplerEntry, UniformEntry, VertexStepMode, gl_compare, upload_uniform,
};
use crate::resources::GlSamplerState;
use crate::tracker::{MemoryBarriers, barriers_for_pass};

/// Sampler-state cache entries kept before the cache is flushed.
const SAMPLER_CACHE_LIMIT: usize = 4096;

/// Counters of one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionStats {
    pub commands: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub barriers: u64,
    pub readbacks: u64,
}

impl ExecutionStats {
    pub fn accumulate(&mut self, other: &ExecutionStats) {
        self.commands += other.commands;
        self.draws += other.draws;
        self.dispatches += other.dispatches;
        self.barriers += other.barriers;
        self.readbacks += other.readbacks;
    }
}

#[derive(Debug, Clone)]
enum BoundPipeline {
    Graphics(Arc<GraphicsPipelineState>),
    Compute(Arc<ComputePipelineState>),
}

impl BoundPipeline {
    fn tables(&self) -> (&[UniformEntry], &[SamplerEntry]) {
        match self {
            Self::Graphics(s) => (&s.uniforms, &s.samplers),
            Self::Compute(s) => (&s.uniforms, &s.samplers),
        }
    }
}

/// Driver bindings known for the current frame.
#[derive(Debug, Default)]
struct TransientState {
    array_buffer: Option<GlHandle>,
    element_buffer: Option<GlHandle>,
    enabled_attribs: u64,
    divisors: Vec<u32>,
    pipeline: Option<BoundPipeline>,
    stencil_ref: u32,
    unpack_alignment_one: bool,
    pack_alignment_one: bool,
}

/// Replays recorded commands on the thread that has the context current.
///
/// State that mirrors driver object state (the texture parameters applied
/// from samplers, the core-profile vertex array) persists across frames.
/// Bind state is reset at every `BeginFrame`/`ResetFrame` marker.
pub struct CommandExecutor {
    sampler_cache: HashMap<u64, GlSamplerState>,
    vertex_array: Option<GlHandle>,
    transient: TransientState,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            sampler_cache: HashMap::new(),
            vertex_array: None,
            transient: TransientState::default(),
        }
    }

    /// Forget driver objects after a context loss without deleting them.
    pub fn invalidate(&mut self) {
        self.sampler_cache.clear();
        self.vertex_array = None;
        self.transient = TransientState::default();
    }

    /// Delete the objects owned by the executor. The context must be current.
    pub fn destroy(&mut self, driver: &dyn GlDriver) {
        if let Some(vao) = self.vertex_array.take() {
            driver.delete_vertex_array(vao);
        }
        self.invalidate();
    }

    /// Replay every command of `cb` in order.
    ///
    /// Readback callbacks run before this returns.
    pub fn execute(
        &mut self,
        driver: &dyn GlDriver,
        caps: &Capabilities,
        cb: &mut CommandBuffer,
    ) -> ExecutionStats {
        profile_scope!("execute_command_buffer");

        let (commands, pools) = cb.parts_mut();
        let mut stats = ExecutionStats::default();
        for command in commands {
            log::trace!("CommandExecutor: {}", command.name());
            stats.commands += 1;
            self.execute_one(driver, caps, command, pools, &mut stats);
        }
        stats
    }

    fn execute_one(
        &mut self,
        driver: &dyn GlDriver,
        caps: &Capabilities,
        command: &Command,
        pools: &mut CommandPools,
        stats: &mut ExecutionStats,
    ) {
        match command {
            Command::BeginFrame | Command::ResetFrame => self.begin_frame(driver, caps),
            Command::EndFrame => {
                self.transient.pipeline = None;
                if self.sampler_cache.len() > SAMPLER_CACHE_LIMIT {
                    self.sampler_cache.clear();
                }
            }
            Command::Viewport(v) => {
                driver.viewport(v.x as i32, v.y as i32, v.width as i32, v.height as i32);
                driver.depth_range(v.min_depth, v.max_depth);
            }
            Command::Scissor(rect) => {
                driver.enable(glow::SCISSOR_TEST);
                driver.scissor(rect.x, rect.y, rect.width as i32, rect.height as i32);
            }
            Command::BlendConstants(c) => driver.blend_color(c[0], c[1], c[2], c[3]),
            Command::StencilRef(reference) => {
                self.transient.stencil_ref = *reference;
                if let Some(BoundPipeline::Graphics(state)) = &self.transient.pipeline {
                    if state.depth_stencil.stencil_test {
                        apply_stencil_func(driver, state, *reference);
                    }
                }
            }
            Command::BindVertexBuffer {
                buffer,
                offset,
                binding,
            } => self.bind_vertex_buffer(driver, caps, *buffer, *offset, *binding),
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                ..
            } => {
                let Some(BoundPipeline::Graphics(state)) = &self.transient.pipeline else {
                    log::warn!("CommandExecutor: draw without a graphics pipeline");
                    return;
                };
                if *instance_count == 0 {
                    return;
                }
                let mode = state.topology.gl_mode();
                if *instance_count != 1 && caps.instancing {
                    driver.draw_arrays_instanced(
                        mode,
                        *first_vertex as i32,
                        *vertex_count as i32,
                        *instance_count as i32,
                    );
                } else {
                    driver.draw_arrays(mode, *first_vertex as i32, *vertex_count as i32);
                }
                stats.draws += 1;
            }
            Command::DrawIndexed {
                buffer,
                index_type,
                offset,
                index_count,
                instance_count,
                base_vertex,
                ..
            } => {
                let Some(BoundPipeline::Graphics(state)) = &self.transient.pipeline else {
                    log::warn!("CommandExecutor: draw without a graphics pipeline");
                    return;
                };
                if *instance_count == 0 {
                    return;
                }
                let mode = state.topology.gl_mode();
                if self.transient.element_buffer != Some(*buffer) {
                    driver.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, *buffer);
                    self.transient.element_buffer = Some(*buffer);
                }
                let count = *index_count as i32;
                let offset = *offset as i32;
                let instanced = *instance_count != 1 && caps.instancing;
                // Without base-vertex entry points the offset is dropped.
                let use_base_vertex = *base_vertex != 0 && caps.base_vertex;
                match (instanced, use_base_vertex) {
                    (true, true) => driver.draw_elements_instanced_base_vertex(
                        mode,
                        count,
                        *index_type,
                        offset,
                        *instance_count as i32,
                        *base_vertex,
                    ),
                    (true, false) => driver.draw_elements_instanced(
                        mode,
                        count,
                        *index_type,
                        offset,
                        *instance_count as i32,
                    ),
                    (false, true) => driver.draw_elements_base_vertex(
                        mode,
                        count,
                        *index_type,
                        offset,
                        *base_vertex,
                    ),
                    (false, false) => driver.draw_elements(mode, count, *index_type, offset),
                }
                stats.draws += 1;
            }
            Command::BindGraphicsPipeline(state) => {
                driver.use_program(state.program);
                apply_graphics_state(driver, caps, state, self.transient.stencil_ref);
                self.disable_unused_attribs(driver, state);
                self.transient.pipeline = Some(BoundPipeline::Graphics(Arc::clone(state)));
            }
            Command::BindComputePipeline(state) => {
                driver.use_program(state.program);
                self.transient.pipeline = Some(BoundPipeline::Compute(Arc::clone(state)));
            }
            Command::BindShaderResources { set } => {
                if let Some(set) = pools.sets.get(*set) {
                    self.bind_shader_resources(driver, caps, set, pools);
                }
            }
            Command::BindFramebuffer {
                framebuffer,
                is_default,
                color_attachment_count,
                srgb,
            } => {
                driver.bind_framebuffer(glow::FRAMEBUFFER, *framebuffer);
                if !*is_default && caps.max_draw_buffers > 1 {
                    let buffers: Vec<u32> = (0..*color_attachment_count)
                        .map(|i| glow::COLOR_ATTACHMENT0 + i)
                        .collect();
                    driver.draw_buffers(&buffers);
                }
                if caps.srgb_write_control {
                    if *srgb {
                        driver.enable(glow::FRAMEBUFFER_SRGB);
                    } else {
                        driver.disable(glow::FRAMEBUFFER_SRGB);
                    }
                }
                driver.disable(glow::SCISSOR_TEST);
            }
            Command::Clear {
                mask,
                color,
                depth,
                stencil,
            } => {
                driver.disable(glow::SCISSOR_TEST);
                if mask & glow::COLOR_BUFFER_BIT != 0 {
                    driver.color_mask(true, true, true, true);
                    driver.clear_color(color[0], color[1], color[2], color[3]);
                }
                if mask & glow::DEPTH_BUFFER_BIT != 0 {
                    driver.depth_mask(true);
                    driver.clear_depth(*depth);
                }
                if mask & glow::STENCIL_BUFFER_BIT != 0 {
                    driver.stencil_mask_separate(glow::FRONT_AND_BACK, 0xFF);
                    driver.clear_stencil(*stencil as i32);
                }
                driver.clear(*mask);
                // The write masks of the bound pipeline were overridden.
                if let Some(BoundPipeline::Graphics(state)) = &self.transient.pipeline {
                    apply_write_masks(driver, state);
                }
            }
            Command::BufferSubData {
                target,
                buffer,
                offset,
                data,
            } => {
                let Some(bytes) = pools.bytes.get(*data) else {
                    return;
                };
                self.bind_buffer_for_transfer(driver, *target, *buffer);
                driver.buffer_sub_data(*target, *offset as i32, bytes);
            }
            Command::GetBufferSubData {
                target,
                buffer,
                offset,
                size,
                readback,
            } => {
                self.bind_buffer_for_transfer(driver, *target, *buffer);
                let mut out = vec![0u8; *size as usize];
                if caps.get_buffer_sub_data {
                    driver.get_buffer_sub_data(*target, *offset as i32, &mut out);
                } else if !(caps.proper_map_buffer
                    && driver.read_buffer_mapped(*target, *offset as i32, &mut out))
                {
                    log::warn!("CommandExecutor: buffer readback is not supported by this context");
                    out.clear();
                }
                if let Some(Some(PendingReadback::Buffer(callback))) =
                    pools.readbacks.get_mut(*readback).map(Option::take)
                {
                    callback(BufferReadbackResult(out));
                }
                stats.readbacks += 1;
            }
            Command::CopyTex {
                src,
                src_origin,
                dst,
                dst_origin,
                size,
            } => {
                let Some(fb) = temporary_framebuffer(driver) else {
                    return;
                };
                driver.bind_framebuffer(glow::READ_FRAMEBUFFER, fb);
                attach(driver, glow::READ_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, src);
                driver.bind_texture(dst.target, dst.handle);
                driver.copy_tex_sub_image_2d(
                    dst.image_target(),
                    dst.level as i32,
                    dst_origin[0],
                    dst_origin[1],
                    src_origin[0],
                    src_origin[1],
                    size[0],
                    size[1],
                );
                driver.bind_framebuffer(glow::FRAMEBUFFER, 0);
                driver.delete_framebuffer(fb);
            }
            Command::ReadPixels {
                source,
                width,
                height,
                format,
                gl_format,
                gl_type,
                readback,
            } => {
                let temp = match source {
                    ReadSource::Texture(texture) => {
                        let Some(fb) = temporary_framebuffer(driver) else {
                            return;
                        };
                        driver.bind_framebuffer(glow::READ_FRAMEBUFFER, fb);
                        attach(driver, glow::READ_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, texture);
                        Some(fb)
                    }
                    ReadSource::Framebuffer(fb) => {
                        driver.bind_framebuffer(glow::READ_FRAMEBUFFER, *fb);
                        None
                    }
                };
                if !self.transient.pack_alignment_one {
                    driver.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
                    self.transient.pack_alignment_one = true;
                }
                let len = *width as usize * *height as usize * format.bytes_per_pixel() as usize;
                let mut data = vec![0u8; len];
                driver.read_pixels(
                    0,
                    0,
                    *width as i32,
                    *height as i32,
                    *gl_format,
                    *gl_type,
                    &mut data,
                );
                if let Some(fb) = temp {
                    driver.bind_framebuffer(glow::FRAMEBUFFER, 0);
                    driver.delete_framebuffer(fb);
                }
                if let Some(Some(PendingReadback::Texture(callback))) =
                    pools.readbacks.get_mut(*readback).map(Option::take)
                {
                    callback(TextureReadbackResult {
                        pixel_size: (*width, *height),
                        format: *format,
                        data,
                    });
                }
                stats.readbacks += 1;
            }
            Command::SubImage {
                texture,
                x,
                y,
                width,
                height,
                internal_format,
                format,
                ty,
                data,
            } => {
                let Some(bytes) = pools.bytes.get(*data) else {
                    return;
                };
                if !self.transient.unpack_alignment_one {
                    driver.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
                    self.transient.unpack_alignment_one = true;
                }
                driver.bind_texture(texture.target, texture.handle);
                let level = texture.level as i32;
                if texture.target == glow::TEXTURE_1D {
                    driver.tex_image_1d(
                        texture.target,
                        level,
                        *internal_format as i32,
                        *width as i32,
                        *format,
                        *ty,
                        Some(bytes),
                    );
                } else if texture.is_layered() {
                    driver.tex_sub_image_3d(
                        texture.target,
                        level,
                        *x,
                        *y,
                        texture.layer as i32,
                        *width as i32,
                        *height as i32,
                        1,
                        *format,
                        *ty,
                        bytes,
                    );
                } else {
                    driver.tex_sub_image_2d(
                        texture.image_target(),
                        level,
                        *x,
                        *y,
                        *width as i32,
                        *height as i32,
                        *format,
                        *ty,
                        bytes,
                    );
                }
            }
            Command::CompressedImage {
                texture,
                internal_format,
                width,
                height,
                depth,
                data,
            } => {
                let Some(bytes) = pools.bytes.get(*data) else {
                    return;
                };
                driver.bind_texture(texture.target, texture.handle);
                if texture.is_layered() {
                    driver.compressed_tex_image_3d(
                        texture.target,
                        texture.level as i32,
                        *internal_format,
                        *width as i32,
                        *height as i32,
                        *depth as i32,
                        bytes,
                    );
                } else {
                    driver.compressed_tex_image_2d(
                        texture.image_target(),
                        texture.level as i32,
                        *internal_format,
                        *width as i32,
                        *height as i32,
                        bytes,
                    );
                }
            }
            Command::CompressedSubImage {
                texture,
                x,
                y,
                width,
                height,
                internal_format,
                data,
            } => {
                let Some(bytes) = pools.bytes.get(*data) else {
                    return;
                };
                driver.bind_texture(texture.target, texture.handle);
                if texture.is_layered() {
                    driver.compressed_tex_sub_image_3d(
                        texture.target,
                        texture.level as i32,
                        *x,
                        *y,
                        texture.layer as i32,
                        *width as i32,
                        *height as i32,
                        1,
                        *internal_format,
                        bytes,
                    );
                } else {
                    driver.compressed_tex_sub_image_2d(
                        texture.image_target(),
                        texture.level as i32,
                        *x,
                        *y,
                        *width as i32,
                        *height as i32,
                        *internal_format,
                        bytes,
                    );
                }
            }
            Command::BlitFromRenderbuffer {
                renderbuffer,
                width,
                height,
                dst,
            } => {
                if !caps.framebuffer_blit {
                    log::warn!("CommandExecutor: multisample resolve needs framebuffer blits");
                    return;
                }
                let (Some(read), Some(draw)) = (temporary_framebuffer(driver), temporary_framebuffer(driver))
                else {
                    return;
                };
                driver.bind_framebuffer(glow::READ_FRAMEBUFFER, read);
                driver.framebuffer_renderbuffer(
                    glow::READ_FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0,
                    *renderbuffer,
                );
                driver.bind_framebuffer(glow::DRAW_FRAMEBUFFER, draw);
                attach(driver, glow::DRAW_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, dst);
                resolve_blit(driver, *width, *height);
                driver.bind_framebuffer(glow::FRAMEBUFFER, 0);
                driver.delete_framebuffer(read);
                driver.delete_framebuffer(draw);
            }
            Command::BlitFromTexture {
                src,
                width,
                height,
                dst,
            } => {
                if !caps.framebuffer_blit {
                    log::warn!("CommandExecutor: multisample resolve needs framebuffer blits");
                    return;
                }
                let (Some(read), Some(draw)) = (temporary_framebuffer(driver), temporary_framebuffer(driver))
                else {
                    return;
                };
                driver.bind_framebuffer(glow::READ_FRAMEBUFFER, read);
                attach(driver, glow::READ_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, src);
                driver.bind_framebuffer(glow::DRAW_FRAMEBUFFER, draw);
                attach(driver, glow::DRAW_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, dst);
                resolve_blit(driver, *width, *height);
                driver.bind_framebuffer(glow::FRAMEBUFFER, 0);
                driver.delete_framebuffer(read);
                driver.delete_framebuffer(draw);
            }
            Command::GenMip { texture, target } => {
                driver.bind_texture(*target, *texture);
                driver.generate_mipmap(*target);
            }
            Command::Dispatch { x, y, z } => {
                if !caps.compute {
                    log::warn!("CommandExecutor: dispatch without compute support");
                    return;
                }
                driver.dispatch_compute(*x, *y, *z);
                stats.dispatches += 1;
            }
            Command::BarriersForPass { tracker } => {
                let bits = pools
                    .tracker(*tracker)
                    .map(barriers_for_pass)
                    .unwrap_or(MemoryBarriers::empty());
                if !bits.is_empty() && caps.compute {
                    driver.memory_barrier(bits.bits());
                    stats.barriers += 1;
                }
            }
            Command::Barrier(bits) => {
                if !bits.is_empty() && caps.compute {
                    driver.memory_barrier(bits.bits());
                    stats.barriers += 1;
                }
            }
            Command::InvalidateFramebuffer { is_default } => {
                if !caps.invalidate_framebuffer {
                    return;
                }
                if *is_default {
                    driver.invalidate_framebuffer(glow::FRAMEBUFFER, &[glow::DEPTH, glow::STENCIL]);
                } else {
                    driver.invalidate_framebuffer(glow::FRAMEBUFFER, &[glow::DEPTH_STENCIL_ATTACHMENT]);
                }
            }
            Command::PushDebugGroup(name) => {
                if caps.debug_markers {
                    driver.push_debug_group(name);
                }
            }
            Command::PopDebugGroup => {
                if caps.debug_markers {
                    driver.pop_debug_group();
                }
            }
            Command::InsertDebugMarker(message) => {
                if caps.debug_markers {
                    driver.debug_message_insert(message);
                }
            }
        }
    }

    fn begin_frame(&mut self, driver: &dyn GlDriver, caps: &Capabilities) {
        self.transient = TransientState::default();
        if !caps.needs_vertex_array() {
            return;
        }
        if self.vertex_array.is_none() {
            match driver.create_vertex_array() {
                Ok(vao) => self.vertex_array = Some(vao),
                Err(e) => log::error!("CommandExecutor: failed to create vertex array: {e}"),
            }
        }
        if let Some(vao) = self.vertex_array {
            driver.bind_vertex_array(vao);
        }
    }

    /// Bind a buffer for an upload or readback, keeping the vertex input
    /// bookkeeping in sync.
    fn bind_buffer_for_transfer(&mut self, driver: &dyn GlDriver, target: u32, buffer: GlHandle) {
        driver.bind_buffer(target, buffer);
        match target {
            glow::ARRAY_BUFFER => self.transient.array_buffer = Some(buffer),
            glow::ELEMENT_ARRAY_BUFFER => self.transient.element_buffer = Some(buffer),
            _ => {}
        }
    }

    fn bind_vertex_buffer(
        &mut self,
        driver: &dyn GlDriver,
        caps: &Capabilities,
        buffer: GlHandle,
        offset: u32,
        binding: u32,
    ) {
        let Some(BoundPipeline::Graphics(state)) = &self.transient.pipeline else {
            log::warn!("CommandExecutor: vertex buffer bound without a graphics pipeline");
            return;
        };
        let Some(layout) = state.vertex_input.bindings.get(binding as usize) else {
            log::warn!("CommandExecutor: pipeline has no vertex binding {binding}");
            return;
        };
        if self.transient.array_buffer != Some(buffer) {
            driver.bind_buffer(glow::ARRAY_BUFFER, buffer);
            self.transient.array_buffer = Some(buffer);
        }
        let stride = layout.stride as i32;
        let divisor = match layout.step_mode {
            VertexStepMode::Vertex => 0,
            VertexStepMode::Instance => layout.step_rate.max(1),
        };
        for attribute in state.vertex_input.attributes.iter().filter(|a| a.binding == binding) {
            let location = attribute.location;
            let pointer = (offset + attribute.offset) as i32;
            let format = attribute.format;
            if format.is_integer() && caps.int_attributes {
                driver.vertex_attrib_pointer_i32(location, format.components(), format.gl_type(), stride, pointer);
            } else {
                driver.vertex_attrib_pointer_f32(
                    location,
                    format.components(),
                    format.gl_type(),
                    format.normalized(),
                    stride,
                    pointer,
                );
            }
            let bit = 1u64.checked_shl(location).unwrap_or(0);
            if bit == 0 || self.transient.enabled_attribs & bit == 0 {
                driver.enable_vertex_attrib_array(location);
                self.transient.enabled_attribs |= bit;
            }
            if caps.instancing {
                let slot = location as usize;
                if self.transient.divisors.len() <= slot {
                    self.transient.divisors.resize(slot + 1, 0);
                }
                if self.transient.divisors[slot] != divisor {
                    driver.vertex_attrib_divisor(location, divisor);
                    self.transient.divisors[slot] = divisor;
                }
            }
        }
    }

    fn disable_unused_attribs(&mut self, driver: &dyn GlDriver, state: &GraphicsPipelineState) {
        let used = state
            .vertex_input
            .attributes
            .iter()
            .fold(0u64, |mask, a| mask | 1u64.checked_shl(a.location).unwrap_or(0));
        let stale = self.transient.enabled_attribs & !used;
        for location in 0..64 {
            if stale & (1 << location) != 0 {
                driver.disable_vertex_attrib_array(location);
            }
        }
        self.transient.enabled_attribs &= used;
    }

    fn bind_shader_resources(
        &mut self,
        driver: &dyn GlDriver,
        caps: &Capabilities,
        set: &ResourceSet,
        pools: &CommandPools,
    ) {
        let Some(pipeline) = &self.transient.pipeline else {
            log::warn!("CommandExecutor: shader resources bound without a pipeline");
            return;
        };
        let (uniforms, samplers) = pipeline.tables();
        let snapshots = &pools.uniforms[set.uniforms.clone()];
        let units = &pools.textures[set.textures.clone()];

        for entry in uniforms {
            if let Some(snapshot) = snapshots.iter().find(|s| s.binding == entry.binding) {
                upload_uniform(driver, entry, &snapshot.data);
            }
        }

        for (unit, entry) in samplers.iter().enumerate() {
            if unit as u32 >= caps.max_texture_units {
                log::warn!(
                    "CommandExecutor: sampler {} exceeds {} texture units",
                    entry.name,
                    caps.max_texture_units
                );
                break;
            }
            let Some(texture) = units.iter().find(|u| {
                u.kind != UnitKind::SamplerOnly
                    && u.binding == entry.binding
                    && u.array_index == entry.array_index
            }) else {
                continue;
            };
            let sampler = match (texture.kind, entry.sampler_binding) {
                (UnitKind::Combined, _) => texture.sampler,
                (_, Some(binding)) => units
                    .iter()
                    .find(|u| u.kind == UnitKind::SamplerOnly && u.binding == binding)
                    .and_then(|u| u.sampler),
                _ => None,
            };

            driver.active_texture(unit as u32);
            driver.bind_texture(texture.target, texture.texture);
            driver.uniform_i32_slice(entry.location, 1, &[unit as i32]);
            if let Some(sampler) = sampler {
                let previous = self.sampler_cache.get(&texture.texture_id);
                if previous != Some(&sampler) {
                    let wrap_r = matches!(
                        texture.target,
                        glow::TEXTURE_3D | glow::TEXTURE_CUBE_MAP | glow::TEXTURE_2D_ARRAY
                    );
                    sampler.apply(
                        driver,
                        texture.target,
                        previous,
                        wrap_r,
                        caps.texture_compare_mode,
                    );
                    self.sampler_cache.insert(texture.texture_id, sampler);
                }
            }
        }

        for storage in &pools.storage[set.storage.clone()] {
            match *storage {
                StorageBinding::Buffer {
                    binding,
                    buffer,
                    offset,
                    size,
                } => driver.bind_buffer_range(
                    glow::SHADER_STORAGE_BUFFER,
                    binding,
                    buffer,
                    offset as i32,
                    size as i32,
                ),
                StorageBinding::Image {
                    binding,
                    texture,
                    level,
                    layered,
                    access,
                    format,
                } => driver.bind_image_texture(binding, texture, level as i32, layered, 0, access, format),
            }
        }
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("cached_samplers", &self.sampler_cache.len())
            .field("vertex_array", &self.vertex_array)
            .finish()
    }
}

// ============================================================================
// Fixed-function state
// ============================================================================

fn apply_graphics_state(
    driver: &dyn GlDriver,
    caps: &Capabilities,
    state: &GraphicsPipelineState,
    stencil_ref: u32,
) {
    match state.cull_mode {
        CullMode::None => driver.disable(glow::CULL_FACE),
        CullMode::Front | CullMode::Back => {
            driver.enable(glow::CULL_FACE);
            driver.cull_face(if state.cull_mode == CullMode::Front {
                glow::FRONT
            } else {
                glow::BACK
            });
        }
    }
    driver.front_face(match state.front_face {
        FrontFace::Ccw => glow::CCW,
        FrontFace::Cw => glow::CW,
    });
    if caps.polygon_mode {
        driver.polygon_mode(
            glow::FRONT_AND_BACK,
            match state.polygon_mode {
                PolygonMode::Fill => glow::FILL,
                PolygonMode::Line => glow::LINE,
            },
        );
    }
    if caps.wide_lines || state.line_width <= 1.0 {
        driver.line_width(state.line_width);
    }

    let ds = &state.depth_stencil;
    if ds.depth_test {
        driver.enable(glow::DEPTH_TEST);
        driver.depth_func(gl_compare(ds.depth_compare));
    } else {
        driver.disable(glow::DEPTH_TEST);
    }
    if ds.stencil_test {
        driver.enable(glow::STENCIL_TEST);
        apply_stencil_func(driver, state, stencil_ref);
        for (face, ops) in [(glow::FRONT, &ds.stencil_front), (glow::BACK, &ds.stencil_back)] {
            driver.stencil_op_separate(face, ops.fail_op.gl(), ops.depth_fail_op.gl(), ops.pass_op.gl());
        }
    } else {
        driver.disable(glow::STENCIL_TEST);
    }

    let bias = state.depth_bias;
    if bias.constant != 0.0 || bias.slope_scale != 0.0 {
        driver.enable(glow::POLYGON_OFFSET_FILL);
        driver.polygon_offset(bias.slope_scale, bias.constant);
    } else {
        driver.disable(glow::POLYGON_OFFSET_FILL);
    }

    match &state.blend.blend {
        Some(blend) => {
            driver.enable(glow::BLEND);
            driver.blend_func_separate(
                blend.color.src_factor.gl(),
                blend.color.dst_factor.gl(),
                blend.alpha.src_factor.gl(),
                blend.alpha.dst_factor.gl(),
            );
            driver.blend_equation_separate(blend.color.operation.gl(), blend.alpha.operation.gl());
        }
        None => driver.disable(glow::BLEND),
    }
    apply_write_masks(driver, state);

    if state.topology == PrimitiveTopology::Patches && caps.tessellation {
        driver.patch_vertices(state.patch_control_points as i32);
    }
}

fn apply_write_masks(driver: &dyn GlDriver, state: &GraphicsPipelineState) {
    let mask = state.blend.write_mask;
    driver.color_mask(
        mask.contains(ColorWrites::R),
        mask.contains(ColorWrites::G),
        mask.contains(ColorWrites::B),
        mask.contains(ColorWrites::A),
    );
    driver.depth_mask(state.depth_stencil.depth_write);
    driver.stencil_mask_separate(glow::FRONT_AND_BACK, state.depth_stencil.stencil_write_mask);
}

fn apply_stencil_func(driver: &dyn GlDriver, state: &GraphicsPipelineState, reference: u32) {
    let ds = &state.depth_stencil;
    for (face, ops) in [(glow::FRONT, &ds.stencil_front), (glow::BACK, &ds.stencil_back)] {
        driver.stencil_func_separate(face, gl_compare(ops.compare), reference as i32, ds.stencil_read_mask);
    }
}

// ============================================================================
// Temporary framebuffers
// ============================================================================

fn temporary_framebuffer(driver: &dyn GlDriver) -> Option<GlHandle> {
    match driver.create_framebuffer() {
        Ok(fb) => Some(fb),
        Err(e) => {
            log::error!("CommandExecutor: failed to create a framebuffer: {e}");
            None
        }
    }
}

fn attach(driver: &dyn GlDriver, target: u32, attachment: u32, texture: &TextureRef) {
    if texture.is_layered() {
        driver.framebuffer_texture_layer(
            target,
            attachment,
            texture.handle,
            texture.level as i32,
            texture.layer as i32,
        );
    } else {
        driver.framebuffer_texture_2d(
            target,
            attachment,
            texture.image_target(),
            texture.handle,
            texture.level as i32,
        );
    }
}

fn resolve_blit(driver: &dyn GlDriver, width: u32, height: u32) {
    let rect = [0, 0, width as i32, height as i32];
    driver.blit_framebuffer(rect, rect, glow::COLOR_BUFFER_BIT, glow::NEAREST);
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::driver::dummy::{DummyCall, DummyDriver, DummyProfile};
    use crate::resources::{RenderTarget, SwapchainRenderTarget};
    use crate::types::DepthStencilClearValue;

    fn default_target() -> RenderTarget {
        RenderTarget::Default(SwapchainRenderTarget {
            framebuffer: 0,
            pixel_size: (4, 4),
            sample_count: 1,
            srgb: false,
        })
    }

    fn run(profile: DummyProfile, cb: &mut CommandBuffer) -> (DummyDriver, ExecutionStats) {
        let driver = DummyDriver::with_profile(profile);
        let caps = Capabilities::detect(&driver).unwrap();
        driver.clear_calls();
        let mut executor = CommandExecutor::new();
        let stats = executor.execute(&driver, &caps, cb);
        (driver, stats)
    }

    #[test]
    fn test_core_profile_binds_vertex_array_at_frame_begin() {
        let mut cb = CommandBuffer::new();
        cb.mark_frame_begin(false);
        cb.mark_frame_end();
        let (driver, stats) = run(DummyProfile::desktop_gl46(), &mut cb);
        assert_eq!(stats.commands, 2);
        assert_eq!(driver.count_calls(|c| matches!(c, DummyCall::BindVertexArray(_))), 1);

        let mut cb = CommandBuffer::new();
        cb.mark_frame_begin(false);
        let (driver, _) = run(DummyProfile::gles30(), &mut cb);
        assert_eq!(driver.count_calls(|c| matches!(c, DummyCall::BindVertexArray(_))), 0);
    }

    #[test]
    fn test_clear_disables_scissor_first() {
        let mut cb = CommandBuffer::new();
        cb.mark_frame_begin(false);
        cb.begin_pass(&default_target(), [1.0, 0.0, 0.0, 1.0], DepthStencilClearValue::default(), None);
        cb.end_pass(None);
        let (driver, _) = run(DummyProfile::gles30(), &mut cb);

        let calls = driver.calls();
        let clear = calls
            .iter()
            .position(|c| matches!(c, DummyCall::Clear(_)))
            .unwrap();
        let disable = calls[..clear]
            .iter()
            .rposition(|c| *c == DummyCall::Disable(glow::SCISSOR_TEST));
        assert!(disable.is_some());
    }

    #[test]
    fn test_barrier_skipped_without_compute() {
        let mut cb = CommandBuffer::new();
        cb.memory_barrier(MemoryBarriers::all());
        let (driver, stats) = run(DummyProfile::gles30(), &mut cb);
        assert_eq!(stats.barriers, 0);
        assert!(driver.last_memory_barrier().is_none());

        let mut cb = CommandBuffer::new();
        cb.memory_barrier(MemoryBarriers::SHADER_STORAGE);
        let (driver, stats) = run(DummyProfile::gles32(), &mut cb);
        assert_eq!(stats.barriers, 1);
        assert_eq!(driver.last_memory_barrier(), Some(glow::SHADER_STORAGE_BARRIER_BIT));
    }
}
