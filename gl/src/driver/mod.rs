//! Driver abstraction layer.
//!
//! The backend never calls an OpenGL entry point directly. Everything goes
//! through [`GlDriver`], a narrow object-safe trait mirroring the subset of
//! GL / GLES / WebGL the backend uses. Objects are raw `u32` GL names, with
//! `0` meaning "none"; enum arguments are the [`glow`] constants.
//!
//! # Available Drivers
//!
//! - [`GlowDriver`]: the real driver on native targets, wrapping a
//!   [`glow::Context`]
//! - [`DummyDriver`] (feature `dummy`, default): a software model of the GL
//!   object state used by tests and headless tools
//!
//! Every method must only be called while the driver's context is current on
//! the calling thread; [`GlRhi::ensure_context`](crate::GlRhi::ensure_context)
//! is the single place that guarantees it.

#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(not(target_arch = "wasm32"))]
pub mod glow_driver;

#[cfg(feature = "dummy")]
pub use dummy::{DummyCall, DummyDriver};
#[cfg(not(target_arch = "wasm32"))]
pub use glow_driver::GlowDriver;

use serde::{Deserialize, Serialize};

/// A raw GL object name. `0` is the null object.
pub type GlHandle = u32;

/// A linked program in driver-specific binary form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramBinary {
    /// Driver-defined binary format enum.
    pub format: u32,
    /// Opaque program bytes.
    pub data: Vec<u8>,
}

/// The OpenGL-family entry points used by the backend.
pub trait GlDriver {
    // ========================================================================
    // Queries
    // ========================================================================

    /// `glGetString`.
    fn get_string(&self, name: u32) -> String;
    /// `glGetIntegerv` for a single value.
    fn get_integer(&self, pname: u32) -> i32;
    /// `glGetIntegeri_v`.
    fn get_integer_indexed(&self, pname: u32, index: u32) -> i32;
    /// The extension strings the context exposes.
    fn extensions(&self) -> Vec<String>;
    /// `glGetError`.
    fn get_error(&self) -> u32;
    /// `glFlush`.
    fn flush(&self);
    /// `glFinish`.
    fn finish(&self);

    // ========================================================================
    // Fixed function state
    // ========================================================================

    fn enable(&self, cap: u32);
    fn disable(&self, cap: u32);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn depth_range(&self, near: f32, far: f32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32);
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool);
    fn depth_func(&self, func: u32);
    fn depth_mask(&self, write: bool);
    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32);
    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32);
    fn stencil_mask_separate(&self, face: u32, mask: u32);
    fn cull_face(&self, mode: u32);
    fn front_face(&self, mode: u32);
    fn polygon_offset(&self, factor: f32, units: f32);
    fn polygon_mode(&self, face: u32, mode: u32);
    fn line_width(&self, width: f32);
    fn patch_vertices(&self, count: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&self, depth: f32);
    fn clear_stencil(&self, stencil: i32);
    fn clear(&self, mask: u32);

    // ========================================================================
    // Buffers
    // ========================================================================

    fn create_buffer(&self) -> Result<GlHandle, String>;
    fn delete_buffer(&self, buffer: GlHandle);
    fn bind_buffer(&self, target: u32, buffer: GlHandle);
    fn bind_buffer_range(&self, target: u32, index: u32, buffer: GlHandle, offset: i32, size: i32);
    fn buffer_data_size(&self, target: u32, size: i32, usage: u32);
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]);
    /// `glGetBufferSubData`. Desktop GL only.
    fn get_buffer_sub_data(&self, target: u32, offset: i32, out: &mut [u8]);
    /// Map `[offset, offset + out.len())` for reading, copy it out and unmap.
    fn read_buffer_mapped(&self, target: u32, offset: i32, out: &mut [u8]) -> bool;
    /// Map `[offset, offset + data.len())` for writing, copy `data` in and unmap.
    fn write_buffer_mapped(&self, target: u32, offset: i32, data: &[u8]) -> bool;

    // ========================================================================
    // Vertex input
    // ========================================================================

    fn create_vertex_array(&self) -> Result<GlHandle, String>;
    fn delete_vertex_array(&self, vao: GlHandle);
    fn bind_vertex_array(&self, vao: GlHandle);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, ty: u32, stride: i32, offset: i32);
    fn vertex_attrib_divisor(&self, index: u32, divisor: u32);

    // ========================================================================
    // Textures
    // ========================================================================

    fn create_texture(&self) -> Result<GlHandle, String>;
    fn delete_texture(&self, texture: GlHandle);
    fn bind_texture(&self, target: u32, texture: GlHandle);
    /// `glActiveTexture(GL_TEXTURE0 + unit)`.
    fn active_texture(&self, unit: u32);
    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32);
    fn pixel_store_i32(&self, pname: u32, value: i32);
    #[allow(clippy::too_many_arguments)]
    fn tex_image_1d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        depth: i32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    );
    fn tex_storage_2d(&self, target: u32, levels: i32, internal_format: u32, width: i32, height: i32);
    #[allow(clippy::too_many_arguments)]
    fn tex_storage_3d(
        &self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    );
    fn tex_storage_2d_multisample(
        &self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_3d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        z: i32,
        width: i32,
        height: i32,
        depth: i32,
        format: u32,
        ty: u32,
        data: &[u8],
    );
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_sub_image_3d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        z: i32,
        width: i32,
        height: i32,
        depth: i32,
        format: u32,
        data: &[u8],
    );
    /// Copy from the current read framebuffer into the bound texture.
    #[allow(clippy::too_many_arguments)]
    fn copy_tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        dst_x: i32,
        dst_y: i32,
        src_x: i32,
        src_y: i32,
        width: i32,
        height: i32,
    );
    fn generate_mipmap(&self, target: u32);
    #[allow(clippy::too_many_arguments)]
    fn bind_image_texture(
        &self,
        unit: u32,
        texture: GlHandle,
        level: i32,
        layered: bool,
        layer: i32,
        access: u32,
        format: u32,
    );

    // ========================================================================
    // Renderbuffers and framebuffers
    // ========================================================================

    fn create_renderbuffer(&self) -> Result<GlHandle, String>;
    fn delete_renderbuffer(&self, renderbuffer: GlHandle);
    fn bind_renderbuffer(&self, renderbuffer: GlHandle);
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32);
    fn renderbuffer_storage_multisample(
        &self,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );
    fn create_framebuffer(&self) -> Result<GlHandle, String>;
    fn delete_framebuffer(&self, framebuffer: GlHandle);
    fn bind_framebuffer(&self, target: u32, framebuffer: GlHandle);
    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: GlHandle,
        level: i32,
    );
    fn framebuffer_texture_layer(
        &self,
        target: u32,
        attachment: u32,
        texture: GlHandle,
        level: i32,
        layer: i32,
    );
    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, renderbuffer: GlHandle);
    fn check_framebuffer_status(&self, target: u32) -> u32;
    fn draw_buffers(&self, buffers: &[u32]);
    fn read_buffer(&self, src: u32);
    /// Blit `src` rectangle `[x0, y0, x1, y1]` of the read framebuffer into
    /// `dst` of the draw framebuffer.
    fn blit_framebuffer(&self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32);
    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]);
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        out: &mut [u8],
    );

    // ========================================================================
    // Shaders and programs
    // ========================================================================

    fn create_shader(&self, stage: u32) -> Result<GlHandle, String>;
    fn delete_shader(&self, shader: GlHandle);
    fn shader_source(&self, shader: GlHandle, source: &str);
    fn compile_shader(&self, shader: GlHandle);
    fn get_shader_compile_status(&self, shader: GlHandle) -> bool;
    fn get_shader_info_log(&self, shader: GlHandle) -> String;
    fn create_program(&self) -> Result<GlHandle, String>;
    fn delete_program(&self, program: GlHandle);
    fn attach_shader(&self, program: GlHandle, shader: GlHandle);
    fn detach_shader(&self, program: GlHandle, shader: GlHandle);
    fn bind_attrib_location(&self, program: GlHandle, index: u32, name: &str);
    fn link_program(&self, program: GlHandle);
    fn get_program_link_status(&self, program: GlHandle) -> bool;
    fn get_program_info_log(&self, program: GlHandle) -> String;
    fn use_program(&self, program: GlHandle);
    /// Location of an active uniform, `None` when inactive or unknown.
    fn get_uniform_location(&self, program: GlHandle, name: &str) -> Option<u32>;
    /// `glUniform{1,2,3,4}iv` selected by `components`.
    fn uniform_i32_slice(&self, location: u32, components: u32, values: &[i32]);
    /// `glUniform{1,2,3,4}uiv` selected by `components`.
    fn uniform_u32_slice(&self, location: u32, components: u32, values: &[u32]);
    /// `glUniform{1,2,3,4}fv` selected by `components`.
    fn uniform_f32_slice(&self, location: u32, components: u32, values: &[f32]);
    /// `glUniformMatrix{2,3,4}fv` for square matrices of `dim` columns.
    fn uniform_matrix_f32_slice(&self, location: u32, dim: u32, values: &[f32]);
    fn program_binary_retrievable_hint(&self, program: GlHandle);
    fn get_program_binary(&self, program: GlHandle) -> Option<ProgramBinary>;
    fn program_binary(&self, program: GlHandle, binary: &ProgramBinary);

    // ========================================================================
    // Draws, dispatches and synchronization
    // ========================================================================

    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32);
    fn draw_elements(&self, mode: u32, count: i32, index_type: u32, offset: i32);
    fn draw_elements_base_vertex(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        base_vertex: i32,
    );
    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        instances: i32,
    );
    #[allow(clippy::too_many_arguments)]
    fn draw_elements_instanced_base_vertex(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        instances: i32,
        base_vertex: i32,
    );
    fn dispatch_compute(&self, x: u32, y: u32, z: u32);
    fn memory_barrier(&self, barriers: u32);

    // ========================================================================
    // Debug
    // ========================================================================

    fn push_debug_group(&self, message: &str);
    fn pop_debug_group(&self);
    fn debug_message_insert(&self, message: &str);
}
