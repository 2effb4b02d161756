//! [`GlDriver`] implementation over [`glow`].

use std::num::NonZeroU32;

use glow::HasContext;

use super::{GlDriver, GlHandle, ProgramBinary};

/// The real OpenGL / GLES driver.
///
/// Wraps a [`glow::Context`] created from the platform's loader function.
/// All calls assume the context is current on the calling thread, which the
/// backend guarantees through `ensure_context` before replaying anything.
pub struct GlowDriver {
    gl: glow::Context,
}

impl GlowDriver {
    /// Wrap an existing glow context.
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    /// Load GL entry points through `loader`.
    ///
    /// # Safety
    ///
    /// A context must be current and `loader` must return valid entry points
    /// for it (or null for unsupported ones).
    pub unsafe fn from_loader_function<F>(loader: F) -> Self
    where
        F: FnMut(&str) -> *const std::os::raw::c_void,
    {
        Self {
            gl: unsafe { glow::Context::from_loader_function(loader) },
        }
    }

    /// Access the underlying context.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

impl std::fmt::Debug for GlowDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.gl.version();
        f.debug_struct("GlowDriver")
            .field("major", &version.major)
            .field("minor", &version.minor)
            .field("is_embedded", &version.is_embedded)
            .finish()
    }
}

fn nz(handle: GlHandle) -> Option<NonZeroU32> {
    NonZeroU32::new(handle)
}

fn buffer(handle: GlHandle) -> Option<glow::NativeBuffer> {
    nz(handle).map(glow::NativeBuffer)
}

fn texture(handle: GlHandle) -> Option<glow::NativeTexture> {
    nz(handle).map(glow::NativeTexture)
}

fn renderbuffer(handle: GlHandle) -> Option<glow::NativeRenderbuffer> {
    nz(handle).map(glow::NativeRenderbuffer)
}

fn framebuffer(handle: GlHandle) -> Option<glow::NativeFramebuffer> {
    nz(handle).map(glow::NativeFramebuffer)
}

fn vertex_array(handle: GlHandle) -> Option<glow::NativeVertexArray> {
    nz(handle).map(glow::NativeVertexArray)
}

fn program(handle: GlHandle) -> Option<glow::NativeProgram> {
    nz(handle).map(glow::NativeProgram)
}

fn shader(handle: GlHandle) -> Option<glow::NativeShader> {
    nz(handle).map(glow::NativeShader)
}

// SAFETY (all methods below): the backend only calls into the driver after
// `ensure_context` made the context current on this thread, and only passes
// names it created through this same driver.
impl GlDriver for GlowDriver {
    fn get_string(&self, name: u32) -> String {
        unsafe { self.gl.get_parameter_string(name) }
    }

    fn get_integer(&self, pname: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(pname) }
    }

    fn get_integer_indexed(&self, pname: u32, index: u32) -> i32 {
        unsafe { self.gl.get_parameter_indexed_i32(pname, index) }
    }

    fn extensions(&self) -> Vec<String> {
        self.gl.supported_extensions().iter().cloned().collect()
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn flush(&self) {
        unsafe { self.gl.flush() }
    }

    fn finish(&self) {
        unsafe { self.gl.finish() }
    }

    fn enable(&self, cap: u32) {
        unsafe { self.gl.enable(cap) }
    }

    fn disable(&self, cap: u32) {
        unsafe { self.gl.disable(cap) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn depth_range(&self, near: f32, far: f32) {
        unsafe { self.gl.depth_range_f32(near, far) }
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }

    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.blend_color(r, g, b, a) }
    }

    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        unsafe {
            self.gl
                .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha)
        }
    }

    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32) {
        unsafe { self.gl.blend_equation_separate(mode_rgb, mode_alpha) }
    }

    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        unsafe { self.gl.color_mask(r, g, b, a) }
    }

    fn depth_func(&self, func: u32) {
        unsafe { self.gl.depth_func(func) }
    }

    fn depth_mask(&self, write: bool) {
        unsafe { self.gl.depth_mask(write) }
    }

    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32) {
        unsafe { self.gl.stencil_func_separate(face, func, reference, mask) }
    }

    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        unsafe { self.gl.stencil_op_separate(face, fail, depth_fail, pass) }
    }

    fn stencil_mask_separate(&self, face: u32, mask: u32) {
        unsafe { self.gl.stencil_mask_separate(face, mask) }
    }

    fn cull_face(&self, mode: u32) {
        unsafe { self.gl.cull_face(mode) }
    }

    fn front_face(&self, mode: u32) {
        unsafe { self.gl.front_face(mode) }
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }

    fn polygon_mode(&self, face: u32, mode: u32) {
        unsafe { self.gl.polygon_mode(face, mode) }
    }

    fn line_width(&self, width: f32) {
        unsafe { self.gl.line_width(width) }
    }

    fn patch_vertices(&self, count: i32) {
        unsafe { self.gl.patch_parameter_i32(glow::PATCH_VERTICES, count) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear_depth(&self, depth: f32) {
        unsafe { self.gl.clear_depth_f32(depth) }
    }

    fn clear_stencil(&self, stencil: i32) {
        unsafe { self.gl.clear_stencil(stencil) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }

    fn create_buffer(&self) -> Result<GlHandle, String> {
        unsafe { self.gl.create_buffer() }.map(|b| b.0.get())
    }

    fn delete_buffer(&self, handle: GlHandle) {
        if let Some(b) = buffer(handle) {
            unsafe { self.gl.delete_buffer(b) }
        }
    }

    fn bind_buffer(&self, target: u32, handle: GlHandle) {
        unsafe { self.gl.bind_buffer(target, buffer(handle)) }
    }

    fn bind_buffer_range(&self, target: u32, index: u32, handle: GlHandle, offset: i32, size: i32) {
        unsafe {
            self.gl
                .bind_buffer_range(target, index, buffer(handle), offset, size)
        }
    }

    fn buffer_data_size(&self, target: u32, size: i32, usage: u32) {
        unsafe { self.gl.buffer_data_size(target, size, usage) }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, offset, data) }
    }

    fn get_buffer_sub_data(&self, target: u32, offset: i32, out: &mut [u8]) {
        unsafe { self.gl.get_buffer_sub_data(target, offset, out) }
    }

    fn read_buffer_mapped(&self, target: u32, offset: i32, out: &mut [u8]) -> bool {
        unsafe {
            let ptr = self
                .gl
                .map_buffer_range(target, offset, out.len() as i32, glow::MAP_READ_BIT);
            if ptr.is_null() {
                return false;
            }
            std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), out.len());
            self.gl.unmap_buffer(target);
        }
        true
    }

    fn write_buffer_mapped(&self, target: u32, offset: i32, data: &[u8]) -> bool {
        unsafe {
            let ptr = self.gl.map_buffer_range(
                target,
                offset,
                data.len() as i32,
                glow::MAP_WRITE_BIT | glow::MAP_INVALIDATE_RANGE_BIT,
            );
            if ptr.is_null() {
                return false;
            }
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
            self.gl.unmap_buffer(target);
        }
        true
    }

    fn create_vertex_array(&self) -> Result<GlHandle, String> {
        unsafe { self.gl.create_vertex_array() }.map(|v| v.0.get())
    }

    fn delete_vertex_array(&self, vao: GlHandle) {
        if let Some(v) = vertex_array(vao) {
            unsafe { self.gl.delete_vertex_array(v) }
        }
    }

    fn bind_vertex_array(&self, vao: GlHandle) {
        unsafe { self.gl.bind_vertex_array(vertex_array(vao)) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, ty, normalized, stride, offset)
        }
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, ty: u32, stride: i32, offset: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_i32(index, size, ty, stride, offset)
        }
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(index, divisor) }
    }

    fn create_texture(&self) -> Result<GlHandle, String> {
        unsafe { self.gl.create_texture() }.map(|t| t.0.get())
    }

    fn delete_texture(&self, handle: GlHandle) {
        if let Some(t) = texture(handle) {
            unsafe { self.gl.delete_texture(t) }
        }
    }

    fn bind_texture(&self, target: u32, handle: GlHandle) {
        unsafe { self.gl.bind_texture(target, texture(handle)) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, pname, value) }
    }

    fn pixel_store_i32(&self, pname: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(pname, value) }
    }

    fn tex_image_1d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    ) {
        unsafe {
            self.gl.tex_image_1d(
                target,
                level,
                internal_format,
                width,
                0,
                format,
                ty,
                glow::PixelUnpackData::Slice(data),
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                level,
                internal_format,
                width,
                height,
                0,
                format,
                ty,
                glow::PixelUnpackData::Slice(data),
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_image_3d(
                target,
                level,
                internal_format,
                width,
                height,
                depth,
                0,
                format,
                ty,
                glow::PixelUnpackData::Slice(data),
            )
        }
    }

    fn tex_storage_2d(&self, target: u32, levels: i32, internal_format: u32, width: i32, height: i32) {
        unsafe {
            self.gl
                .tex_storage_2d(target, levels, internal_format, width, height)
        }
    }

    fn tex_storage_3d(
        &self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    ) {
        unsafe {
            self.gl
                .tex_storage_3d(target, levels, internal_format, width, height, depth)
        }
    }

    fn tex_storage_2d_multisample(
        &self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        unsafe {
            self.gl.tex_storage_2d_multisample(
                target,
                samples,
                internal_format,
                width,
                height,
                true,
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                level,
                x,
                y,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::Slice(Some(data)),
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_3d(
                target,
                level,
                x,
                y,
                z,
                width,
                height,
                depth,
                format,
                ty,
                glow::PixelUnpackData::Slice(Some(data)),
            )
        }
    }

    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    ) {
        unsafe {
            self.gl.compressed_tex_image_2d(
                target,
                level,
                internal_format as i32,
                width,
                height,
                0,
                data.len() as i32,
                data,
            )
        }
    }

    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
        data: &[u8],
    ) {
        unsafe {
            self.gl.compressed_tex_image_3d(
                target,
                level,
                internal_format as i32,
                width,
                height,
                depth,
                0,
                data.len() as i32,
                data,
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.compressed_tex_sub_image_2d(
                target,
                level,
                x,
                y,
                width,
                height,
                format,
                glow::CompressedPixelUnpackData::Slice(data),
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.compressed_tex_sub_image_3d(
                target,
                level,
                x,
                y,
                z,
                width,
                height,
                depth,
                format,
                glow::CompressedPixelUnpackData::Slice(data),
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.copy_tex_sub_image_2d(
                target, level, dst_x, dst_y, src_x, src_y, width, height,
            )
        }
    }

    fn generate_mipmap(&self, target: u32) {
        unsafe { self.gl.generate_mipmap(target) }
    }

    fn bind_image_texture(
        &self,
        unit: u32,
        handle: GlHandle,
        level: i32,
        layered: bool,
        layer: i32,
        access: u32,
        format: u32,
    ) {
        unsafe {
            self.gl.bind_image_texture(
                unit,
                texture(handle),
                level,
                layered,
                layer,
                access,
                format,
            )
        }
    }

    fn create_renderbuffer(&self) -> Result<GlHandle, String> {
        unsafe { self.gl.create_renderbuffer() }.map(|r| r.0.get())
    }

    fn delete_renderbuffer(&self, handle: GlHandle) {
        if let Some(r) = renderbuffer(handle) {
            unsafe { self.gl.delete_renderbuffer(r) }
        }
    }

    fn bind_renderbuffer(&self, handle: GlHandle) {
        unsafe {
            self.gl
                .bind_renderbuffer(glow::RENDERBUFFER, renderbuffer(handle))
        }
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        unsafe {
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, internal_format, width, height)
        }
    }

    fn renderbuffer_storage_multisample(
        &self,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        unsafe {
            self.gl.renderbuffer_storage_multisample(
                glow::RENDERBUFFER,
                samples,
                internal_format,
                width,
                height,
            )
        }
    }

    fn create_framebuffer(&self) -> Result<GlHandle, String> {
        unsafe { self.gl.create_framebuffer() }.map(|f| f.0.get())
    }

    fn delete_framebuffer(&self, handle: GlHandle) {
        if let Some(f) = framebuffer(handle) {
            unsafe { self.gl.delete_framebuffer(f) }
        }
    }

    fn bind_framebuffer(&self, target: u32, handle: GlHandle) {
        unsafe { self.gl.bind_framebuffer(target, framebuffer(handle)) }
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        handle: GlHandle,
        level: i32,
    ) {
        unsafe {
            self.gl
                .framebuffer_texture_2d(target, attachment, tex_target, texture(handle), level)
        }
    }

    fn framebuffer_texture_layer(
        &self,
        target: u32,
        attachment: u32,
        handle: GlHandle,
        level: i32,
        layer: i32,
    ) {
        unsafe {
            self.gl
                .framebuffer_texture_layer(target, attachment, texture(handle), level, layer)
        }
    }

    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, handle: GlHandle) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                target,
                attachment,
                glow::RENDERBUFFER,
                renderbuffer(handle),
            )
        }
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        unsafe { self.gl.check_framebuffer_status(target) }
    }

    fn draw_buffers(&self, buffers: &[u32]) {
        unsafe { self.gl.draw_buffers(buffers) }
    }

    fn read_buffer(&self, src: u32) {
        unsafe { self.gl.read_buffer(src) }
    }

    fn blit_framebuffer(&self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32) {
        unsafe {
            self.gl.blit_framebuffer(
                src[0], src[1], src[2], src[3], dst[0], dst[1], dst[2], dst[3], mask, filter,
            )
        }
    }

    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]) {
        unsafe { self.gl.invalidate_framebuffer(target, attachments) }
    }

    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        out: &mut [u8],
    ) {
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                width,
                height,
                format,
                ty,
                glow::PixelPackData::Slice(Some(out)),
            )
        }
    }

    fn create_shader(&self, stage: u32) -> Result<GlHandle, String> {
        unsafe { self.gl.create_shader(stage) }.map(|s| s.0.get())
    }

    fn delete_shader(&self, handle: GlHandle) {
        if let Some(s) = shader(handle) {
            unsafe { self.gl.delete_shader(s) }
        }
    }

    fn shader_source(&self, handle: GlHandle, source: &str) {
        if let Some(s) = shader(handle) {
            unsafe { self.gl.shader_source(s, source) }
        }
    }

    fn compile_shader(&self, handle: GlHandle) {
        if let Some(s) = shader(handle) {
            unsafe { self.gl.compile_shader(s) }
        }
    }

    fn get_shader_compile_status(&self, handle: GlHandle) -> bool {
        shader(handle).is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }

    fn get_shader_info_log(&self, handle: GlHandle) -> String {
        shader(handle)
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn create_program(&self) -> Result<GlHandle, String> {
        unsafe { self.gl.create_program() }.map(|p| p.0.get())
    }

    fn delete_program(&self, handle: GlHandle) {
        if let Some(p) = program(handle) {
            unsafe { self.gl.delete_program(p) }
        }
    }

    fn attach_shader(&self, prog: GlHandle, sh: GlHandle) {
        if let (Some(p), Some(s)) = (program(prog), shader(sh)) {
            unsafe { self.gl.attach_shader(p, s) }
        }
    }

    fn detach_shader(&self, prog: GlHandle, sh: GlHandle) {
        if let (Some(p), Some(s)) = (program(prog), shader(sh)) {
            unsafe { self.gl.detach_shader(p, s) }
        }
    }

    fn bind_attrib_location(&self, prog: GlHandle, index: u32, name: &str) {
        if let Some(p) = program(prog) {
            unsafe { self.gl.bind_attrib_location(p, index, name) }
        }
    }

    fn link_program(&self, prog: GlHandle) {
        if let Some(p) = program(prog) {
            unsafe { self.gl.link_program(p) }
        }
    }

    fn get_program_link_status(&self, prog: GlHandle) -> bool {
        program(prog).is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }

    fn get_program_info_log(&self, prog: GlHandle) -> String {
        program(prog)
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn use_program(&self, prog: GlHandle) {
        unsafe { self.gl.use_program(program(prog)) }
    }

    fn get_uniform_location(&self, prog: GlHandle, name: &str) -> Option<u32> {
        let p = program(prog)?;
        unsafe { self.gl.get_uniform_location(p, name) }.map(|l| l.0)
    }

    fn uniform_i32_slice(&self, location: u32, components: u32, values: &[i32]) {
        let loc = glow::NativeUniformLocation(location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_i32_slice(Some(&loc), values),
                2 => self.gl.uniform_2_i32_slice(Some(&loc), values),
                3 => self.gl.uniform_3_i32_slice(Some(&loc), values),
                _ => self.gl.uniform_4_i32_slice(Some(&loc), values),
            }
        }
    }

    fn uniform_u32_slice(&self, location: u32, components: u32, values: &[u32]) {
        let loc = glow::NativeUniformLocation(location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_u32_slice(Some(&loc), values),
                2 => self.gl.uniform_2_u32_slice(Some(&loc), values),
                3 => self.gl.uniform_3_u32_slice(Some(&loc), values),
                _ => self.gl.uniform_4_u32_slice(Some(&loc), values),
            }
        }
    }

    fn uniform_f32_slice(&self, location: u32, components: u32, values: &[f32]) {
        let loc = glow::NativeUniformLocation(location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_f32_slice(Some(&loc), values),
                2 => self.gl.uniform_2_f32_slice(Some(&loc), values),
                3 => self.gl.uniform_3_f32_slice(Some(&loc), values),
                _ => self.gl.uniform_4_f32_slice(Some(&loc), values),
            }
        }
    }

    fn uniform_matrix_f32_slice(&self, location: u32, dim: u32, values: &[f32]) {
        let loc = glow::NativeUniformLocation(location);
        unsafe {
            match dim {
                2 => self.gl.uniform_matrix_2_f32_slice(Some(&loc), false, values),
                3 => self.gl.uniform_matrix_3_f32_slice(Some(&loc), false, values),
                _ => self.gl.uniform_matrix_4_f32_slice(Some(&loc), false, values),
            }
        }
    }

    fn program_binary_retrievable_hint(&self, prog: GlHandle) {
        if let Some(p) = program(prog) {
            unsafe { self.gl.program_binary_retrievable_hint(p, true) }
        }
    }

    fn get_program_binary(&self, prog: GlHandle) -> Option<ProgramBinary> {
        let p = program(prog)?;
        let binary = unsafe { self.gl.get_program_binary(p) }?;
        if binary.buffer.is_empty() {
            return None;
        }
        Some(ProgramBinary {
            format: binary.format,
            data: binary.buffer,
        })
    }

    fn program_binary(&self, prog: GlHandle, binary: &ProgramBinary) {
        if let Some(p) = program(prog) {
            let native = glow::ProgramBinary {
                buffer: binary.data.clone(),
                format: binary.format,
            };
            unsafe { self.gl.program_binary(p, &native) }
        }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        unsafe { self.gl.draw_arrays_instanced(mode, first, count, instances) }
    }

    fn draw_elements(&self, mode: u32, count: i32, index_type: u32, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, index_type, offset) }
    }

    fn draw_elements_base_vertex(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        base_vertex: i32,
    ) {
        unsafe {
            self.gl
                .draw_elements_base_vertex(mode, count, index_type, offset, base_vertex)
        }
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        instances: i32,
    ) {
        unsafe {
            self.gl
                .draw_elements_instanced(mode, count, index_type, offset, instances)
        }
    }

    fn draw_elements_instanced_base_vertex(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        instances: i32,
        base_vertex: i32,
    ) {
        unsafe {
            self.gl.draw_elements_instanced_base_vertex(
                mode,
                count,
                index_type,
                offset,
                instances,
                base_vertex,
            )
        }
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        unsafe { self.gl.dispatch_compute(x, y, z) }
    }

    fn memory_barrier(&self, barriers: u32) {
        unsafe { self.gl.memory_barrier(barriers) }
    }

    fn push_debug_group(&self, message: &str) {
        unsafe {
            self.gl
                .push_debug_group(glow::DEBUG_SOURCE_APPLICATION, 0, message)
        }
    }

    fn pop_debug_group(&self) {
        unsafe { self.gl.pop_debug_group() }
    }

    fn debug_message_insert(&self, message: &str) {
        unsafe {
            self.gl.debug_message_insert(
                glow::DEBUG_SOURCE_APPLICATION,
                glow::DEBUG_TYPE_MARKER,
                0,
                glow::DEBUG_SEVERITY_NOTIFICATION,
                message,
            )
        }
    }
}
