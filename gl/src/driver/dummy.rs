//! Software model of an OpenGL-family context.
//!
//! [`DummyDriver`] tracks GL object state in host memory so the whole backend
//! can run without a GPU: object names, buffer contents, texture level images,
//! framebuffer attachments, clears, blits, pixel readbacks, programs with
//! round-trippable binaries and uniform values. Rasterization is not modeled;
//! draws and dispatches are only logged.
//!
//! Every entry point appends a [`DummyCall`] to a call log so tests can make
//! assertions about the exact driver traffic a command stream produced.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{GlDriver, GlHandle, ProgramBinary};

/// Binary format tag of programs produced by [`DummyDriver`].
pub const DUMMY_PROGRAM_BINARY_FORMAT: u32 = 0x8D64_0001;

const PROGRAM_BINARY_MAGIC: &[u8; 8] = b"RLDUMMY1";

// ============================================================================
// Profiles
// ============================================================================

/// The version, extension and limit set a [`DummyDriver`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyProfile {
    /// `GL_VERSION` string.
    pub version: String,
    /// `GL_SHADING_LANGUAGE_VERSION` string.
    pub shading_language_version: String,
    /// Extension strings.
    pub extensions: Vec<String>,
    /// Report the core profile bit in `GL_CONTEXT_PROFILE_MASK`.
    pub core_profile: bool,
    /// Integer limits by GL enum.
    pub limits: HashMap<u32, i32>,
    /// `GL_MAX_COMPUTE_WORK_GROUP_SIZE` per dimension.
    pub compute_work_group_size: [i32; 3],
    /// `GL_MAX_COMPUTE_WORK_GROUP_COUNT` per dimension.
    pub compute_work_group_count: [i32; 3],
    /// Whether `glGetProgramBinary` produces binaries.
    pub program_binaries: bool,
    /// Whether `glMapBufferRange` works.
    pub map_buffer_range: bool,
}

impl DummyProfile {
    fn base_limits(max_texture_size: i32, max_samples: i32) -> HashMap<u32, i32> {
        HashMap::from([
            (glow::MAX_TEXTURE_SIZE, max_texture_size),
            (glow::MAX_COLOR_ATTACHMENTS, 8),
            (glow::MAX_DRAW_BUFFERS, 8),
            (glow::MAX_VERTEX_ATTRIBS, 16),
            (glow::MAX_VERTEX_UNIFORM_VECTORS, 1024),
            (glow::MAX_FRAGMENT_UNIFORM_VECTORS, 1024),
            (glow::MAX_VARYING_VECTORS, 31),
            (glow::MAX_VERTEX_OUTPUT_COMPONENTS, 128),
            (glow::MAX_SAMPLES, max_samples),
            (glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS, 32),
            (glow::MAX_UNIFORM_BLOCK_SIZE, 65536),
            (glow::MAX_COMPUTE_WORK_GROUP_INVOCATIONS, 1024),
        ])
    }

    /// Desktop OpenGL 4.6, core profile.
    pub fn desktop_gl46() -> Self {
        Self {
            version: "4.6.0 RedLilium Dummy".to_string(),
            shading_language_version: "4.60 RedLilium Dummy".to_string(),
            extensions: vec![
                "GL_ARB_get_program_binary".to_string(),
                "GL_EXT_texture_compression_s3tc".to_string(),
                "GL_ARB_texture_compression_bptc".to_string(),
                "GL_KHR_debug".to_string(),
            ],
            core_profile: true,
            limits: Self::base_limits(16384, 8),
            compute_work_group_size: [1024, 1024, 64],
            compute_work_group_count: [65535, 65535, 65535],
            program_binaries: true,
            map_buffer_range: true,
        }
    }

    /// Desktop OpenGL 3.3, core profile.
    pub fn desktop_gl33() -> Self {
        Self {
            version: "3.3.0 RedLilium Dummy".to_string(),
            shading_language_version: "3.30 RedLilium Dummy".to_string(),
            extensions: vec!["GL_EXT_texture_compression_s3tc".to_string()],
            core_profile: true,
            limits: Self::base_limits(16384, 8),
            compute_work_group_size: [0, 0, 0],
            compute_work_group_count: [0, 0, 0],
            program_binaries: false,
            map_buffer_range: true,
        }
    }

    /// OpenGL ES 3.2.
    pub fn gles32() -> Self {
        Self {
            version: "OpenGL ES 3.2 RedLilium Dummy".to_string(),
            shading_language_version: "OpenGL ES GLSL ES 3.20".to_string(),
            extensions: vec![
                "GL_KHR_debug".to_string(),
                "GL_EXT_color_buffer_float".to_string(),
            ],
            core_profile: false,
            limits: Self::base_limits(8192, 4),
            compute_work_group_size: [128, 128, 64],
            compute_work_group_count: [65535, 65535, 65535],
            program_binaries: true,
            map_buffer_range: true,
        }
    }

    /// OpenGL ES 3.0.
    pub fn gles30() -> Self {
        Self {
            version: "OpenGL ES 3.0 RedLilium Dummy".to_string(),
            shading_language_version: "OpenGL ES GLSL ES 3.00".to_string(),
            extensions: Vec::new(),
            core_profile: false,
            limits: Self::base_limits(4096, 4),
            compute_work_group_size: [0, 0, 0],
            compute_work_group_count: [0, 0, 0],
            program_binaries: true,
            map_buffer_range: true,
        }
    }

    /// OpenGL ES 2.0 with no extensions.
    pub fn gles20() -> Self {
        let mut limits = Self::base_limits(2048, 0);
        limits.insert(glow::MAX_COLOR_ATTACHMENTS, 1);
        limits.insert(glow::MAX_DRAW_BUFFERS, 1);
        limits.insert(glow::MAX_VERTEX_ATTRIBS, 8);
        limits.insert(glow::MAX_VERTEX_UNIFORM_VECTORS, 128);
        limits.insert(glow::MAX_FRAGMENT_UNIFORM_VECTORS, 16);
        limits.insert(glow::MAX_VARYING_VECTORS, 8);
        Self {
            version: "OpenGL ES 2.0 RedLilium Dummy".to_string(),
            shading_language_version: "OpenGL ES GLSL ES 1.00".to_string(),
            extensions: Vec::new(),
            core_profile: false,
            limits,
            compute_work_group_size: [0, 0, 0],
            compute_work_group_count: [0, 0, 0],
            program_binaries: false,
            map_buffer_range: false,
        }
    }

    /// WebGL 2 as reported by browsers.
    pub fn webgl2() -> Self {
        Self {
            version: "WebGL 2.0 (OpenGL ES 3.0 RedLilium Dummy)".to_string(),
            shading_language_version: "WebGL GLSL ES 3.00".to_string(),
            extensions: vec!["EXT_color_buffer_float".to_string()],
            core_profile: false,
            limits: Self::base_limits(4096, 4),
            compute_work_group_size: [0, 0, 0],
            compute_work_group_count: [0, 0, 0],
            program_binaries: false,
            map_buffer_range: false,
        }
    }

    /// Add an extension string.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Override an integer limit.
    pub fn with_limit(mut self, pname: u32, value: i32) -> Self {
        self.limits.insert(pname, value);
        self
    }

    /// Enable or disable program binaries.
    pub fn with_program_binaries(mut self, enabled: bool) -> Self {
        self.program_binaries = enabled;
        self
    }
}

impl Default for DummyProfile {
    fn default() -> Self {
        Self::desktop_gl46()
    }
}

// ============================================================================
// Call log
// ============================================================================

/// A recorded driver call.
///
/// Calls that matter for behavioral assertions get their own variant; the
/// rest are logged as [`DummyCall::Other`] with the GL entry point name.
#[derive(Debug, Clone, PartialEq)]
pub enum DummyCall {
    CreateBuffer(GlHandle),
    DeleteBuffer(GlHandle),
    BufferData { buffer: GlHandle, size: usize },
    BufferSubData { buffer: GlHandle, offset: i32, len: usize },
    GetBufferSubData { buffer: GlHandle, offset: i32, len: usize },
    MapBufferRange { buffer: GlHandle, offset: i32, len: usize },
    CreateTexture(GlHandle),
    DeleteTexture(GlHandle),
    BindTexture { target: u32, texture: GlHandle },
    TexParameter { pname: u32, value: i32 },
    TexImage { target: u32, level: i32, width: i32, height: i32, depth: i32 },
    TexStorage { target: u32, levels: i32, width: i32, height: i32, depth: i32 },
    TexSubImage { target: u32, level: i32, x: i32, y: i32, width: i32, height: i32 },
    CompressedTexImage { target: u32, level: i32, width: i32, height: i32, len: usize },
    CompressedTexSubImage { target: u32, level: i32, x: i32, y: i32, width: i32, height: i32 },
    CopyTexSubImage { target: u32, level: i32 },
    GenerateMipmap(u32),
    BindImageTexture { unit: u32, texture: GlHandle },
    CreateRenderbuffer(GlHandle),
    DeleteRenderbuffer(GlHandle),
    CreateFramebuffer(GlHandle),
    DeleteFramebuffer(GlHandle),
    BindFramebuffer { target: u32, framebuffer: GlHandle },
    DrawBuffers(Vec<u32>),
    BlitFramebuffer { mask: u32 },
    InvalidateFramebuffer(Vec<u32>),
    ReadPixels { width: i32, height: i32 },
    Clear(u32),
    Enable(u32),
    Disable(u32),
    Viewport([i32; 4]),
    Scissor([i32; 4]),
    CreateShader(GlHandle),
    DeleteShader(GlHandle),
    CompileShader(GlHandle),
    CreateProgram(GlHandle),
    DeleteProgram(GlHandle),
    BindAttribLocation { index: u32, name: String },
    LinkProgram(GlHandle),
    ProgramBinary(GlHandle),
    GetProgramBinary(GlHandle),
    UseProgram(GlHandle),
    Uniform { location: u32 },
    CreateVertexArray(GlHandle),
    BindVertexArray(GlHandle),
    VertexAttribPointer { index: u32, stride: i32, offset: i32 },
    VertexAttribDivisor { index: u32, divisor: u32 },
    DrawArrays { mode: u32, first: i32, count: i32, instances: i32 },
    DrawElements { mode: u32, count: i32, index_type: u32, offset: i32, instances: i32, base_vertex: i32 },
    DispatchCompute([u32; 3]),
    MemoryBarrier(u32),
    PushDebugGroup(String),
    PopDebugGroup,
    DebugMarker(String),
    Finish,
    Other(&'static str),
}

// ============================================================================
// Object model
// ============================================================================

#[derive(Debug, Clone, Default)]
struct DummyImage {
    width: u32,
    height: u32,
    depth: u32,
    /// Bytes per texel; zero for block-compressed images.
    bytes_per_pixel: u32,
    /// Bytes per 4x4 block of compressed images.
    block_bytes: u32,
    data: Vec<u8>,
}

impl DummyImage {
    fn uncompressed(width: u32, height: u32, depth: u32, bytes_per_pixel: u32) -> Self {
        let len = (width * height * depth.max(1) * bytes_per_pixel) as usize;
        Self {
            width,
            height,
            depth: depth.max(1),
            bytes_per_pixel,
            block_bytes: 0,
            data: vec![0; len],
        }
    }

    fn layer_stride(&self) -> usize {
        (self.width * self.height * self.bytes_per_pixel) as usize
    }
}

#[derive(Debug, Default)]
struct DummyTexture {
    target: Option<u32>,
    internal_format: u32,
    immutable: bool,
    samples: i32,
    /// Images keyed by (level, cube face).
    images: BTreeMap<(i32, u32), DummyImage>,
    params: HashMap<u32, i32>,
}

#[derive(Debug, Default)]
struct DummyRenderbuffer {
    internal_format: u32,
    samples: i32,
    image: DummyImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attachment {
    Texture { texture: GlHandle, level: i32, face: u32, layer: u32 },
    Renderbuffer(GlHandle),
}

#[derive(Debug, Default)]
struct DummyFramebuffer {
    attachments: HashMap<u32, Attachment>,
    draw_buffers: Vec<u32>,
    read_buffer: u32,
}

#[derive(Debug, Default)]
struct DummyShader {
    stage: u32,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Clone, PartialEq)]
enum UniformValue {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U32(Vec<u32>),
}

#[derive(Debug, Default)]
struct DummyProgram {
    shaders: Vec<GlHandle>,
    /// (stage, source) of the last successful link or binary load.
    linked_sources: Vec<(u32, String)>,
    linked: bool,
    log: String,
    attrib_bindings: BTreeMap<String, u32>,
    uniform_locations: HashMap<String, u32>,
    next_location: u32,
    uniforms: HashMap<u32, UniformValue>,
}

impl DummyProgram {
    fn source_mentions(&self, identifier: &str) -> bool {
        self.linked_sources
            .iter()
            .any(|(_, src)| contains_identifier(src, identifier))
    }
}

fn contains_identifier(source: &str, identifier: &str) -> bool {
    if identifier.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    source.match_indices(identifier).any(|(i, _)| {
        let before = source[..i].chars().next_back();
        let after = source[i + identifier.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

#[derive(Debug)]
struct DummyState {
    next_name: u32,
    error: u32,

    buffers: HashMap<GlHandle, Vec<u8>>,
    buffer_bindings: HashMap<u32, GlHandle>,

    textures: HashMap<GlHandle, DummyTexture>,
    active_unit: u32,
    texture_bindings: HashMap<(u32, u32), GlHandle>,
    unpack_row_length: i32,

    renderbuffers: HashMap<GlHandle, DummyRenderbuffer>,
    bound_renderbuffer: GlHandle,

    framebuffers: HashMap<GlHandle, DummyFramebuffer>,
    draw_framebuffer: GlHandle,
    read_framebuffer: GlHandle,
    default_color: DummyImage,

    vertex_arrays: HashSet<GlHandle>,
    shaders: HashMap<GlHandle, DummyShader>,
    programs: HashMap<GlHandle, DummyProgram>,
    current_program: GlHandle,

    enabled: HashSet<u32>,
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: i32,
    last_memory_barrier: Option<u32>,
    debug_group_depth: u32,
    program_failures: u32,

    calls: Vec<DummyCall>,
}

impl Default for DummyState {
    fn default() -> Self {
        Self {
            next_name: 1,
            error: glow::NO_ERROR,
            buffers: HashMap::new(),
            buffer_bindings: HashMap::new(),
            textures: HashMap::new(),
            active_unit: 0,
            texture_bindings: HashMap::new(),
            unpack_row_length: 0,
            renderbuffers: HashMap::new(),
            bound_renderbuffer: 0,
            framebuffers: HashMap::new(),
            draw_framebuffer: 0,
            read_framebuffer: 0,
            default_color: DummyImage::default(),
            vertex_arrays: HashSet::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: 0,
            enabled: HashSet::new(),
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            last_memory_barrier: None,
            debug_group_depth: 0,
            program_failures: 0,
            calls: Vec::new(),
        }
    }
}

impl DummyState {
    fn alloc_name(&mut self) -> GlHandle {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    fn set_error(&mut self, error: u32) {
        if self.error == glow::NO_ERROR {
            self.error = error;
        }
    }

    fn bound_buffer(&self, target: u32) -> GlHandle {
        self.buffer_bindings.get(&target).copied().unwrap_or(0)
    }

    fn bound_texture(&self, target: u32) -> GlHandle {
        let bind_target = binding_target(target);
        self.texture_bindings
            .get(&(self.active_unit, bind_target))
            .copied()
            .unwrap_or(0)
    }

    fn bound_texture_mut(&mut self, target: u32) -> Option<&mut DummyTexture> {
        let handle = self.bound_texture(target);
        self.textures.get_mut(&handle)
    }

    fn framebuffer_binding(&self, target: u32) -> GlHandle {
        if target == glow::READ_FRAMEBUFFER {
            self.read_framebuffer
        } else {
            self.draw_framebuffer
        }
    }

    fn color_attachment_image(&mut self, attachment: Attachment) -> Option<(&mut DummyImage, u32)> {
        match attachment {
            Attachment::Texture {
                texture,
                level,
                face,
                layer,
            } => self
                .textures
                .get_mut(&texture)?
                .images
                .get_mut(&(level, face))
                .map(|img| (img, layer)),
            Attachment::Renderbuffer(rb) => {
                self.renderbuffers.get_mut(&rb).map(|r| (&mut r.image, 0))
            }
        }
    }

    fn read_source(&mut self) -> Option<(&mut DummyImage, u32)> {
        if self.read_framebuffer == 0 {
            return Some((&mut self.default_color, 0));
        }
        let fb = self.framebuffers.get(&self.read_framebuffer)?;
        let slot = if fb.read_buffer == 0 {
            glow::COLOR_ATTACHMENT0
        } else {
            fb.read_buffer
        };
        let attachment = *fb.attachments.get(&slot)?;
        self.color_attachment_image(attachment)
    }

    fn draw_color_attachments(&self) -> Vec<Option<Attachment>> {
        if self.draw_framebuffer == 0 {
            return vec![None];
        }
        let Some(fb) = self.framebuffers.get(&self.draw_framebuffer) else {
            return Vec::new();
        };
        let slots: Vec<u32> = if fb.draw_buffers.is_empty() {
            vec![glow::COLOR_ATTACHMENT0]
        } else {
            fb.draw_buffers
                .iter()
                .copied()
                .filter(|b| *b != glow::NONE)
                .collect()
        };
        slots
            .iter()
            .filter_map(|slot| fb.attachments.get(slot).copied().map(Some))
            .collect()
    }
}

fn binding_target(target: u32) -> u32 {
    if (glow::TEXTURE_CUBE_MAP_POSITIVE_X..=glow::TEXTURE_CUBE_MAP_NEGATIVE_Z).contains(&target) {
        glow::TEXTURE_CUBE_MAP
    } else {
        target
    }
}

fn cube_face(target: u32) -> u32 {
    if (glow::TEXTURE_CUBE_MAP_POSITIVE_X..=glow::TEXTURE_CUBE_MAP_NEGATIVE_Z).contains(&target) {
        target - glow::TEXTURE_CUBE_MAP_POSITIVE_X
    } else {
        0
    }
}

/// Bytes per texel of an external (format, type) pair.
fn external_bytes_per_pixel(format: u32, ty: u32) -> u32 {
    let components = match format {
        glow::RED | glow::RED_INTEGER | glow::ALPHA | glow::LUMINANCE | glow::DEPTH_COMPONENT => 1,
        glow::RG | glow::RG_INTEGER | glow::LUMINANCE_ALPHA => 2,
        glow::RGB | glow::RGB_INTEGER => 3,
        _ => 4,
    };
    match ty {
        glow::UNSIGNED_BYTE | glow::BYTE => components,
        glow::UNSIGNED_SHORT | glow::SHORT | glow::HALF_FLOAT => components * 2,
        glow::UNSIGNED_INT_24_8
        | glow::UNSIGNED_INT_2_10_10_10_REV
        | glow::UNSIGNED_INT_10F_11F_11F_REV => 4,
        glow::FLOAT_32_UNSIGNED_INT_24_8_REV => 8,
        _ => components * 4,
    }
}

/// Bytes per texel of a sized internal format.
fn internal_bytes_per_pixel(internal: u32) -> u32 {
    match internal {
        glow::R8 | glow::R8_SNORM | glow::R8UI | glow::R8I | glow::ALPHA | glow::LUMINANCE
        | glow::STENCIL_INDEX8 => 1,
        glow::RG8 | glow::R16 | glow::R16F | glow::R16UI | glow::DEPTH_COMPONENT16 => 2,
        glow::RGB8 | glow::SRGB8 => 3,
        glow::RGBA16F | glow::RG32F | glow::RG32UI | glow::RGBA16 | glow::DEPTH32F_STENCIL8 => 8,
        glow::RGBA32F | glow::RGBA32UI | glow::RGBA32I => 16,
        _ => 4,
    }
}

/// Bytes per 4x4 block of a compressed internal format, `None` when not compressed.
fn compressed_block_bytes(internal: u32) -> Option<u32> {
    match internal {
        glow::COMPRESSED_RGB_S3TC_DXT1_EXT
        | glow::COMPRESSED_RGBA_S3TC_DXT1_EXT
        | glow::COMPRESSED_SRGB_ALPHA_S3TC_DXT1_EXT
        | glow::COMPRESSED_RED_RGTC1
        | glow::COMPRESSED_RGB8_ETC2
        | glow::COMPRESSED_SRGB8_ETC2
        | glow::COMPRESSED_RGB8_PUNCHTHROUGH_ALPHA1_ETC2
        | glow::COMPRESSED_SRGB8_PUNCHTHROUGH_ALPHA1_ETC2 => Some(8),
        glow::COMPRESSED_RGBA_S3TC_DXT3_EXT
        | glow::COMPRESSED_RGBA_S3TC_DXT5_EXT
        | glow::COMPRESSED_SRGB_ALPHA_S3TC_DXT3_EXT
        | glow::COMPRESSED_SRGB_ALPHA_S3TC_DXT5_EXT
        | glow::COMPRESSED_RG_RGTC2
        | glow::COMPRESSED_RGBA_BPTC_UNORM
        | glow::COMPRESSED_SRGB_ALPHA_BPTC_UNORM
        | glow::COMPRESSED_RGB_BPTC_SIGNED_FLOAT
        | glow::COMPRESSED_RGB_BPTC_UNSIGNED_FLOAT
        | glow::COMPRESSED_RGBA8_ETC2_EAC
        | glow::COMPRESSED_SRGB8_ALPHA8_ETC2_EAC
        | glow::COMPRESSED_RGBA_ASTC_4x4_KHR
        | glow::COMPRESSED_SRGB8_ALPHA8_ASTC_4x4_KHR => Some(16),
        _ => None,
    }
}

fn clear_texel(color: [f32; 4], bytes_per_pixel: u32) -> Vec<u8> {
    match bytes_per_pixel {
        16 => color.iter().flat_map(|c| c.to_le_bytes()).collect(),
        n => color
            .iter()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .cycle()
            .take(n as usize)
            .collect(),
    }
}

/// Copy a tightly packed `w * h * d` region of `src` into `img` at `(x, y, z)`.
#[allow(clippy::too_many_arguments)]
fn write_region(
    img: &mut DummyImage,
    x: i32,
    y: i32,
    z: i32,
    w: i32,
    h: i32,
    d: i32,
    src: &[u8],
    row_length: i32,
) -> bool {
    if x < 0
        || y < 0
        || z < 0
        || (x + w) as u32 > img.width
        || (y + h) as u32 > img.height
        || (z + d) as u32 > img.depth
    {
        return false;
    }
    let bpp = img.bytes_per_pixel as usize;
    let src_row_px = if row_length > 0 { row_length } else { w } as usize;
    let row_bytes = w as usize * bpp;
    for layer in 0..d as usize {
        for row in 0..h as usize {
            let src_off = ((layer * h as usize + row) * src_row_px) * bpp;
            let dst_off = (((z as usize + layer) * img.height as usize + y as usize + row)
                * img.width as usize
                + x as usize)
                * bpp;
            if src_off + row_bytes > src.len() {
                return false;
            }
            img.data[dst_off..dst_off + row_bytes]
                .copy_from_slice(&src[src_off..src_off + row_bytes]);
        }
    }
    true
}

fn read_region(img: &DummyImage, layer: u32, x: i32, y: i32, w: i32, h: i32, out: &mut [u8]) -> bool {
    if x < 0 || y < 0 || (x + w) as u32 > img.width || (y + h) as u32 > img.height {
        return false;
    }
    let bpp = img.bytes_per_pixel as usize;
    let row_bytes = w as usize * bpp;
    let base = layer as usize * img.layer_stride();
    for row in 0..h as usize {
        let src_off = base + ((y as usize + row) * img.width as usize + x as usize) * bpp;
        let dst_off = row * row_bytes;
        if dst_off + row_bytes > out.len() {
            return false;
        }
        out[dst_off..dst_off + row_bytes].copy_from_slice(&img.data[src_off..src_off + row_bytes]);
    }
    true
}

/// Patch a block-compressed region. Coordinates are in texels and must be
/// block aligned.
#[allow(clippy::too_many_arguments)]
fn write_compressed_region(
    img: &mut DummyImage,
    x: i32,
    y: i32,
    z: i32,
    w: i32,
    h: i32,
    d: i32,
    src: &[u8],
) -> bool {
    if img.block_bytes == 0 || x % 4 != 0 || y % 4 != 0 {
        return false;
    }
    let blocks_w = img.width.div_ceil(4) as usize;
    let blocks_h = img.height.div_ceil(4) as usize;
    let (bx, by) = (x as usize / 4, y as usize / 4);
    let (bw, bh) = ((w as usize).div_ceil(4), (h as usize).div_ceil(4));
    if bx + bw > blocks_w || by + bh > blocks_h || (z + d) as u32 > img.depth {
        return false;
    }
    let block = img.block_bytes as usize;
    let layer_bytes = blocks_w * blocks_h * block;
    let row_bytes = bw * block;
    for layer in 0..d as usize {
        for row in 0..bh {
            let src_off = (layer * bh + row) * row_bytes;
            let dst_off = (z as usize + layer) * layer_bytes + ((by + row) * blocks_w + bx) * block;
            if src_off + row_bytes > src.len() || dst_off + row_bytes > img.data.len() {
                return false;
            }
            img.data[dst_off..dst_off + row_bytes]
                .copy_from_slice(&src[src_off..src_off + row_bytes]);
        }
    }
    true
}

// ============================================================================
// DummyDriver
// ============================================================================

/// A GPU-less [`GlDriver`].
///
/// Clones share the same object state, call log and loss flag, so a test can
/// hand one clone to the backend and inspect through another.
///
/// # Example
///
/// ```ignore
/// let driver = Arc::new(DummyDriver::with_profile(DummyProfile::gles30()));
/// let buffer = driver.create_buffer()?;
/// assert_eq!(driver.live_buffers(), 1);
/// ```
#[derive(Clone)]
pub struct DummyDriver {
    profile: DummyProfile,
    state: Arc<Mutex<DummyState>>,
    lost: Arc<AtomicBool>,
}

impl DummyDriver {
    /// Create a driver emulating desktop GL 4.6 core.
    pub fn new() -> Self {
        Self::with_profile(DummyProfile::default())
    }

    /// Create a driver emulating `profile`.
    pub fn with_profile(profile: DummyProfile) -> Self {
        Self {
            profile,
            state: Arc::new(Mutex::new(DummyState::default())),
            lost: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The emulated profile.
    pub fn profile(&self) -> &DummyProfile {
        &self.profile
    }

    // ========================================================================
    // Test controls
    // ========================================================================

    /// Flag shared with a platform context so both observe a context loss.
    pub fn loss_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    /// Simulate a lost context.
    pub fn lose_context(&self) {
        log::trace!("DummyDriver: context lost");
        self.lost.store(true, Ordering::SeqCst);
    }

    /// Whether the context was lost.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Make the next `count` program creations fail.
    pub fn fail_program_creations(&self, count: u32) {
        self.state.lock().program_failures = count;
    }

    /// Resize the default framebuffer's color image (RGBA8).
    pub fn resize_default_framebuffer(&self, width: u32, height: u32) {
        self.state.lock().default_color = DummyImage::uncompressed(width, height, 1, 4);
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<DummyCall> {
        self.state.lock().calls.clone()
    }

    /// Number of logged calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of logged calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&DummyCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Mask passed to the last `glMemoryBarrier`.
    pub fn last_memory_barrier(&self) -> Option<u32> {
        self.state.lock().last_memory_barrier
    }

    // ========================================================================
    // Object inspection
    // ========================================================================

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        self.state.lock().renderbuffers.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.lock().programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.lock().shaders.len()
    }

    pub fn is_buffer_alive(&self, buffer: GlHandle) -> bool {
        self.state.lock().buffers.contains_key(&buffer)
    }

    pub fn is_texture_alive(&self, texture: GlHandle) -> bool {
        self.state.lock().textures.contains_key(&texture)
    }

    /// Contents of a buffer object.
    pub fn buffer_contents(&self, buffer: GlHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).cloned()
    }

    /// Raw bytes of a texture level (all layers) for cube face `face`.
    pub fn texture_level(&self, texture: GlHandle, level: i32, face: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .textures
            .get(&texture)?
            .images
            .get(&(level, face))
            .map(|img| img.data.clone())
    }

    /// Value of a texture parameter set through `glTexParameteri`.
    pub fn texture_parameter(&self, texture: GlHandle, pname: u32) -> Option<i32> {
        self.state.lock().textures.get(&texture)?.params.get(&pname).copied()
    }

    /// Internal format and sample count of a texture.
    pub fn texture_format(&self, texture: GlHandle) -> Option<(u32, i32)> {
        let state = self.state.lock();
        let tex = state.textures.get(&texture)?;
        Some((tex.internal_format, tex.samples))
    }

    /// Internal format and sample count of a renderbuffer.
    pub fn renderbuffer_format(&self, renderbuffer: GlHandle) -> Option<(u32, i32)> {
        let state = self.state.lock();
        let rb = state.renderbuffers.get(&renderbuffer)?;
        Some((rb.internal_format, rb.samples))
    }

    /// Whether `texture` was allocated with immutable storage.
    pub fn texture_is_immutable(&self, texture: GlHandle) -> bool {
        self.state
            .lock()
            .textures
            .get(&texture)
            .is_some_and(|t| t.immutable)
    }

    /// Float uniform value of `name` in `program`.
    pub fn uniform_f32(&self, program: GlHandle, name: &str) -> Option<Vec<f32>> {
        let state = self.state.lock();
        let prog = state.programs.get(&program)?;
        let loc = prog.uniform_locations.get(name)?;
        match prog.uniforms.get(loc)? {
            UniformValue::F32(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Integer uniform value of `name` in `program` (samplers included).
    pub fn uniform_i32(&self, program: GlHandle, name: &str) -> Option<Vec<i32>> {
        let state = self.state.lock();
        let prog = state.programs.get(&program)?;
        let loc = prog.uniform_locations.get(name)?;
        match prog.uniforms.get(loc)? {
            UniformValue::I32(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Attribute locations bound before the last link of `program`.
    pub fn attrib_bindings(&self, program: GlHandle) -> Vec<(String, u32)> {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|p| {
                p.attrib_bindings
                    .iter()
                    .map(|(n, i)| (n.clone(), *i))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn log(&self, call: DummyCall) {
        self.state.lock().calls.push(call);
    }
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyDriver")
            .field("version", &self.profile.version)
            .field("lost", &self.is_lost())
            .finish()
    }
}

impl GlDriver for DummyDriver {
    // ========================================================================
    // Queries
    // ========================================================================

    fn get_string(&self, name: u32) -> String {
        match name {
            glow::VERSION => self.profile.version.clone(),
            glow::SHADING_LANGUAGE_VERSION => self.profile.shading_language_version.clone(),
            glow::VENDOR => "RedLilium".to_string(),
            glow::RENDERER => "RedLilium Dummy Renderer".to_string(),
            _ => String::new(),
        }
    }

    fn get_integer(&self, pname: u32) -> i32 {
        match pname {
            glow::CONTEXT_PROFILE_MASK if self.profile.core_profile => {
                glow::CONTEXT_CORE_PROFILE_BIT as i32
            }
            glow::CONTEXT_PROFILE_MASK => 0,
            glow::NUM_PROGRAM_BINARY_FORMATS => i32::from(self.profile.program_binaries),
            _ => self.profile.limits.get(&pname).copied().unwrap_or(0),
        }
    }

    fn get_integer_indexed(&self, pname: u32, index: u32) -> i32 {
        let i = (index as usize).min(2);
        match pname {
            glow::MAX_COMPUTE_WORK_GROUP_SIZE => self.profile.compute_work_group_size[i],
            glow::MAX_COMPUTE_WORK_GROUP_COUNT => self.profile.compute_work_group_count[i],
            _ => 0,
        }
    }

    fn extensions(&self) -> Vec<String> {
        self.profile.extensions.clone()
    }

    fn get_error(&self) -> u32 {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.error, glow::NO_ERROR)
    }

    fn flush(&self) {
        self.log(DummyCall::Other("glFlush"));
    }

    fn finish(&self) {
        self.log(DummyCall::Finish);
    }

    // ========================================================================
    // Fixed function state
    // ========================================================================

    fn enable(&self, cap: u32) {
        let mut state = self.state.lock();
        state.enabled.insert(cap);
        state.calls.push(DummyCall::Enable(cap));
    }

    fn disable(&self, cap: u32) {
        let mut state = self.state.lock();
        state.enabled.remove(&cap);
        state.calls.push(DummyCall::Disable(cap));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.log(DummyCall::Viewport([x, y, width, height]));
    }

    fn depth_range(&self, _near: f32, _far: f32) {
        self.log(DummyCall::Other("glDepthRangef"));
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.log(DummyCall::Scissor([x, y, width, height]));
    }

    fn blend_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {
        self.log(DummyCall::Other("glBlendColor"));
    }

    fn blend_func_separate(&self, _src_rgb: u32, _dst_rgb: u32, _src_alpha: u32, _dst_alpha: u32) {
        self.log(DummyCall::Other("glBlendFuncSeparate"));
    }

    fn blend_equation_separate(&self, _mode_rgb: u32, _mode_alpha: u32) {
        self.log(DummyCall::Other("glBlendEquationSeparate"));
    }

    fn color_mask(&self, _r: bool, _g: bool, _b: bool, _a: bool) {
        self.log(DummyCall::Other("glColorMask"));
    }

    fn depth_func(&self, _func: u32) {
        self.log(DummyCall::Other("glDepthFunc"));
    }

    fn depth_mask(&self, _write: bool) {
        self.log(DummyCall::Other("glDepthMask"));
    }

    fn stencil_func_separate(&self, _face: u32, _func: u32, _reference: i32, _mask: u32) {
        self.log(DummyCall::Other("glStencilFuncSeparate"));
    }

    fn stencil_op_separate(&self, _face: u32, _fail: u32, _depth_fail: u32, _pass: u32) {
        self.log(DummyCall::Other("glStencilOpSeparate"));
    }

    fn stencil_mask_separate(&self, _face: u32, _mask: u32) {
        self.log(DummyCall::Other("glStencilMaskSeparate"));
    }

    fn cull_face(&self, _mode: u32) {
        self.log(DummyCall::Other("glCullFace"));
    }

    fn front_face(&self, _mode: u32) {
        self.log(DummyCall::Other("glFrontFace"));
    }

    fn polygon_offset(&self, _factor: f32, _units: f32) {
        self.log(DummyCall::Other("glPolygonOffset"));
    }

    fn polygon_mode(&self, _face: u32, _mode: u32) {
        self.log(DummyCall::Other("glPolygonMode"));
    }

    fn line_width(&self, _width: f32) {
        self.log(DummyCall::Other("glLineWidth"));
    }

    fn patch_vertices(&self, _count: i32) {
        self.log(DummyCall::Other("glPatchParameteri"));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.state.lock().clear_color = [r, g, b, a];
    }

    fn clear_depth(&self, depth: f32) {
        self.state.lock().clear_depth = depth;
    }

    fn clear_stencil(&self, stencil: i32) {
        self.state.lock().clear_stencil = stencil;
    }

    fn clear(&self, mask: u32) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::Clear(mask));
        if mask & glow::COLOR_BUFFER_BIT == 0 {
            return;
        }
        let color = state.clear_color;
        for attachment in state.draw_color_attachments() {
            let target = match attachment {
                None => Some((&mut state.default_color, 0)),
                Some(a) => state.color_attachment_image(a),
            };
            if let Some((img, layer)) = target
                && img.bytes_per_pixel > 0
            {
                let texel = clear_texel(color, img.bytes_per_pixel);
                let stride = img.layer_stride();
                let start = layer as usize * stride;
                if let Some(slice) = img.data.get_mut(start..start + stride) {
                    for chunk in slice.chunks_exact_mut(texel.len()) {
                        chunk.copy_from_slice(&texel);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    fn create_buffer(&self) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        let name = state.alloc_name();
        state.buffers.insert(name, Vec::new());
        state.calls.push(DummyCall::CreateBuffer(name));
        Ok(name)
    }

    fn delete_buffer(&self, buffer: GlHandle) {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer);
        state.buffer_bindings.retain(|_, b| *b != buffer);
        state.calls.push(DummyCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: u32, buffer: GlHandle) {
        let mut state = self.state.lock();
        state.buffer_bindings.insert(target, buffer);
        state.calls.push(DummyCall::Other("glBindBuffer"));
    }

    fn bind_buffer_range(&self, target: u32, _index: u32, buffer: GlHandle, _offset: i32, _size: i32) {
        let mut state = self.state.lock();
        state.buffer_bindings.insert(target, buffer);
        state.calls.push(DummyCall::Other("glBindBufferRange"));
    }

    fn buffer_data_size(&self, target: u32, size: i32, _usage: u32) {
        let mut state = self.state.lock();
        let buffer = state.bound_buffer(target);
        match state.buffers.get_mut(&buffer) {
            Some(data) => *data = vec![0; size.max(0) as usize],
            None => state.set_error(glow::INVALID_OPERATION),
        }
        state.calls.push(DummyCall::BufferData {
            buffer,
            size: size.max(0) as usize,
        });
    }

    fn buffer_data(&self, target: u32, data: &[u8], _usage: u32) {
        let mut state = self.state.lock();
        let buffer = state.bound_buffer(target);
        match state.buffers.get_mut(&buffer) {
            Some(contents) => *contents = data.to_vec(),
            None => state.set_error(glow::INVALID_OPERATION),
        }
        state.calls.push(DummyCall::BufferData {
            buffer,
            size: data.len(),
        });
    }

    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]) {
        let mut state = self.state.lock();
        let buffer = state.bound_buffer(target);
        let start = offset.max(0) as usize;
        let ok = match state.buffers.get_mut(&buffer) {
            Some(contents) if start + data.len() <= contents.len() => {
                contents[start..start + data.len()].copy_from_slice(data);
                true
            }
            _ => false,
        };
        if !ok {
            state.set_error(glow::INVALID_VALUE);
        }
        state.calls.push(DummyCall::BufferSubData {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn get_buffer_sub_data(&self, target: u32, offset: i32, out: &mut [u8]) {
        let mut state = self.state.lock();
        let buffer = state.bound_buffer(target);
        let start = offset.max(0) as usize;
        let ok = match state.buffers.get(&buffer) {
            Some(contents) if start + out.len() <= contents.len() => {
                out.copy_from_slice(&contents[start..start + out.len()]);
                true
            }
            _ => false,
        };
        if !ok {
            state.set_error(glow::INVALID_VALUE);
        }
        state.calls.push(DummyCall::GetBufferSubData {
            buffer,
            offset,
            len: out.len(),
        });
    }

    fn read_buffer_mapped(&self, target: u32, offset: i32, out: &mut [u8]) -> bool {
        if !self.profile.map_buffer_range {
            return false;
        }
        let mut state = self.state.lock();
        let buffer = state.bound_buffer(target);
        let start = offset.max(0) as usize;
        state.calls.push(DummyCall::MapBufferRange {
            buffer,
            offset,
            len: out.len(),
        });
        match state.buffers.get(&buffer) {
            Some(contents) if start + out.len() <= contents.len() => {
                out.copy_from_slice(&contents[start..start + out.len()]);
                true
            }
            _ => false,
        }
    }

    fn write_buffer_mapped(&self, target: u32, offset: i32, data: &[u8]) -> bool {
        if !self.profile.map_buffer_range {
            return false;
        }
        let mut state = self.state.lock();
        let buffer = state.bound_buffer(target);
        let start = offset.max(0) as usize;
        state.calls.push(DummyCall::MapBufferRange {
            buffer,
            offset,
            len: data.len(),
        });
        match state.buffers.get_mut(&buffer) {
            Some(contents) if start + data.len() <= contents.len() => {
                contents[start..start + data.len()].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Vertex input
    // ========================================================================

    fn create_vertex_array(&self) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        let name = state.alloc_name();
        state.vertex_arrays.insert(name);
        state.calls.push(DummyCall::CreateVertexArray(name));
        Ok(name)
    }

    fn delete_vertex_array(&self, vao: GlHandle) {
        let mut state = self.state.lock();
        state.vertex_arrays.remove(&vao);
        state.calls.push(DummyCall::Other("glDeleteVertexArrays"));
    }

    fn bind_vertex_array(&self, vao: GlHandle) {
        self.log(DummyCall::BindVertexArray(vao));
    }

    fn enable_vertex_attrib_array(&self, _index: u32) {
        self.log(DummyCall::Other("glEnableVertexAttribArray"));
    }

    fn disable_vertex_attrib_array(&self, _index: u32) {
        self.log(DummyCall::Other("glDisableVertexAttribArray"));
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        _size: i32,
        _ty: u32,
        _normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.log(DummyCall::VertexAttribPointer {
            index,
            stride,
            offset,
        });
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, _size: i32, _ty: u32, stride: i32, offset: i32) {
        self.log(DummyCall::VertexAttribPointer {
            index,
            stride,
            offset,
        });
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        self.log(DummyCall::VertexAttribDivisor { index, divisor });
    }

    // ========================================================================
    // Textures
    // ========================================================================

    fn create_texture(&self) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        let name = state.alloc_name();
        state.textures.insert(name, DummyTexture::default());
        state.calls.push(DummyCall::CreateTexture(name));
        Ok(name)
    }

    fn delete_texture(&self, texture: GlHandle) {
        let mut state = self.state.lock();
        state.textures.remove(&texture);
        state.texture_bindings.retain(|_, t| *t != texture);
        state.calls.push(DummyCall::DeleteTexture(texture));
    }

    fn bind_texture(&self, target: u32, texture: GlHandle) {
        let mut state = self.state.lock();
        let unit = state.active_unit;
        state.texture_bindings.insert((unit, target), texture);
        if let Some(tex) = state.textures.get_mut(&texture)
            && tex.target.is_none()
        {
            tex.target = Some(target);
        }
        state.calls.push(DummyCall::BindTexture { target, texture });
    }

    fn active_texture(&self, unit: u32) {
        let mut state = self.state.lock();
        state.active_unit = unit;
        state.calls.push(DummyCall::Other("glActiveTexture"));
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        let mut state = self.state.lock();
        if let Some(tex) = state.bound_texture_mut(target) {
            tex.params.insert(pname, value);
        }
        state.calls.push(DummyCall::TexParameter { pname, value });
    }

    fn pixel_store_i32(&self, pname: u32, value: i32) {
        let mut state = self.state.lock();
        if pname == glow::UNPACK_ROW_LENGTH {
            state.unpack_row_length = value;
        }
        state.calls.push(DummyCall::Other("glPixelStorei"));
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
        self.tex_image_3d(target, level, internal_format, width, 1, 1, format, ty, data);
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
        self.tex_image_3d(target, level, internal_format, width, height, 1, format, ty, data);
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::TexImage {
            target,
            level,
            width,
            height,
            depth,
        });
        let face = cube_face(target);
        let bpp = external_bytes_per_pixel(format, ty);
        let row_length = state.unpack_row_length;
        let Some(tex) = state.bound_texture_mut(target) else {
            state.set_error(glow::INVALID_OPERATION);
            return;
        };
        if tex.immutable {
            state.set_error(glow::INVALID_OPERATION);
            return;
        }
        tex.internal_format = internal_format as u32;
        let mut img = DummyImage::uncompressed(width as u32, height as u32, depth as u32, bpp);
        if let Some(src) = data {
            write_region(&mut img, 0, 0, 0, width, height, depth, src, row_length);
        }
        tex.images.insert((level, face), img);
    }

    fn tex_storage_2d(&self, target: u32, levels: i32, internal_format: u32, width: i32, height: i32) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::TexStorage {
            target,
            levels,
            width,
            height,
            depth: 1,
        });
        let faces = if target == glow::TEXTURE_CUBE_MAP { 6 } else { 1 };
        let Some(tex) = state.bound_texture_mut(target) else {
            state.set_error(glow::INVALID_OPERATION);
            return;
        };
        tex.internal_format = internal_format;
        tex.immutable = true;
        let block = compressed_block_bytes(internal_format);
        for level in 0..levels {
            let w = (width as u32 >> level).max(1);
            let h = (height as u32 >> level).max(1);
            for face in 0..faces {
                let img = match block {
                    Some(block_bytes) => DummyImage {
                        width: w,
                        height: h,
                        depth: 1,
                        bytes_per_pixel: 0,
                        block_bytes,
                        data: vec![0; (w.div_ceil(4) * h.div_ceil(4) * block_bytes) as usize],
                    },
                    None => DummyImage::uncompressed(w, h, 1, internal_bytes_per_pixel(internal_format)),
                };
                tex.images.insert((level, face), img);
            }
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::TexStorage {
            target,
            levels,
            width,
            height,
            depth,
        });
        let Some(tex) = state.bound_texture_mut(target) else {
            state.set_error(glow::INVALID_OPERATION);
            return;
        };
        tex.internal_format = internal_format;
        tex.immutable = true;
        let is_3d = target == glow::TEXTURE_3D;
        for level in 0..levels {
            let w = (width as u32 >> level).max(1);
            let h = (height as u32 >> level).max(1);
            let d = if is_3d {
                (depth as u32 >> level).max(1)
            } else {
                depth as u32
            };
            tex.images.insert(
                (level, 0),
                DummyImage::uncompressed(w, h, d, internal_bytes_per_pixel(internal_format)),
            );
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::TexStorage {
            target,
            levels: 1,
            width,
            height,
            depth: 1,
        });
        let Some(tex) = state.bound_texture_mut(target) else {
            state.set_error(glow::INVALID_OPERATION);
            return;
        };
        tex.internal_format = internal_format;
        tex.immutable = true;
        tex.samples = samples;
        tex.images.insert(
            (0, 0),
            DummyImage::uncompressed(
                width as u32,
                height as u32,
                1,
                internal_bytes_per_pixel(internal_format),
            ),
        );
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::TexSubImage {
            target,
            level,
            x,
            y,
            width,
            height,
        });
        let row_length = state.unpack_row_length;
        let face = cube_face(target);
        let ok = state
            .bound_texture_mut(target)
            .and_then(|tex| tex.images.get_mut(&(level, face)))
            .is_some_and(|img| {
                img.bytes_per_pixel == external_bytes_per_pixel(format, ty)
                    && write_region(img, x, y, 0, width, height, 1, data, row_length)
            });
        if !ok {
            state.set_error(glow::INVALID_OPERATION);
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::TexSubImage {
            target,
            level,
            x,
            y,
            width,
            height,
        });
        let row_length = state.unpack_row_length;
        let ok = state
            .bound_texture_mut(target)
            .and_then(|tex| tex.images.get_mut(&(level, 0)))
            .is_some_and(|img| {
                img.bytes_per_pixel == external_bytes_per_pixel(format, ty)
                    && write_region(img, x, y, z, width, height, depth, data, row_length)
            });
        if !ok {
            state.set_error(glow::INVALID_OPERATION);
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
        self.compressed_tex_image_3d(target, level, internal_format, width, height, 1, data);
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::CompressedTexImage {
            target,
            level,
            width,
            height,
            len: data.len(),
        });
        let face = cube_face(target);
        let Some(block_bytes) = compressed_block_bytes(internal_format) else {
            state.set_error(glow::INVALID_ENUM);
            return;
        };
        let (w, h, d) = (width as u32, height as u32, depth.max(1) as u32);
        let expected = (w.div_ceil(4) * h.div_ceil(4) * d * block_bytes) as usize;
        if data.len() != expected {
            state.set_error(glow::INVALID_VALUE);
            return;
        }
        let Some(tex) = state.bound_texture_mut(target) else {
            state.set_error(glow::INVALID_OPERATION);
            return;
        };
        tex.internal_format = internal_format;
        tex.images.insert(
            (level, face),
            DummyImage {
                width: w,
                height: h,
                depth: d,
                bytes_per_pixel: 0,
                block_bytes,
                data: data.to_vec(),
            },
        );
    }

    fn compressed_tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _format: u32,
        data: &[u8],
    ) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::CompressedTexSubImage {
            target,
            level,
            x,
            y,
            width,
            height,
        });
        let face = cube_face(target);
        let ok = state
            .bound_texture_mut(target)
            .and_then(|tex| tex.images.get_mut(&(level, face)))
            .is_some_and(|img| write_compressed_region(img, x, y, 0, width, height, 1, data));
        if !ok {
            state.set_error(glow::INVALID_OPERATION);
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
        _format: u32,
        data: &[u8],
    ) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::CompressedTexSubImage {
            target,
            level,
            x,
            y,
            width,
            height,
        });
        let ok = state
            .bound_texture_mut(target)
            .and_then(|tex| tex.images.get_mut(&(level, 0)))
            .is_some_and(|img| write_compressed_region(img, x, y, z, width, height, depth, data));
        if !ok {
            state.set_error(glow::INVALID_OPERATION);
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
        let mut state = self.state.lock();
        state.calls.push(DummyCall::CopyTexSubImage { target, level });
        let Some((src, layer)) = state.read_source() else {
            state.set_error(glow::INVALID_FRAMEBUFFER_OPERATION);
            return;
        };
        let mut pixels = vec![0u8; (width * height) as usize * src.bytes_per_pixel as usize];
        if !read_region(src, layer, src_x, src_y, width, height, &mut pixels) {
            state.set_error(glow::INVALID_VALUE);
            return;
        }
        let face = cube_face(target);
        let ok = state
            .bound_texture_mut(target)
            .and_then(|tex| tex.images.get_mut(&(level, face)))
            .is_some_and(|img| write_region(img, dst_x, dst_y, 0, width, height, 1, &pixels, 0));
        if !ok {
            state.set_error(glow::INVALID_OPERATION);
        }
    }

    fn generate_mipmap(&self, target: u32) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::GenerateMipmap(target));
        let Some(tex) = state.bound_texture_mut(target) else {
            return;
        };
        let Some(base) = tex.images.get(&(0, 0)).cloned() else {
            return;
        };
        if base.bytes_per_pixel == 0 {
            return;
        }
        let bpp = base.bytes_per_pixel as usize;
        let mut level = 1;
        let (mut w, mut h) = (base.width, base.height);
        while w > 1 || h > 1 {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            // Nearest downsample: every texel takes the top-left source texel.
            let mut img = DummyImage::uncompressed(w, h, base.depth, base.bytes_per_pixel);
            for z in 0..base.depth as usize {
                for y in 0..h as usize {
                    for x in 0..w as usize {
                        let sx = (x * base.width as usize / w as usize).min(base.width as usize - 1);
                        let sy = (y * base.height as usize / h as usize).min(base.height as usize - 1);
                        let src = ((z * base.height as usize + sy) * base.width as usize + sx) * bpp;
                        let dst = ((z * h as usize + y) * w as usize + x) * bpp;
                        img.data[dst..dst + bpp].copy_from_slice(&base.data[src..src + bpp]);
                    }
                }
            }
            tex.images.insert((level, 0), img);
            level += 1;
        }
    }

    fn bind_image_texture(
        &self,
        unit: u32,
        texture: GlHandle,
        _level: i32,
        _layered: bool,
        _layer: i32,
        _access: u32,
        _format: u32,
    ) {
        self.log(DummyCall::BindImageTexture { unit, texture });
    }

    // ========================================================================
    // Renderbuffers and framebuffers
    // ========================================================================

    fn create_renderbuffer(&self) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        let name = state.alloc_name();
        state.renderbuffers.insert(name, DummyRenderbuffer::default());
        state.calls.push(DummyCall::CreateRenderbuffer(name));
        Ok(name)
    }

    fn delete_renderbuffer(&self, renderbuffer: GlHandle) {
        let mut state = self.state.lock();
        state.renderbuffers.remove(&renderbuffer);
        state.calls.push(DummyCall::DeleteRenderbuffer(renderbuffer));
    }

    fn bind_renderbuffer(&self, renderbuffer: GlHandle) {
        let mut state = self.state.lock();
        state.bound_renderbuffer = renderbuffer;
        state.calls.push(DummyCall::Other("glBindRenderbuffer"));
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        self.renderbuffer_storage_multisample(0, internal_format, width, height);
    }

    fn renderbuffer_storage_multisample(
        &self,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::Other("glRenderbufferStorage"));
        let rb = state.bound_renderbuffer;
        let Some(renderbuffer) = state.renderbuffers.get_mut(&rb) else {
            state.set_error(glow::INVALID_OPERATION);
            return;
        };
        renderbuffer.internal_format = internal_format;
        renderbuffer.samples = samples;
        renderbuffer.image = DummyImage::uncompressed(
            width as u32,
            height as u32,
            1,
            internal_bytes_per_pixel(internal_format),
        );
    }

    fn create_framebuffer(&self) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        let name = state.alloc_name();
        state.framebuffers.insert(name, DummyFramebuffer::default());
        state.calls.push(DummyCall::CreateFramebuffer(name));
        Ok(name)
    }

    fn delete_framebuffer(&self, framebuffer: GlHandle) {
        let mut state = self.state.lock();
        state.framebuffers.remove(&framebuffer);
        if state.draw_framebuffer == framebuffer {
            state.draw_framebuffer = 0;
        }
        if state.read_framebuffer == framebuffer {
            state.read_framebuffer = 0;
        }
        state.calls.push(DummyCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: GlHandle) {
        let mut state = self.state.lock();
        match target {
            glow::READ_FRAMEBUFFER => state.read_framebuffer = framebuffer,
            glow::DRAW_FRAMEBUFFER => state.draw_framebuffer = framebuffer,
            _ => {
                state.read_framebuffer = framebuffer;
                state.draw_framebuffer = framebuffer;
            }
        }
        state.calls.push(DummyCall::BindFramebuffer {
            target,
            framebuffer,
        });
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: GlHandle,
        level: i32,
    ) {
        let mut state = self.state.lock();
        let fb = state.framebuffer_binding(target);
        if let Some(framebuffer) = state.framebuffers.get_mut(&fb) {
            if texture == 0 {
                framebuffer.attachments.remove(&attachment);
            } else {
                framebuffer.attachments.insert(
                    attachment,
                    Attachment::Texture {
                        texture,
                        level,
                        face: cube_face(tex_target),
                        layer: 0,
                    },
                );
            }
        }
        state.calls.push(DummyCall::Other("glFramebufferTexture2D"));
    }

    fn framebuffer_texture_layer(
        &self,
        target: u32,
        attachment: u32,
        texture: GlHandle,
        level: i32,
        layer: i32,
    ) {
        let mut state = self.state.lock();
        let fb = state.framebuffer_binding(target);
        let is_cube = state
            .textures
            .get(&texture)
            .is_some_and(|t| t.target == Some(glow::TEXTURE_CUBE_MAP));
        if let Some(framebuffer) = state.framebuffers.get_mut(&fb) {
            let (face, layer) = if is_cube {
                (layer as u32, 0)
            } else {
                (0, layer as u32)
            };
            framebuffer.attachments.insert(
                attachment,
                Attachment::Texture {
                    texture,
                    level,
                    face,
                    layer,
                },
            );
        }
        state.calls.push(DummyCall::Other("glFramebufferTextureLayer"));
    }

    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, renderbuffer: GlHandle) {
        let mut state = self.state.lock();
        let fb = state.framebuffer_binding(target);
        if let Some(framebuffer) = state.framebuffers.get_mut(&fb) {
            if renderbuffer == 0 {
                framebuffer.attachments.remove(&attachment);
            } else {
                framebuffer
                    .attachments
                    .insert(attachment, Attachment::Renderbuffer(renderbuffer));
            }
        }
        state.calls.push(DummyCall::Other("glFramebufferRenderbuffer"));
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        let state = self.state.lock();
        let fb = state.framebuffer_binding(target);
        if fb == 0 {
            return glow::FRAMEBUFFER_COMPLETE;
        }
        let Some(framebuffer) = state.framebuffers.get(&fb) else {
            return glow::FRAMEBUFFER_UNDEFINED;
        };
        if framebuffer.attachments.is_empty() {
            return glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT;
        }
        let all_alive = framebuffer.attachments.values().all(|a| match a {
            Attachment::Texture { texture, .. } => state.textures.contains_key(texture),
            Attachment::Renderbuffer(rb) => state.renderbuffers.contains_key(rb),
        });
        if all_alive {
            glow::FRAMEBUFFER_COMPLETE
        } else {
            glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT
        }
    }

    fn draw_buffers(&self, buffers: &[u32]) {
        let mut state = self.state.lock();
        let fb = state.draw_framebuffer;
        if let Some(framebuffer) = state.framebuffers.get_mut(&fb) {
            framebuffer.draw_buffers = buffers.to_vec();
        }
        state.calls.push(DummyCall::DrawBuffers(buffers.to_vec()));
    }

    fn read_buffer(&self, src: u32) {
        let mut state = self.state.lock();
        let fb = state.read_framebuffer;
        if let Some(framebuffer) = state.framebuffers.get_mut(&fb) {
            framebuffer.read_buffer = src;
        }
        state.calls.push(DummyCall::Other("glReadBuffer"));
    }

    fn blit_framebuffer(&self, src: [i32; 4], dst: [i32; 4], mask: u32, _filter: u32) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::BlitFramebuffer { mask });
        if mask & glow::COLOR_BUFFER_BIT == 0 {
            return;
        }
        let (w, h) = (src[2] - src[0], src[3] - src[1]);
        if w != dst[2] - dst[0] || h != dst[3] - dst[1] || w <= 0 || h <= 0 {
            // Scaling blits are not modeled.
            return;
        }
        let Some((src_img, src_layer)) = state.read_source() else {
            state.set_error(glow::INVALID_FRAMEBUFFER_OPERATION);
            return;
        };
        let bpp = src_img.bytes_per_pixel;
        let mut pixels = vec![0u8; (w * h) as usize * bpp as usize];
        if !read_region(src_img, src_layer, src[0], src[1], w, h, &mut pixels) {
            state.set_error(glow::INVALID_VALUE);
            return;
        }
        for attachment in state.draw_color_attachments() {
            let target = match attachment {
                None => Some((&mut state.default_color, 0)),
                Some(a) => state.color_attachment_image(a),
            };
            if let Some((img, layer)) = target
                && img.bytes_per_pixel == bpp
            {
                write_region(img, dst[0], dst[1], layer as i32, w, h, 1, &pixels, 0);
            }
        }
    }

    fn invalidate_framebuffer(&self, _target: u32, attachments: &[u32]) {
        self.log(DummyCall::InvalidateFramebuffer(attachments.to_vec()));
    }

    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        out: &mut [u8],
    ) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::ReadPixels { width, height });
        let ok = state
            .read_source()
            .is_some_and(|(img, layer)| read_region(img, layer, x, y, width, height, out));
        if !ok {
            state.set_error(glow::INVALID_OPERATION);
        }
    }

    // ========================================================================
    // Shaders and programs
    // ========================================================================

    fn create_shader(&self, stage: u32) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        let name = state.alloc_name();
        state.shaders.insert(
            name,
            DummyShader {
                stage,
                ..Default::default()
            },
        );
        state.calls.push(DummyCall::CreateShader(name));
        Ok(name)
    }

    fn delete_shader(&self, shader: GlHandle) {
        let mut state = self.state.lock();
        state.shaders.remove(&shader);
        state.calls.push(DummyCall::DeleteShader(shader));
    }

    fn shader_source(&self, shader: GlHandle, source: &str) {
        let mut state = self.state.lock();
        if let Some(sh) = state.shaders.get_mut(&shader) {
            sh.source = source.to_string();
        }
        state.calls.push(DummyCall::Other("glShaderSource"));
    }

    fn compile_shader(&self, shader: GlHandle) {
        let mut state = self.state.lock();
        if let Some(sh) = state.shaders.get_mut(&shader) {
            if sh.source.trim().is_empty() {
                sh.compiled = false;
                sh.log = "ERROR: 0:1: empty shader source".to_string();
            } else if let Some(line) = sh.source.lines().position(|l| l.trim_start().starts_with("#error")) {
                sh.compiled = false;
                sh.log = format!("ERROR: 0:{}: '#error' : user error directive", line + 1);
            } else {
                sh.compiled = true;
                sh.log.clear();
            }
        }
        state.calls.push(DummyCall::CompileShader(shader));
    }

    fn get_shader_compile_status(&self, shader: GlHandle) -> bool {
        self.state
            .lock()
            .shaders
            .get(&shader)
            .is_some_and(|s| s.compiled)
    }

    fn get_shader_info_log(&self, shader: GlHandle) -> String {
        self.state
            .lock()
            .shaders
            .get(&shader)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn create_program(&self) -> Result<GlHandle, String> {
        let mut state = self.state.lock();
        if state.program_failures > 0 {
            state.program_failures -= 1;
            return Err("out of program names".to_string());
        }
        let name = state.alloc_name();
        state.programs.insert(name, DummyProgram::default());
        state.calls.push(DummyCall::CreateProgram(name));
        Ok(name)
    }

    fn delete_program(&self, program: GlHandle) {
        let mut state = self.state.lock();
        state.programs.remove(&program);
        if state.current_program == program {
            state.current_program = 0;
        }
        state.calls.push(DummyCall::DeleteProgram(program));
    }

    fn attach_shader(&self, program: GlHandle, shader: GlHandle) {
        let mut state = self.state.lock();
        if let Some(prog) = state.programs.get_mut(&program) {
            prog.shaders.push(shader);
        }
        state.calls.push(DummyCall::Other("glAttachShader"));
    }

    fn detach_shader(&self, program: GlHandle, shader: GlHandle) {
        let mut state = self.state.lock();
        if let Some(prog) = state.programs.get_mut(&program) {
            prog.shaders.retain(|s| *s != shader);
        }
        state.calls.push(DummyCall::Other("glDetachShader"));
    }

    fn bind_attrib_location(&self, program: GlHandle, index: u32, name: &str) {
        let mut state = self.state.lock();
        if let Some(prog) = state.programs.get_mut(&program) {
            prog.attrib_bindings.insert(name.to_string(), index);
        }
        state.calls.push(DummyCall::BindAttribLocation {
            index,
            name: name.to_string(),
        });
    }

    fn link_program(&self, program: GlHandle) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::LinkProgram(program));
        let sources: Option<Vec<(u32, String)>> = state.programs.get(&program).map(|prog| {
            prog.shaders
                .iter()
                .filter_map(|s| state.shaders.get(s))
                .filter(|s| s.compiled)
                .map(|s| (s.stage, s.source.clone()))
                .collect()
        });
        let attached = state
            .programs
            .get(&program)
            .map(|p| p.shaders.len())
            .unwrap_or(0);
        let Some(prog) = state.programs.get_mut(&program) else {
            state.set_error(glow::INVALID_VALUE);
            return;
        };
        let sources = sources.unwrap_or_default();
        prog.uniform_locations.clear();
        prog.uniforms.clear();
        prog.next_location = 0;
        if sources.is_empty() || sources.len() != attached {
            prog.linked = false;
            prog.linked_sources.clear();
            prog.log = "error: one or more attached shaders not successfully compiled".to_string();
        } else {
            prog.linked = true;
            prog.linked_sources = sources;
            prog.log.clear();
        }
    }

    fn get_program_link_status(&self, program: GlHandle) -> bool {
        self.state
            .lock()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked)
    }

    fn get_program_info_log(&self, program: GlHandle) -> String {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn use_program(&self, program: GlHandle) {
        let mut state = self.state.lock();
        state.current_program = program;
        state.calls.push(DummyCall::UseProgram(program));
    }

    fn get_uniform_location(&self, program: GlHandle, name: &str) -> Option<u32> {
        let mut state = self.state.lock();
        let prog = state.programs.get_mut(&program)?;
        if !prog.linked {
            return None;
        }
        if let Some(loc) = prog.uniform_locations.get(name) {
            return Some(*loc);
        }
        // A uniform is active when every path component appears in the source.
        let active = name
            .split('.')
            .map(|part| part.split('[').next().unwrap_or(part))
            .all(|part| prog.source_mentions(part));
        if !active {
            return None;
        }
        let loc = prog.next_location;
        prog.next_location += 1;
        prog.uniform_locations.insert(name.to_string(), loc);
        Some(loc)
    }

    fn uniform_i32_slice(&self, location: u32, _components: u32, values: &[i32]) {
        let mut state = self.state.lock();
        let current = state.current_program;
        if let Some(prog) = state.programs.get_mut(&current) {
            prog.uniforms.insert(location, UniformValue::I32(values.to_vec()));
        }
        state.calls.push(DummyCall::Uniform { location });
    }

    fn uniform_u32_slice(&self, location: u32, _components: u32, values: &[u32]) {
        let mut state = self.state.lock();
        let current = state.current_program;
        if let Some(prog) = state.programs.get_mut(&current) {
            prog.uniforms.insert(location, UniformValue::U32(values.to_vec()));
        }
        state.calls.push(DummyCall::Uniform { location });
    }

    fn uniform_f32_slice(&self, location: u32, _components: u32, values: &[f32]) {
        let mut state = self.state.lock();
        let current = state.current_program;
        if let Some(prog) = state.programs.get_mut(&current) {
            prog.uniforms.insert(location, UniformValue::F32(values.to_vec()));
        }
        state.calls.push(DummyCall::Uniform { location });
    }

    fn uniform_matrix_f32_slice(&self, location: u32, _dim: u32, values: &[f32]) {
        self.uniform_f32_slice(location, 4, values);
    }

    fn program_binary_retrievable_hint(&self, _program: GlHandle) {
        self.log(DummyCall::Other("glProgramParameteri"));
    }

    fn get_program_binary(&self, program: GlHandle) -> Option<ProgramBinary> {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::GetProgramBinary(program));
        if !self.profile.program_binaries {
            return None;
        }
        let prog = state.programs.get(&program)?;
        if !prog.linked {
            return None;
        }
        let mut data = PROGRAM_BINARY_MAGIC.to_vec();
        let payload = bincode::serialize(&prog.linked_sources).ok()?;
        data.extend_from_slice(&payload);
        Some(ProgramBinary {
            format: DUMMY_PROGRAM_BINARY_FORMAT,
            data,
        })
    }

    fn program_binary(&self, program: GlHandle, binary: &ProgramBinary) {
        let mut state = self.state.lock();
        state.calls.push(DummyCall::ProgramBinary(program));
        if binary.format != DUMMY_PROGRAM_BINARY_FORMAT {
            state.set_error(glow::INVALID_ENUM);
            if let Some(prog) = state.programs.get_mut(&program) {
                prog.linked = false;
            }
            return;
        }
        let decoded = binary
            .data
            .strip_prefix(PROGRAM_BINARY_MAGIC.as_slice())
            .and_then(|payload| bincode::deserialize::<Vec<(u32, String)>>(payload).ok());
        let Some(prog) = state.programs.get_mut(&program) else {
            state.set_error(glow::INVALID_VALUE);
            return;
        };
        prog.uniform_locations.clear();
        prog.uniforms.clear();
        prog.next_location = 0;
        match decoded {
            Some(sources) if !sources.is_empty() => {
                prog.linked = true;
                prog.linked_sources = sources;
                prog.log.clear();
            }
            _ => {
                prog.linked = false;
                prog.linked_sources.clear();
                prog.log = "error: program binary is corrupt".to_string();
            }
        }
    }

    // ========================================================================
    // Draws, dispatches and synchronization
    // ========================================================================

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.draw_arrays_instanced(mode, first, count, 1);
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        self.log(DummyCall::DrawArrays {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_elements(&self, mode: u32, count: i32, index_type: u32, offset: i32) {
        self.draw_elements_instanced_base_vertex(mode, count, index_type, offset, 1, 0);
    }

    fn draw_elements_base_vertex(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        base_vertex: i32,
    ) {
        self.draw_elements_instanced_base_vertex(mode, count, index_type, offset, 1, base_vertex);
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        index_type: u32,
        offset: i32,
        instances: i32,
    ) {
        self.draw_elements_instanced_base_vertex(mode, count, index_type, offset, instances, 0);
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
        self.log(DummyCall::DrawElements {
            mode,
            count,
            index_type,
            offset,
            instances,
            base_vertex,
        });
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        self.log(DummyCall::DispatchCompute([x, y, z]));
    }

    fn memory_barrier(&self, barriers: u32) {
        let mut state = self.state.lock();
        state.last_memory_barrier = Some(barriers);
        state.calls.push(DummyCall::MemoryBarrier(barriers));
    }

    // ========================================================================
    // Debug
    // ========================================================================

    fn push_debug_group(&self, message: &str) {
        let mut state = self.state.lock();
        state.debug_group_depth += 1;
        state.calls.push(DummyCall::PushDebugGroup(message.to_string()));
    }

    fn pop_debug_group(&self) {
        let mut state = self.state.lock();
        if state.debug_group_depth == 0 {
            state.set_error(glow::STACK_UNDERFLOW);
        } else {
            state.debug_group_depth -= 1;
        }
        state.calls.push(DummyCall::PopDebugGroup);
    }

    fn debug_message_insert(&self, message: &str) {
        self.log(DummyCall::DebugMarker(message.to_string()));
    }
}

static_assertions::assert_impl_all!(DummyDriver: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_texture(driver: &DummyDriver, target: u32) -> GlHandle {
        let tex = driver.create_texture().unwrap();
        driver.bind_texture(target, tex);
        tex
    }

    #[test]
    fn test_names_are_unique_and_tracked() {
        let driver = DummyDriver::new();
        let a = driver.create_buffer().unwrap();
        let b = driver.create_buffer().unwrap();
        assert_ne!(a, b);
        assert_eq!(driver.live_buffers(), 2);

        driver.delete_buffer(a);
        assert!(!driver.is_buffer_alive(a));
        assert!(driver.is_buffer_alive(b));
    }

    #[test]
    fn test_buffer_sub_data_roundtrip() {
        let driver = DummyDriver::new();
        let buf = driver.create_buffer().unwrap();
        driver.bind_buffer(glow::ARRAY_BUFFER, buf);
        driver.buffer_data_size(glow::ARRAY_BUFFER, 16, glow::STATIC_DRAW);
        driver.buffer_sub_data(glow::ARRAY_BUFFER, 4, &[1, 2, 3, 4]);

        let mut out = [0u8; 4];
        driver.get_buffer_sub_data(glow::ARRAY_BUFFER, 4, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(driver.get_error(), glow::NO_ERROR);
    }

    #[test]
    fn test_out_of_range_sub_data_sets_error() {
        let driver = DummyDriver::new();
        let buf = driver.create_buffer().unwrap();
        driver.bind_buffer(glow::ARRAY_BUFFER, buf);
        driver.buffer_data_size(glow::ARRAY_BUFFER, 4, glow::STATIC_DRAW);
        driver.buffer_sub_data(glow::ARRAY_BUFFER, 2, &[0; 4]);
        assert_eq!(driver.get_error(), glow::INVALID_VALUE);
        assert_eq!(driver.get_error(), glow::NO_ERROR);
    }

    #[test]
    fn test_texture_upload_and_readback_through_fbo() {
        let driver = DummyDriver::new();
        let tex = bound_texture(&driver, glow::TEXTURE_2D);
        driver.tex_storage_2d(glow::TEXTURE_2D, 1, glow::RGBA8, 2, 2);
        let pixels: Vec<u8> = (0..16).collect();
        driver.tex_sub_image_2d(
            glow::TEXTURE_2D,
            0,
            0,
            0,
            2,
            2,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            &pixels,
        );

        let fb = driver.create_framebuffer().unwrap();
        driver.bind_framebuffer(glow::FRAMEBUFFER, fb);
        driver.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            glow::TEXTURE_2D,
            tex,
            0,
        );
        assert_eq!(
            driver.check_framebuffer_status(glow::FRAMEBUFFER),
            glow::FRAMEBUFFER_COMPLETE
        );

        let mut out = vec![0u8; 16];
        driver.read_pixels(0, 0, 2, 2, glow::RGBA, glow::UNSIGNED_BYTE, &mut out);
        assert_eq!(out, pixels);
    }

    #[test]
    fn test_clear_fills_color_attachment() {
        let driver = DummyDriver::new();
        let tex = bound_texture(&driver, glow::TEXTURE_2D);
        driver.tex_storage_2d(glow::TEXTURE_2D, 1, glow::RGBA8, 4, 4);
        let fb = driver.create_framebuffer().unwrap();
        driver.bind_framebuffer(glow::FRAMEBUFFER, fb);
        driver.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            glow::TEXTURE_2D,
            tex,
            0,
        );
        driver.clear_color(0.0, 1.0, 0.0, 1.0);
        driver.clear(glow::COLOR_BUFFER_BIT);

        let level = driver.texture_level(tex, 0, 0).unwrap();
        assert!(level.chunks(4).all(|px| px == [0, 255, 0, 255]));
    }

    #[test]
    fn test_compressed_sub_image_patches_blocks() {
        let driver = DummyDriver::new();
        let tex = bound_texture(&driver, glow::TEXTURE_2D);
        driver.compressed_tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::COMPRESSED_RGBA_S3TC_DXT1_EXT,
            8,
            8,
            &[0; 32],
        );
        driver.compressed_tex_sub_image_2d(
            glow::TEXTURE_2D,
            0,
            4,
            4,
            4,
            4,
            glow::COMPRESSED_RGBA_S3TC_DXT1_EXT,
            &[7; 8],
        );
        assert_eq!(driver.get_error(), glow::NO_ERROR);
        let level = driver.texture_level(tex, 0, 0).unwrap();
        assert_eq!(&level[24..32], &[7; 8]);
        assert!(level[..24].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_program_binary_roundtrip_and_corruption() {
        let driver = DummyDriver::new();
        let vs = driver.create_shader(glow::VERTEX_SHADER).unwrap();
        driver.shader_source(vs, "uniform vec4 color; void main() {}");
        driver.compile_shader(vs);
        let program = driver.create_program().unwrap();
        driver.attach_shader(program, vs);
        driver.link_program(program);
        assert!(driver.get_program_link_status(program));

        let binary = driver.get_program_binary(program).unwrap();
        let restored = driver.create_program().unwrap();
        driver.program_binary(restored, &binary);
        assert!(driver.get_program_link_status(restored));
        assert!(driver.get_uniform_location(restored, "color").is_some());

        let mut corrupt = binary.clone();
        corrupt.data.truncate(4);
        let broken = driver.create_program().unwrap();
        driver.program_binary(broken, &corrupt);
        assert!(!driver.get_program_link_status(broken));
    }

    #[test]
    fn test_compile_error_directive_fails() {
        let driver = DummyDriver::new();
        let fs = driver.create_shader(glow::FRAGMENT_SHADER).unwrap();
        driver.shader_source(fs, "void main() {}\n#error broken\n");
        driver.compile_shader(fs);
        assert!(!driver.get_shader_compile_status(fs));
        assert!(driver.get_shader_info_log(fs).contains("0:2"));
    }

    #[test]
    fn test_inactive_uniform_has_no_location() {
        let driver = DummyDriver::new();
        let vs = driver.create_shader(glow::VERTEX_SHADER).unwrap();
        driver.shader_source(vs, "struct buf { vec4 color; }; uniform buf ubuf;");
        driver.compile_shader(vs);
        let program = driver.create_program().unwrap();
        driver.attach_shader(program, vs);
        driver.link_program(program);

        assert!(driver.get_uniform_location(program, "ubuf.color").is_some());
        assert!(driver.get_uniform_location(program, "ubuf.unused").is_none());
    }

    #[test]
    fn test_profiles_report_version_strings() {
        let gles = DummyDriver::with_profile(DummyProfile::gles20());
        assert!(gles.get_string(glow::VERSION).starts_with("OpenGL ES 2.0"));
        assert_eq!(gles.get_integer(glow::NUM_PROGRAM_BINARY_FORMATS), 0);

        let desktop = DummyDriver::new();
        assert_eq!(
            desktop.get_integer(glow::CONTEXT_PROFILE_MASK),
            glow::CONTEXT_CORE_PROFILE_BIT as i32
        );
    }

    #[test]
    fn test_loss_flag_is_shared() {
        let driver = DummyDriver::new();
        let flag = driver.loss_flag();
        assert!(!flag.load(Ordering::SeqCst));
        driver.lose_context();
        assert!(flag.load(Ordering::SeqCst));
        assert!(driver.is_lost());
    }
}
