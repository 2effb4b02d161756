//! Capability detection.
//!
//! [`Capabilities::detect`] queries the driver once at backend creation and
//! derives every feature flag and limit the rest of the backend branches on.
//! After that the record is immutable: [`Capabilities::is_feature_supported`]
//! and [`Capabilities::resource_limit`] never touch the driver.

use std::collections::HashSet;
use std::fmt;

use redlilium_core::shader::ShaderVersion;

use crate::driver::GlDriver;
use crate::error::GraphicsError;

// ============================================================================
// Version parsing
// ============================================================================

/// Parsed `GL_VERSION` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
    /// OpenGL ES (WebGL included).
    pub gles: bool,
    /// WebGL. `major`/`minor` are the equivalent ES version.
    pub webgl: bool,
}

impl GlVersion {
    /// Desktop GL version.
    pub const fn desktop(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            gles: false,
            webgl: false,
        }
    }

    /// OpenGL ES version.
    pub const fn es(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            gles: true,
            webgl: false,
        }
    }

    /// Parse a `GL_VERSION` string.
    ///
    /// Accepted shapes:
    /// - desktop: `"4.6.0 NVIDIA 535.54"`
    /// - ES: `"OpenGL ES 3.2 Mesa 23.0"`, `"OpenGL ES-CM 1.1"`
    /// - WebGL: `"WebGL 2.0 (OpenGL ES 3.0 Chromium)"`, reported as ES `major + 1`
    pub fn parse(version: &str) -> Option<Self> {
        let version = version.trim();
        let (rest, gles, webgl) = if let Some(rest) = version.strip_prefix("WebGL ") {
            (rest, true, true)
        } else if let Some(rest) = version.strip_prefix("OpenGL ES") {
            // "OpenGL ES-CM 1.1" / "OpenGL ES-CL 1.1" / "OpenGL ES 3.2"
            let rest = rest.trim_start_matches(|c: char| c != ' ');
            (rest.trim_start(), true, false)
        } else {
            (version, false, false)
        };

        let number = rest.split_whitespace().next()?;
        let mut parts = number.split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor_digits: String = parts
            .next()
            .unwrap_or("0")
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let minor = minor_digits.parse().unwrap_or(0);

        if webgl {
            // WebGL 1 is ES 2.0, WebGL 2 is ES 3.0.
            return Some(Self {
                major: major + 1,
                minor: 0,
                gles: true,
                webgl: true,
            });
        }
        Some(Self {
            major,
            minor,
            gles,
            webgl,
        })
    }

    /// Whether this version is at least `major.minor`.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.webgl, self.gles) {
            (true, _) => write!(f, "WebGL {}", self.major - 1),
            (false, true) => write!(f, "OpenGL ES {}.{}", self.major, self.minor),
            (false, false) => write!(f, "OpenGL {}.{}", self.major, self.minor),
        }
    }
}

fn extension_present(extensions: &HashSet<String>, name: &str) -> bool {
    extensions.contains(name)
        || name
            .strip_prefix("GL_")
            .is_some_and(|bare| extensions.contains(bare))
}

// ============================================================================
// Features and limits
// ============================================================================

/// Optional functionality a caller can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    MultisampleTexture,
    MultisampleRenderBuffer,
    DebugMarkers,
    Instancing,
    CustomInstanceStepRate,
    PrimitiveRestart,
    NonDynamicUniformBuffers,
    NonFourAlignedEffectiveIndexBufferOffset,
    NPOTTextureRepeat,
    RedOrAlpha8IsRed,
    ElementIndexUint,
    Compute,
    WideLines,
    VertexShaderPointSize,
    BaseVertex,
    BaseInstance,
    TriangleFanTopology,
    ReadBackNonUniformBuffer,
    ReadBackNonBaseMipLevel,
    TexelFetch,
    RenderToNonBaseMipLevel,
    IntAttributes,
    ScreenSpaceDerivatives,
    ReadBackAnyTextureFormat,
    PipelineCache,
    TextureImportOES,
    ThreeDimensionalTextures,
    RenderTo3DTextureSlice,
    TextureArrays,
    Tessellation,
    GeometryShader,
    NonFillPolygonMode,
    OneDimensionalTextures,
    OneDimensionalTextureMipmaps,
    HalfAttributes,
    RenderToOneDimensionalTexture,
    ThreeDimensionalTextureMipmaps,
    FramebufferInvalidation,
}

/// Numeric limits a caller can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceLimit {
    TextureSizeMin,
    TextureSizeMax,
    MaxColorAttachments,
    FramesInFlight,
    MaxAsyncReadbackFrames,
    MaxThreadGroupsPerDimension,
    MaxThreadsPerThreadGroup,
    MaxThreadGroupX,
    MaxThreadGroupY,
    MaxThreadGroupZ,
    MaxUniformBufferRange,
    MaxVertexInputs,
    MaxVertexOutputs,
    MaxDrawBuffers,
    MaxUniformVectors,
    MaxSamples,
}

// ============================================================================
// Capabilities
// ============================================================================

/// Immutable capability record of a context.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub version: GlVersion,
    pub core_profile: bool,
    pub vendor: String,
    pub renderer: String,
    pub version_string: String,
    extensions: HashSet<String>,

    // Limits
    pub max_texture_size: u32,
    pub max_color_attachments: u32,
    pub max_draw_buffers: u32,
    pub max_samples: u32,
    pub max_vertex_attribs: u32,
    pub max_uniform_vectors: u32,
    pub max_vertex_outputs: u32,
    pub max_uniform_block_size: u32,
    pub max_texture_units: u32,
    pub max_compute_work_group_count: [u32; 3],
    pub max_compute_work_group_size: [u32; 3],
    pub max_compute_invocations: u32,

    // Rendering
    pub msaa_renderbuffer: bool,
    pub framebuffer_blit: bool,
    pub multisample_texture: bool,
    pub instancing: bool,
    pub fixed_index_primitive_restart: bool,
    pub base_vertex: bool,
    pub compute: bool,
    pub tessellation: bool,
    pub geometry_shader: bool,
    pub uniform_buffers: bool,
    pub polygon_mode: bool,
    pub wide_lines: bool,
    pub invalidate_framebuffer: bool,
    pub srgb_write_control: bool,
    pub debug_markers: bool,
    pub program_binary: bool,
    pub element_index_uint: bool,
    pub int_attributes: bool,
    pub half_attributes: bool,
    pub texel_fetch: bool,
    pub screen_space_derivatives: bool,

    // Textures
    pub npot_texture_full: bool,
    pub texture_1d: bool,
    pub texture_3d: bool,
    pub texture_arrays: bool,
    pub texture_rectangle: bool,
    pub texture_external_oes: bool,
    pub texture_storage: bool,
    pub texture_compare_mode: bool,
    pub non_base_level_framebuffer_texture: bool,
    pub depth_texture: bool,
    pub depth24: bool,
    pub packed_depth_stencil: bool,
    pub needs_depth_stencil_combined_attach: bool,
    pub rgba8_format: bool,
    pub bgra_external_format: bool,
    pub bgra_internal_format: bool,
    pub r8_format: bool,
    pub r16_format: bool,
    pub float_formats: bool,
    pub rgb10_formats: bool,
    pub compressed_s3tc: bool,
    pub compressed_rgtc: bool,
    pub compressed_bptc: bool,
    pub compressed_etc2: bool,
    pub compressed_astc: bool,

    // Buffers
    pub proper_map_buffer: bool,
    pub get_buffer_sub_data: bool,
}

impl Capabilities {
    /// Query the driver and derive the capability record.
    ///
    /// The context must be current. Fails only when the version string cannot
    /// be parsed.
    pub fn detect(driver: &dyn GlDriver) -> Result<Self, GraphicsError> {
        let version_string = driver.get_string(glow::VERSION);
        let version = GlVersion::parse(&version_string).ok_or_else(|| {
            log::error!("Capabilities: unrecognized GL_VERSION '{version_string}'");
            GraphicsError::InitializationFailed(format!(
                "unrecognized GL_VERSION '{version_string}'"
            ))
        })?;
        let extensions: HashSet<String> = driver.extensions().into_iter().collect();
        let int = |pname: u32| driver.get_integer(pname).max(0) as u32;

        let core_profile = !version.gles
            && version.at_least(3, 2)
            && (int(glow::CONTEXT_PROFILE_MASK) & glow::CONTEXT_CORE_PROFILE_BIT) != 0;

        let mut caps = Self {
            version,
            core_profile,
            vendor: driver.get_string(glow::VENDOR),
            renderer: driver.get_string(glow::RENDERER),
            version_string,
            extensions,
            ..Default::default()
        };
        caps.derive_flags();
        caps.query_limits(driver);
        Ok(caps)
    }

    /// Build a record for `version` and `extensions` without a driver.
    ///
    /// Limits are left at zero except the texture size, which is set to a
    /// conservative 2048. Used by tests and by callers validating descriptors
    /// ahead of context creation.
    pub fn from_version(version: GlVersion, extensions: &[&str]) -> Self {
        let mut caps = Self {
            version,
            core_profile: !version.gles && version.at_least(3, 2),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            max_texture_size: 2048,
            max_color_attachments: 1,
            max_draw_buffers: 1,
            ..Default::default()
        };
        caps.derive_flags();
        caps
    }

    /// Whether the context exposes `name`.
    ///
    /// WebGL contexts report extensions without the `GL_` prefix; both
    /// spellings are accepted.
    pub fn has_extension(&self, name: &str) -> bool {
        extension_present(&self.extensions, name)
    }

    fn derive_flags(&mut self) {
        let v = self.version;
        let es = v.gles;
        let es3 = es && v.major >= 3;
        let extensions = std::mem::take(&mut self.extensions);
        let ext = |name: &str| extension_present(&extensions, name);

        self.msaa_renderbuffer = if es {
            es3
        } else {
            v.major >= 3 || ext("GL_EXT_framebuffer_multisample")
        };
        self.framebuffer_blit = if es {
            es3
        } else {
            v.major >= 3 || ext("GL_EXT_framebuffer_blit")
        };
        self.multisample_texture = if es { v.at_least(3, 1) } else { v.at_least(3, 2) };
        self.instancing = if es { es3 } else { v.at_least(3, 3) };
        self.fixed_index_primitive_restart = if es { es3 } else { v.at_least(4, 3) };
        self.base_vertex = if es {
            v.at_least(3, 2)
        } else {
            v.at_least(3, 2) || ext("GL_ARB_draw_elements_base_vertex")
        };
        self.compute = if es {
            v.at_least(3, 1) && !v.webgl
        } else {
            v.at_least(4, 3) || ext("GL_ARB_compute_shader")
        };
        self.tessellation = if es { v.at_least(3, 2) } else { v.at_least(4, 0) };
        self.geometry_shader = v.at_least(3, 2);
        self.uniform_buffers = if es { es3 } else { v.at_least(3, 1) };
        self.polygon_mode = !es;
        self.wide_lines = !es && !self.core_profile;
        self.invalidate_framebuffer = if es { es3 } else { v.at_least(4, 3) };
        self.srgb_write_control = if es {
            ext("GL_EXT_sRGB_write_control")
        } else {
            v.major >= 3 || ext("GL_ARB_framebuffer_sRGB")
        };
        self.debug_markers = !v.webgl
            && (ext("GL_KHR_debug")
                || if es { v.at_least(3, 2) } else { v.at_least(4, 3) });
        self.program_binary = !v.webgl
            && if es {
                es3 || ext("GL_OES_get_program_binary")
            } else {
                v.at_least(4, 1) || ext("GL_ARB_get_program_binary")
            };
        self.element_index_uint = !es || es3 || ext("GL_OES_element_index_uint");
        self.int_attributes = (!es && v.major >= 3) || es3;
        self.half_attributes = !es || es3;
        self.texel_fetch = (!es && v.major >= 3) || es3;
        self.screen_space_derivatives = !es || es3 || ext("GL_OES_standard_derivatives");

        self.npot_texture_full = !es || es3 || ext("GL_OES_texture_npot");
        self.texture_1d = !es;
        self.texture_3d = !es || es3 || ext("GL_OES_texture_3D");
        self.texture_arrays = if es { es3 } else { v.major >= 3 };
        self.texture_rectangle = !es;
        self.texture_external_oes = es && ext("GL_OES_EGL_image_external");
        self.texture_storage = if es {
            es3
        } else {
            v.at_least(4, 2) || ext("GL_ARB_texture_storage")
        };
        self.texture_compare_mode = !es || es3;
        self.non_base_level_framebuffer_texture = !es || es3 || ext("GL_OES_fbo_render_mipmap");
        self.depth_texture = !es
            || es3
            || ext("GL_OES_depth_texture")
            || ext("GL_ANGLE_depth_texture")
            || ext("WEBGL_depth_texture");
        self.depth24 = !es || es3 || ext("GL_OES_depth24");
        self.packed_depth_stencil = !es || es3 || ext("GL_OES_packed_depth_stencil");
        self.needs_depth_stencil_combined_attach = v.webgl;
        self.rgba8_format = !es || es3 || ext("GL_OES_rgb8_rgba8");
        self.bgra_external_format = !es
            || ext("GL_EXT_texture_format_BGRA8888")
            || ext("GL_IMG_texture_format_BGRA8888");
        self.bgra_internal_format = es && ext("GL_EXT_texture_format_BGRA8888");
        self.r8_format = !es || es3 || ext("GL_EXT_texture_rg");
        self.r16_format = !es || ext("GL_EXT_texture_norm16");
        self.float_formats = !es || es3;
        self.rgb10_formats = !es || es3;
        self.compressed_s3tc = ext("GL_EXT_texture_compression_s3tc")
            || ext("WEBGL_compressed_texture_s3tc");
        self.compressed_rgtc = (!es && v.major >= 3) || ext("GL_EXT_texture_compression_rgtc");
        self.compressed_bptc = (!es && v.at_least(4, 2))
            || ext("GL_ARB_texture_compression_bptc")
            || ext("GL_EXT_texture_compression_bptc");
        self.compressed_etc2 = (es3 && !v.webgl)
            || (!es && v.at_least(4, 3))
            || ext("GL_ARB_ES3_compatibility")
            || ext("WEBGL_compressed_texture_etc");
        self.compressed_astc = (es && v.at_least(3, 2))
            || ext("GL_KHR_texture_compression_astc_ldr")
            || ext("WEBGL_compressed_texture_astc");

        self.proper_map_buffer = if es { es3 && !v.webgl } else { true };
        self.get_buffer_sub_data = !es;

        self.extensions = extensions;
    }

    fn query_limits(&mut self, driver: &dyn GlDriver) {
        let int = |pname: u32| driver.get_integer(pname).max(0) as u32;

        self.max_texture_size = int(glow::MAX_TEXTURE_SIZE).max(64);
        self.max_color_attachments = if self.version.gles && self.version.major < 3 {
            1
        } else {
            int(glow::MAX_COLOR_ATTACHMENTS).max(1)
        };
        self.max_draw_buffers = if self.version.gles && self.version.major < 3 {
            1
        } else {
            int(glow::MAX_DRAW_BUFFERS).max(1)
        };
        self.max_samples = if self.msaa_renderbuffer {
            int(glow::MAX_SAMPLES).max(1)
        } else {
            1
        };
        self.max_vertex_attribs = int(glow::MAX_VERTEX_ATTRIBS);
        self.max_uniform_vectors = int(glow::MAX_VERTEX_UNIFORM_VECTORS)
            .min(int(glow::MAX_FRAGMENT_UNIFORM_VECTORS));
        self.max_vertex_outputs = if self.version.gles && self.version.major < 3 {
            int(glow::MAX_VARYING_VECTORS)
        } else {
            int(glow::MAX_VERTEX_OUTPUT_COMPONENTS) / 4
        };
        self.max_uniform_block_size = if self.uniform_buffers {
            int(glow::MAX_UNIFORM_BLOCK_SIZE)
        } else {
            // Uniforms are always set individually; this is the default-block budget.
            self.max_uniform_vectors * 16
        };
        self.max_texture_units = int(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS);
        if self.program_binary && int(glow::NUM_PROGRAM_BINARY_FORMATS) == 0 {
            self.program_binary = false;
        }

        if self.compute {
            for i in 0..3 {
                self.max_compute_work_group_count[i] = driver
                    .get_integer_indexed(glow::MAX_COMPUTE_WORK_GROUP_COUNT, i as u32)
                    .max(0) as u32;
                self.max_compute_work_group_size[i] = driver
                    .get_integer_indexed(glow::MAX_COMPUTE_WORK_GROUP_SIZE, i as u32)
                    .max(0) as u32;
            }
            self.max_compute_invocations = int(glow::MAX_COMPUTE_WORK_GROUP_INVOCATIONS);
        }
    }

    /// Whether `feature` is available.
    pub fn is_feature_supported(&self, feature: Feature) -> bool {
        let es = self.version.gles;
        match feature {
            Feature::MultisampleTexture => self.multisample_texture,
            Feature::MultisampleRenderBuffer => self.msaa_renderbuffer,
            Feature::DebugMarkers => self.debug_markers,
            Feature::Instancing => self.instancing,
            Feature::CustomInstanceStepRate => false,
            Feature::PrimitiveRestart => self.fixed_index_primitive_restart,
            Feature::NonDynamicUniformBuffers => true,
            Feature::NonFourAlignedEffectiveIndexBufferOffset => true,
            Feature::NPOTTextureRepeat => self.npot_texture_full,
            Feature::RedOrAlpha8IsRed => self.r8_format,
            Feature::ElementIndexUint => self.element_index_uint,
            Feature::Compute => self.compute,
            Feature::WideLines => self.wide_lines,
            Feature::VertexShaderPointSize => true,
            Feature::BaseVertex => self.base_vertex,
            Feature::BaseInstance => false,
            Feature::TriangleFanTopology => true,
            Feature::ReadBackNonUniformBuffer => self.get_buffer_sub_data || self.proper_map_buffer,
            Feature::ReadBackNonBaseMipLevel => self.non_base_level_framebuffer_texture,
            Feature::TexelFetch => self.texel_fetch,
            Feature::RenderToNonBaseMipLevel => self.non_base_level_framebuffer_texture,
            Feature::IntAttributes => self.int_attributes,
            Feature::ScreenSpaceDerivatives => self.screen_space_derivatives,
            Feature::ReadBackAnyTextureFormat => false,
            Feature::PipelineCache => self.program_binary,
            Feature::TextureImportOES => self.texture_external_oes,
            Feature::ThreeDimensionalTextures => self.texture_3d,
            Feature::RenderTo3DTextureSlice => self.texture_3d && (!es || self.version.major >= 3),
            Feature::TextureArrays => self.texture_arrays,
            Feature::Tessellation => self.tessellation,
            Feature::GeometryShader => self.geometry_shader,
            Feature::NonFillPolygonMode => self.polygon_mode,
            Feature::OneDimensionalTextures => self.texture_1d,
            Feature::OneDimensionalTextureMipmaps => self.texture_1d,
            Feature::HalfAttributes => self.half_attributes,
            Feature::RenderToOneDimensionalTexture => self.texture_1d,
            Feature::ThreeDimensionalTextureMipmaps => self.texture_3d,
            Feature::FramebufferInvalidation => self.invalidate_framebuffer,
        }
    }

    /// Value of `limit`.
    pub fn resource_limit(&self, limit: ResourceLimit) -> u32 {
        match limit {
            ResourceLimit::TextureSizeMin => 1,
            ResourceLimit::TextureSizeMax => self.max_texture_size,
            ResourceLimit::MaxColorAttachments => self.max_color_attachments,
            ResourceLimit::FramesInFlight => 1,
            ResourceLimit::MaxAsyncReadbackFrames => 1,
            ResourceLimit::MaxThreadGroupsPerDimension => self
                .max_compute_work_group_count
                .iter()
                .copied()
                .min()
                .unwrap_or(0),
            ResourceLimit::MaxThreadsPerThreadGroup => self.max_compute_invocations,
            ResourceLimit::MaxThreadGroupX => self.max_compute_work_group_size[0],
            ResourceLimit::MaxThreadGroupY => self.max_compute_work_group_size[1],
            ResourceLimit::MaxThreadGroupZ => self.max_compute_work_group_size[2],
            ResourceLimit::MaxUniformBufferRange => self.max_uniform_block_size,
            ResourceLimit::MaxVertexInputs => self.max_vertex_attribs,
            ResourceLimit::MaxVertexOutputs => self.max_vertex_outputs,
            ResourceLimit::MaxDrawBuffers => self.max_draw_buffers,
            ResourceLimit::MaxUniformVectors => self.max_uniform_vectors,
            ResourceLimit::MaxSamples => self.max_samples,
        }
    }

    /// Whether the context needs a vertex array object bound to draw.
    pub fn needs_vertex_array(&self) -> bool {
        self.core_profile
    }

    /// Shading language versions the context accepts, highest first.
    pub fn shader_version_candidates(&self) -> Vec<ShaderVersion> {
        let v = self.version;
        if v.gles {
            let mut list = Vec::new();
            if !v.webgl {
                if v.at_least(3, 2) {
                    list.push(ShaderVersion::gles(320));
                }
                if v.at_least(3, 1) {
                    list.push(ShaderVersion::gles(310));
                }
            }
            if v.major >= 3 {
                list.push(ShaderVersion::gles(300));
            }
            list.push(ShaderVersion::gles(100));
            return list;
        }

        let max = match (v.major, v.minor) {
            (2, 0) => 110,
            (2, _) => 120,
            (3, 0) => 130,
            (3, 1) => 140,
            (3, 2) => 150,
            (major, minor) => major * 100 + minor * 10,
        };
        let min = if self.core_profile { 140 } else { 0 };
        [460, 450, 440, 430, 420, 410, 400, 330, 150, 140, 130, 120, 110]
            .into_iter()
            .filter(|ver| *ver <= max && *ver >= min)
            .map(ShaderVersion::glsl)
            .collect()
    }
}
