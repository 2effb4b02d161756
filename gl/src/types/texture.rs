//! Texture types, descriptors and GL format translation.

use bitflags::bitflags;

use crate::caps::Capabilities;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    // 8-bit per channel formats
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8,
    /// 8-bit red channel, unsigned normalized.
    R8,
    /// 8-bit RG channels, unsigned normalized.
    Rg8,
    /// 8-bit single channel: red where supported, alpha otherwise.
    RedOrAlpha8,

    // 16-bit per channel formats
    /// 16-bit red channel, unsigned normalized.
    R16,
    /// 16-bit RG channels, unsigned normalized.
    Rg16,
    /// 16-bit red channel, float.
    R16F,
    /// 16-bit RGBA channels, float.
    Rgba16F,

    // 32-bit per channel formats
    /// 32-bit red channel, float.
    R32F,
    /// 32-bit RGBA channels, float.
    Rgba32F,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10A2,

    // Integer formats
    /// 8-bit red channel, unsigned integer.
    R8UI,
    /// 32-bit red channel, unsigned integer.
    R32UI,
    /// 32-bit RG channels, unsigned integer.
    Rg32UI,
    /// 32-bit RGBA channels, unsigned integer.
    Rgba32UI,

    // Depth/stencil formats
    /// 16-bit depth.
    D16,
    /// 24-bit depth.
    D24,
    /// 24-bit depth with 8-bit stencil.
    D24S8,
    /// 32-bit depth, float.
    D32F,
    /// 32-bit depth float with 8-bit stencil.
    D32FS8,

    // Block compressed formats
    Bc1,
    Bc2,
    Bc3,
    Bc4,
    Bc5,
    Bc6H,
    Bc7,
    Etc2Rgb8,
    Etc2Rgb8A1,
    Etc2Rgba8,
    Astc4x4,
}

/// Driver-side format tuple of a [`TextureFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlFormat {
    /// Internal format passed to `glTexImage*`. Unsized on ES 2.
    pub internal_format: u32,
    /// Sized internal format for `glTexStorage*` and renderbuffers.
    pub sized_internal_format: u32,
    /// External pixel format.
    pub format: u32,
    /// External pixel type.
    pub ty: u32,
}

impl TextureFormat {
    /// Returns true if this is a block compressed format.
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Self::Bc1
                | Self::Bc2
                | Self::Bc3
                | Self::Bc4
                | Self::Bc5
                | Self::Bc6H
                | Self::Bc7
                | Self::Etc2Rgb8
                | Self::Etc2Rgb8A1
                | Self::Etc2Rgba8
                | Self::Astc4x4
        )
    }

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16 | Self::D24 | Self::D24S8 | Self::D32F | Self::D32FS8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24S8 | Self::D32FS8)
    }

    /// Size in bytes of one pixel. Zero for compressed formats.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8 | Self::RedOrAlpha8 | Self::R8UI => 1,
            Self::Rg8 | Self::R16 | Self::R16F | Self::D16 => 2,
            Self::Rgba8
            | Self::Bgra8
            | Self::Rg16
            | Self::R32F
            | Self::Rgb10A2
            | Self::R32UI
            | Self::D24
            | Self::D24S8
            | Self::D32F => 4,
            Self::Rgba16F | Self::Rg32UI | Self::D32FS8 => 8,
            Self::Rgba32F | Self::Rgba32UI => 16,
            _ => 0,
        }
    }

    /// Size in bytes of one 4x4 block. Zero for uncompressed formats.
    pub fn block_bytes(self) -> u32 {
        match self {
            Self::Bc1 | Self::Bc4 | Self::Etc2Rgb8 | Self::Etc2Rgb8A1 => 8,
            Self::Bc2 | Self::Bc3 | Self::Bc5 | Self::Bc6H | Self::Bc7 | Self::Etc2Rgba8 => 16,
            Self::Astc4x4 => 16,
            _ => 0,
        }
    }

    /// Byte size of a tightly packed `width` x `height` image.
    pub fn image_size(self, width: u32, height: u32) -> u32 {
        if self.is_compressed() {
            width.div_ceil(4) * height.div_ceil(4) * self.block_bytes()
        } else {
            width * height * self.bytes_per_pixel()
        }
    }

    /// Resolve the GL format tuple, `None` when the context cannot use it.
    pub fn gl_format(self, srgb: bool, caps: &Capabilities) -> Option<GlFormat> {
        let es2 = caps.version.gles && caps.version.major < 3;
        let plain = |sized: u32, format: u32, ty: u32| GlFormat {
            internal_format: if es2 { format } else { sized },
            sized_internal_format: sized,
            format,
            ty,
        };
        let compressed = |linear: u32, srgb_variant: u32| {
            let fmt = if srgb { srgb_variant } else { linear };
            GlFormat {
                internal_format: fmt,
                sized_internal_format: fmt,
                format: fmt,
                ty: glow::UNSIGNED_BYTE,
            }
        };

        let gl = match self {
            Self::Rgba8 => {
                let sized = if srgb { glow::SRGB8_ALPHA8 } else { glow::RGBA8 };
                GlFormat {
                    internal_format: if es2 && !srgb { glow::RGBA } else { sized },
                    sized_internal_format: sized,
                    format: glow::RGBA,
                    ty: glow::UNSIGNED_BYTE,
                }
            }
            Self::Bgra8 => {
                if !caps.bgra_external_format {
                    return None;
                }
                let sized = if srgb { glow::SRGB8_ALPHA8 } else { glow::RGBA8 };
                GlFormat {
                    internal_format: if caps.bgra_internal_format {
                        glow::BGRA
                    } else {
                        sized
                    },
                    sized_internal_format: sized,
                    format: glow::BGRA,
                    ty: glow::UNSIGNED_BYTE,
                }
            }
            Self::R8 if caps.r8_format => plain(glow::R8, glow::RED, glow::UNSIGNED_BYTE),
            Self::Rg8 if caps.r8_format => plain(glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
            Self::RedOrAlpha8 => {
                if caps.r8_format {
                    plain(glow::R8, glow::RED, glow::UNSIGNED_BYTE)
                } else {
                    GlFormat {
                        internal_format: glow::ALPHA,
                        sized_internal_format: glow::ALPHA,
                        format: glow::ALPHA,
                        ty: glow::UNSIGNED_BYTE,
                    }
                }
            }
            Self::R16 if caps.r16_format => plain(glow::R16, glow::RED, glow::UNSIGNED_SHORT),
            Self::Rg16 if caps.r16_format => plain(glow::RG16, glow::RG, glow::UNSIGNED_SHORT),
            Self::R16F if caps.float_formats => plain(glow::R16F, glow::RED, glow::HALF_FLOAT),
            Self::Rgba16F if caps.float_formats => {
                plain(glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT)
            }
            Self::R32F if caps.float_formats => plain(glow::R32F, glow::RED, glow::FLOAT),
            Self::Rgba32F if caps.float_formats => plain(glow::RGBA32F, glow::RGBA, glow::FLOAT),
            Self::Rgb10A2 if caps.rgb10_formats => plain(
                glow::RGB10_A2,
                glow::RGBA,
                glow::UNSIGNED_INT_2_10_10_10_REV,
            ),
            Self::R8UI if caps.int_attributes => {
                plain(glow::R8UI, glow::RED_INTEGER, glow::UNSIGNED_BYTE)
            }
            Self::R32UI if caps.int_attributes => {
                plain(glow::R32UI, glow::RED_INTEGER, glow::UNSIGNED_INT)
            }
            Self::Rg32UI if caps.int_attributes => {
                plain(glow::RG32UI, glow::RG_INTEGER, glow::UNSIGNED_INT)
            }
            Self::Rgba32UI if caps.int_attributes => {
                plain(glow::RGBA32UI, glow::RGBA_INTEGER, glow::UNSIGNED_INT)
            }
            Self::D16 => plain(
                glow::DEPTH_COMPONENT16,
                glow::DEPTH_COMPONENT,
                glow::UNSIGNED_SHORT,
            ),
            Self::D24 if caps.depth24 => plain(
                glow::DEPTH_COMPONENT24,
                glow::DEPTH_COMPONENT,
                glow::UNSIGNED_INT,
            ),
            Self::D24S8 if caps.packed_depth_stencil => plain(
                glow::DEPTH24_STENCIL8,
                glow::DEPTH_STENCIL,
                glow::UNSIGNED_INT_24_8,
            ),
            Self::D32F if caps.float_formats => plain(
                glow::DEPTH_COMPONENT32F,
                glow::DEPTH_COMPONENT,
                glow::FLOAT,
            ),
            Self::D32FS8 if caps.float_formats => plain(
                glow::DEPTH32F_STENCIL8,
                glow::DEPTH_STENCIL,
                glow::FLOAT_32_UNSIGNED_INT_24_8_REV,
            ),
            Self::Bc1 if caps.compressed_s3tc => compressed(
                glow::COMPRESSED_RGBA_S3TC_DXT1_EXT,
                glow::COMPRESSED_SRGB_ALPHA_S3TC_DXT1_EXT,
            ),
            Self::Bc2 if caps.compressed_s3tc => compressed(
                glow::COMPRESSED_RGBA_S3TC_DXT3_EXT,
                glow::COMPRESSED_SRGB_ALPHA_S3TC_DXT3_EXT,
            ),
            Self::Bc3 if caps.compressed_s3tc => compressed(
                glow::COMPRESSED_RGBA_S3TC_DXT5_EXT,
                glow::COMPRESSED_SRGB_ALPHA_S3TC_DXT5_EXT,
            ),
            Self::Bc4 if caps.compressed_rgtc => {
                compressed(glow::COMPRESSED_RED_RGTC1, glow::COMPRESSED_RED_RGTC1)
            }
            Self::Bc5 if caps.compressed_rgtc => {
                compressed(glow::COMPRESSED_RG_RGTC2, glow::COMPRESSED_RG_RGTC2)
            }
            Self::Bc6H if caps.compressed_bptc => compressed(
                glow::COMPRESSED_RGB_BPTC_UNSIGNED_FLOAT,
                glow::COMPRESSED_RGB_BPTC_UNSIGNED_FLOAT,
            ),
            Self::Bc7 if caps.compressed_bptc => compressed(
                glow::COMPRESSED_RGBA_BPTC_UNORM,
                glow::COMPRESSED_SRGB_ALPHA_BPTC_UNORM,
            ),
            Self::Etc2Rgb8 if caps.compressed_etc2 => {
                compressed(glow::COMPRESSED_RGB8_ETC2, glow::COMPRESSED_SRGB8_ETC2)
            }
            Self::Etc2Rgb8A1 if caps.compressed_etc2 => compressed(
                glow::COMPRESSED_RGB8_PUNCHTHROUGH_ALPHA1_ETC2,
                glow::COMPRESSED_SRGB8_PUNCHTHROUGH_ALPHA1_ETC2,
            ),
            Self::Etc2Rgba8 if caps.compressed_etc2 => compressed(
                glow::COMPRESSED_RGBA8_ETC2_EAC,
                glow::COMPRESSED_SRGB8_ALPHA8_ETC2_EAC,
            ),
            Self::Astc4x4 if caps.compressed_astc => compressed(
                glow::COMPRESSED_RGBA_ASTC_4x4_KHR,
                glow::COMPRESSED_SRGB8_ALPHA8_ASTC_4x4_KHR,
            ),
            _ => return None,
        };
        Some(gl)
    }
}

bitflags! {
    /// Texture creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// Used as a color attachment.
        const RENDER_TARGET = 1 << 0;
        /// Six-faced cube map.
        const CUBE_MAP = 1 << 1;
        /// Full mip chain.
        const MIP_MAPPED = 1 << 2;
        /// sRGB encoded.
        const SRGB = 1 << 3;
        /// Source of texture copies and readbacks.
        const USED_AS_TRANSFER_SOURCE = 1 << 4;
        /// Target of mipmap generation.
        const USED_WITH_GENERATE_MIPS = 1 << 5;
        /// Bound as a storage image.
        const USED_WITH_LOAD_STORE = 1 << 6;
        /// Compressed atlas patched through sub-region uploads.
        const USED_AS_COMPRESSED_ATLAS = 1 << 7;
        /// `GL_TEXTURE_EXTERNAL_OES` sampler target.
        const EXTERNAL_OES = 1 << 8;
        /// Volume texture.
        const THREE_DIMENSIONAL = 1 << 9;
        /// `GL_TEXTURE_RECTANGLE` target.
        const TEXTURE_RECTANGLE_GL = 1 << 10;
        /// Layered 1D or 2D array.
        const TEXTURE_ARRAY = 1 << 11;
        /// One-dimensional texture.
        const ONE_DIMENSIONAL = 1 << 12;
    }
}

impl Default for TextureFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Texture format.
    pub format: TextureFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels (1 for 1D textures).
    pub height: u32,
    /// Depth in pixels; greater than 1 only for 3D textures.
    pub depth: u32,
    /// Layer count of array textures; 0 for non-arrays.
    pub array_size: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Creation flags.
    pub flags: TextureFlags,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, flags: TextureFlags) -> Self {
        Self {
            label: None,
            format,
            width,
            height,
            depth: 1,
            array_size: 0,
            sample_count: 1,
            flags,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the depth of a 3D texture.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the layer count of an array texture.
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Number of mip levels: the full chain of the larger 2D dimension when
    /// `MIP_MAPPED` is set, 1 otherwise.
    pub fn mip_level_count(&self) -> u32 {
        if self.flags.contains(TextureFlags::MIP_MAPPED) {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }

    /// Number of faces or layers addressed by uploads and attachments.
    pub fn layer_count(&self) -> u32 {
        if self.flags.contains(TextureFlags::CUBE_MAP) {
            6
        } else if self.flags.contains(TextureFlags::TEXTURE_ARRAY) {
            self.array_size.max(1)
        } else if self.flags.contains(TextureFlags::THREE_DIMENSIONAL) {
            self.depth.max(1)
        } else {
            1
        }
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, TextureFormat::default(), TextureFlags::empty())
    }
}

/// Size of mip `level` of a `width` x `height` image.
pub fn mip_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::GlVersion;

    #[test]
    fn test_mip_level_count() {
        let desc = TextureDescriptor::new_2d(256, 64, TextureFormat::Rgba8, TextureFlags::MIP_MAPPED);
        assert_eq!(desc.mip_level_count(), 9);
        let desc = TextureDescriptor::new_2d(256, 64, TextureFormat::Rgba8, TextureFlags::empty());
        assert_eq!(desc.mip_level_count(), 1);
        let desc = TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba8, TextureFlags::MIP_MAPPED);
        assert_eq!(desc.mip_level_count(), 1);
    }

    #[test]
    fn test_image_size() {
        assert_eq!(TextureFormat::Rgba8.image_size(4, 4), 64);
        assert_eq!(TextureFormat::Bc1.image_size(8, 8), 32);
        assert_eq!(TextureFormat::Bc3.image_size(5, 5), 64);
    }

    #[test]
    fn test_gles2_uses_unsized_internal_format() {
        let caps = Capabilities::from_version(GlVersion::es(2, 0), &[]);
        let gl = TextureFormat::Rgba8.gl_format(false, &caps).unwrap();
        assert_eq!(gl.internal_format, glow::RGBA);
        assert!(TextureFormat::R8.gl_format(false, &caps).is_none());
        let alpha = TextureFormat::RedOrAlpha8.gl_format(false, &caps).unwrap();
        assert_eq!(alpha.format, glow::ALPHA);
    }

    #[test]
    fn test_srgb_and_compressed_formats() {
        let caps = Capabilities::from_version(
            GlVersion::desktop(4, 6),
            &["GL_EXT_texture_compression_s3tc"],
        );
        let gl = TextureFormat::Rgba8.gl_format(true, &caps).unwrap();
        assert_eq!(gl.internal_format, glow::SRGB8_ALPHA8);
        let bc1 = TextureFormat::Bc1.gl_format(false, &caps).unwrap();
        assert_eq!(bc1.internal_format, glow::COMPRESSED_RGBA_S3TC_DXT1_EXT);
        assert!(TextureFormat::Astc4x4.gl_format(false, &caps).is_none());
    }
}
