//! Resource update batches.
//!
//! A [`ResourceUpdateBatch`] collects buffer writes, texture uploads,
//! copies, readbacks and mipmap requests. It is recorded into a command
//! buffer outside of passes, or handed to `begin_pass`/`end_pass`.
//!
//! Uniform buffers are host memory: writes land immediately and reads
//! complete (callback included) at record time. Everything else becomes
//! commands whose payload bytes the command buffer retains until it is
//! reset.

use std::sync::Arc;

use super::buffer::CommandBuffer;
use super::pool::PendingReadback;
use super::{Command, ReadSource, TextureRef};
use crate::resources::{Buffer, Texture};
use crate::tracker::{BufferAccess, TextureAccess};
use crate::types::{BufferType, BufferUsage, TextureFlags, TextureFormat};

// ============================================================================
// Readback results
// ============================================================================

/// Bytes read back from a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferReadbackResult(pub Vec<u8>);

impl BufferReadbackResult {
    pub fn data(&self) -> &[u8] {
        &self.0
    }
}

/// Pixels read back from a texture or a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureReadbackResult {
    pub pixel_size: (u32, u32),
    pub format: TextureFormat,
    /// Tightly packed rows, bottom row first.
    pub data: Vec<u8>,
}

pub type BufferReadbackCallback = Box<dyn FnOnce(BufferReadbackResult) + Send>;
pub type TextureReadbackCallback = Box<dyn FnOnce(TextureReadbackResult) + Send>;

// ============================================================================
// Descriptions
// ============================================================================

/// Pixel data for one texture subresource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureSubresourceUpload {
    pub data: Vec<u8>,
    /// Destination offset inside the level.
    pub destination: (u32, u32),
    /// Region size; `None` covers the rest of the level.
    pub size: Option<(u32, u32)>,
    /// Top-left pixel of the region inside `data`.
    pub source_origin: (u32, u32),
    /// Row pitch of `data`; `None` means tightly packed rows of `size`.
    pub source_bytes_per_row: Option<u32>,
}

impl TextureSubresourceUpload {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_destination(mut self, x: u32, y: u32) -> Self {
        self.destination = (x, y);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn with_source_origin(mut self, x: u32, y: u32) -> Self {
        self.source_origin = (x, y);
        self
    }

    pub fn with_source_bytes_per_row(mut self, bytes: u32) -> Self {
        self.source_bytes_per_row = Some(bytes);
        self
    }
}

/// Data for one (layer, level) of a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureUploadEntry {
    /// Cube face, array layer or 3D slice.
    pub layer: u32,
    pub level: u32,
    pub subresource: TextureSubresourceUpload,
}

/// A set of subresource uploads into one texture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureUploadDescription {
    pub entries: Vec<TextureUploadEntry>,
}

impl TextureUploadDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level 0 of layer 0 from a tightly packed image.
    pub fn whole_image(data: Vec<u8>) -> Self {
        Self::new().with_entry(0, 0, TextureSubresourceUpload::new(data))
    }

    pub fn with_entry(mut self, layer: u32, level: u32, subresource: TextureSubresourceUpload) -> Self {
        self.entries.push(TextureUploadEntry {
            layer,
            level,
            subresource,
        });
        self
    }
}

/// A subresource location of a texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureCopyLocation {
    pub level: u32,
    pub layer: u32,
    pub x: u32,
    pub y: u32,
}

impl TextureCopyLocation {
    pub fn new(level: u32, layer: u32, x: u32, y: u32) -> Self {
        Self { level, layer, x, y }
    }

    /// Level 0, layer 0, origin (0, 0).
    pub fn base() -> Self {
        Self::default()
    }
}

/// Texture-to-texture copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureCopyDescription {
    pub src: TextureCopyLocation,
    pub dst: TextureCopyLocation,
    /// `None` copies the whole source level.
    pub size: Option<(u32, u32)>,
}

/// What a texture readback reads.
#[derive(Debug, Clone, Default)]
pub struct TextureReadbackDescription {
    /// `None` reads the current surface's back buffer.
    pub texture: Option<Arc<Texture>>,
    pub level: u32,
    pub layer: u32,
}

impl TextureReadbackDescription {
    pub fn texture(texture: Arc<Texture>) -> Self {
        Self {
            texture: Some(texture),
            level: 0,
            layer: 0,
        }
    }

    /// Read the back buffer of the frame being recorded.
    pub fn back_buffer() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }
}

// ============================================================================
// Batch
// ============================================================================

/// One queued update.
pub enum ResourceUpdate {
    DynamicBufferUpdate {
        buffer: Arc<Buffer>,
        offset: u32,
        data: Vec<u8>,
    },
    StaticBufferUpload {
        buffer: Arc<Buffer>,
        offset: u32,
        data: Vec<u8>,
    },
    BufferRead {
        buffer: Arc<Buffer>,
        offset: u32,
        size: u32,
        callback: BufferReadbackCallback,
    },
    TextureUpload {
        texture: Arc<Texture>,
        description: TextureUploadDescription,
    },
    TextureCopy {
        dst: Arc<Texture>,
        src: Arc<Texture>,
        description: TextureCopyDescription,
    },
    TextureRead {
        description: TextureReadbackDescription,
        callback: TextureReadbackCallback,
    },
    GenerateMips {
        texture: Arc<Texture>,
    },
}

impl std::fmt::Debug for ResourceUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DynamicBufferUpdate { buffer, offset, data } => f
                .debug_struct("DynamicBufferUpdate")
                .field("buffer", &buffer.id())
                .field("offset", offset)
                .field("len", &data.len())
                .finish(),
            Self::StaticBufferUpload { buffer, offset, data } => f
                .debug_struct("StaticBufferUpload")
                .field("buffer", &buffer.id())
                .field("offset", offset)
                .field("len", &data.len())
                .finish(),
            Self::BufferRead {
                buffer, offset, size, ..
            } => f
                .debug_struct("BufferRead")
                .field("buffer", &buffer.id())
                .field("offset", offset)
                .field("size", size)
                .finish(),
            Self::TextureUpload {
                texture,
                description,
            } => f
                .debug_struct("TextureUpload")
                .field("texture", &texture.id())
                .field("entries", &description.entries.len())
                .finish(),
            Self::TextureCopy { dst, src, .. } => f
                .debug_struct("TextureCopy")
                .field("dst", &dst.id())
                .field("src", &src.id())
                .finish(),
            Self::TextureRead { description, .. } => f
                .debug_struct("TextureRead")
                .field("texture", &description.texture.as_ref().map(|t| t.id()))
                .finish(),
            Self::GenerateMips { texture } => f
                .debug_struct("GenerateMips")
                .field("texture", &texture.id())
                .finish(),
        }
    }
}

/// An ordered list of resource updates.
///
/// # Example
///
/// ```ignore
/// let mut batch = ResourceUpdateBatch::new();
/// batch.upload_static_buffer(&vertices, 0, bytemuck::cast_slice(&VERTS));
/// batch.upload_texture(&texture, TextureUploadDescription::whole_image(pixels));
/// cb.resource_update(batch);
/// ```
#[derive(Debug, Default)]
pub struct ResourceUpdateBatch {
    updates: Vec<ResourceUpdate>,
}

impl ResourceUpdateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `data` at `offset` of a dynamic buffer.
    pub fn update_dynamic_buffer(&mut self, buffer: &Arc<Buffer>, offset: u32, data: &[u8]) {
        self.updates.push(ResourceUpdate::DynamicBufferUpdate {
            buffer: Arc::clone(buffer),
            offset,
            data: data.to_vec(),
        });
    }

    /// Write `data` at `offset` of an immutable or static buffer.
    pub fn upload_static_buffer(&mut self, buffer: &Arc<Buffer>, offset: u32, data: &[u8]) {
        self.updates.push(ResourceUpdate::StaticBufferUpload {
            buffer: Arc::clone(buffer),
            offset,
            data: data.to_vec(),
        });
    }

    /// Read `[offset, offset + size)` of `buffer`.
    ///
    /// Uniform buffers call back while the batch is recorded; other buffers
    /// call back during the replay of the frame.
    pub fn read_back_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u32,
        size: u32,
        callback: impl FnOnce(BufferReadbackResult) + Send + 'static,
    ) {
        self.updates.push(ResourceUpdate::BufferRead {
            buffer: Arc::clone(buffer),
            offset,
            size,
            callback: Box::new(callback),
        });
    }

    pub fn upload_texture(&mut self, texture: &Arc<Texture>, description: TextureUploadDescription) {
        self.updates.push(ResourceUpdate::TextureUpload {
            texture: Arc::clone(texture),
            description,
        });
    }

    pub fn copy_texture(
        &mut self,
        dst: &Arc<Texture>,
        src: &Arc<Texture>,
        description: TextureCopyDescription,
    ) {
        self.updates.push(ResourceUpdate::TextureCopy {
            dst: Arc::clone(dst),
            src: Arc::clone(src),
            description,
        });
    }

    /// Read a texture level or the back buffer. The callback runs during
    /// the replay of the frame.
    pub fn read_back_texture(
        &mut self,
        description: TextureReadbackDescription,
        callback: impl FnOnce(TextureReadbackResult) + Send + 'static,
    ) {
        self.updates.push(ResourceUpdate::TextureRead {
            description,
            callback: Box::new(callback),
        });
    }

    pub fn generate_mips(&mut self, texture: &Arc<Texture>) {
        self.updates.push(ResourceUpdate::GenerateMips {
            texture: Arc::clone(texture),
        });
    }

    /// Append every update of `other`.
    pub fn merge(&mut self, mut other: ResourceUpdateBatch) {
        self.updates.append(&mut other.updates);
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub(crate) fn into_updates(self) -> Vec<ResourceUpdate> {
        self.updates
    }
}

// ============================================================================
// Recording
// ============================================================================

impl CommandBuffer {
    pub(super) fn record_update(&mut self, update: ResourceUpdate) {
        match update {
            ResourceUpdate::DynamicBufferUpdate {
                buffer,
                offset,
                data,
            } => {
                if buffer.descriptor().buffer_type != BufferType::Dynamic {
                    log::warn!(
                        "CommandBuffer: dynamic update of non-dynamic buffer {:?} ignored",
                        buffer.label()
                    );
                    return;
                }
                self.record_buffer_write(&buffer, offset, data);
            }
            ResourceUpdate::StaticBufferUpload {
                buffer,
                offset,
                data,
            } => {
                if buffer.descriptor().buffer_type == BufferType::Dynamic {
                    log::warn!(
                        "CommandBuffer: static upload into dynamic buffer {:?} ignored",
                        buffer.label()
                    );
                    return;
                }
                self.record_buffer_write(&buffer, offset, data);
            }
            ResourceUpdate::BufferRead {
                buffer,
                offset,
                size,
                callback,
            } => self.record_buffer_read(&buffer, offset, size, callback),
            ResourceUpdate::TextureUpload {
                texture,
                description,
            } => {
                for entry in description.entries {
                    self.record_texture_upload(&texture, entry);
                }
            }
            ResourceUpdate::TextureCopy {
                dst,
                src,
                description,
            } => self.record_texture_copy(&dst, &src, &description),
            ResourceUpdate::TextureRead {
                description,
                callback,
            } => self.record_texture_read(&description, callback),
            ResourceUpdate::GenerateMips { texture } => {
                if !texture.flags().contains(TextureFlags::MIP_MAPPED) {
                    log::warn!(
                        "CommandBuffer: generate_mips on {:?} without MIP_MAPPED ignored",
                        texture.label()
                    );
                    return;
                }
                self.tracked_texture_barrier(&texture, TextureAccess::Update);
                self.commands.push(Command::GenMip {
                    texture: texture.handle(),
                    target: texture.target(),
                });
            }
        }
    }

    fn record_buffer_write(&mut self, buffer: &Buffer, offset: u32, data: Vec<u8>) {
        // Host memory: clipped to the buffer.
        if buffer.is_uniform() {
            buffer.write_host(offset, &data);
            return;
        }
        let end = offset as u64 + data.len() as u64;
        if end > buffer.size() as u64 {
            log::warn!(
                "CommandBuffer: write of {} bytes at {} exceeds buffer {:?} ({} bytes)",
                data.len(),
                offset,
                buffer.label(),
                buffer.size()
            );
            return;
        }
        if data.is_empty() {
            return;
        }
        if buffer.handle() == 0 {
            log::warn!("CommandBuffer: write to destroyed buffer {:?}", buffer.label());
            return;
        }
        self.tracked_buffer_barrier(buffer, BufferAccess::Update);
        let data = self.pools.push_bytes(data);
        self.commands.push(Command::BufferSubData {
            target: buffer.gl_target(),
            buffer: buffer.handle(),
            offset,
            data,
        });
    }

    fn record_buffer_read(
        &mut self,
        buffer: &Buffer,
        offset: u32,
        size: u32,
        callback: BufferReadbackCallback,
    ) {
        if buffer.is_uniform() {
            callback(BufferReadbackResult(buffer.read_host(offset, size)));
            return;
        }
        if offset as u64 + size as u64 > buffer.size() as u64 {
            log::warn!(
                "CommandBuffer: read of {} bytes at {} exceeds buffer {:?}",
                size,
                offset,
                buffer.label()
            );
            return;
        }
        if buffer.handle() == 0 {
            log::warn!("CommandBuffer: read of destroyed buffer {:?}", buffer.label());
            return;
        }
        self.tracked_buffer_barrier(buffer, BufferAccess::Read);
        let readback = self.pools.push_readback(PendingReadback::Buffer(callback));
        self.commands.push(Command::GetBufferSubData {
            target: buffer.gl_target(),
            buffer: buffer.handle(),
            offset,
            size,
            readback,
        });
    }

    fn record_texture_upload(&mut self, texture: &Texture, entry: TextureUploadEntry) {
        let plan = *texture.plan();
        let TextureUploadEntry {
            layer,
            level,
            subresource,
        } = entry;
        if level >= plan.mip_levels || layer >= plan.layers.max(1) {
            log::warn!(
                "CommandBuffer: upload to layer {} level {} out of range for {:?}",
                layer,
                level,
                texture.label()
            );
            return;
        }
        if plan.sample_count > 1 {
            log::warn!("CommandBuffer: cannot upload into multisample texture {:?}", texture.label());
            return;
        }

        let (level_w, level_h) = plan.level_size(level);
        let (dx, dy) = subresource.destination;
        let (width, height) = subresource
            .size
            .unwrap_or((level_w.saturating_sub(dx), level_h.saturating_sub(dy)));
        if width == 0 || height == 0 || dx + width > level_w || dy + height > level_h {
            log::warn!(
                "CommandBuffer: upload region {}x{} at ({}, {}) outside level {} of {:?}",
                width,
                height,
                dx,
                dy,
                level,
                texture.label()
            );
            return;
        }

        let format = texture.format();
        let tex_ref = TextureRef {
            handle: texture.handle(),
            target: plan.target,
            level,
            layer,
        };
        self.tracked_texture_barrier(texture, TextureAccess::Update);

        if plan.compressed {
            self.record_compressed_upload(texture, tex_ref, (dx, dy), (width, height), subresource.data);
            return;
        }

        let Some(pixels) = repack_rows(
            &subresource.data,
            format.bytes_per_pixel(),
            (width, height),
            subresource.source_origin,
            subresource.source_bytes_per_row,
        ) else {
            log::warn!(
                "CommandBuffer: {} bytes are too few for a {}x{} upload into {:?}",
                subresource.data.len(),
                width,
                height,
                texture.label()
            );
            return;
        };
        if plan.target == glow::TEXTURE_1D && (dx != 0 || width != level_w) {
            log::warn!("CommandBuffer: 1D uploads must cover the whole level");
            return;
        }

        let data = self.pools.push_bytes(pixels);
        self.commands.push(Command::SubImage {
            texture: tex_ref,
            x: dx as i32,
            y: dy as i32,
            width,
            height,
            internal_format: plan.format.internal_format,
            format: plan.format.format,
            ty: plan.format.ty,
            data,
        });
    }

    /// Compressed images cannot be allocated without data. Whole levels are
    /// specified directly. Atlases, 3D and array textures get a zeroed level
    /// once and are then patched region by region.
    fn record_compressed_upload(
        &mut self,
        texture: &Texture,
        tex_ref: TextureRef,
        origin: (u32, u32),
        size: (u32, u32),
        data: Vec<u8>,
    ) {
        let plan = *texture.plan();
        let format = texture.format();
        let internal_format = plan.format.internal_format;
        let needed = format.image_size(size.0, size.1) as usize;
        if data.len() < needed {
            log::warn!(
                "CommandBuffer: {} bytes are too few for a {}x{} compressed upload into {:?}",
                data.len(),
                size.0,
                size.1,
                texture.label()
            );
            return;
        }
        let (level_w, level_h) = plan.level_size(tex_ref.level);
        let full_level = origin == (0, 0) && size == (level_w, level_h);
        let patched = texture.flags().contains(TextureFlags::USED_AS_COMPRESSED_ATLAS)
            || plan.is_layered();

        if patched {
            if !texture.compressed_level_built(tex_ref.level) {
                let (depth, faces) = if plan.is_layered() {
                    (plan.level_layers(tex_ref.level), 1)
                } else if plan.is_cube() {
                    (1, 6)
                } else {
                    (1, 1)
                };
                let face_bytes = format.image_size(level_w, level_h) as usize * depth as usize;
                for face in 0..faces {
                    let zeros = self.pools.push_bytes(vec![0u8; face_bytes]);
                    self.commands.push(Command::CompressedImage {
                        texture: TextureRef {
                            layer: if faces == 1 { tex_ref.layer } else { face },
                            ..tex_ref
                        },
                        internal_format,
                        width: level_w,
                        height: level_h,
                        depth,
                        data: zeros,
                    });
                }
                texture.mark_compressed_level_built(tex_ref.level);
                texture.mark_specified();
            }
            let data = self.pools.push_bytes(data);
            self.commands.push(Command::CompressedSubImage {
                texture: tex_ref,
                x: origin.0 as i32,
                y: origin.1 as i32,
                width: size.0,
                height: size.1,
                internal_format,
                data,
            });
            return;
        }

        if full_level {
            let data = self.pools.push_bytes(data);
            self.commands.push(Command::CompressedImage {
                texture: tex_ref,
                internal_format,
                width: level_w,
                height: level_h,
                depth: 1,
                data,
            });
            texture.mark_compressed_level_built(tex_ref.level);
            texture.mark_specified();
        } else if texture.compressed_level_built(tex_ref.level) {
            let data = self.pools.push_bytes(data);
            self.commands.push(Command::CompressedSubImage {
                texture: tex_ref,
                x: origin.0 as i32,
                y: origin.1 as i32,
                width: size.0,
                height: size.1,
                internal_format,
                data,
            });
        } else {
            log::warn!(
                "CommandBuffer: partial compressed upload into unspecified level {} of {:?} ignored",
                tex_ref.level,
                texture.label()
            );
        }
    }

    fn record_texture_copy(&mut self, dst: &Texture, src: &Texture, desc: &TextureCopyDescription) {
        let (src_plan, dst_plan) = (*src.plan(), *dst.plan());
        if src_plan.compressed || dst_plan.compressed {
            log::warn!("CommandBuffer: copies between compressed textures are not supported");
            return;
        }
        if dst_plan.is_layered() {
            log::warn!("CommandBuffer: copy into a layered texture is not supported");
            return;
        }
        if desc.src.level >= src_plan.mip_levels || desc.dst.level >= dst_plan.mip_levels {
            log::warn!("CommandBuffer: copy level out of range");
            return;
        }
        let (src_w, src_h) = src_plan.level_size(desc.src.level);
        let (width, height) = desc.size.unwrap_or((
            src_w.saturating_sub(desc.src.x),
            src_h.saturating_sub(desc.src.y),
        ));
        let (dst_w, dst_h) = dst_plan.level_size(desc.dst.level);
        if desc.src.x + width > src_w
            || desc.src.y + height > src_h
            || desc.dst.x + width > dst_w
            || desc.dst.y + height > dst_h
        {
            log::warn!("CommandBuffer: copy region {}x{} out of bounds", width, height);
            return;
        }

        self.tracked_texture_barrier(src, TextureAccess::Read);
        self.tracked_texture_barrier(dst, TextureAccess::Update);
        self.commands.push(Command::CopyTex {
            src: TextureRef {
                handle: src.handle(),
                target: src_plan.target,
                level: desc.src.level,
                layer: desc.src.layer,
            },
            src_origin: [desc.src.x as i32, desc.src.y as i32],
            dst: TextureRef {
                handle: dst.handle(),
                target: dst_plan.target,
                level: desc.dst.level,
                layer: desc.dst.layer,
            },
            dst_origin: [desc.dst.x as i32, desc.dst.y as i32],
            size: [width as i32, height as i32],
        });
    }

    fn record_texture_read(
        &mut self,
        desc: &TextureReadbackDescription,
        callback: TextureReadbackCallback,
    ) {
        let (source, width, height, format, gl_format, gl_type) = match &desc.texture {
            Some(texture) => {
                let plan = *texture.plan();
                if plan.compressed || plan.sample_count > 1 || texture.format().is_depth() {
                    log::warn!(
                        "CommandBuffer: readback of {:?} is not supported for its format",
                        texture.label()
                    );
                    return;
                }
                if desc.level >= plan.mip_levels {
                    log::warn!("CommandBuffer: readback level {} out of range", desc.level);
                    return;
                }
                self.tracked_texture_barrier(texture, TextureAccess::Read);
                let (w, h) = plan.level_size(desc.level);
                (
                    ReadSource::Texture(TextureRef {
                        handle: texture.handle(),
                        target: plan.target,
                        level: desc.level,
                        layer: desc.layer,
                    }),
                    w,
                    h,
                    texture.format(),
                    plan.format.format,
                    plan.format.ty,
                )
            }
            None => {
                let Some(target) = self.back_buffer else {
                    log::warn!("CommandBuffer: back buffer readback outside a surface frame");
                    return;
                };
                (
                    ReadSource::Framebuffer(target.framebuffer),
                    target.pixel_size.0,
                    target.pixel_size.1,
                    TextureFormat::Rgba8,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                )
            }
        };

        let readback = self.pools.push_readback(PendingReadback::Texture(callback));
        self.commands.push(Command::ReadPixels {
            source,
            width,
            height,
            format,
            gl_format,
            gl_type,
            readback,
        });
    }

    /// Updates outside passes only synchronize storage resources.
    fn tracked_buffer_barrier(&mut self, buffer: &Buffer, access: BufferAccess) {
        if !buffer.usage().contains(BufferUsage::STORAGE) {
            return;
        }
        let previous = buffer.access();
        if previous == access {
            return;
        }
        if previous.is_write() {
            self.commands
                .push(Command::Barrier(crate::tracker::MemoryBarriers::all()));
        }
        buffer.swap_access(access);
    }

    fn tracked_texture_barrier(&mut self, texture: &Texture, access: TextureAccess) {
        if !texture.flags().contains(TextureFlags::USED_WITH_LOAD_STORE) {
            return;
        }
        let previous = texture.access();
        if previous == access {
            return;
        }
        if previous.is_write() {
            self.commands
                .push(Command::Barrier(crate::tracker::MemoryBarriers::all()));
        }
        texture.swap_access(access);
    }
}

/// Copy a `size` region starting at `origin` out of rows of `pitch` bytes
/// into tightly packed rows. `None` when `data` is too short.
fn repack_rows(
    data: &[u8],
    bytes_per_pixel: u32,
    size: (u32, u32),
    origin: (u32, u32),
    pitch: Option<u32>,
) -> Option<Vec<u8>> {
    let bpp = bytes_per_pixel as usize;
    let row = size.0 as usize * bpp;
    let pitch = pitch.map_or(row, |p| p as usize);
    let skip = origin.0 as usize * bpp;
    let first = origin.1 as usize * pitch;
    if pitch < skip + row {
        return None;
    }
    let rows = size.1 as usize;
    if rows == 0 {
        return None;
    }
    let last_end = first + (rows - 1) * pitch + skip + row;
    if data.len() < last_end {
        return None;
    }
    if pitch == row && skip == 0 {
        return Some(data[first..first + rows * row].to_vec());
    }
    let mut packed = Vec::with_capacity(rows * row);
    for r in 0..rows {
        let start = first + r * pitch + skip;
        packed.extend_from_slice(&data[start..start + row]);
    }
    Some(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repack_tight_rows_is_a_copy() {
        let data: Vec<u8> = (0..16).collect();
        assert_eq!(repack_rows(&data, 4, (2, 2), (0, 0), None), Some(data));
    }

    #[test]
    fn test_repack_extracts_sub_rectangle() {
        // 3x2 image of 1-byte pixels, rows padded to 4 bytes.
        let data = vec![1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(
            repack_rows(&data, 1, (2, 2), (1, 0), Some(4)),
            Some(vec![2, 3, 5, 6])
        );
    }

    #[test]
    fn test_repack_rejects_short_data() {
        assert_eq!(repack_rows(&[0; 7], 4, (2, 1), (0, 0), None), None);
        assert_eq!(repack_rows(&[0; 8], 4, (2, 1), (0, 0), Some(4)), None);
    }

    #[test]
    fn test_batch_merge_keeps_order() {
        let mut a = ResourceUpdateBatch::new();
        assert!(a.is_empty());
        let b = ResourceUpdateBatch::new();
        a.merge(b);
        assert_eq!(a.len(), 0);
    }
}
