//! Render targets.
//!
//! A pass renders either into the surface's default framebuffer
//! ([`SwapchainRenderTarget`]) or into a framebuffer object assembled from
//! textures and renderbuffers ([`TextureRenderTarget`]).
//!
//! ```text
//! TextureRenderTarget
//!   ├── color 0: Texture (layer, level) ──┐
//!   ├── color 1: RenderBuffer (MSAA) ─────┼── resolve → Texture (layer, level)
//!   └── depth-stencil: RenderBuffer | depth Texture
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use super::{RenderBuffer, Texture};
use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle};
use crate::error::GraphicsError;
use crate::release::{DeferredRelease, DeferredReleaseQueue};
use crate::types::TextureFlags;

// ============================================================================
// Attachments
// ============================================================================

/// One color attachment: a texture subresource or a renderbuffer, with an
/// optional texture that multisample contents are resolved into at the end
/// of a pass.
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub texture: Option<Arc<Texture>>,
    pub renderbuffer: Option<Arc<RenderBuffer>>,
    pub layer: u32,
    pub level: u32,
    pub resolve_texture: Option<Arc<Texture>>,
    pub resolve_layer: u32,
    pub resolve_level: u32,
}

impl ColorAttachment {
    pub fn texture(texture: Arc<Texture>) -> Self {
        Self {
            texture: Some(texture),
            renderbuffer: None,
            layer: 0,
            level: 0,
            resolve_texture: None,
            resolve_layer: 0,
            resolve_level: 0,
        }
    }

    pub fn renderbuffer(renderbuffer: Arc<RenderBuffer>) -> Self {
        Self {
            texture: None,
            renderbuffer: Some(renderbuffer),
            layer: 0,
            level: 0,
            resolve_texture: None,
            resolve_layer: 0,
            resolve_level: 0,
        }
    }

    /// Cube face, array layer or 3D slice.
    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_resolve(mut self, texture: Arc<Texture>, layer: u32, level: u32) -> Self {
        self.resolve_texture = Some(texture);
        self.resolve_layer = layer;
        self.resolve_level = level;
        self
    }

    /// Internal format of whatever backs the attachment.
    fn internal_format(&self) -> u32 {
        match (&self.texture, &self.renderbuffer) {
            (Some(t), _) => t.plan().format.sized_internal_format,
            (None, Some(rb)) => rb.internal_format(),
            (None, None) => 0,
        }
    }

    fn sample_count(&self) -> u32 {
        match (&self.texture, &self.renderbuffer) {
            (Some(t), _) => t.sample_count(),
            (None, Some(rb)) => rb.sample_count(),
            (None, None) => 1,
        }
    }

    fn pixel_size(&self) -> (u32, u32) {
        match (&self.texture, &self.renderbuffer) {
            (Some(t), _) => t.plan().level_size(self.level),
            (None, Some(rb)) => rb.pixel_size(),
            (None, None) => (0, 0),
        }
    }
}

/// Depth-stencil attachment of a [`TextureRenderTarget`].
#[derive(Debug, Clone)]
pub enum DepthStencilAttachment {
    RenderBuffer(Arc<RenderBuffer>),
    Texture(Arc<Texture>),
}

impl DepthStencilAttachment {
    fn internal_format(&self) -> u32 {
        match self {
            Self::RenderBuffer(rb) => rb.internal_format(),
            Self::Texture(t) => t.plan().format.sized_internal_format,
        }
    }
}

bitflags! {
    /// Flags for texture render targets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureRenderTargetFlags: u32 {
        /// Keep color contents at pass begin instead of clearing them.
        const PRESERVE_COLOR_CONTENTS = 1 << 0;
        /// Keep depth-stencil contents at pass end.
        const PRESERVE_DEPTH_STENCIL_CONTENTS = 1 << 1;
    }
}

/// Descriptor for creating a [`TextureRenderTarget`].
#[derive(Debug, Clone, Default)]
pub struct TextureRenderTargetDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil: Option<DepthStencilAttachment>,
    pub flags: TextureRenderTargetFlags,
}

impl TextureRenderTargetDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_stencil(mut self, attachment: DepthStencilAttachment) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }

    pub fn with_flags(mut self, flags: TextureRenderTargetFlags) -> Self {
        self.flags = flags;
        self
    }
}

// ============================================================================
// Render pass descriptor
// ============================================================================

/// Attachment formats a pipeline renders into.
///
/// Two targets with compatible descriptors can be used with the same
/// pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDescriptor {
    pub color_formats: Vec<u32>,
    pub depth_stencil_format: Option<u32>,
    pub has_depth_stencil: bool,
}

impl RenderPassDescriptor {
    /// Same number of color attachments with the same formats, and the same
    /// depth-stencil presence. The default framebuffer reports format `0`
    /// which matches any format.
    pub fn is_compatible(&self, other: &RenderPassDescriptor) -> bool {
        let fmt_eq = |a: u32, b: u32| a == 0 || b == 0 || a == b;
        self.color_formats.len() == other.color_formats.len()
            && self
                .color_formats
                .iter()
                .zip(&other.color_formats)
                .all(|(a, b)| fmt_eq(*a, *b))
            && self.has_depth_stencil == other.has_depth_stencil
            && match (self.depth_stencil_format, other.depth_stencil_format) {
                (Some(a), Some(b)) => fmt_eq(a, b),
                _ => true,
            }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// The surface's default framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainRenderTarget {
    /// Usually 0; some platforms render surfaces into an FBO.
    pub framebuffer: GlHandle,
    pub pixel_size: (u32, u32),
    pub sample_count: u32,
    /// Enable sRGB write conversion while bound.
    pub srgb: bool,
}

impl SwapchainRenderTarget {
    pub fn render_pass_descriptor(&self) -> RenderPassDescriptor {
        RenderPassDescriptor {
            color_formats: vec![0],
            depth_stencil_format: None,
            has_depth_stencil: true,
        }
    }
}

/// A framebuffer object over textures and renderbuffers.
pub struct TextureRenderTarget {
    id: u64,
    descriptor: TextureRenderTargetDescriptor,
    framebuffer: AtomicU32,
    pixel_size: (u32, u32),
    sample_count: u32,
    srgb_update: bool,
    render_pass: RenderPassDescriptor,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl TextureRenderTarget {
    /// Build and validate the framebuffer object. The context must be current.
    pub(crate) fn create(
        driver: &dyn GlDriver,
        caps: &Capabilities,
        descriptor: TextureRenderTargetDescriptor,
        release_queue: Arc<DeferredReleaseQueue>,
    ) -> Result<Self, GraphicsError> {
        let invalid = |msg: String| {
            log::warn!("TextureRenderTarget: {} ({:?})", msg, descriptor.label);
            Err(GraphicsError::Validation(msg))
        };

        if descriptor.color_attachments.is_empty() && descriptor.depth_stencil.is_none() {
            return invalid("render target has no attachments".into());
        }
        if descriptor.color_attachments.len() > caps.max_color_attachments.max(1) as usize {
            return invalid(format!(
                "{} color attachments exceed the limit of {}",
                descriptor.color_attachments.len(),
                caps.max_color_attachments
            ));
        }
        for (i, color) in descriptor.color_attachments.iter().enumerate() {
            match (&color.texture, &color.renderbuffer) {
                (Some(_), Some(_)) | (None, None) => {
                    return invalid(format!(
                        "color attachment {i} needs exactly one of texture or renderbuffer"
                    ));
                }
                (Some(t), None) if !t.flags().contains(TextureFlags::RENDER_TARGET) => {
                    return invalid(format!(
                        "color attachment {i} texture lacks the RENDER_TARGET flag"
                    ));
                }
                _ => {}
            }
            if color.level > 0 && !caps.non_base_level_framebuffer_texture {
                log::warn!("TextureRenderTarget: rendering to mip level {} not supported", color.level);
                return Err(GraphicsError::FeatureNotSupported(
                    "rendering to a non-base mip level".into(),
                ));
            }
            if color.resolve_texture.is_some() && !caps.framebuffer_blit {
                log::warn!("TextureRenderTarget: multisample resolve not supported");
                return Err(GraphicsError::FeatureNotSupported(
                    "multisample resolve".into(),
                ));
            }
        }

        let pixel_size = match (descriptor.color_attachments.first(), &descriptor.depth_stencil) {
            (Some(c), _) => c.pixel_size(),
            (None, Some(DepthStencilAttachment::RenderBuffer(rb))) => rb.pixel_size(),
            (None, Some(DepthStencilAttachment::Texture(t))) => t.pixel_size(),
            (None, None) => (0, 0),
        };
        let sample_count = match (descriptor.color_attachments.first(), &descriptor.depth_stencil) {
            (Some(c), _) => c.sample_count(),
            (None, Some(DepthStencilAttachment::RenderBuffer(rb))) => rb.sample_count(),
            (None, Some(DepthStencilAttachment::Texture(t))) => t.sample_count(),
            (None, None) => 1,
        };
        let srgb_update = descriptor
            .color_attachments
            .iter()
            .filter_map(|c| c.texture.as_ref())
            .any(|t| t.flags().contains(TextureFlags::SRGB));

        let framebuffer = driver.create_framebuffer().map_err(|e| {
            log::error!("TextureRenderTarget: glGenFramebuffers failed: {e}");
            GraphicsError::ResourceCreationFailed(e)
        })?;
        driver.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);

        for (i, color) in descriptor.color_attachments.iter().enumerate() {
            let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
            if let Some(texture) = &color.texture {
                attach_texture(driver, texture, attachment, color.layer, color.level);
            } else if let Some(rb) = &color.renderbuffer {
                driver.framebuffer_renderbuffer(glow::FRAMEBUFFER, attachment, rb.handle());
            }
        }
        match &descriptor.depth_stencil {
            Some(DepthStencilAttachment::RenderBuffer(rb)) => {
                rb.attach_depth_stencil(
                    driver,
                    glow::FRAMEBUFFER,
                    caps.needs_depth_stencil_combined_attach,
                );
            }
            Some(DepthStencilAttachment::Texture(t)) => {
                let attachment = if t.format().has_stencil() {
                    glow::DEPTH_STENCIL_ATTACHMENT
                } else {
                    glow::DEPTH_ATTACHMENT
                };
                attach_texture(driver, t, attachment, 0, 0);
            }
            None => {}
        }
        if caps.max_draw_buffers > 1 || descriptor.color_attachments.len() > 1 {
            let buffers: Vec<u32> = (0..descriptor.color_attachments.len() as u32)
                .map(|i| glow::COLOR_ATTACHMENT0 + i)
                .collect();
            if !buffers.is_empty() {
                driver.draw_buffers(&buffers);
            }
        }

        let status = driver.check_framebuffer_status(glow::FRAMEBUFFER);
        driver.bind_framebuffer(glow::FRAMEBUFFER, 0);
        if status != glow::FRAMEBUFFER_COMPLETE {
            log::error!(
                "TextureRenderTarget: framebuffer {:?} incomplete (0x{:04X})",
                descriptor.label,
                status
            );
            driver.delete_framebuffer(framebuffer);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "framebuffer incomplete (0x{status:04X})"
            )));
        }

        let render_pass = RenderPassDescriptor {
            color_formats: descriptor
                .color_attachments
                .iter()
                .map(ColorAttachment::internal_format)
                .collect(),
            depth_stencil_format: descriptor.depth_stencil.as_ref().map(|d| d.internal_format()),
            has_depth_stencil: descriptor.depth_stencil.is_some(),
        };

        log::debug!(
            "TextureRenderTarget: created {:?} framebuffer {} {}x{} samples={}",
            descriptor.label,
            framebuffer,
            pixel_size.0,
            pixel_size.1,
            sample_count
        );
        Ok(Self {
            id: super::next_resource_id(),
            descriptor,
            framebuffer: AtomicU32::new(framebuffer),
            pixel_size,
            sample_count,
            srgb_update,
            render_pass,
            release_queue,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &TextureRenderTargetDescriptor {
        &self.descriptor
    }

    pub fn framebuffer(&self) -> GlHandle {
        self.framebuffer.load(Ordering::Acquire)
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        self.pixel_size
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Whether sRGB write conversion must be on while rendering.
    pub fn srgb_update(&self) -> bool {
        self.srgb_update
    }

    pub fn flags(&self) -> TextureRenderTargetFlags {
        self.descriptor.flags
    }

    pub fn render_pass_descriptor(&self) -> &RenderPassDescriptor {
        &self.render_pass
    }

    pub fn color_attachments(&self) -> &[ColorAttachment] {
        &self.descriptor.color_attachments
    }

    pub fn depth_stencil(&self) -> Option<&DepthStencilAttachment> {
        self.descriptor.depth_stencil.as_ref()
    }

    /// Queue the framebuffer object for deletion. Attachments are released
    /// through their own handles.
    pub fn destroy(&self) {
        let fb = self.framebuffer.swap(0, Ordering::AcqRel);
        if fb != 0 {
            log::debug!("TextureRenderTarget: queued framebuffer {} for release", fb);
            self.release_queue.push(DeferredRelease::Framebuffer(fb));
        }
    }
}

impl Drop for TextureRenderTarget {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for TextureRenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureRenderTarget")
            .field("id", &self.id)
            .field("framebuffer", &self.framebuffer())
            .field("pixel_size", &self.pixel_size)
            .field("sample_count", &self.sample_count)
            .field("colors", &self.descriptor.color_attachments.len())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure TextureRenderTarget is Send + Sync
static_assertions::assert_impl_all!(TextureRenderTarget: Send, Sync);

/// What a render pass draws into.
#[derive(Debug, Clone)]
pub enum RenderTarget {
    Default(SwapchainRenderTarget),
    Texture(Arc<TextureRenderTarget>),
}

impl RenderTarget {
    pub fn framebuffer(&self) -> GlHandle {
        match self {
            Self::Default(rt) => rt.framebuffer,
            Self::Texture(rt) => rt.framebuffer(),
        }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        match self {
            Self::Default(rt) => rt.pixel_size,
            Self::Texture(rt) => rt.pixel_size(),
        }
    }

    pub fn sample_count(&self) -> u32 {
        match self {
            Self::Default(rt) => rt.sample_count,
            Self::Texture(rt) => rt.sample_count(),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default(_))
    }

    pub fn srgb_update(&self) -> bool {
        match self {
            Self::Default(rt) => rt.srgb,
            Self::Texture(rt) => rt.srgb_update(),
        }
    }

    pub fn color_attachment_count(&self) -> usize {
        match self {
            Self::Default(_) => 1,
            Self::Texture(rt) => rt.color_attachments().len(),
        }
    }

    pub fn has_depth_stencil(&self) -> bool {
        match self {
            Self::Default(_) => true,
            Self::Texture(rt) => rt.depth_stencil().is_some(),
        }
    }

    pub fn preserves_depth_stencil(&self) -> bool {
        match self {
            Self::Default(_) => false,
            Self::Texture(rt) => rt
                .flags()
                .contains(TextureRenderTargetFlags::PRESERVE_DEPTH_STENCIL_CONTENTS),
        }
    }

    pub fn render_pass_descriptor(&self) -> RenderPassDescriptor {
        match self {
            Self::Default(rt) => rt.render_pass_descriptor(),
            Self::Texture(rt) => rt.render_pass_descriptor().clone(),
        }
    }
}

/// Attach a texture subresource to the bound `GL_FRAMEBUFFER`.
pub(crate) fn attach_texture(
    driver: &dyn GlDriver,
    texture: &Texture,
    attachment: u32,
    layer: u32,
    level: u32,
) {
    attach_texture_to(driver, glow::FRAMEBUFFER, texture, attachment, layer, level);
}

/// Attach a texture subresource to the framebuffer bound at `target`.
pub(crate) fn attach_texture_to(
    driver: &dyn GlDriver,
    target: u32,
    texture: &Texture,
    attachment: u32,
    layer: u32,
    level: u32,
) {
    let plan = texture.plan();
    if plan.is_cube() {
        driver.framebuffer_texture_2d(
            target,
            attachment,
            plan.face_target(layer),
            texture.handle(),
            level as i32,
        );
    } else if plan.is_layered() || plan.target == glow::TEXTURE_1D_ARRAY {
        driver.framebuffer_texture_layer(
            target,
            attachment,
            texture.handle(),
            level as i32,
            layer as i32,
        );
    } else {
        driver.framebuffer_texture_2d(target, attachment, plan.target, texture.handle(), level as i32);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::caps::GlVersion;
    use crate::driver::DummyDriver;
    use crate::resources::RenderBufferDescriptor;
    use crate::types::{TextureDescriptor, TextureFormat};

    fn texture(driver: &DummyDriver, caps: &Capabilities, flags: TextureFlags) -> Arc<Texture> {
        let desc = TextureDescriptor::new_2d(32, 16, TextureFormat::Rgba8, flags);
        let plan = Texture::prepare_create(&desc, caps).unwrap();
        Arc::new(Texture::create(driver, desc, plan, Arc::new(DeferredReleaseQueue::new())).unwrap())
    }

    #[test]
    fn test_create_color_and_depth() {
        let driver = DummyDriver::new();
        let caps = Capabilities::from_version(GlVersion::desktop(4, 6), &[]);
        let queue = Arc::new(DeferredReleaseQueue::new());
        let color = texture(&driver, &caps, TextureFlags::RENDER_TARGET);
        let depth = Arc::new(
            RenderBuffer::create(
                &driver,
                &caps,
                RenderBufferDescriptor::depth_stencil(32, 16),
                queue.clone(),
            )
            .unwrap(),
        );
        let rt = TextureRenderTarget::create(
            &driver,
            &caps,
            TextureRenderTargetDescriptor::new()
                .with_color(ColorAttachment::texture(color))
                .with_depth_stencil(DepthStencilAttachment::RenderBuffer(depth)),
            queue.clone(),
        )
        .unwrap();
        assert_eq!(rt.pixel_size(), (32, 16));
        assert_ne!(rt.framebuffer(), 0);
        assert_eq!(rt.render_pass_descriptor().color_formats, vec![glow::RGBA8]);

        rt.destroy();
        assert_eq!(rt.framebuffer(), 0);
        queue.drain(&driver);
        assert_eq!(driver.live_framebuffers(), 0);
    }

    #[test]
    fn test_requires_render_target_flag() {
        let driver = DummyDriver::new();
        let caps = Capabilities::from_version(GlVersion::desktop(4, 6), &[]);
        let color = texture(&driver, &caps, TextureFlags::empty());
        let err = TextureRenderTarget::create(
            &driver,
            &caps,
            TextureRenderTargetDescriptor::new().with_color(ColorAttachment::texture(color)),
            Arc::new(DeferredReleaseQueue::new()),
        )
        .unwrap_err();
        assert!(matches!(err, GraphicsError::Validation(_)));
        assert_eq!(driver.live_framebuffers(), 0);
    }

    #[test]
    fn test_render_pass_compatibility() {
        let a = RenderPassDescriptor {
            color_formats: vec![glow::RGBA8],
            depth_stencil_format: Some(glow::DEPTH24_STENCIL8),
            has_depth_stencil: true,
        };
        let mut b = a.clone();
        assert!(a.is_compatible(&b));
        b.color_formats = vec![glow::RGBA16F];
        assert!(!a.is_compatible(&b));
        let swapchain = SwapchainRenderTarget {
            framebuffer: 0,
            pixel_size: (1, 1),
            sample_count: 1,
            srgb: false,
        };
        assert!(swapchain.render_pass_descriptor().is_compatible(&a));
    }
}
