//! Swapchain over a drawable surface.
//!
//! A GL surface has exactly one back buffer owned by the window system, so
//! the swapchain is mostly bookkeeping: the surface's current pixel size,
//! the command buffer recorded for the frame and, when multisampling is
//! requested, an intermediate framebuffer that is resolved into the surface
//! before presenting.
//!
//! # Example
//!
//! ```ignore
//! let mut swapchain = rhi.create_swapchain(surface, SwapchainDescriptor::new().with_sample_count(4));
//! swapchain.create_or_resize(&mut rhi)?;
//!
//! // In render loop:
//! if rhi.begin_frame(&mut swapchain) == FrameOpResult::Success {
//!     let target = swapchain.render_target();
//!     let cb = swapchain.command_buffer_mut();
//!     cb.begin_pass(&target, [0.0, 0.0, 0.0, 1.0], Default::default(), None);
//!     // ... draws ...
//!     cb.end_pass(None);
//!     rhi.end_frame(&mut swapchain);
//! }
//! ```

use std::sync::Arc;

use crate::caps::Capabilities;
use crate::command::CommandBuffer;
use crate::driver::{GlDriver, GlHandle};
use crate::error::GraphicsError;
use crate::platform::Surface;
use crate::release::{DeferredRelease, DeferredReleaseQueue};
use crate::resources::{
    RenderBuffer, RenderBufferDescriptor, RenderTarget, SwapchainRenderTarget,
};
use crate::rhi::GlRhi;

/// Descriptor for creating a swapchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    pub label: Option<String>,
    /// Samples of the intermediate color buffer; 1 renders to the surface.
    pub sample_count: u32,
    /// Give the multisample framebuffer a depth-stencil buffer.
    pub depth_stencil: bool,
    /// Convert to sRGB on write where the driver allows toggling it.
    pub srgb: bool,
}

impl Default for SwapchainDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            sample_count: 1,
            depth_stencil: true,
            srgb: false,
        }
    }
}

impl SwapchainDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count.max(1);
        self
    }

    pub fn with_depth_stencil(mut self, enabled: bool) -> Self {
        self.depth_stencil = enabled;
        self
    }

    pub fn with_srgb(mut self, enabled: bool) -> Self {
        self.srgb = enabled;
        self
    }
}

/// Multisample color (and depth-stencil) storage resolved into the surface.
struct MsaaBuffers {
    framebuffer: GlHandle,
    samples: u32,
    _color: RenderBuffer,
    _depth_stencil: Option<RenderBuffer>,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl MsaaBuffers {
    fn create(
        driver: &dyn GlDriver,
        caps: &Capabilities,
        descriptor: &SwapchainDescriptor,
        size: (u32, u32),
        release_queue: &Arc<DeferredReleaseQueue>,
    ) -> Result<Self, GraphicsError> {
        let color = RenderBuffer::create(
            driver,
            caps,
            RenderBufferDescriptor::color(size.0, size.1)
                .with_sample_count(descriptor.sample_count),
            Arc::clone(release_queue),
        )?;
        let depth_stencil = if descriptor.depth_stencil {
            Some(RenderBuffer::create(
                driver,
                caps,
                RenderBufferDescriptor::depth_stencil(size.0, size.1)
                    .with_sample_count(descriptor.sample_count),
                Arc::clone(release_queue),
            )?)
        } else {
            None
        };

        let framebuffer = driver.create_framebuffer().map_err(|e| {
            log::error!("Swapchain: glGenFramebuffers failed: {e}");
            GraphicsError::ResourceCreationFailed(e)
        })?;
        driver.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
        driver.framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, color.handle());
        if let Some(ds) = &depth_stencil {
            ds.attach_depth_stencil(
                driver,
                glow::FRAMEBUFFER,
                caps.needs_depth_stencil_combined_attach,
            );
        }
        let status = driver.check_framebuffer_status(glow::FRAMEBUFFER);
        driver.bind_framebuffer(glow::FRAMEBUFFER, 0);
        if status != glow::FRAMEBUFFER_COMPLETE {
            log::error!("Swapchain: multisample framebuffer incomplete (0x{status:04X})");
            release_queue.push(DeferredRelease::Framebuffer(framebuffer));
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "multisample framebuffer incomplete (0x{status:04X})"
            )));
        }

        Ok(Self {
            framebuffer,
            samples: color.sample_count(),
            _color: color,
            _depth_stencil: depth_stencil,
            release_queue: Arc::clone(release_queue),
        })
    }
}

impl Drop for MsaaBuffers {
    fn drop(&mut self) {
        self.release_queue
            .push(DeferredRelease::Framebuffer(self.framebuffer));
    }
}

/// Presents frames to a [`Surface`].
///
/// Owns the command buffer recorded between
/// [`GlRhi::begin_frame`] and [`GlRhi::end_frame`].
pub struct Swapchain {
    descriptor: SwapchainDescriptor,
    surface: Arc<dyn Surface>,
    pixel_size: (u32, u32),
    default_framebuffer: GlHandle,
    srgb: bool,
    msaa: Option<MsaaBuffers>,
    command_buffer: CommandBuffer,
    frame_count: u64,
}

impl Swapchain {
    pub(crate) fn new(
        surface: Arc<dyn Surface>,
        descriptor: SwapchainDescriptor,
        debug_markers: bool,
    ) -> Self {
        Self {
            descriptor,
            surface,
            pixel_size: (0, 0),
            default_framebuffer: 0,
            srgb: false,
            msaa: None,
            command_buffer: CommandBuffer::new().with_debug_markers(debug_markers),
            frame_count: 0,
        }
    }

    /// Query the surface size and rebuild size-dependent storage.
    ///
    /// Returns whether the pixel size changed. A zero-sized surface (a
    /// minimized window) is not an error; frames are refused until it grows.
    pub fn create_or_resize(&mut self, rhi: &mut GlRhi) -> Result<bool, GraphicsError> {
        let size = self.surface.pixel_size();
        let changed = size != self.pixel_size;
        let needs_msaa = self.descriptor.sample_count > 1;
        if !changed && self.msaa.is_some() == needs_msaa {
            return Ok(false);
        }

        if !rhi.ensure_context(Some(self.surface.as_ref())) {
            return Err(if rhi.is_device_lost() {
                GraphicsError::DeviceLost
            } else {
                GraphicsError::ContextNotCurrent
            });
        }
        let caps = rhi.capabilities();
        self.default_framebuffer = rhi.context().default_framebuffer(self.surface.as_ref());
        self.srgb = self.descriptor.srgb && caps.srgb_write_control;
        if self.descriptor.srgb && !self.srgb {
            log::warn!("Swapchain: sRGB writes cannot be toggled on this context");
        }

        self.msaa = None;
        if needs_msaa && size.0 > 0 && size.1 > 0 {
            if caps.msaa_renderbuffer && caps.framebuffer_blit {
                self.msaa = Some(MsaaBuffers::create(
                    rhi.driver(),
                    caps,
                    &self.descriptor,
                    size,
                    rhi.release_queue(),
                )?);
            } else {
                log::warn!(
                    "Swapchain: {} samples requested without multisample renderbuffers, rendering single-sampled",
                    self.descriptor.sample_count
                );
            }
        }

        log::debug!(
            "Swapchain: {:?} {}x{} -> {}x{} (samples={})",
            self.descriptor.label,
            self.pixel_size.0,
            self.pixel_size.1,
            size.0,
            size.1,
            self.sample_count()
        );
        self.pixel_size = size;
        Ok(changed)
    }

    pub fn descriptor(&self) -> &SwapchainDescriptor {
        &self.descriptor
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Pixel size as of the last [`create_or_resize`](Self::create_or_resize).
    pub fn pixel_size(&self) -> (u32, u32) {
        self.pixel_size
    }

    /// Effective sample count of the render target.
    pub fn sample_count(&self) -> u32 {
        self.msaa.as_ref().map_or(1, |m| m.samples)
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Whether a frame can be rendered at the current size.
    pub fn is_renderable(&self) -> bool {
        self.pixel_size.0 > 0 && self.pixel_size.1 > 0
    }

    /// The target the frame's passes render into.
    pub fn render_target(&self) -> RenderTarget {
        RenderTarget::Default(self.back_buffer())
    }

    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    pub fn command_buffer_mut(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffer
    }

    pub(crate) fn back_buffer(&self) -> SwapchainRenderTarget {
        SwapchainRenderTarget {
            framebuffer: self
                .msaa
                .as_ref()
                .map_or(self.default_framebuffer, |m| m.framebuffer),
            pixel_size: self.pixel_size,
            sample_count: self.sample_count(),
            srgb: self.srgb,
        }
    }

    /// Blit the multisample buffer into the surface, if there is one.
    pub(crate) fn resolve(&self, driver: &dyn GlDriver) {
        let Some(msaa) = &self.msaa else {
            return;
        };
        let rect = [0, 0, self.pixel_size.0 as i32, self.pixel_size.1 as i32];
        driver.bind_framebuffer(glow::READ_FRAMEBUFFER, msaa.framebuffer);
        driver.bind_framebuffer(glow::DRAW_FRAMEBUFFER, self.default_framebuffer);
        driver.blit_framebuffer(rect, rect, glow::COLOR_BUFFER_BIT, glow::NEAREST);
        driver.bind_framebuffer(glow::FRAMEBUFFER, self.default_framebuffer);
    }

    pub(crate) fn frame_presented(&mut self) {
        self.frame_count += 1;
    }

    /// Split borrow for the backend's frame bracket.
    pub(crate) fn parts_mut(&mut self) -> (&dyn Surface, &mut CommandBuffer) {
        (self.surface.as_ref(), &mut self.command_buffer)
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("label", &self.descriptor.label)
            .field("surface", &self.surface.id())
            .field("pixel_size", &self.pixel_size)
            .field("sample_count", &self.sample_count())
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

// Ensure Swapchain can be handed to a render thread
static_assertions::assert_impl_all!(Swapchain: Send);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::config::RhiParameters;
    use crate::driver::dummy::{DummyDriver, DummyProfile};
    use crate::platform::{HeadlessContext, HeadlessSurface};

    fn rhi(profile: DummyProfile) -> GlRhi {
        let driver = DummyDriver::with_profile(profile);
        let context = HeadlessContext::with_loss_flag(driver.loss_flag());
        GlRhi::create(RhiParameters::new(), Box::new(driver), Box::new(context), None).unwrap()
    }

    #[test]
    fn test_resize_reports_change() {
        let mut rhi = rhi(DummyProfile::gles30());
        let surface = Arc::new(HeadlessSurface::new(32, 16));
        let mut swapchain = rhi.create_swapchain(surface.clone(), SwapchainDescriptor::new());
        assert!(!swapchain.is_renderable());

        assert!(swapchain.create_or_resize(&mut rhi).unwrap());
        assert_eq!(swapchain.pixel_size(), (32, 16));
        assert!(!swapchain.create_or_resize(&mut rhi).unwrap());

        surface.resize(64, 64);
        assert!(swapchain.create_or_resize(&mut rhi).unwrap());
        assert_eq!(swapchain.pixel_size(), (64, 64));
    }

    #[test]
    fn test_msaa_uses_intermediate_framebuffer() {
        let mut rhi = rhi(DummyProfile::desktop_gl46());
        let surface = Arc::new(HeadlessSurface::new(8, 8));
        let mut swapchain = rhi.create_swapchain(
            surface,
            SwapchainDescriptor::new().with_sample_count(4),
        );
        swapchain.create_or_resize(&mut rhi).unwrap();

        assert_eq!(swapchain.sample_count(), 4);
        let back = swapchain.back_buffer();
        assert_ne!(back.framebuffer, 0);
        assert_eq!(back.sample_count, 4);
    }

    #[test]
    fn test_msaa_falls_back_without_support() {
        let mut rhi = rhi(DummyProfile::gles20());
        let surface = Arc::new(HeadlessSurface::new(8, 8));
        let mut swapchain = rhi.create_swapchain(
            surface,
            SwapchainDescriptor::new().with_sample_count(4),
        );
        swapchain.create_or_resize(&mut rhi).unwrap();
        assert_eq!(swapchain.sample_count(), 1);
        assert_eq!(swapchain.back_buffer().framebuffer, 0);
    }
}
