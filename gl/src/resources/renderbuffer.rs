//! Renderbuffer resource.
//!
//! Renderbuffers are storage-only attachments: depth/stencil, or multisample
//! color that is resolved into a texture at the end of a pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle};
use crate::error::GraphicsError;
use crate::release::{DeferredRelease, DeferredReleaseQueue};
use crate::types::TextureFormat;

/// What a renderbuffer stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderBufferKind {
    /// Combined depth and stencil.
    DepthStencil,
    /// Color, typically multisampled.
    Color,
}

/// Descriptor for creating a renderbuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderBufferDescriptor {
    pub label: Option<String>,
    pub kind: RenderBufferKind,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    /// Color format hint. Only `Rgba8` is honoured for color renderbuffers.
    pub backing_format: Option<TextureFormat>,
}

impl RenderBufferDescriptor {
    pub fn new(kind: RenderBufferKind, width: u32, height: u32) -> Self {
        Self {
            label: None,
            kind,
            width,
            height,
            sample_count: 1,
            backing_format: None,
        }
    }

    pub fn depth_stencil(width: u32, height: u32) -> Self {
        Self::new(RenderBufferKind::DepthStencil, width, height)
    }

    pub fn color(width: u32, height: u32) -> Self {
        Self::new(RenderBufferKind::Color, width, height)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count.max(1);
        self
    }

    pub fn with_backing_format(mut self, format: TextureFormat) -> Self {
        self.backing_format = Some(format);
        self
    }
}

/// A renderbuffer.
///
/// A depth-stencil renderbuffer on a context without packed depth-stencil is
/// backed by two driver objects: a depth one and a separate stencil one.
pub struct RenderBuffer {
    id: u64,
    descriptor: RenderBufferDescriptor,
    samples: u32,
    /// Depth, packed depth-stencil, or color storage.
    handle: AtomicU32,
    /// Separate stencil storage, 0 when packed or not a depth-stencil buffer.
    stencil: AtomicU32,
    internal_format: u32,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl RenderBuffer {
    /// Create the renderbuffer storage. The context must be current.
    pub(crate) fn create(
        driver: &dyn GlDriver,
        caps: &Capabilities,
        descriptor: RenderBufferDescriptor,
        release_queue: Arc<DeferredReleaseQueue>,
    ) -> Result<Self, GraphicsError> {
        if descriptor.width == 0 || descriptor.height == 0 {
            log::warn!("RenderBuffer: zero size for {:?}", descriptor.label);
            return Err(GraphicsError::Validation(
                "renderbuffer size must be non-zero".into(),
            ));
        }

        let mut samples = descriptor.sample_count.max(1);
        if samples > 1 && !caps.msaa_renderbuffer {
            log::warn!(
                "RenderBuffer: multisample renderbuffers not supported, using 1 sample for {:?}",
                descriptor.label
            );
            samples = 1;
        }
        if caps.max_samples > 0 {
            samples = samples.min(caps.max_samples);
        }

        let (w, h) = (descriptor.width as i32, descriptor.height as i32);
        let storage = |internal: u32| {
            if samples > 1 {
                driver.renderbuffer_storage_multisample(samples as i32, internal, w, h);
            } else {
                driver.renderbuffer_storage(internal, w, h);
            }
        };
        let allocate = |internal: u32| -> Result<GlHandle, GraphicsError> {
            let handle = driver
                .create_renderbuffer()
                .map_err(GraphicsError::ResourceCreationFailed)?;
            driver.bind_renderbuffer(handle);
            storage(internal);
            Ok(handle)
        };

        let (internal_format, handle, stencil) = match descriptor.kind {
            RenderBufferKind::DepthStencil if caps.packed_depth_stencil => {
                let handle = allocate(glow::DEPTH24_STENCIL8)?;
                (glow::DEPTH24_STENCIL8, handle, 0)
            }
            RenderBufferKind::DepthStencil => {
                let depth_format = if caps.depth24 {
                    glow::DEPTH_COMPONENT24
                } else {
                    glow::DEPTH_COMPONENT16
                };
                let depth = allocate(depth_format)?;
                let stencil = match allocate(glow::STENCIL_INDEX8) {
                    Ok(stencil) => stencil,
                    Err(e) => {
                        driver.delete_renderbuffer(depth);
                        return Err(e);
                    }
                };
                (depth_format, depth, stencil)
            }
            RenderBufferKind::Color => {
                let internal = if caps.rgba8_format {
                    glow::RGBA8
                } else {
                    glow::RGBA4
                };
                if let Some(format) = descriptor.backing_format
                    && format != TextureFormat::Rgba8
                {
                    log::warn!(
                        "RenderBuffer: backing format {:?} ignored, using 0x{:04X}",
                        format,
                        internal
                    );
                }
                (internal, allocate(internal)?, 0)
            }
        };
        driver.bind_renderbuffer(0);

        log::debug!(
            "RenderBuffer: created {:?} {:?} {}x{} samples={} handle {}",
            descriptor.label,
            descriptor.kind,
            descriptor.width,
            descriptor.height,
            samples,
            handle
        );
        Ok(Self {
            id: super::next_resource_id(),
            descriptor,
            samples,
            handle: AtomicU32::new(handle),
            stencil: AtomicU32::new(stencil),
            internal_format,
            release_queue,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &RenderBufferDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> RenderBufferKind {
        self.descriptor.kind
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.descriptor.width, self.descriptor.height)
    }

    /// Effective sample count after capability clamping.
    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    /// Internal format of the main storage.
    pub fn internal_format(&self) -> u32 {
        self.internal_format
    }

    pub fn handle(&self) -> GlHandle {
        self.handle.load(Ordering::Acquire)
    }

    /// Separate stencil storage, if any.
    pub fn stencil_handle(&self) -> Option<GlHandle> {
        match self.stencil.load(Ordering::Acquire) {
            0 => None,
            h => Some(h),
        }
    }

    /// Attach to the bound framebuffer object.
    pub(crate) fn attach_depth_stencil(&self, driver: &dyn GlDriver, target: u32, combined: bool) {
        let handle = self.handle();
        if let Some(stencil) = self.stencil_handle() {
            driver.framebuffer_renderbuffer(target, glow::DEPTH_ATTACHMENT, handle);
            driver.framebuffer_renderbuffer(target, glow::STENCIL_ATTACHMENT, stencil);
        } else if combined {
            driver.framebuffer_renderbuffer(target, glow::DEPTH_STENCIL_ATTACHMENT, handle);
        } else {
            driver.framebuffer_renderbuffer(target, glow::DEPTH_ATTACHMENT, handle);
            driver.framebuffer_renderbuffer(target, glow::STENCIL_ATTACHMENT, handle);
        }
    }

    /// Queue the driver storage for deletion. Safe to call more than once.
    pub fn destroy(&self) {
        let handle = self.handle.swap(0, Ordering::AcqRel);
        let stencil = self.stencil.swap(0, Ordering::AcqRel);
        if handle != 0 {
            log::debug!("RenderBuffer: queued handle {} for release", handle);
            self.release_queue.push(DeferredRelease::RenderBuffer(handle));
        }
        self.release_queue.push(DeferredRelease::RenderBuffer(stencil));
    }
}

impl Drop for RenderBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RenderBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBuffer")
            .field("id", &self.id)
            .field("kind", &self.descriptor.kind)
            .field("size", &self.pixel_size())
            .field("samples", &self.samples)
            .field("handle", &self.handle())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure RenderBuffer is Send + Sync
static_assertions::assert_impl_all!(RenderBuffer: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::caps::GlVersion;
    use crate::driver::DummyDriver;

    #[test]
    fn test_packed_depth_stencil() {
        let driver = DummyDriver::new();
        let caps = Capabilities::from_version(GlVersion::desktop(4, 6), &[]);
        let queue = Arc::new(DeferredReleaseQueue::new());
        let rb = RenderBuffer::create(
            &driver,
            &caps,
            RenderBufferDescriptor::depth_stencil(32, 32),
            queue.clone(),
        )
        .unwrap();
        assert_eq!(rb.stencil_handle(), None);
        assert_eq!(
            driver.renderbuffer_format(rb.handle()),
            Some((glow::DEPTH24_STENCIL8, 0))
        );
        drop(rb);
        assert_eq!(queue.len(), 1);
        queue.drain(&driver);
        assert_eq!(driver.live_renderbuffers(), 0);
    }

    #[test]
    fn test_separate_depth_and_stencil_on_es2() {
        let driver = DummyDriver::new();
        let caps = Capabilities::from_version(GlVersion::es(2, 0), &[]);
        let queue = Arc::new(DeferredReleaseQueue::new());
        let rb = RenderBuffer::create(
            &driver,
            &caps,
            RenderBufferDescriptor::depth_stencil(16, 16).with_sample_count(4),
            queue.clone(),
        )
        .unwrap();
        assert_eq!(rb.sample_count(), 1);
        assert_eq!(rb.internal_format(), glow::DEPTH_COMPONENT16);
        let stencil = rb.stencil_handle().unwrap();
        assert_eq!(
            driver.renderbuffer_format(stencil),
            Some((glow::STENCIL_INDEX8, 0))
        );
        rb.destroy();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_multisample_color() {
        let driver = DummyDriver::new();
        let mut caps = Capabilities::from_version(GlVersion::desktop(4, 6), &[]);
        caps.max_samples = 8;
        let queue = Arc::new(DeferredReleaseQueue::new());
        let rb = RenderBuffer::create(
            &driver,
            &caps,
            RenderBufferDescriptor::color(8, 8).with_sample_count(4),
            queue,
        )
        .unwrap();
        assert_eq!(driver.renderbuffer_format(rb.handle()), Some((glow::RGBA8, 4)));
    }
}
