//! Deferred release of GL objects.
//!
//! A command buffer recorded this frame may still reference a handle whose
//! owner was destroyed while recording. Deleting the GL object immediately
//! would leave the replay pointing at a dead (or recycled) name, so owners
//! never delete. They push a [`DeferredRelease`] onto the shared queue and the
//! backend drains it at its safe points.
//!
//! # Architecture
//!
//! ```text
//! Buffer::destroy / Drop ──┐
//! Texture::destroy / Drop ─┤  push    ┌──────────────────────┐
//! RenderBuffer / FBO ──────┼────────► │ DeferredReleaseQueue │
//! ShaderCompileCache ──────┘          └──────────┬───────────┘
//!                                                │ drain (context current)
//!     begin_frame / begin_offscreen_frame /      ▼
//!     finish / GlRhi::destroy            glDelete* per entry
//! ```

use parking_lot::Mutex;

use crate::driver::{GlDriver, GlHandle};

/// A GL object pending deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredRelease {
    Buffer(GlHandle),
    Texture(GlHandle),
    RenderBuffer(GlHandle),
    Framebuffer(GlHandle),
    Program(GlHandle),
    Shader(GlHandle),
}

impl DeferredRelease {
    /// Delete the object.
    ///
    /// The driver's context must be current.
    pub fn release(self, driver: &dyn GlDriver) {
        match self {
            Self::Buffer(h) => driver.delete_buffer(h),
            Self::Texture(h) => driver.delete_texture(h),
            Self::RenderBuffer(h) => driver.delete_renderbuffer(h),
            Self::Framebuffer(h) => driver.delete_framebuffer(h),
            Self::Program(h) => driver.delete_program(h),
            Self::Shader(h) => driver.delete_shader(h),
        }
    }
}

/// Queue of GL objects whose deletion waits for the next safe point.
///
/// Shared through an `Arc` by the backend and every resource it creates.
#[derive(Debug, Default)]
pub struct DeferredReleaseQueue {
    pending: Mutex<Vec<DeferredRelease>>,
}

impl DeferredReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `release`. Null handles are ignored.
    pub fn push(&self, release: DeferredRelease) {
        let handle = match release {
            DeferredRelease::Buffer(h)
            | DeferredRelease::Texture(h)
            | DeferredRelease::RenderBuffer(h)
            | DeferredRelease::Framebuffer(h)
            | DeferredRelease::Program(h)
            | DeferredRelease::Shader(h) => h,
        };
        if handle != 0 {
            self.pending.lock().push(release);
        }
    }

    /// Number of pending releases.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Delete every pending object in queue order.
    ///
    /// The driver's context must be current. Returns the number of objects
    /// deleted.
    pub fn drain(&self, driver: &dyn GlDriver) -> usize {
        self.drain_with(driver, |_| {})
    }

    /// Like [`drain`](Self::drain), calling `observer` for each release
    /// before the object is deleted.
    pub fn drain_with(
        &self,
        driver: &dyn GlDriver,
        mut observer: impl FnMut(&DeferredRelease),
    ) -> usize {
        // Take the list first so releases queued from the observer wait for
        // the next drain instead of deadlocking.
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();
        if count > 0 {
            log::trace!("DeferredReleaseQueue: releasing {} objects", count);
        }
        for release in pending {
            observer(&release);
            release.release(driver);
        }
        count
    }
}

static_assertions::assert_impl_all!(DeferredReleaseQueue: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;

    #[test]
    fn test_push_ignores_null_handles() {
        let queue = DeferredReleaseQueue::new();
        queue.push(DeferredRelease::Buffer(0));
        assert!(queue.is_empty());
        queue.push(DeferredRelease::Buffer(3));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_deletes_in_order() {
        let driver = DummyDriver::new();
        let buffer = driver.create_buffer().unwrap();
        let texture = driver.create_texture().unwrap();

        let queue = DeferredReleaseQueue::new();
        queue.push(DeferredRelease::Texture(texture));
        queue.push(DeferredRelease::Buffer(buffer));
        assert!(driver.is_buffer_alive(buffer));

        let mut seen = Vec::new();
        let drained = queue.drain_with(&driver, |r| seen.push(*r));
        assert_eq!(drained, 2);
        assert_eq!(
            seen,
            vec![
                DeferredRelease::Texture(texture),
                DeferredRelease::Buffer(buffer)
            ]
        );
        assert!(!driver.is_buffer_alive(buffer));
        assert!(!driver.is_texture_alive(texture));
        assert!(queue.is_empty());
        assert_eq!(queue.drain(&driver), 0);
    }
}
