//! GPU buffer resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle};
use crate::error::GraphicsError;
use crate::release::{DeferredRelease, DeferredReleaseQueue};
use crate::tracker::BufferAccess;
use crate::types::{BufferDescriptor, BufferType, BufferUsage};

/// A GPU buffer resource.
///
/// Buffers are created by [`GlRhi::create_buffer`](crate::GlRhi::create_buffer)
/// and are reference-counted.
///
/// Uniform buffers never touch the driver: their bytes live in host memory
/// and are decomposed into individual uniform calls when shader resources are
/// bound. Every other usage owns a GL buffer object.
///
/// # Example
///
/// ```ignore
/// let desc = BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 1024);
/// let buffer = rhi.create_buffer(desc)?;
/// println!("Buffer size: {}", buffer.size());
/// ```
pub struct Buffer {
    id: u64,
    descriptor: BufferDescriptor,
    handle: AtomicU32,
    target: u32,
    access: Mutex<BufferAccess>,
    host: Option<Mutex<Vec<u8>>>,
    data_generation: AtomicU64,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl Buffer {
    /// Validate `descriptor` and allocate storage.
    ///
    /// The driver's context must be current unless the buffer is a uniform
    /// buffer.
    pub(crate) fn create(
        driver: &dyn GlDriver,
        descriptor: BufferDescriptor,
        release_queue: Arc<DeferredReleaseQueue>,
    ) -> Result<Self, GraphicsError> {
        let usage = descriptor.usage;
        if usage.is_empty() {
            log::warn!("Buffer: no usage flags set");
            return Err(GraphicsError::Validation("buffer has no usage".into()));
        }
        if usage.contains(BufferUsage::UNIFORM) && usage != BufferUsage::UNIFORM {
            log::warn!("Buffer: uniform buffers cannot combine usages ({usage:?})");
            return Err(GraphicsError::Validation(
                "uniform buffer cannot be combined with other usages".into(),
            ));
        }

        let mut buffer = Self {
            id: super::next_resource_id(),
            target: usage.gl_target(),
            descriptor,
            handle: AtomicU32::new(0),
            access: Mutex::new(BufferAccess::None),
            host: None,
            data_generation: AtomicU64::new(0),
            release_queue,
        };

        if usage == BufferUsage::UNIFORM {
            buffer.host = Some(Mutex::new(vec![0; buffer.descriptor.size as usize]));
            log::debug!(
                "Buffer: created host uniform buffer {:?} ({} bytes)",
                buffer.descriptor.label,
                buffer.descriptor.size
            );
            return Ok(buffer);
        }

        let handle = driver.create_buffer().map_err(|e| {
            log::error!("Buffer: glGenBuffers failed: {e}");
            GraphicsError::ResourceCreationFailed(e)
        })?;
        let hint = match buffer.descriptor.buffer_type {
            BufferType::Dynamic => glow::DYNAMIC_DRAW,
            BufferType::Immutable | BufferType::Static => glow::STATIC_DRAW,
        };
        // Zero-sized allocations get a one byte placeholder.
        let size = buffer.descriptor.size.max(1);
        driver.bind_buffer(buffer.target, handle);
        driver.buffer_data_size(buffer.target, size as i32, hint);
        buffer.handle.store(handle, Ordering::Release);

        log::debug!(
            "Buffer: created {:?} handle {} ({} bytes, {:?})",
            buffer.descriptor.label,
            handle,
            size,
            usage
        );
        Ok(buffer)
    }

    /// Process-unique identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u32 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Whether this is a host-side uniform buffer.
    pub fn is_uniform(&self) -> bool {
        self.host.is_some()
    }

    /// Raw GL name, `0` for uniform buffers and after `destroy()`.
    pub fn handle(&self) -> GlHandle {
        self.handle.load(Ordering::Acquire)
    }

    /// GL binding target used for uploads and readbacks.
    pub fn gl_target(&self) -> u32 {
        self.target
    }

    /// Counter bumped on every write to the host copy of a uniform buffer.
    pub fn data_generation(&self) -> u64 {
        self.data_generation.load(Ordering::Acquire)
    }

    /// Last recorded access.
    pub fn access(&self) -> BufferAccess {
        *self.access.lock()
    }

    pub(crate) fn swap_access(&self, access: BufferAccess) -> BufferAccess {
        std::mem::replace(&mut *self.access.lock(), access)
    }

    /// Write `data` at `offset` into the host copy, clipped to the buffer.
    ///
    /// Returns the number of bytes written; always zero for buffers without a
    /// host copy.
    pub(crate) fn write_host(&self, offset: u32, data: &[u8]) -> usize {
        let Some(host) = &self.host else {
            return 0;
        };
        let mut bytes = host.lock();
        let start = (offset as usize).min(bytes.len());
        let len = data.len().min(bytes.len() - start);
        bytes[start..start + len].copy_from_slice(&data[..len]);
        if len > 0 {
            self.data_generation.fetch_add(1, Ordering::AcqRel);
        }
        len
    }

    /// Copy `[offset, offset + len)` of the host copy, clipped to the buffer.
    pub(crate) fn read_host(&self, offset: u32, len: u32) -> Vec<u8> {
        let Some(host) = &self.host else {
            return Vec::new();
        };
        let bytes = host.lock();
        let start = (offset as usize).min(bytes.len());
        let end = start.saturating_add(len as usize).min(bytes.len());
        bytes[start..end].to_vec()
    }

    /// Run `f` over the whole host copy of a uniform buffer.
    pub(crate) fn with_host_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.host.as_ref().map(|host| f(&host.lock()))
    }

    /// Rewrite the whole buffer for the current frame.
    ///
    /// Uniform buffers hand `f` their host copy. Other buffers must be
    /// [`BufferType::Dynamic`]; `f` fills a staging copy which is written
    /// through a mapped range when the driver maps properly and through
    /// `glBufferSubData` otherwise. The context must be current.
    pub(crate) fn full_dynamic_update(
        &self,
        driver: &dyn GlDriver,
        caps: &Capabilities,
        f: impl FnOnce(&mut [u8]),
    ) -> Result<(), GraphicsError> {
        if let Some(host) = &self.host {
            f(&mut host.lock());
            self.data_generation.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }
        if self.descriptor.buffer_type != BufferType::Dynamic {
            log::warn!("Buffer: full dynamic update requires a dynamic buffer");
            return Err(GraphicsError::Validation(
                "full dynamic update on a non-dynamic buffer".into(),
            ));
        }
        let handle = self.handle();
        if handle == 0 {
            return Err(GraphicsError::Validation("buffer was destroyed".into()));
        }

        let mut staging = vec![0u8; self.descriptor.size as usize];
        f(&mut staging);
        driver.bind_buffer(self.target, handle);
        let mapped = caps.proper_map_buffer && driver.write_buffer_mapped(self.target, 0, &staging);
        if !mapped {
            driver.buffer_sub_data(self.target, 0, &staging);
        }
        self.swap_access(BufferAccess::Update);
        Ok(())
    }

    /// Queue the driver buffer for deletion. Safe to call more than once.
    pub fn destroy(&self) {
        let handle = self.handle.swap(0, Ordering::AcqRel);
        if handle != 0 {
            log::debug!("Buffer: queued handle {} for release", handle);
            self.release_queue.push(DeferredRelease::Buffer(handle));
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("handle", &self.handle())
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::caps::GlVersion;
    use crate::driver::DummyDriver;

    fn queue() -> Arc<DeferredReleaseQueue> {
        Arc::new(DeferredReleaseQueue::new())
    }

    #[test]
    fn test_uniform_buffer_is_host_only() {
        let driver = DummyDriver::new();
        let desc = BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, 64);
        let buffer = Buffer::create(&driver, desc, queue()).unwrap();
        assert!(buffer.is_uniform());
        assert_eq!(buffer.handle(), 0);
        assert_eq!(driver.live_buffers(), 0);
    }

    #[test]
    fn test_uniform_with_other_usage_fails() {
        let driver = DummyDriver::new();
        let desc = BufferDescriptor::new(
            BufferType::Dynamic,
            BufferUsage::UNIFORM | BufferUsage::VERTEX,
            64,
        );
        let err = Buffer::create(&driver, desc, queue()).unwrap_err();
        assert!(matches!(err, GraphicsError::Validation(_)));
        assert_eq!(driver.live_buffers(), 0);
    }

    #[test]
    fn test_zero_size_gets_placeholder() {
        let driver = DummyDriver::new();
        let desc = BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 0);
        let buffer = Buffer::create(&driver, desc, queue()).unwrap();
        assert_eq!(driver.buffer_contents(buffer.handle()).unwrap().len(), 1);
    }

    #[test]
    fn test_host_writes_are_clipped() {
        let driver = DummyDriver::new();
        let desc = BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, 8);
        let buffer = Buffer::create(&driver, desc, queue()).unwrap();
        let generation = buffer.data_generation();
        assert_eq!(buffer.write_host(6, &[1, 2, 3, 4]), 2);
        assert_eq!(buffer.read_host(4, 100), vec![0, 0, 1, 2]);
        assert_eq!(buffer.write_host(20, &[9]), 0);
        assert_eq!(buffer.data_generation(), generation + 1);
    }

    #[test]
    fn test_destroy_defers_deletion() {
        let driver = DummyDriver::new();
        let queue = queue();
        let desc = BufferDescriptor::new(BufferType::Static, BufferUsage::INDEX, 16);
        let buffer = Buffer::create(&driver, desc, queue.clone()).unwrap();
        let handle = buffer.handle();
        buffer.destroy();
        buffer.destroy();
        assert_eq!(buffer.handle(), 0);
        assert!(driver.is_buffer_alive(handle));
        assert_eq!(queue.len(), 1);
        drop(buffer);
        assert_eq!(queue.drain(&driver), 1);
        assert!(!driver.is_buffer_alive(handle));
    }

    #[test]
    fn test_full_dynamic_update_falls_back_to_sub_data() {
        let driver = DummyDriver::new();
        let caps = Capabilities::from_version(GlVersion::es(2, 0), &[]);
        let desc = BufferDescriptor::new(BufferType::Dynamic, BufferUsage::VERTEX, 4);
        let buffer = Buffer::create(&driver, desc, queue()).unwrap();
        buffer
            .full_dynamic_update(&driver, &caps, |bytes| bytes.copy_from_slice(&[1, 2, 3, 4]))
            .unwrap();
        assert_eq!(driver.buffer_contents(buffer.handle()).unwrap(), vec![1, 2, 3, 4]);

        let desc = BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 4);
        let fixed = Buffer::create(&driver, desc, queue()).unwrap();
        assert!(fixed.full_dynamic_update(&driver, &caps, |_| {}).is_err());
    }
}
