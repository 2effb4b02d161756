//! The backend context.
//!
//! [`GlRhi`] owns the driver, the platform context and everything that must
//! live exactly as long as them: the capability record, the deferred-release
//! queue, the shader and pipeline caches and the command executor.
//!
//! # Frame Lifecycle
//!
//! ```text
//!  begin_frame(swapchain)            end_frame(swapchain)
//!  ├─ ensure_context(surface)        ├─ ensure_context(surface)
//!  ├─ drain deferred releases        ├─ replay swapchain command buffer
//!  └─ reset command buffer           ├─ resolve multisample buffer
//!       │                            └─ swap buffers
//!       ▼
//!  record passes into swapchain.command_buffer_mut()
//! ```
//!
//! Offscreen frames follow the same bracket with their own command buffer
//! and without presenting. Once a context loss is seen every frame
//! operation returns [`FrameOpResult::DeviceLost`] without touching the
//! driver; the backend must be destroyed and created again.

use std::sync::Arc;

use redlilium_core::profiling::{frame_mark, profile_plot, profile_scope};

use crate::bindings::ShaderResourceBindings;
use crate::cache::{DiskShaderCache, PipelineBlobCache, ShaderBinaryCache, driver_id};
use crate::caps::{Capabilities, Feature, ResourceLimit};
use crate::command::{CommandBuffer, CommandExecutor, ExecutionStats};
use crate::config::{RhiParameters, SurfaceFormat};
use crate::driver::GlDriver;
use crate::error::{FrameOpResult, GraphicsError};
use crate::pipeline::{
    ComputePipeline, ComputePipelineDescriptor, GraphicsPipeline, GraphicsPipelineDescriptor,
    PipelineContext,
};
use crate::platform::{ContextProvider, Surface};
use crate::release::DeferredReleaseQueue;
use crate::resources::{
    Buffer, NativeTexture, RenderBuffer, RenderBufferDescriptor, Sampler, Texture,
    TextureRenderTarget, TextureRenderTargetDescriptor,
};
use crate::shader::ShaderCompileCache;
use crate::swapchain::{Swapchain, SwapchainDescriptor};
use crate::types::{BufferDescriptor, BufferUsage, SamplerDescriptor, TextureDescriptor};

/// Counters accumulated over the backend's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RhiStatistics {
    pub frames: u64,
    pub commands_executed: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub barriers: u64,
    pub readbacks: u64,
    pub deferred_releases: u64,
}

impl RhiStatistics {
    fn record(&mut self, stats: &ExecutionStats) {
        self.commands_executed += stats.commands;
        self.draws += stats.draws;
        self.dispatches += stats.dispatches;
        self.barriers += stats.barriers;
        self.readbacks += stats.readbacks;
    }
}

/// Which frame bracket is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Swapchain,
    Offscreen,
}

/// An OpenGL-family rendering backend instance.
///
/// # Example
///
/// ```ignore
/// let driver = DummyDriver::new();
/// let context = HeadlessContext::with_loss_flag(driver.loss_flag());
/// let mut rhi = GlRhi::create(RhiParameters::from_env(), Box::new(driver), Box::new(context), None)?;
///
/// let texture = rhi.create_texture(&TextureDescriptor::new_2d(256, 256, TextureFormat::Rgba8, TextureFlags::empty()))?;
/// let (result, mut cb) = rhi.begin_offscreen_frame();
/// // ... record ...
/// rhi.end_offscreen_frame(cb);
/// ```
pub struct GlRhi {
    params: RhiParameters,
    driver: Box<dyn GlDriver>,
    context: Box<dyn ContextProvider>,
    caps: Capabilities,
    release_queue: Arc<DeferredReleaseQueue>,
    executor: CommandExecutor,
    compile_cache: ShaderCompileCache,
    blob_cache: PipelineBlobCache,
    disk_cache: Option<DiskShaderCache>,
    /// Surface the context was last made current against; `Some(None)` is
    /// the offscreen fallback.
    current_surface: Option<Option<u64>>,
    device_lost: bool,
    destroyed: bool,
    frame_state: FrameState,
    offscreen_buffer: Option<CommandBuffer>,
    pipeline_generation: u64,
    statistics: RhiStatistics,
}

impl GlRhi {
    // ========================================================================
    // Creation
    // ========================================================================

    /// Make `context` current, detect capabilities and set up the caches.
    ///
    /// `surface` is the surface the context is first made current against;
    /// `None` uses the provider's offscreen fallback.
    pub fn create(
        params: RhiParameters,
        driver: Box<dyn GlDriver>,
        context: Box<dyn ContextProvider>,
        surface: Option<&dyn Surface>,
    ) -> Result<Self, GraphicsError> {
        profile_scope!("GlRhi::create");

        if let Err(e) = context.make_current(surface) {
            log::error!("GlRhi: failed to make the context current: {e}");
            return Err(GraphicsError::InitializationFailed(format!(
                "context could not be made current: {e}"
            )));
        }
        let caps = Capabilities::detect(driver.as_ref())?;
        log::info!(
            "GlRhi: {} ({}) on {} {}{}",
            caps.version_string,
            if caps.core_profile { "core" } else if caps.version.gles { "ES" } else { "compat" },
            caps.vendor,
            caps.renderer,
            params
                .label
                .as_deref()
                .map(|l| format!(" [{l}]"))
                .unwrap_or_default()
        );
        if params.surface_format == SurfaceFormat::Srgb8Alpha8 && !caps.srgb_write_control {
            log::warn!("GlRhi: sRGB surface requested but sRGB writes cannot be controlled");
        }

        let id = driver_id(&caps);
        let disk_cache = params.disk_cache_dir.as_ref().and_then(|dir| {
            if !caps.program_binary {
                log::info!("GlRhi: program binaries unsupported, disk shader cache disabled");
                return None;
            }
            match DiskShaderCache::new(dir, &id) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    log::warn!("GlRhi: disk shader cache at {} unusable: {e}", dir.display());
                    None
                }
            }
        });

        Ok(Self {
            compile_cache: ShaderCompileCache::new(params.shader_compile_cache_limit),
            blob_cache: PipelineBlobCache::new(id),
            disk_cache,
            params,
            driver,
            context,
            caps,
            release_queue: Arc::new(DeferredReleaseQueue::new()),
            executor: CommandExecutor::new(),
            current_surface: Some(surface.map(|s| s.id())),
            device_lost: false,
            destroyed: false,
            frame_state: FrameState::Idle,
            offscreen_buffer: None,
            pipeline_generation: 0,
            statistics: RhiStatistics::default(),
        })
    }

    /// Tear down executor objects and drain every pending release.
    ///
    /// Called by `Drop`; calling it earlier is allowed and makes the drop a
    /// no-op. Resources still alive afterwards only queue their handles.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if self.ensure_context(None) {
            self.executor.destroy(self.driver.as_ref());
            self.compile_cache.clear(&self.release_queue);
            let drained = self.release_queue.drain(self.driver.as_ref());
            self.statistics.deferred_releases += drained as u64;
            self.context.done_current();
        } else {
            self.executor.invalidate();
        }
        log::debug!("GlRhi: destroyed {:?}", self.params.label);
    }

    // ========================================================================
    // Context
    // ========================================================================

    /// Make the context current against `surface`, or the offscreen fallback.
    ///
    /// Returns `false` if that failed. A lost context marks the backend as
    /// lost for good.
    pub fn ensure_context(&mut self, surface: Option<&dyn Surface>) -> bool {
        if self.device_lost {
            return false;
        }
        let wanted = surface.map(|s| s.id());
        // Any surface will do for work that does not render to one.
        let already = match (self.current_surface, wanted) {
            (Some(_), None) => true,
            (Some(current), Some(_)) => current == wanted,
            (None, _) => false,
        };

        if !already {
            match self.context.make_current(surface) {
                Ok(()) => self.current_surface = Some(wanted),
                Err(GraphicsError::DeviceLost) => {
                    self.mark_lost();
                    return false;
                }
                Err(e) => {
                    log::warn!("GlRhi: make current failed: {e}");
                    self.current_surface = None;
                    return false;
                }
            }
        }
        if !self.context.is_valid() {
            self.mark_lost();
            return false;
        }
        true
    }

    fn mark_lost(&mut self) {
        if !self.device_lost {
            log::warn!("GlRhi: context lost");
        }
        self.device_lost = true;
        self.current_surface = None;
        self.executor.invalidate();
    }

    /// Whether a context loss was detected.
    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    fn require_context(&mut self) -> Result<(), GraphicsError> {
        if self.ensure_context(None) {
            Ok(())
        } else if self.device_lost {
            Err(GraphicsError::DeviceLost)
        } else {
            Err(GraphicsError::ContextNotCurrent)
        }
    }

    pub fn parameters(&self) -> &RhiParameters {
        &self.params
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn is_feature_supported(&self, feature: Feature) -> bool {
        self.caps.is_feature_supported(feature)
    }

    pub fn resource_limit(&self, limit: ResourceLimit) -> u32 {
        self.caps.resource_limit(limit)
    }

    pub fn release_queue(&self) -> &Arc<DeferredReleaseQueue> {
        &self.release_queue
    }

    pub fn statistics(&self) -> RhiStatistics {
        self.statistics
    }

    pub(crate) fn driver(&self) -> &dyn GlDriver {
        self.driver.as_ref()
    }

    pub(crate) fn context(&self) -> &dyn ContextProvider {
        self.context.as_ref()
    }

    fn debug_markers(&self) -> bool {
        self.params.debug_markers && self.caps.debug_markers
    }

    fn drain_releases(&mut self) {
        let drained = self.release_queue.drain(self.driver.as_ref());
        if drained > 0 {
            profile_plot!("deferred_releases", drained as f64);
            self.statistics.deferred_releases += drained as u64;
        }
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Create a swapchain for `surface`. Call
    /// [`Swapchain::create_or_resize`] before the first frame.
    pub fn create_swapchain(
        &self,
        surface: Arc<dyn Surface>,
        descriptor: SwapchainDescriptor,
    ) -> Swapchain {
        let descriptor = if self.params.surface_format == SurfaceFormat::Srgb8Alpha8 {
            descriptor.with_srgb(true)
        } else {
            descriptor
        };
        Swapchain::new(surface, descriptor, self.debug_markers())
    }

    fn context_failure(&self) -> FrameOpResult {
        if self.device_lost {
            FrameOpResult::DeviceLost
        } else {
            FrameOpResult::Error
        }
    }

    /// Start recording a frame for `swapchain`.
    pub fn begin_frame(&mut self, swapchain: &mut Swapchain) -> FrameOpResult {
        profile_scope!("begin_frame");
        if self.device_lost {
            return FrameOpResult::DeviceLost;
        }
        if self.frame_state != FrameState::Idle {
            log::warn!("GlRhi: begin_frame while a {:?} frame is open", self.frame_state);
            return FrameOpResult::Error;
        }
        if !swapchain.is_renderable() {
            return FrameOpResult::Error;
        }
        let surface = Arc::clone(swapchain.surface());
        if !self.ensure_context(Some(surface.as_ref())) {
            return self.context_failure();
        }
        self.drain_releases();

        let back_buffer = swapchain.back_buffer();
        let cb = swapchain.command_buffer_mut();
        cb.reset_commands();
        cb.set_back_buffer(Some(back_buffer));
        cb.mark_frame_begin(false);
        self.frame_state = FrameState::Swapchain;
        FrameOpResult::Success
    }

    /// Replay the frame recorded for `swapchain` and present it.
    pub fn end_frame(&mut self, swapchain: &mut Swapchain) -> FrameOpResult {
        profile_scope!("end_frame");
        if self.device_lost {
            self.frame_state = FrameState::Idle;
            return FrameOpResult::DeviceLost;
        }
        if self.frame_state != FrameState::Swapchain {
            log::warn!("GlRhi: end_frame without begin_frame");
            return FrameOpResult::Error;
        }
        self.frame_state = FrameState::Idle;

        let (surface, cb) = swapchain.parts_mut();
        if !self.ensure_context(Some(surface)) {
            return self.context_failure();
        }
        cb.mark_frame_end();
        let stats = self.executor.execute(self.driver.as_ref(), &self.caps, cb);
        self.statistics.record(&stats);

        swapchain.resolve(self.driver.as_ref());
        match self.context.swap_buffers(swapchain.surface().as_ref()) {
            Ok(()) => {}
            Err(GraphicsError::DeviceLost) => {
                self.mark_lost();
                return FrameOpResult::DeviceLost;
            }
            Err(e) => {
                log::warn!("GlRhi: swap buffers failed: {e}");
                return FrameOpResult::Error;
            }
        }
        swapchain.frame_presented();
        self.statistics.frames += 1;
        frame_mark!();
        FrameOpResult::Success
    }

    /// Start an offscreen frame.
    ///
    /// The returned buffer is only meaningful with `Success`; hand it back
    /// through [`end_offscreen_frame`](Self::end_offscreen_frame).
    pub fn begin_offscreen_frame(&mut self) -> (FrameOpResult, CommandBuffer) {
        profile_scope!("begin_offscreen_frame");
        let mut cb = self
            .offscreen_buffer
            .take()
            .unwrap_or_else(|| CommandBuffer::new().with_debug_markers(self.debug_markers()));
        if self.device_lost {
            return (FrameOpResult::DeviceLost, cb);
        }
        if self.frame_state != FrameState::Idle {
            log::warn!(
                "GlRhi: begin_offscreen_frame while a {:?} frame is open",
                self.frame_state
            );
            return (FrameOpResult::Error, cb);
        }
        if !self.ensure_context(None) {
            return (self.context_failure(), cb);
        }
        self.drain_releases();

        cb.reset_commands();
        cb.set_back_buffer(None);
        cb.mark_frame_begin(true);
        self.frame_state = FrameState::Offscreen;
        (FrameOpResult::Success, cb)
    }

    /// Replay an offscreen frame. Readback callbacks have run when this
    /// returns `Success`.
    pub fn end_offscreen_frame(&mut self, mut cb: CommandBuffer) -> FrameOpResult {
        profile_scope!("end_offscreen_frame");
        if self.device_lost {
            self.frame_state = FrameState::Idle;
            return FrameOpResult::DeviceLost;
        }
        if self.frame_state != FrameState::Offscreen {
            log::warn!("GlRhi: end_offscreen_frame without begin_offscreen_frame");
            return FrameOpResult::Error;
        }
        self.frame_state = FrameState::Idle;
        if !self.ensure_context(None) {
            return self.context_failure();
        }

        cb.mark_frame_end();
        let stats = self.executor.execute(self.driver.as_ref(), &self.caps, &mut cb);
        self.statistics.record(&stats);
        self.driver.flush();
        cb.reset_commands();
        self.offscreen_buffer = Some(cb);
        FrameOpResult::Success
    }

    /// Wait for the driver and drain pending releases. Only valid outside
    /// a frame.
    pub fn finish(&mut self) -> FrameOpResult {
        if self.device_lost {
            return FrameOpResult::DeviceLost;
        }
        if self.frame_state != FrameState::Idle {
            log::warn!("GlRhi: finish inside a {:?} frame", self.frame_state);
            return FrameOpResult::Error;
        }
        if !self.ensure_context(None) {
            return self.context_failure();
        }
        self.driver.finish();
        self.drain_releases();
        FrameOpResult::Success
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Create a buffer. Uniform buffers are host memory only and need no
    /// current context.
    pub fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        if !descriptor.usage.contains(BufferUsage::UNIFORM) {
            self.require_context()?;
        }
        let buffer = Buffer::create(
            self.driver.as_ref(),
            descriptor.clone(),
            Arc::clone(&self.release_queue),
        )?;
        Ok(Arc::new(buffer))
    }

    /// Rewrite all of `buffer` for the current frame.
    pub fn with_full_dynamic_buffer_update(
        &mut self,
        buffer: &Buffer,
        f: impl FnOnce(&mut [u8]),
    ) -> Result<(), GraphicsError> {
        if !buffer.is_uniform() {
            self.require_context()?;
        }
        buffer.full_dynamic_update(self.driver.as_ref(), &self.caps, f)
    }

    /// Validate and allocate a texture.
    ///
    /// Validation runs before any driver call, so a rejected descriptor
    /// leaves no handle behind.
    pub fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let plan = Texture::prepare_create(descriptor, &self.caps)?;
        self.require_context()?;
        let texture = Texture::create(
            self.driver.as_ref(),
            descriptor.clone(),
            plan,
            Arc::clone(&self.release_queue),
        )?;
        Ok(Arc::new(texture))
    }

    /// Wrap a texture created outside the backend. It is never deleted here.
    pub fn import_texture(
        &self,
        native: NativeTexture,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let plan = Texture::prepare_create(descriptor, &self.caps)?;
        let texture = Texture::create_from(
            native,
            descriptor.clone(),
            plan,
            Arc::clone(&self.release_queue),
        )?;
        Ok(Arc::new(texture))
    }

    /// Samplers are plain state and always succeed.
    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Arc<Sampler> {
        Arc::new(Sampler::new(descriptor.clone()))
    }

    pub fn create_renderbuffer(
        &mut self,
        descriptor: &RenderBufferDescriptor,
    ) -> Result<Arc<RenderBuffer>, GraphicsError> {
        self.require_context()?;
        let renderbuffer = RenderBuffer::create(
            self.driver.as_ref(),
            &self.caps,
            descriptor.clone(),
            Arc::clone(&self.release_queue),
        )?;
        Ok(Arc::new(renderbuffer))
    }

    pub fn create_texture_render_target(
        &mut self,
        descriptor: TextureRenderTargetDescriptor,
    ) -> Result<Arc<TextureRenderTarget>, GraphicsError> {
        self.require_context()?;
        let target = TextureRenderTarget::create(
            self.driver.as_ref(),
            &self.caps,
            descriptor,
            Arc::clone(&self.release_queue),
        )?;
        Ok(Arc::new(target))
    }

    /// An empty binding table; fill it and call
    /// [`create`](ShaderResourceBindings::create).
    pub fn new_shader_resource_bindings(&self) -> ShaderResourceBindings {
        ShaderResourceBindings::new()
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    fn pipeline_context(&mut self) -> PipelineContext<'_> {
        self.pipeline_generation += 1;
        PipelineContext {
            driver: self.driver.as_ref(),
            caps: &self.caps,
            compile_cache: &mut self.compile_cache,
            blob_cache: &mut self.blob_cache,
            disk_cache: self.disk_cache.as_ref().map(|c| c as &dyn ShaderBinaryCache),
            save_to_blob_cache: self.params.pipeline_cache_save,
            release_queue: &self.release_queue,
            generation: self.pipeline_generation,
        }
    }

    pub fn create_graphics_pipeline(
        &mut self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<Arc<GraphicsPipeline>, GraphicsError> {
        self.require_context()?;
        let mut ctx = self.pipeline_context();
        let pipeline = GraphicsPipeline::create(&mut ctx, descriptor)?;
        Ok(Arc::new(pipeline))
    }

    pub fn create_compute_pipeline(
        &mut self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<Arc<ComputePipeline>, GraphicsError> {
        if !self.caps.compute {
            log::warn!("GlRhi: compute pipelines are not supported by this context");
            return Err(GraphicsError::FeatureNotSupported("compute".into()));
        }
        self.require_context()?;
        let mut ctx = self.pipeline_context();
        let pipeline = ComputePipeline::create(&mut ctx, descriptor)?;
        Ok(Arc::new(pipeline))
    }

    /// Serialize the pipeline blob cache.
    pub fn pipeline_cache_data(&self) -> Vec<u8> {
        self.blob_cache.export()
    }

    /// Load a blob produced by [`pipeline_cache_data`](Self::pipeline_cache_data).
    ///
    /// A blob from another driver, build or format version is rejected as a
    /// whole. Returns the number of programs loaded.
    pub fn set_pipeline_cache_data(&mut self, data: &[u8]) -> usize {
        match self.blob_cache.import(data) {
            Ok(count) => {
                log::debug!("GlRhi: loaded {count} cached programs");
                count
            }
            Err(e) => {
                log::warn!("GlRhi: pipeline cache data rejected: {e}");
                0
            }
        }
    }
}

impl Drop for GlRhi {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for GlRhi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlRhi")
            .field("label", &self.params.label)
            .field("version", &self.caps.version)
            .field("device_lost", &self.device_lost)
            .field("frame_state", &self.frame_state)
            .field("pending_releases", &self.release_queue.len())
            .finish()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::driver::dummy::{DummyDriver, DummyProfile};
    use crate::platform::{HeadlessContext, HeadlessSurface};
    use crate::types::{BufferType, TextureFlags, TextureFormat};

    fn create(profile: DummyProfile) -> (GlRhi, Arc<std::sync::atomic::AtomicBool>) {
        let driver = DummyDriver::with_profile(profile);
        let loss = driver.loss_flag();
        let context = HeadlessContext::with_loss_flag(Arc::clone(&loss));
        let rhi = GlRhi::create(RhiParameters::new(), Box::new(driver), Box::new(context), None)
            .unwrap();
        (rhi, loss)
    }

    #[test]
    fn test_create_fails_on_lost_context() {
        let driver = DummyDriver::new();
        let context = HeadlessContext::new();
        context.lose();
        let result = GlRhi::create(RhiParameters::new(), Box::new(driver), Box::new(context), None);
        assert!(matches!(result, Err(GraphicsError::InitializationFailed(_))));
    }

    #[test]
    fn test_offscreen_frame_round_trip() {
        let (mut rhi, _) = create(DummyProfile::gles30());
        let (result, cb) = rhi.begin_offscreen_frame();
        assert_eq!(result, FrameOpResult::Success);
        assert_eq!(rhi.end_offscreen_frame(cb), FrameOpResult::Success);
        assert_eq!(rhi.statistics().commands_executed, 2);
    }

    #[test]
    fn test_nested_frames_are_rejected() {
        let (mut rhi, _) = create(DummyProfile::gles30());
        let (_, cb) = rhi.begin_offscreen_frame();
        let (result, _) = rhi.begin_offscreen_frame();
        assert_eq!(result, FrameOpResult::Error);
        assert_eq!(rhi.finish(), FrameOpResult::Error);
        assert_eq!(rhi.end_offscreen_frame(cb), FrameOpResult::Success);
        assert_eq!(rhi.finish(), FrameOpResult::Success);
    }

    #[test]
    fn test_loss_is_sticky() {
        let (mut rhi, loss) = create(DummyProfile::gles30());
        let surface = Arc::new(HeadlessSurface::new(16, 16));
        let mut swapchain = rhi.create_swapchain(surface, SwapchainDescriptor::new());
        swapchain.create_or_resize(&mut rhi).unwrap();

        assert_eq!(rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
        loss.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(rhi.end_frame(&mut swapchain), FrameOpResult::DeviceLost);
        assert!(rhi.is_device_lost());
        assert_eq!(rhi.begin_frame(&mut swapchain), FrameOpResult::DeviceLost);
        assert_eq!(rhi.begin_offscreen_frame().0, FrameOpResult::DeviceLost);
        assert!(matches!(
            rhi.create_texture(&TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8, TextureFlags::empty())),
            Err(GraphicsError::DeviceLost)
        ));
    }

    #[test]
    fn test_uniform_buffer_needs_no_context() {
        let (mut rhi, loss) = create(DummyProfile::gles20());
        loss.store(true, std::sync::atomic::Ordering::SeqCst);
        let buffer = rhi.create_buffer(&BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, 64));
        assert!(buffer.is_ok());
        assert!(!rhi.is_device_lost());
    }
}
