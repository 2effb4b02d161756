//! Windowing-system seam.
//!
//! The backend does not create windows or talk to a windowing system. It is
//! given a [`ContextProvider`] that can make its GL context current against a
//! [`Surface`] (or an offscreen fallback), and surfaces that report their
//! pixel size.
//!
//! # Available Providers
//!
//! - [`HeadlessContext`]: no real context; pairs with the dummy driver and
//!   shares its context-loss flag
//! - [`EglContext`] (feature `egl`): a headless pbuffer GLES 3 context

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::driver::GlHandle;
use crate::error::GraphicsError;

/// A drawable the backend can present to.
pub trait Surface: Send + Sync {
    /// Stable identity, used to notice when a swapchain changes surfaces.
    fn id(&self) -> u64;

    /// Current size in physical pixels.
    fn pixel_size(&self) -> (u32, u32);

    /// Physical pixels per logical pixel.
    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }
}

/// Makes a GL context current on the calling thread.
///
/// Implementations report a lost context as [`GraphicsError::DeviceLost`];
/// any other failure is recoverable.
pub trait ContextProvider: Send {
    /// Make the context current against `surface`, or an offscreen fallback
    /// when `None`.
    fn make_current(&self, surface: Option<&dyn Surface>) -> Result<(), GraphicsError>;

    /// Release the context from the calling thread.
    fn done_current(&self);

    /// Present the back buffer of `surface`.
    fn swap_buffers(&self, surface: &dyn Surface) -> Result<(), GraphicsError>;

    /// Whether the context still exists.
    fn is_valid(&self) -> bool;

    /// The framebuffer object that renders to `surface`.
    fn default_framebuffer(&self, _surface: &dyn Surface) -> GlHandle {
        0
    }
}

// ============================================================================
// Headless
// ============================================================================

/// Context provider without a real context.
///
/// It is always current. Its lost state can be shared with a driver so a
/// simulated loss is seen both by [`GlRhi::ensure_context`](crate::GlRhi::ensure_context)
/// and by the driver.
///
/// # Example
///
/// ```ignore
/// let driver = DummyDriver::new();
/// let context = HeadlessContext::with_loss_flag(driver.loss_flag());
/// driver.lose_context();
/// assert!(!context.is_valid());
/// ```
#[derive(Debug, Default)]
pub struct HeadlessContext {
    lost: Arc<AtomicBool>,
    make_current_calls: AtomicU64,
    swaps: AtomicU64,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `lost` as this context's loss flag.
    pub fn with_loss_flag(lost: Arc<AtomicBool>) -> Self {
        Self {
            lost,
            ..Default::default()
        }
    }

    /// Simulate a context loss.
    pub fn lose(&self) {
        log::trace!("HeadlessContext: context lost");
        self.lost.store(true, Ordering::SeqCst);
    }

    /// Number of `make_current` calls so far.
    pub fn make_current_calls(&self) -> u64 {
        self.make_current_calls.load(Ordering::Relaxed)
    }

    /// Number of presented frames.
    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }
}

impl ContextProvider for HeadlessContext {
    fn make_current(&self, _surface: Option<&dyn Surface>) -> Result<(), GraphicsError> {
        self.make_current_calls.fetch_add(1, Ordering::Relaxed);
        if self.lost.load(Ordering::SeqCst) {
            return Err(GraphicsError::DeviceLost);
        }
        Ok(())
    }

    fn done_current(&self) {}

    fn swap_buffers(&self, _surface: &dyn Surface) -> Result<(), GraphicsError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(GraphicsError::DeviceLost);
        }
        self.swaps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.lost.load(Ordering::SeqCst)
    }
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// A surface with a settable size and no window behind it.
#[derive(Debug)]
pub struct HeadlessSurface {
    id: u64,
    size: Mutex<(u32, u32)>,
    device_pixel_ratio: f32,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            size: Mutex::new((width, height)),
            device_pixel_ratio: 1.0,
        }
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    /// Change the reported size, as a window resize would.
    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = (width, height);
    }
}

impl Surface for HeadlessSurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn pixel_size(&self) -> (u32, u32) {
        *self.size.lock()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }
}

// Ensure the headless types can be shared with a render thread
static_assertions::assert_impl_all!(HeadlessContext: Send, Sync);
static_assertions::assert_impl_all!(HeadlessSurface: Send, Sync);

// ============================================================================
// EGL
// ============================================================================

#[cfg(all(feature = "egl", not(target_arch = "wasm32")))]
pub use egl_context::EglContext;

#[cfg(all(feature = "egl", not(target_arch = "wasm32")))]
mod egl_context {
    use khronos_egl as egl;

    use super::{ContextProvider, Surface};
    use crate::driver::GlowDriver;
    use crate::error::GraphicsError;

    type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

    const OPENGL_ES3_BIT: egl::Int = 0x0040;

    /// A headless GLES 3 context on an EGL pbuffer.
    ///
    /// The pbuffer is the offscreen fallback surface; presenting is a no-op
    /// apart from `eglSwapBuffers` on it.
    pub struct EglContext {
        egl: EglInstance,
        display: egl::Display,
        surface: egl::Surface,
        context: egl::Context,
    }

    impl EglContext {
        /// Load libEGL and create a `width`x`height` pbuffer context.
        pub fn new(width: u32, height: u32) -> Result<Self, GraphicsError> {
            let fail = |what: &str, e: &dyn std::fmt::Display| {
                log::error!("EglContext: {what}: {e}");
                GraphicsError::InitializationFailed(format!("{what}: {e}"))
            };

            let egl = unsafe { EglInstance::load_required() }
                .map_err(|e| fail("failed to load libEGL", &e))?;
            let display = unsafe { egl.get_display(egl::DEFAULT_DISPLAY) }
                .ok_or_else(|| fail("no EGL display", &"eglGetDisplay returned nothing"))?;
            let (major, minor) = egl
                .initialize(display)
                .map_err(|e| fail("eglInitialize failed", &e))?;
            egl.bind_api(egl::OPENGL_ES_API)
                .map_err(|e| fail("eglBindAPI failed", &e))?;

            let config_attribs = [
                egl::SURFACE_TYPE,
                egl::PBUFFER_BIT,
                egl::RENDERABLE_TYPE,
                OPENGL_ES3_BIT,
                egl::RED_SIZE,
                8,
                egl::GREEN_SIZE,
                8,
                egl::BLUE_SIZE,
                8,
                egl::ALPHA_SIZE,
                8,
                egl::DEPTH_SIZE,
                24,
                egl::STENCIL_SIZE,
                8,
                egl::NONE,
            ];
            let config = egl
                .choose_first_config(display, &config_attribs)
                .map_err(|e| fail("eglChooseConfig failed", &e))?
                .ok_or_else(|| fail("no matching EGL config", &"GLES 3 pbuffer"))?;

            let surface_attribs = [
                egl::WIDTH,
                width.max(1) as egl::Int,
                egl::HEIGHT,
                height.max(1) as egl::Int,
                egl::NONE,
            ];
            let surface = egl
                .create_pbuffer_surface(display, config, &surface_attribs)
                .map_err(|e| fail("eglCreatePbufferSurface failed", &e))?;
            let context_attribs = [egl::CONTEXT_CLIENT_VERSION, 3, egl::NONE];
            let context = match egl.create_context(display, config, None, &context_attribs) {
                Ok(context) => context,
                Err(e) => {
                    let _ = egl.destroy_surface(display, surface);
                    return Err(fail("eglCreateContext failed", &e));
                }
            };

            log::info!("EglContext: EGL {major}.{minor}, {width}x{height} pbuffer");
            Ok(Self {
                egl,
                display,
                surface,
                context,
            })
        }

        /// Load GL entry points for this context. It must be current.
        pub fn create_driver(&self) -> GlowDriver {
            unsafe {
                GlowDriver::from_loader_function(|name| {
                    self.egl
                        .get_proc_address(name)
                        .map_or(std::ptr::null(), |f| f as *const std::os::raw::c_void)
                })
            }
        }
    }

    impl ContextProvider for EglContext {
        fn make_current(&self, _surface: Option<&dyn Surface>) -> Result<(), GraphicsError> {
            match self.egl.make_current(
                self.display,
                Some(self.surface),
                Some(self.surface),
                Some(self.context),
            ) {
                Ok(()) => Ok(()),
                Err(egl::Error::ContextLost) => Err(GraphicsError::DeviceLost),
                Err(e) => {
                    log::warn!("EglContext: eglMakeCurrent failed: {e}");
                    Err(GraphicsError::ContextNotCurrent)
                }
            }
        }

        fn done_current(&self) {
            let _ = self.egl.make_current(self.display, None, None, None);
        }

        fn swap_buffers(&self, _surface: &dyn Surface) -> Result<(), GraphicsError> {
            match self.egl.swap_buffers(self.display, self.surface) {
                Ok(()) => Ok(()),
                Err(egl::Error::ContextLost) => Err(GraphicsError::DeviceLost),
                Err(e) => {
                    log::warn!("EglContext: eglSwapBuffers failed: {e}");
                    Err(GraphicsError::Internal(e.to_string()))
                }
            }
        }

        fn is_valid(&self) -> bool {
            !matches!(self.egl.get_error(), Some(egl::Error::ContextLost))
        }
    }

    impl Drop for EglContext {
        fn drop(&mut self) {
            let _ = self.egl.make_current(self.display, None, None, None);
            let _ = self.egl.destroy_context(self.display, self.context);
            let _ = self.egl.destroy_surface(self.display, self.surface);
            let _ = self.egl.terminate(self.display);
        }
    }

    impl std::fmt::Debug for EglContext {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("EglContext").finish_non_exhaustive()
        }
    }

    // SAFETY: the handles are plain EGL names; a context is only used by the
    // thread that made it current, which ensure_context serializes.
    unsafe impl Send for EglContext {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_loss_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let context = HeadlessContext::with_loss_flag(Arc::clone(&flag));
        assert!(context.make_current(None).is_ok());
        assert!(context.is_valid());

        flag.store(true, Ordering::SeqCst);
        assert!(!context.is_valid());
        assert_eq!(context.make_current(None), Err(GraphicsError::DeviceLost));
        assert_eq!(context.make_current_calls(), 2);
    }

    #[test]
    fn test_headless_surface_resize() {
        let surface = HeadlessSurface::new(64, 32).with_device_pixel_ratio(2.0);
        assert_eq!(surface.pixel_size(), (64, 32));
        surface.resize(128, 64);
        assert_eq!(surface.pixel_size(), (128, 64));
        assert_eq!(surface.device_pixel_ratio(), 2.0);
        assert_ne!(surface.id(), HeadlessSurface::new(1, 1).id());
    }

    #[test]
    fn test_swap_counts_frames() {
        let context = HeadlessContext::new();
        let surface = HeadlessSurface::new(8, 8);
        context.swap_buffers(&surface).unwrap();
        context.swap_buffers(&surface).unwrap();
        assert_eq!(context.swap_count(), 2);
        context.lose();
        assert!(context.swap_buffers(&surface).is_err());
        assert_eq!(context.swap_count(), 2);
    }
}
