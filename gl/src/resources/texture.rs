//! GPU texture resource.
//!
//! Creation is split in two. [`Texture::prepare_create`] is pure: it checks
//! the flag combination and the capability record and resolves the GL target
//! and format tuple into a [`TexturePlan`]. Only then does
//! [`GlRhi::create_texture`](crate::GlRhi::create_texture) allocate a GL name
//! and storage. Compressed textures stop after the name: their storage is
//! specified by the first upload, which has to carry real bytes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle};
use crate::error::GraphicsError;
use crate::release::{DeferredRelease, DeferredReleaseQueue};
use crate::tracker::TextureAccess;
use crate::types::{GlFormat, TextureDescriptor, TextureFlags, TextureFormat, mip_size};

/// `GL_TEXTURE_EXTERNAL_OES`.
pub(crate) const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// Resolved GL parameters of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturePlan {
    /// Bind target (`GL_TEXTURE_2D`, `GL_TEXTURE_CUBE_MAP`, ...).
    pub target: u32,
    pub format: GlFormat,
    pub width: u32,
    pub height: u32,
    /// Depth of 3D textures, layer count of arrays, 6 for cube maps, 1 otherwise.
    pub layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    /// Allocated with `glTexStorage*`.
    pub immutable_storage: bool,
    pub compressed: bool,
}

impl TexturePlan {
    /// Whether the target addresses layers through a z coordinate.
    pub fn is_layered(&self) -> bool {
        matches!(
            self.target,
            glow::TEXTURE_3D | glow::TEXTURE_2D_ARRAY | glow::TEXTURE_CUBE_MAP_ARRAY
        )
    }

    pub fn is_cube(&self) -> bool {
        self.target == glow::TEXTURE_CUBE_MAP
    }

    /// Target of per-face image calls: the face target for cube maps.
    pub fn face_target(&self, layer: u32) -> u32 {
        if self.is_cube() {
            glow::TEXTURE_CUBE_MAP_POSITIVE_X + layer.min(5)
        } else {
            self.target
        }
    }

    /// Size of mip `level`.
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        mip_size(self.width, self.height, level)
    }

    /// Depth (or layer count) of mip `level`; only 3D textures shrink.
    pub fn level_layers(&self, level: u32) -> u32 {
        if self.target == glow::TEXTURE_3D {
            (self.layers >> level).max(1)
        } else {
            self.layers
        }
    }
}

/// A texture handle created outside this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeTexture {
    pub object: GlHandle,
}

#[derive(Debug, Default)]
struct TextureState {
    access: TextureAccess,
    specified: bool,
    /// Bit `n` set once compressed level `n` has backing storage.
    compressed_levels_built: u32,
}

/// A GPU texture resource.
///
/// Textures are created by [`GlRhi::create_texture`](crate::GlRhi::create_texture)
/// or imported with [`GlRhi::import_texture`](crate::GlRhi::import_texture),
/// and are reference-counted.
///
/// # Example
///
/// ```ignore
/// let texture = rhi.create_texture(TextureDescriptor::new_2d(
///     256, 256,
///     TextureFormat::Rgba8,
///     TextureFlags::empty(),
/// ))?;
/// println!("Texture size: {:?}", texture.pixel_size());
/// ```
pub struct Texture {
    id: u64,
    descriptor: TextureDescriptor,
    plan: TexturePlan,
    handle: AtomicU32,
    owns_handle: bool,
    state: Mutex<TextureState>,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl Texture {
    /// Validate `desc` against the flag invariants and `caps`.
    ///
    /// Pure: no driver calls are made, so a failure leaves nothing behind.
    pub fn prepare_create(
        desc: &TextureDescriptor,
        caps: &Capabilities,
    ) -> Result<TexturePlan, GraphicsError> {
        let flags = desc.flags;
        let is_cube = flags.contains(TextureFlags::CUBE_MAP);
        let is_3d = flags.contains(TextureFlags::THREE_DIMENSIONAL);
        let is_1d = flags.contains(TextureFlags::ONE_DIMENSIONAL);
        let is_array = flags.contains(TextureFlags::TEXTURE_ARRAY);
        let is_external = flags.contains(TextureFlags::EXTERNAL_OES);
        let is_rect = flags.contains(TextureFlags::TEXTURE_RECTANGLE_GL);
        let multisample = desc.sample_count > 1;

        let invalid = |msg: String| {
            log::warn!("Texture: {} ({:?})", msg, desc.label);
            Err(GraphicsError::Validation(msg))
        };
        let unsupported = |what: &str| {
            log::warn!("Texture: {} not supported by this context ({:?})", what, desc.label);
            Err(GraphicsError::FeatureNotSupported(what.to_string()))
        };

        if is_cube && is_3d {
            return invalid("texture cannot be both cube and 3D".into());
        }
        if is_cube && is_1d {
            return invalid("texture cannot be both cube and 1D".into());
        }
        if is_3d && is_1d {
            return invalid("texture cannot be both 3D and 1D".into());
        }
        if is_array && is_3d {
            return invalid("texture cannot be both array and 3D".into());
        }
        if desc.depth > 1 && !is_3d {
            return invalid(format!("depth {} requires the 3D flag", desc.depth));
        }
        if (desc.array_size >= 1) != is_array {
            return invalid(format!(
                "array size {} does not match the array flag",
                desc.array_size
            ));
        }
        if multisample
            && (is_cube || is_3d || is_1d || flags.contains(TextureFlags::MIP_MAPPED))
        {
            return invalid("multisample textures must be single-level 2D".into());
        }

        if is_3d && !caps.texture_3d {
            return unsupported("3D textures");
        }
        if is_1d && !caps.texture_1d {
            return unsupported("1D textures");
        }
        if is_array && !caps.texture_arrays {
            return unsupported("array textures");
        }
        if is_array && is_cube && !cube_arrays_supported(caps) {
            return unsupported("cube map arrays");
        }
        if is_array && multisample {
            return unsupported("multisample array textures");
        }
        if multisample && !caps.multisample_texture {
            return unsupported("multisample textures");
        }
        if is_external && !caps.texture_external_oes {
            return unsupported("external OES textures");
        }
        if is_rect && !caps.texture_rectangle {
            return unsupported("rectangle textures");
        }
        if desc.format.is_depth() && !caps.depth_texture {
            return unsupported("depth textures");
        }
        let immutable_storage = flags.contains(TextureFlags::USED_WITH_LOAD_STORE) || multisample;
        if immutable_storage && !caps.texture_storage {
            return unsupported("immutable texture storage");
        }
        if immutable_storage && is_1d {
            return unsupported("load/store 1D textures");
        }

        let Some(format) = desc.format.gl_format(flags.contains(TextureFlags::SRGB), caps) else {
            return unsupported(&format!("texture format {:?}", desc.format));
        };

        let max = caps.max_texture_size;
        if max > 0 && (desc.width > max || desc.height > max) {
            return invalid(format!(
                "size {}x{} exceeds the maximum texture size {}",
                desc.width, desc.height, max
            ));
        }

        let target = if is_external {
            TEXTURE_EXTERNAL_OES
        } else if multisample {
            glow::TEXTURE_2D_MULTISAMPLE
        } else if is_cube && is_array {
            glow::TEXTURE_CUBE_MAP_ARRAY
        } else if is_cube {
            glow::TEXTURE_CUBE_MAP
        } else if is_3d {
            glow::TEXTURE_3D
        } else if is_1d && is_array {
            glow::TEXTURE_1D_ARRAY
        } else if is_1d {
            glow::TEXTURE_1D
        } else if is_array {
            glow::TEXTURE_2D_ARRAY
        } else if is_rect {
            glow::TEXTURE_RECTANGLE
        } else {
            glow::TEXTURE_2D
        };

        let layers = if is_cube && is_array {
            6 * desc.array_size
        } else {
            desc.layer_count()
        };
        let sample_count = if caps.max_samples > 0 {
            desc.sample_count.clamp(1, caps.max_samples)
        } else {
            desc.sample_count.max(1)
        };

        Ok(TexturePlan {
            target,
            format,
            width: desc.width.max(1),
            height: if is_1d && !is_array { 1 } else { desc.height.max(1) },
            layers,
            mip_levels: desc.mip_level_count(),
            sample_count,
            immutable_storage,
            compressed: desc.format.is_compressed(),
        })
    }

    /// Allocate a GL texture for a validated plan.
    ///
    /// The context must be current. Nothing is leaked on failure.
    pub(crate) fn create(
        driver: &dyn GlDriver,
        descriptor: TextureDescriptor,
        plan: TexturePlan,
        release_queue: Arc<DeferredReleaseQueue>,
    ) -> Result<Self, GraphicsError> {
        let handle = driver.create_texture().map_err(|e| {
            log::error!("Texture: glGenTextures failed: {e}");
            GraphicsError::ResourceCreationFailed(e)
        })?;
        // Drop stale errors so the check below only sees this allocation.
        let _ = driver.get_error();
        driver.bind_texture(plan.target, handle);

        let specified = allocate_storage(driver, &plan);
        let error = driver.get_error();
        if error != glow::NO_ERROR {
            log::error!(
                "Texture: storage allocation for {:?} failed with 0x{:04X}",
                descriptor.label,
                error
            );
            driver.delete_texture(handle);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture storage allocation failed (0x{error:04X})"
            )));
        }

        log::debug!(
            "Texture: created {:?} handle {} ({}x{}x{} {:?}, {} levels{})",
            descriptor.label,
            handle,
            plan.width,
            plan.height,
            plan.layers,
            descriptor.format,
            plan.mip_levels,
            if specified { "" } else { ", deferred" }
        );
        Ok(Self {
            id: super::next_resource_id(),
            descriptor,
            plan,
            handle: AtomicU32::new(handle),
            owns_handle: true,
            state: Mutex::new(TextureState {
                specified,
                ..Default::default()
            }),
            release_queue,
        })
    }

    /// Wrap a foreign texture handle. The texture is never deleted by this
    /// backend.
    pub(crate) fn create_from(
        native: NativeTexture,
        descriptor: TextureDescriptor,
        plan: TexturePlan,
        release_queue: Arc<DeferredReleaseQueue>,
    ) -> Result<Self, GraphicsError> {
        if native.object == 0 {
            return Err(GraphicsError::Validation(
                "cannot import the null texture".into(),
            ));
        }
        log::debug!("Texture: imported handle {}", native.object);
        Ok(Self {
            id: super::next_resource_id(),
            descriptor,
            plan,
            handle: AtomicU32::new(native.object),
            owns_handle: false,
            state: Mutex::new(TextureState {
                specified: true,
                ..Default::default()
            }),
            release_queue,
        })
    }

    /// Process-unique identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn plan(&self) -> &TexturePlan {
        &self.plan
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    pub fn flags(&self) -> TextureFlags {
        self.descriptor.flags
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Raw GL name, `0` after `destroy()`.
    pub fn handle(&self) -> GlHandle {
        self.handle.load(Ordering::Acquire)
    }

    pub fn target(&self) -> u32 {
        self.plan.target
    }

    /// Size of the base level in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.plan.width, self.plan.height)
    }

    pub fn mip_levels(&self) -> u32 {
        self.plan.mip_levels
    }

    pub fn sample_count(&self) -> u32 {
        self.plan.sample_count
    }

    /// Whether this texture owns its handle.
    pub fn owns_handle(&self) -> bool {
        self.owns_handle
    }

    /// Whether storage has been specified.
    pub fn is_specified(&self) -> bool {
        self.state.lock().specified
    }

    pub(crate) fn mark_specified(&self) {
        self.state.lock().specified = true;
    }

    pub(crate) fn compressed_level_built(&self, level: u32) -> bool {
        level < 32 && self.state.lock().compressed_levels_built & (1 << level) != 0
    }

    pub(crate) fn mark_compressed_level_built(&self, level: u32) {
        if level < 32 {
            self.state.lock().compressed_levels_built |= 1 << level;
        }
    }

    /// Last recorded access.
    pub fn access(&self) -> TextureAccess {
        self.state.lock().access
    }

    pub(crate) fn swap_access(&self, access: TextureAccess) -> TextureAccess {
        std::mem::replace(&mut self.state.lock().access, access)
    }

    /// Queue the driver texture for deletion, or forget an imported one.
    /// Safe to call more than once.
    pub fn destroy(&self) {
        let handle = self.handle.swap(0, Ordering::AcqRel);
        if handle != 0 && self.owns_handle {
            log::debug!("Texture: queued handle {} for release", handle);
            self.release_queue.push(DeferredRelease::Texture(handle));
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("handle", &self.handle())
            .field("size", &self.pixel_size())
            .field("format", &self.descriptor.format)
            .field("flags", &self.descriptor.flags)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);

fn cube_arrays_supported(caps: &Capabilities) -> bool {
    let v = caps.version;
    if v.gles {
        !v.webgl && v.at_least(3, 2)
    } else {
        v.at_least(4, 0)
    }
}

/// Give the bound texture its storage. Returns whether storage exists
/// afterwards.
fn allocate_storage(driver: &dyn GlDriver, plan: &TexturePlan) -> bool {
    let fmt = plan.format;
    let target = plan.target;

    if target == TEXTURE_EXTERNAL_OES {
        return true;
    }
    if plan.sample_count > 1 {
        driver.tex_storage_2d_multisample(
            target,
            plan.sample_count as i32,
            fmt.sized_internal_format,
            plan.width as i32,
            plan.height as i32,
        );
        return true;
    }
    if plan.immutable_storage {
        let levels = plan.mip_levels as i32;
        if plan.is_layered() {
            driver.tex_storage_3d(
                target,
                levels,
                fmt.sized_internal_format,
                plan.width as i32,
                plan.height as i32,
                plan.layers as i32,
            );
        } else {
            driver.tex_storage_2d(
                target,
                levels,
                fmt.sized_internal_format,
                plan.width as i32,
                plan.height as i32,
            );
        }
        return true;
    }
    if plan.compressed {
        return false;
    }

    let internal = fmt.internal_format as i32;
    for level in 0..plan.mip_levels {
        let (w, h) = plan.level_size(level);
        match target {
            glow::TEXTURE_1D => {
                driver.tex_image_1d(target, level as i32, internal, w as i32, fmt.format, fmt.ty, None)
            }
            glow::TEXTURE_1D_ARRAY => driver.tex_image_2d(
                target,
                level as i32,
                internal,
                w as i32,
                plan.layers as i32,
                fmt.format,
                fmt.ty,
                None,
            ),
            glow::TEXTURE_3D | glow::TEXTURE_2D_ARRAY | glow::TEXTURE_CUBE_MAP_ARRAY => driver
                .tex_image_3d(
                    target,
                    level as i32,
                    internal,
                    w as i32,
                    h as i32,
                    plan.level_layers(level) as i32,
                    fmt.format,
                    fmt.ty,
                    None,
                ),
            glow::TEXTURE_CUBE_MAP => {
                for face in 0..6 {
                    driver.tex_image_2d(
                        plan.face_target(face),
                        level as i32,
                        internal,
                        w as i32,
                        h as i32,
                        fmt.format,
                        fmt.ty,
                        None,
                    );
                }
            }
            _ => driver.tex_image_2d(
                target,
                level as i32,
                internal,
                w as i32,
                h as i32,
                fmt.format,
                fmt.ty,
                None,
            ),
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::GlVersion;

    fn desktop() -> Capabilities {
        Capabilities::from_version(GlVersion::desktop(4, 6), &[])
    }

    fn desc(flags: TextureFlags) -> TextureDescriptor {
        TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8, flags)
    }

    #[test]
    fn test_forbidden_pairs() {
        let caps = desktop();
        let pairs = [
            TextureFlags::CUBE_MAP | TextureFlags::THREE_DIMENSIONAL,
            TextureFlags::CUBE_MAP | TextureFlags::ONE_DIMENSIONAL,
            TextureFlags::THREE_DIMENSIONAL | TextureFlags::ONE_DIMENSIONAL,
        ];
        for flags in pairs {
            let err = Texture::prepare_create(&desc(flags), &caps).unwrap_err();
            assert!(matches!(err, GraphicsError::Validation(_)), "{flags:?}");
        }
        let err = Texture::prepare_create(
            &desc(TextureFlags::THREE_DIMENSIONAL | TextureFlags::TEXTURE_ARRAY).with_array_size(4),
            &caps,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GraphicsError::Validation("texture cannot be both array and 3D".into())
        );
    }

    #[test]
    fn test_depth_and_array_size_invariants() {
        let caps = desktop();
        assert!(Texture::prepare_create(&desc(TextureFlags::empty()).with_depth(4), &caps).is_err());
        assert!(
            Texture::prepare_create(&desc(TextureFlags::THREE_DIMENSIONAL).with_depth(4), &caps)
                .is_ok()
        );
        assert!(Texture::prepare_create(&desc(TextureFlags::TEXTURE_ARRAY), &caps).is_err());
        assert!(
            Texture::prepare_create(&desc(TextureFlags::empty()).with_array_size(2), &caps).is_err()
        );
        let plan = Texture::prepare_create(
            &desc(TextureFlags::TEXTURE_ARRAY).with_array_size(3),
            &caps,
        )
        .unwrap();
        assert_eq!(plan.target, glow::TEXTURE_2D_ARRAY);
        assert_eq!(plan.layers, 3);
    }

    #[test]
    fn test_capability_requirements() {
        let es2 = Capabilities::from_version(GlVersion::es(2, 0), &[]);
        let err = Texture::prepare_create(&desc(TextureFlags::THREE_DIMENSIONAL), &es2).unwrap_err();
        assert!(matches!(err, GraphicsError::FeatureNotSupported(_)));
        let err = Texture::prepare_create(
            &TextureDescriptor::new_2d(16, 16, TextureFormat::Bc1, TextureFlags::empty()),
            &desktop(),
        )
        .unwrap_err();
        assert!(matches!(err, GraphicsError::FeatureNotSupported(_)));
    }

    #[test]
    fn test_targets() {
        let caps = desktop();
        let plan = Texture::prepare_create(&desc(TextureFlags::CUBE_MAP), &caps).unwrap();
        assert_eq!(plan.target, glow::TEXTURE_CUBE_MAP);
        assert_eq!(plan.layers, 6);
        assert_eq!(plan.face_target(2), glow::TEXTURE_CUBE_MAP_POSITIVE_X + 2);

        let plan = Texture::prepare_create(&desc(TextureFlags::ONE_DIMENSIONAL), &caps).unwrap();
        assert_eq!(plan.target, glow::TEXTURE_1D);
        assert_eq!(plan.height, 1);

        let plan = Texture::prepare_create(&desc(TextureFlags::empty()).with_sample_count(4), &caps)
            .unwrap();
        assert_eq!(plan.target, glow::TEXTURE_2D_MULTISAMPLE);
        assert!(plan.immutable_storage);

        let plan =
            Texture::prepare_create(&desc(TextureFlags::USED_WITH_LOAD_STORE), &caps).unwrap();
        assert!(plan.immutable_storage);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_create_allocates_levels() {
        use crate::driver::DummyDriver;

        let driver = DummyDriver::new();
        let caps = desktop();
        let d = desc(TextureFlags::MIP_MAPPED);
        let plan = Texture::prepare_create(&d, &caps).unwrap();
        let queue = Arc::new(DeferredReleaseQueue::new());
        let texture = Texture::create(&driver, d, plan, queue.clone()).unwrap();
        assert!(texture.is_specified());
        assert_eq!(texture.mip_levels(), 7);
        assert_eq!(driver.texture_level(texture.handle(), 6, 0).unwrap().len(), 4);

        let handle = texture.handle();
        drop(texture);
        assert!(driver.is_texture_alive(handle));
        queue.drain(&driver);
        assert!(!driver.is_texture_alive(handle));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_compressed_defers_storage_and_import_is_not_owned() {
        use crate::driver::DummyDriver;

        let driver = DummyDriver::new();
        let caps = Capabilities::from_version(
            GlVersion::desktop(4, 6),
            &["GL_EXT_texture_compression_s3tc"],
        );
        let d = TextureDescriptor::new_2d(8, 8, TextureFormat::Bc1, TextureFlags::empty());
        let plan = Texture::prepare_create(&d, &caps).unwrap();
        let queue = Arc::new(DeferredReleaseQueue::new());
        let texture = Texture::create(&driver, d.clone(), plan, queue.clone()).unwrap();
        assert!(!texture.is_specified());
        assert!(driver.texture_level(texture.handle(), 0, 0).is_none());

        let foreign = driver.create_texture().unwrap();
        let imported =
            Texture::create_from(NativeTexture { object: foreign }, d, plan, queue.clone()).unwrap();
        imported.destroy();
        assert_eq!(imported.handle(), 0);
        assert!(queue.is_empty());
    }
}
