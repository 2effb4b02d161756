//! Sampler resource.
//!
//! GLES 2 and WebGL 1 have no sampler objects, so a sampler here is a plain
//! value. The executor translates it into [`GlSamplerState`] and applies it
//! as texture parameters of each texture it is used with, skipping textures
//! whose cached state already matches.

use crate::driver::GlDriver;
use crate::types::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};

/// Texture parameters derived from a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlSamplerState {
    pub min_filter: u32,
    pub mag_filter: u32,
    pub wrap_s: u32,
    pub wrap_t: u32,
    pub wrap_r: u32,
    pub compare_mode: u32,
    pub compare_func: u32,
}

impl GlSamplerState {
    /// Translate a descriptor.
    pub fn from_descriptor(desc: &SamplerDescriptor) -> Self {
        let min_filter = match (desc.min_filter, desc.mipmap_filter) {
            (FilterMode::Nearest, None) => glow::NEAREST,
            (FilterMode::Linear, None) => glow::LINEAR,
            (FilterMode::Nearest, Some(FilterMode::Nearest)) => glow::NEAREST_MIPMAP_NEAREST,
            (FilterMode::Nearest, Some(FilterMode::Linear)) => glow::NEAREST_MIPMAP_LINEAR,
            (FilterMode::Linear, Some(FilterMode::Nearest)) => glow::LINEAR_MIPMAP_NEAREST,
            (FilterMode::Linear, Some(FilterMode::Linear)) => glow::LINEAR_MIPMAP_LINEAR,
        };
        Self {
            min_filter,
            mag_filter: filter(desc.mag_filter),
            wrap_s: wrap(desc.address_mode_u),
            wrap_t: wrap(desc.address_mode_v),
            wrap_r: wrap(desc.address_mode_w),
            compare_mode: if desc.compare.is_some() {
                glow::COMPARE_REF_TO_TEXTURE
            } else {
                glow::NONE
            },
            compare_func: compare(desc.compare.unwrap_or_default()),
        }
    }

    /// Apply to the texture bound at `target` on the active unit.
    ///
    /// `previous` is the state the texture is known to have; only differing
    /// parameters are set. Multisample textures take no sampler state.
    pub(crate) fn apply(
        &self,
        driver: &dyn GlDriver,
        target: u32,
        previous: Option<&GlSamplerState>,
        wrap_r: bool,
        compare_mode: bool,
    ) {
        if target == glow::TEXTURE_2D_MULTISAMPLE {
            return;
        }
        let changed = |f: fn(&GlSamplerState) -> u32| previous.is_none_or(|p| f(p) != f(self));
        let set = |pname: u32, value: u32| driver.tex_parameter_i32(target, pname, value as i32);

        if changed(|s| s.min_filter) {
            set(glow::TEXTURE_MIN_FILTER, self.min_filter);
        }
        if changed(|s| s.mag_filter) {
            set(glow::TEXTURE_MAG_FILTER, self.mag_filter);
        }
        if changed(|s| s.wrap_s) {
            set(glow::TEXTURE_WRAP_S, self.wrap_s);
        }
        if changed(|s| s.wrap_t) {
            set(glow::TEXTURE_WRAP_T, self.wrap_t);
        }
        if wrap_r && changed(|s| s.wrap_r) {
            set(glow::TEXTURE_WRAP_R, self.wrap_r);
        }
        if compare_mode {
            if changed(|s| s.compare_mode) {
                set(glow::TEXTURE_COMPARE_MODE, self.compare_mode);
            }
            if changed(|s| s.compare_func) {
                set(glow::TEXTURE_COMPARE_FUNC, self.compare_func);
            }
        }
    }
}

fn filter(mode: FilterMode) -> u32 {
    match mode {
        FilterMode::Nearest => glow::NEAREST,
        FilterMode::Linear => glow::LINEAR,
    }
}

fn wrap(mode: AddressMode) -> u32 {
    match mode {
        AddressMode::Repeat => glow::REPEAT,
        AddressMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        AddressMode::MirroredRepeat => glow::MIRRORED_REPEAT,
    }
}

fn compare(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::Never => glow::NEVER,
        CompareFunction::Less => glow::LESS,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Greater => glow::GREATER,
        CompareFunction::NotEqual => glow::NOTEQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Always => glow::ALWAYS,
    }
}

/// A texture sampler.
///
/// Samplers are created by [`GlRhi::create_sampler`](crate::GlRhi::create_sampler),
/// which never fails, and are reference-counted like every other resource.
///
/// # Example
///
/// ```ignore
/// let sampler = rhi.create_sampler(SamplerDescriptor::linear());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Sampler {
    id: u64,
    descriptor: SamplerDescriptor,
    state: GlSamplerState,
}

impl Sampler {
    pub(crate) fn new(descriptor: SamplerDescriptor) -> Self {
        Self {
            id: super::next_resource_id(),
            state: GlSamplerState::from_descriptor(&descriptor),
            descriptor,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    /// Translated texture parameters.
    pub fn gl_state(&self) -> GlSamplerState {
        self.state
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("mag_filter", &self.descriptor.mag_filter)
            .field("min_filter", &self.descriptor.min_filter)
            .field("mipmap_filter", &self.descriptor.mipmap_filter)
            .field("compare", &self.descriptor.compare)
            .finish()
    }
}

// Ensure Sampler is Send + Sync
static_assertions::assert_impl_all!(Sampler: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation() {
        let state = GlSamplerState::from_descriptor(
            &SamplerDescriptor::nearest()
                .with_mipmap_filter(FilterMode::Linear)
                .with_address_mode(AddressMode::Repeat),
        );
        assert_eq!(state.min_filter, glow::NEAREST_MIPMAP_LINEAR);
        assert_eq!(state.mag_filter, glow::NEAREST);
        assert_eq!(state.wrap_s, glow::REPEAT);
        assert_eq!(state.wrap_r, glow::REPEAT);
        assert_eq!(state.compare_mode, glow::NONE);
    }

    #[test]
    fn test_compare() {
        let state = GlSamplerState::from_descriptor(
            &SamplerDescriptor::linear().with_compare(CompareFunction::GreaterEqual),
        );
        assert_eq!(state.compare_mode, glow::COMPARE_REF_TO_TEXTURE);
        assert_eq!(state.compare_func, glow::GEQUAL);
    }

    #[test]
    fn test_samplers_get_distinct_ids() {
        let a = Sampler::new(SamplerDescriptor::default());
        let b = Sampler::new(SamplerDescriptor::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.gl_state(), b.gl_state());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_apply_skips_unchanged_parameters() {
        use crate::driver::{DummyCall, DummyDriver};

        let driver = DummyDriver::new();
        let texture = driver.create_texture().unwrap();
        driver.bind_texture(glow::TEXTURE_2D, texture);
        let linear = GlSamplerState::from_descriptor(&SamplerDescriptor::linear());
        linear.apply(&driver, glow::TEXTURE_2D, None, false, true);
        let full = driver.count_calls(|c| matches!(c, DummyCall::TexParameter { .. }));
        assert_eq!(full, 6);

        driver.clear_calls();
        let repeat = GlSamplerState::from_descriptor(
            &SamplerDescriptor::linear().with_address_mode(AddressMode::Repeat),
        );
        repeat.apply(&driver, glow::TEXTURE_2D, Some(&linear), false, true);
        assert_eq!(
            driver.count_calls(|c| matches!(c, DummyCall::TexParameter { .. })),
            2
        );
        assert_eq!(
            driver.texture_parameter(texture, glow::TEXTURE_WRAP_S),
            Some(glow::REPEAT as i32)
        );
    }
}
