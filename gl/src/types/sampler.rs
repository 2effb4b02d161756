//! Sampler types and descriptors.

pub use redlilium_core::sampler::{AddressMode, CompareFunction, FilterMode};

/// Descriptor for creating a sampler.
///
/// Samplers are plain values; two equal descriptors produce the same driver
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Filter between mip levels, `None` samples the base level only.
    pub mipmap_filter: Option<FilterMode>,
    /// Address mode for U coordinate.
    pub address_mode_u: AddressMode,
    /// Address mode for V coordinate.
    pub address_mode_v: AddressMode,
    /// Address mode for W coordinate.
    pub address_mode_w: AddressMode,
    /// Comparison function for shadow sampling.
    pub compare: Option<CompareFunction>,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            compare: None,
        }
    }
}

impl SamplerDescriptor {
    /// Nearest filtering on every axis.
    pub fn nearest() -> Self {
        Self {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        }
    }

    /// Linear filtering on every axis.
    pub fn linear() -> Self {
        Self::default()
    }

    /// Set the address mode of all axes.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
        self
    }

    /// Set the mipmap filter.
    pub fn with_mipmap_filter(mut self, filter: FilterMode) -> Self {
        self.mipmap_filter = Some(filter);
        self
    }

    /// Set the comparison function.
    pub fn with_compare(mut self, compare: CompareFunction) -> Self {
        self.compare = Some(compare);
        self
    }
}
