//! Sampling value types.
//!
//! [`FilterMode`], [`AddressMode`] and [`CompareFunction`] are shared between
//! the backend-agnostic descriptions and the GL backend's sampler state.

mod types;

pub use types::{AddressMode, CompareFunction, FilterMode};
