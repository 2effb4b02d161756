//! # RedLilium Engine Core
//!
//! Backend-agnostic building blocks shared by the RedLilium rendering backends:
//!
//! - [`shader`] - Shader stages, source variants and the reflection model
//! - [`sampler`] - Filtering, addressing and comparison enums
//! - [`profiling`] - Optional Tracy instrumentation macros

pub mod profiling;
pub mod sampler;
pub mod shader;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core library version.
pub fn init() {
    log::info!("RedLilium Core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
