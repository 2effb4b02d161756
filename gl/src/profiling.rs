//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros of [`redlilium_core::profiling`]. With
//! the `profiling` feature the backend opens spans around pipeline creation,
//! frame begin/end and command replay, plots the number of deferred releases
//! drained per safe point and marks a frame on every present.
//!
//! ```bash
//! cargo run --features profiling
//! ```
//!
//! Without the feature every macro expands to nothing.

pub use redlilium_core::profiling::*;
