//! Filter, address and comparison modes.

use serde::{Deserialize, Serialize};

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest neighbor filtering.
    #[default]
    Nearest,
    /// Linear filtering.
    Linear,
}

/// Texture address mode (wrapping behavior) for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressMode {
    /// Repeat the texture.
    Repeat,
    /// Clamp to edge.
    #[default]
    ClampToEdge,
    /// Mirrored repeat.
    MirroredRepeat,
}

/// Comparison function for depth/shadow sampling and depth/stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompareFunction {
    /// Never pass.
    Never,
    /// Pass if less than.
    #[default]
    Less,
    /// Pass if equal.
    Equal,
    /// Pass if less than or equal.
    LessEqual,
    /// Pass if greater than.
    Greater,
    /// Pass if not equal.
    NotEqual,
    /// Pass if greater than or equal.
    GreaterEqual,
    /// Always pass.
    Always,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(FilterMode::default(), FilterMode::Nearest);
        assert_eq!(AddressMode::default(), AddressMode::ClampToEdge);
        assert_eq!(CompareFunction::default(), CompareFunction::Less);
    }
}
