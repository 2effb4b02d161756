//! Shader stages and per-stage source variants.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::reflection::ShaderDescription;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Human readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessellationControl => "tessellation control",
            Self::TessellationEvaluation => "tessellation evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

/// Shading language version a source variant targets.
///
/// Ordering sorts by `gles` first and then by version number, so variants of
/// the same language family are contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShaderVersion {
    /// `true` for GLSL ES.
    pub gles: bool,
    /// Version number as written in `#version` (e.g. 330, 300).
    pub version: u32,
}

impl ShaderVersion {
    /// Desktop GLSL version.
    pub const fn glsl(version: u32) -> Self {
        Self {
            gles: false,
            version,
        }
    }

    /// GLSL ES version.
    pub const fn gles(version: u32) -> Self {
        Self {
            gles: true,
            version,
        }
    }
}

impl fmt::Display for ShaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gles && self.version >= 300 {
            write!(f, "{} es", self.version)
        } else {
            write!(f, "{}", self.version)
        }
    }
}

/// Maps a separate texture + separate sampler pair onto the combined sampler
/// a GLSL translation introduced for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeparateToCombined {
    /// Name of the combined sampler uniform in the GLSL source.
    pub combined_sampler_name: String,
    /// Binding of the separate texture.
    pub texture_binding: i32,
    /// Binding of the separate sampler.
    pub sampler_binding: i32,
}

/// A shader stage with its source variants and reflection data.
///
/// This is the unit handed over by the shader compiler collaborator: one or
/// more source variants each tagged with the language version it requires,
/// plus the reflection model shared by all variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shader {
    stage: ShaderStage,
    description: ShaderDescription,
    sources: BTreeMap<ShaderVersion, String>,
    separate_to_combined: Vec<SeparateToCombined>,
}

impl Shader {
    /// Create a shader with no sources.
    pub fn new(stage: ShaderStage, description: ShaderDescription) -> Self {
        Self {
            stage,
            description,
            sources: BTreeMap::new(),
            separate_to_combined: Vec::new(),
        }
    }

    /// Add a source variant.
    pub fn with_source(mut self, version: ShaderVersion, source: impl Into<String>) -> Self {
        self.sources.insert(version, source.into());
        self
    }

    /// Add a separate-to-combined sampler mapping.
    pub fn with_separate_to_combined(mut self, mapping: SeparateToCombined) -> Self {
        self.separate_to_combined.push(mapping);
        self
    }

    /// Stage of this shader.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Reflection data.
    pub fn description(&self) -> &ShaderDescription {
        &self.description
    }

    /// Source for an exact version, if present and non-empty.
    pub fn source(&self, version: &ShaderVersion) -> Option<&str> {
        self.sources
            .get(version)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// All versions this shader carries a variant for.
    pub fn versions(&self) -> impl Iterator<Item = &ShaderVersion> {
        self.sources.keys()
    }

    /// Separate-to-combined sampler mappings.
    pub fn separate_to_combined(&self) -> &[SeparateToCombined] {
        &self.separate_to_combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::es3(ShaderVersion::gles(300), "300 es")]
    #[case::es2(ShaderVersion::gles(100), "100")]
    #[case::desktop(ShaderVersion::glsl(330), "330")]
    fn test_version_display(#[case] version: ShaderVersion, #[case] expected: &str) {
        assert_eq!(version.to_string(), expected);
    }

    #[test]
    fn test_versions_sort_by_family() {
        let mut versions = vec![
            ShaderVersion::gles(300),
            ShaderVersion::glsl(450),
            ShaderVersion::gles(100),
            ShaderVersion::glsl(330),
        ];
        versions.sort();
        assert_eq!(
            versions,
            vec![
                ShaderVersion::glsl(330),
                ShaderVersion::glsl(450),
                ShaderVersion::gles(100),
                ShaderVersion::gles(300),
            ]
        );
    }

    #[test]
    fn test_empty_source_is_absent() {
        let shader = Shader::new(ShaderStage::Vertex, ShaderDescription::new())
            .with_source(ShaderVersion::glsl(330), "")
            .with_source(ShaderVersion::gles(300), "void main() {}");
        assert!(shader.source(&ShaderVersion::glsl(330)).is_none());
        assert_eq!(
            shader.source(&ShaderVersion::gles(300)),
            Some("void main() {}")
        );
        assert_eq!(shader.versions().count(), 2);
    }
}
