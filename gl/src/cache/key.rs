//! Pipeline cache keys.

use std::fmt;

use redlilium_core::shader::ShaderStage;
use serde::{Deserialize, Serialize};

/// Content hash identifying a linked program.
///
/// Covers the selected source of every stage in stage order. The vertex
/// stage's contribution also covers the attribute name to location bindings,
/// because sources without `layout(location)` qualifiers are identical text
/// for different attribute layouts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineCacheKey([u8; 32]);

impl PipelineCacheKey {
    /// Compute the key of a program built from `stages` with the given
    /// vertex attribute bindings.
    pub fn compute(stages: &[(ShaderStage, &str)], attributes: &[(String, u32)]) -> Self {
        let mut sorted: Vec<&(ShaderStage, &str)> = stages.iter().collect();
        sorted.sort_by_key(|(stage, _)| *stage);

        let mut hasher = blake3::Hasher::new();
        for (stage, source) in sorted {
            hasher.update(&[*stage as u8]);
            hasher.update(&(source.len() as u64).to_le_bytes());
            hasher.update(source.as_bytes());
            if *stage == ShaderStage::Vertex {
                hasher.update(&attribute_encoding(attributes));
            }
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, used as a file name.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for PipelineCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineCacheKey({})", &self.to_hex()[..16])
    }
}

/// Attributes ordered by location, each as `location (u32 LE) ++ name ++ 0`.
fn attribute_encoding(attributes: &[(String, u32)]) -> Vec<u8> {
    let mut sorted: Vec<&(String, u32)> = attributes.iter().collect();
    sorted.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    let mut out = Vec::with_capacity(sorted.len() * 16);
    out.extend_from_slice(b"attribs");
    for (name, location) in sorted {
        out.extend_from_slice(&location.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec3 position;\nattribute vec2 uv;\nvoid main() {}";
    const FS: &str = "void main() {}";

    fn attrs(position: u32, uv: u32) -> Vec<(String, u32)> {
        vec![("position".to_string(), position), ("uv".to_string(), uv)]
    }

    #[test]
    fn test_identical_inputs_give_identical_keys() {
        let stages = [(ShaderStage::Vertex, VS), (ShaderStage::Fragment, FS)];
        let a = PipelineCacheKey::compute(&stages, &attrs(0, 1));
        let b = PipelineCacheKey::compute(&stages, &attrs(0, 1));
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_attribute_locations_change_the_key() {
        let stages = [(ShaderStage::Vertex, VS), (ShaderStage::Fragment, FS)];
        let a = PipelineCacheKey::compute(&stages, &attrs(0, 1));
        let b = PipelineCacheKey::compute(&stages, &attrs(1, 0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_attribute_order_is_irrelevant() {
        let stages = [(ShaderStage::Vertex, VS), (ShaderStage::Fragment, FS)];
        let mut reversed = attrs(0, 1);
        reversed.reverse();
        assert_eq!(
            PipelineCacheKey::compute(&stages, &attrs(0, 1)),
            PipelineCacheKey::compute(&stages, &reversed)
        );
    }

    #[test]
    fn test_stage_boundaries_are_encoded() {
        let a = PipelineCacheKey::compute(
            &[(ShaderStage::Vertex, "ab"), (ShaderStage::Fragment, "c")],
            &[],
        );
        let b = PipelineCacheKey::compute(
            &[(ShaderStage::Vertex, "a"), (ShaderStage::Fragment, "bc")],
            &[],
        );
        assert_ne!(a, b);
    }
}
