//! Buffer types and descriptors.

use bitflags::bitflags;

/// How often the contents of a buffer change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferType {
    /// Uploaded once, never changed afterwards.
    Immutable,
    /// Changed occasionally through upload batches.
    #[default]
    Static,
    /// Changed every frame, possibly through a full dynamic update.
    Dynamic,
}

bitflags! {
    /// What a buffer is used for.
    ///
    /// Uniform buffers are host-side memory decomposed into individual
    /// uniform calls at bind time, so `UNIFORM` cannot be combined with any
    /// other usage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex attribute input.
        const VERTEX = 1 << 0;
        /// Index input.
        const INDEX = 1 << 1;
        /// Uniform block data.
        const UNIFORM = 1 << 2;
        /// Shader storage (compute load/store).
        const STORAGE = 1 << 3;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

impl BufferUsage {
    /// The GL binding target used to upload and read the buffer.
    pub fn gl_target(self) -> u32 {
        if self.contains(Self::INDEX) {
            glow::ELEMENT_ARRAY_BUFFER
        } else if self.contains(Self::STORAGE) && !self.contains(Self::VERTEX) {
            glow::SHADER_STORAGE_BUFFER
        } else {
            glow::ARRAY_BUFFER
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u32,
    /// Update frequency.
    pub buffer_type: BufferType,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(buffer_type: BufferType, usage: BufferUsage, size: u32) -> Self {
        Self {
            label: None,
            size,
            buffer_type,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    #[default]
    Uint16,
    /// 32-bit indices.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }

    /// GL element type.
    pub fn gl_type(self) -> u32 {
        match self {
            Self::Uint16 => glow::UNSIGNED_SHORT,
            Self::Uint32 => glow::UNSIGNED_INT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gl_target() {
        assert_eq!(BufferUsage::VERTEX.gl_target(), glow::ARRAY_BUFFER);
        assert_eq!(BufferUsage::INDEX.gl_target(), glow::ELEMENT_ARRAY_BUFFER);
        assert_eq!(BufferUsage::STORAGE.gl_target(), glow::SHADER_STORAGE_BUFFER);
        assert_eq!(
            (BufferUsage::VERTEX | BufferUsage::STORAGE).gl_target(),
            glow::ARRAY_BUFFER
        );
    }

    #[test]
    fn test_index_format() {
        assert_eq!(IndexFormat::Uint16.size(), 2);
        assert_eq!(IndexFormat::Uint32.gl_type(), glow::UNSIGNED_INT);
    }
}
