//! Side pools of a command buffer.
//!
//! Commands index into these vectors instead of owning variable-length
//! data. Everything is cleared (keeping allocations) when the buffer is
//! reset for the next frame.

use std::ops::Range;

use super::updates::{BufferReadbackCallback, TextureReadbackCallback};
use crate::driver::GlHandle;
use crate::resources::GlSamplerState;
use crate::tracker::PassResourceTracker;

/// Bytes of a uniform buffer range captured when shader resources were bound.
#[derive(Debug, Clone)]
pub(crate) struct UniformSnapshot {
    pub binding: i32,
    pub data: Vec<u8>,
}

/// What a texture unit entry provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    /// Texture and sampler from a combined binding.
    Combined,
    /// Separate texture.
    TextureOnly,
    /// Separate sampler.
    SamplerOnly,
}

/// One texture or sampler of a bound binding table.
#[derive(Debug, Clone)]
pub(crate) struct TextureUnitBinding {
    pub binding: i32,
    pub array_index: u32,
    pub kind: UnitKind,
    pub texture: GlHandle,
    /// Resource id keying the executor's sampler-state cache.
    pub texture_id: u64,
    pub target: u32,
    pub sampler: Option<GlSamplerState>,
}

/// A storage buffer or image binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StorageBinding {
    Buffer {
        binding: u32,
        buffer: GlHandle,
        offset: u32,
        size: u32,
    },
    Image {
        binding: u32,
        texture: GlHandle,
        level: u32,
        layered: bool,
        access: u32,
        format: u32,
    },
}

/// Pool ranges making up one `BindShaderResources` command.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResourceSet {
    pub uniforms: Range<usize>,
    pub textures: Range<usize>,
    pub storage: Range<usize>,
}

/// A readback waiting for its command to replay.
pub(crate) enum PendingReadback {
    Buffer(BufferReadbackCallback),
    Texture(TextureReadbackCallback),
}

impl std::fmt::Debug for PendingReadback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(_) => f.write_str("PendingReadback::Buffer"),
            Self::Texture(_) => f.write_str("PendingReadback::Texture"),
        }
    }
}

/// Every side pool of a command buffer.
#[derive(Debug, Default)]
pub(crate) struct CommandPools {
    pub bytes: Vec<Vec<u8>>,
    pub uniforms: Vec<UniformSnapshot>,
    pub textures: Vec<TextureUnitBinding>,
    pub storage: Vec<StorageBinding>,
    pub sets: Vec<ResourceSet>,
    pub readbacks: Vec<Option<PendingReadback>>,
    /// Trackers are kept across resets; only the first `active_trackers`
    /// belong to the current recording.
    pub trackers: Vec<PassResourceTracker>,
    pub active_trackers: usize,
}

impl CommandPools {
    /// Retain `data` and return its index.
    pub fn push_bytes(&mut self, data: Vec<u8>) -> usize {
        self.bytes.push(data);
        self.bytes.len() - 1
    }

    pub fn push_readback(&mut self, readback: PendingReadback) -> usize {
        self.readbacks.push(Some(readback));
        self.readbacks.len() - 1
    }

    /// Hand out a clean tracker, reusing one from an earlier frame if any.
    pub fn next_tracker(&mut self) -> usize {
        let index = self.active_trackers;
        if index == self.trackers.len() {
            self.trackers.push(PassResourceTracker::new());
        } else {
            self.trackers[index].reset();
        }
        self.active_trackers += 1;
        index
    }

    pub fn tracker_mut(&mut self, index: usize) -> Option<&mut PassResourceTracker> {
        if index < self.active_trackers {
            self.trackers.get_mut(index)
        } else {
            None
        }
    }

    pub fn tracker(&self, index: usize) -> Option<&PassResourceTracker> {
        if index < self.active_trackers {
            self.trackers.get(index)
        } else {
            None
        }
    }

    /// Bytes retained for upload commands.
    pub fn retained_bytes(&self) -> usize {
        self.bytes.iter().map(Vec::len).sum::<usize>()
            + self.uniforms.iter().map(|u| u.data.len()).sum::<usize>()
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
        self.uniforms.clear();
        self.textures.clear();
        self.storage.clear();
        self.sets.clear();
        self.readbacks.clear();
        self.active_trackers = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::BufferAccess;

    #[test]
    fn test_trackers_are_reused_after_reset() {
        let mut pools = CommandPools::default();
        assert_eq!(pools.next_tracker(), 0);
        assert_eq!(pools.next_tracker(), 1);
        pools.tracker_mut(0).unwrap().record_buffer(
            7,
            BufferAccess::StorageWrite,
            BufferAccess::Vertex,
            None,
        );
        pools.reset();
        assert!(pools.tracker(0).is_none());

        assert_eq!(pools.next_tracker(), 0);
        assert_eq!(pools.trackers.len(), 2);
        assert!(pools.tracker(0).unwrap().is_empty());
    }

    #[test]
    fn test_reset_drops_payloads() {
        let mut pools = CommandPools::default();
        let index = pools.push_bytes(vec![1, 2, 3]);
        assert_eq!(index, 0);
        assert_eq!(pools.retained_bytes(), 3);
        pools.reset();
        assert_eq!(pools.retained_bytes(), 0);
    }
}
