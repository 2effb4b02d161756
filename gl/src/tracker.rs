//! Per-pass resource usage tracking for barrier decisions.
//!
//! Every render or compute pass opens a [`PassResourceTracker`]. Each buffer
//! and texture the pass touches is registered with its access kind; the first
//! registration also captures the state the resource was in right before the
//! pass. When the pass replays, the executor asks the tracker whether any of
//! those captured states was a write and, if so, issues a memory barrier
//! covering every domain ([`MemoryBarriers::all`]). The mask is deliberately
//! not narrowed per resource kind.
//!
//! Inside a compute pass [`ComputePassState`] additionally tracks storage
//! resources written by one dispatch, so a later dispatch reading or writing
//! them gets a narrow `SHADER_STORAGE` / `SHADER_IMAGE_ACCESS` barrier.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;

use crate::resources::{Buffer, Texture};

// ============================================================================
// Access kinds
// ============================================================================

/// How a buffer was last accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferAccess {
    /// Never accessed.
    #[default]
    None,
    /// Vertex attribute input.
    Vertex,
    /// Index input.
    Index,
    /// Uniform data.
    Uniform,
    /// Storage buffer read.
    StorageRead,
    /// Storage buffer write.
    StorageWrite,
    /// Storage buffer read and write.
    StorageReadWrite,
    /// Written by an upload.
    Update,
    /// Read back to the host.
    Read,
}

impl BufferAccess {
    /// Whether this access writes the buffer.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::StorageWrite | Self::StorageReadWrite | Self::Update
        )
    }
}

/// How a texture was last accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureAccess {
    /// Never accessed.
    #[default]
    None,
    /// Sampled in a shader.
    Sample,
    /// Attached to the bound framebuffer.
    Framebuffer,
    /// Storage image read.
    StorageRead,
    /// Storage image write.
    StorageWrite,
    /// Storage image read and write.
    StorageReadWrite,
    /// Written by an upload, copy or mipmap generation.
    Update,
    /// Read back to the host or used as a copy source.
    Read,
}

impl TextureAccess {
    /// Whether this access writes the texture.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::Framebuffer | Self::StorageWrite | Self::StorageReadWrite | Self::Update
        )
    }
}

/// Pipeline stage a resource is accessed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassStage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

bitflags! {
    /// `glMemoryBarrier` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryBarriers: u32 {
        const VERTEX_ATTRIB_ARRAY = glow::VERTEX_ATTRIB_ARRAY_BARRIER_BIT;
        const ELEMENT_ARRAY = glow::ELEMENT_ARRAY_BARRIER_BIT;
        const UNIFORM = glow::UNIFORM_BARRIER_BIT;
        const TEXTURE_FETCH = glow::TEXTURE_FETCH_BARRIER_BIT;
        const SHADER_IMAGE_ACCESS = glow::SHADER_IMAGE_ACCESS_BARRIER_BIT;
        const PIXEL_BUFFER = glow::PIXEL_BUFFER_BARRIER_BIT;
        const TEXTURE_UPDATE = glow::TEXTURE_UPDATE_BARRIER_BIT;
        const BUFFER_UPDATE = glow::BUFFER_UPDATE_BARRIER_BIT;
        const FRAMEBUFFER = glow::FRAMEBUFFER_BARRIER_BIT;
        const SHADER_STORAGE = glow::SHADER_STORAGE_BARRIER_BIT;
    }
}

// ============================================================================
// Pass tracker
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedUse<A> {
    before: A,
    access: A,
    stage: Option<PassStage>,
}

/// Resources touched by one pass.
#[derive(Debug, Default)]
pub struct PassResourceTracker {
    buffers: HashMap<u64, TrackedUse<BufferAccess>>,
    textures: HashMap<u64, TrackedUse<TextureAccess>>,
}

impl PassResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an access to `buffer` and move the buffer into `access`.
    ///
    /// Only the first registration in a pass captures the before-pass state.
    pub fn register_buffer(&mut self, buffer: &Buffer, access: BufferAccess, stage: Option<PassStage>) {
        let previous = buffer.swap_access(access);
        self.record_buffer(buffer.id(), previous, access, stage);
    }

    /// Register an access to `texture` and move the texture into `access`.
    pub fn register_texture(
        &mut self,
        texture: &Texture,
        access: TextureAccess,
        stage: Option<PassStage>,
    ) {
        let previous = texture.swap_access(access);
        self.record_texture(texture.id(), previous, access, stage);
    }

    pub(crate) fn record_buffer(
        &mut self,
        id: u64,
        previous: BufferAccess,
        access: BufferAccess,
        stage: Option<PassStage>,
    ) {
        self.buffers
            .entry(id)
            .and_modify(|u| {
                u.access = access;
                u.stage = stage.or(u.stage);
            })
            .or_insert(TrackedUse {
                before: previous,
                access,
                stage,
            });
    }

    pub(crate) fn record_texture(
        &mut self,
        id: u64,
        previous: TextureAccess,
        access: TextureAccess,
        stage: Option<PassStage>,
    ) {
        self.textures
            .entry(id)
            .and_modify(|u| {
                u.access = access;
                u.stage = stage.or(u.stage);
            })
            .or_insert(TrackedUse {
                before: previous,
                access,
                stage,
            });
    }

    /// State of buffer `id` right before the pass.
    pub fn buffer_state_before(&self, id: u64) -> Option<BufferAccess> {
        self.buffers.get(&id).map(|u| u.before)
    }

    /// Latest access of buffer `id` in this pass.
    pub fn buffer_access(&self, id: u64) -> Option<BufferAccess> {
        self.buffers.get(&id).map(|u| u.access)
    }

    /// State of texture `id` right before the pass.
    pub fn texture_state_before(&self, id: u64) -> Option<TextureAccess> {
        self.textures.get(&id).map(|u| u.before)
    }

    /// Latest access of texture `id` in this pass.
    pub fn texture_access(&self, id: u64) -> Option<TextureAccess> {
        self.textures.get(&id).map(|u| u.access)
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }

    /// Forget every tracked resource, keeping the allocations.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.textures.clear();
    }

    /// Barrier to issue before the pass replays.
    pub fn barriers(&self) -> MemoryBarriers {
        barriers_for_pass(self)
    }
}

/// Barrier to issue before a pass: every domain when any resource entered the
/// pass in a write state, nothing otherwise.
pub fn barriers_for_pass(tracker: &PassResourceTracker) -> MemoryBarriers {
    let written = tracker.buffers.values().any(|u| u.before.is_write())
        || tracker.textures.values().any(|u| u.before.is_write());
    if written {
        MemoryBarriers::all()
    } else {
        MemoryBarriers::empty()
    }
}

// ============================================================================
// Compute pass state
// ============================================================================

/// Storage resources written by earlier dispatches of the open compute pass.
#[derive(Debug, Default)]
pub struct ComputePassState {
    written_buffers: HashSet<u64>,
    written_textures: HashSet<u64>,
}

impl ComputePassState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note an upcoming storage buffer access, returning the barrier needed
    /// first.
    pub fn access_buffer(&mut self, id: u64, access: BufferAccess) -> MemoryBarriers {
        let mut bits = MemoryBarriers::empty();
        if self.written_buffers.contains(&id) {
            bits |= MemoryBarriers::SHADER_STORAGE;
        }
        if access.is_write() {
            self.written_buffers.insert(id);
        }
        bits
    }

    /// Note an upcoming storage image access, returning the barrier needed
    /// first.
    pub fn access_texture(&mut self, id: u64, access: TextureAccess) -> MemoryBarriers {
        let mut bits = MemoryBarriers::empty();
        if self.written_textures.contains(&id) {
            bits |= MemoryBarriers::SHADER_IMAGE_ACCESS;
        }
        if access.is_write() {
            self.written_textures.insert(id);
        }
        bits
    }

    /// Barrier needed before a dispatch touching `buffers` and `textures`.
    ///
    /// The barrier is considered issued before the dispatch's own writes are
    /// noted, so they stay pending for the next dispatch.
    pub fn access_dispatch(
        &mut self,
        buffers: &[(u64, BufferAccess)],
        textures: &[(u64, TextureAccess)],
    ) -> MemoryBarriers {
        let mut bits = MemoryBarriers::empty();
        if buffers.iter().any(|(id, _)| self.written_buffers.contains(id)) {
            bits |= MemoryBarriers::SHADER_STORAGE;
        }
        if textures.iter().any(|(id, _)| self.written_textures.contains(id)) {
            bits |= MemoryBarriers::SHADER_IMAGE_ACCESS;
        }
        self.barrier_issued(bits);
        for (id, access) in buffers {
            if access.is_write() {
                self.written_buffers.insert(*id);
            }
        }
        for (id, access) in textures {
            if access.is_write() {
                self.written_textures.insert(*id);
            }
        }
        bits
    }

    /// A barrier with `bits` was recorded; writes before it are now visible.
    pub fn barrier_issued(&mut self, bits: MemoryBarriers) {
        if bits.contains(MemoryBarriers::SHADER_STORAGE) {
            self.written_buffers.clear();
        }
        if bits.contains(MemoryBarriers::SHADER_IMAGE_ACCESS) {
            self.written_textures.clear();
        }
    }

    pub fn reset(&mut self) {
        self.written_buffers.clear();
        self.written_textures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_is_write() {
        assert!(BufferAccess::StorageWrite.is_write());
        assert!(BufferAccess::Update.is_write());
        assert!(!BufferAccess::Vertex.is_write());
        assert!(!BufferAccess::Read.is_write());
        assert!(TextureAccess::Framebuffer.is_write());
        assert!(!TextureAccess::Sample.is_write());
    }

    #[test]
    fn test_first_registration_captures_before_state() {
        let mut tracker = PassResourceTracker::new();
        tracker.record_buffer(1, BufferAccess::Update, BufferAccess::Vertex, Some(PassStage::Vertex));
        tracker.record_buffer(1, BufferAccess::Vertex, BufferAccess::Index, None);
        assert_eq!(tracker.buffer_state_before(1), Some(BufferAccess::Update));
        assert_eq!(tracker.buffer_access(1), Some(BufferAccess::Index));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_read_only_pass_needs_no_barrier() {
        let mut tracker = PassResourceTracker::new();
        tracker.record_buffer(1, BufferAccess::Vertex, BufferAccess::Vertex, Some(PassStage::Vertex));
        tracker.record_texture(2, TextureAccess::Sample, TextureAccess::Sample, Some(PassStage::Fragment));
        assert!(tracker.barriers().is_empty());
    }

    #[test]
    fn test_written_before_pass_emits_full_mask() {
        let mut tracker = PassResourceTracker::new();
        tracker.record_buffer(1, BufferAccess::Vertex, BufferAccess::Vertex, None);
        tracker.record_texture(
            2,
            TextureAccess::StorageWrite,
            TextureAccess::Sample,
            Some(PassStage::Fragment),
        );
        assert_eq!(tracker.barriers(), MemoryBarriers::all());

        tracker.reset();
        assert!(tracker.is_empty());
        assert!(tracker.barriers().is_empty());
    }

    #[test]
    fn test_compute_pass_state() {
        let mut state = ComputePassState::new();
        assert!(state.access_buffer(7, BufferAccess::StorageWrite).is_empty());
        assert_eq!(
            state.access_buffer(7, BufferAccess::StorageRead),
            MemoryBarriers::SHADER_STORAGE
        );
        state.barrier_issued(MemoryBarriers::SHADER_STORAGE);
        assert!(state.access_buffer(7, BufferAccess::StorageRead).is_empty());

        assert!(state.access_texture(3, TextureAccess::StorageWrite).is_empty());
        assert_eq!(
            state.access_texture(3, TextureAccess::StorageReadWrite),
            MemoryBarriers::SHADER_IMAGE_ACCESS
        );
        state.reset();
        assert!(state.access_texture(3, TextureAccess::StorageRead).is_empty());
    }

    #[test]
    fn test_dispatch_keeps_own_writes_pending() {
        let mut state = ComputePassState::new();
        // First dispatch writes buffer 1.
        assert!(state.access_dispatch(&[(1, BufferAccess::StorageWrite)], &[]).is_empty());
        // Second reads 1 and writes 2: needs a barrier, 2 stays pending.
        let bits = state.access_dispatch(
            &[(1, BufferAccess::StorageRead), (2, BufferAccess::StorageWrite)],
            &[],
        );
        assert_eq!(bits, MemoryBarriers::SHADER_STORAGE);
        assert_eq!(
            state.access_dispatch(&[(2, BufferAccess::StorageRead)], &[]),
            MemoryBarriers::SHADER_STORAGE
        );
        assert!(state.access_dispatch(&[(2, BufferAccess::StorageRead)], &[]).is_empty());
    }
}
