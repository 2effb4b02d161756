//! Compute pipelines.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use redlilium_core::profiling::profile_scope;
use redlilium_core::shader::{Shader, ShaderStage};

use super::{PipelineContext, ProgramSource, SamplerEntry, UniformEntry, link_program};
use crate::cache::PipelineCacheKey;
use crate::driver::GlHandle;
use crate::error::GraphicsError;
use crate::release::DeferredReleaseQueue;

/// Descriptor for creating a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: Shader,
}

impl ComputePipelineDescriptor {
    pub fn new(shader: Shader) -> Self {
        Self { label: None, shader }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Immutable state the executor uses when a compute pipeline is bound.
#[derive(Debug, Clone)]
pub struct ComputePipelineState {
    pub program: GlHandle,
    pub uniforms: Vec<UniformEntry>,
    pub samplers: Vec<SamplerEntry>,
    pub work_group_size: [u32; 3],
}

/// A linked compute pipeline.
pub struct ComputePipeline {
    id: u64,
    generation: u64,
    label: Option<String>,
    program: AtomicU32,
    cache_key: PipelineCacheKey,
    program_source: ProgramSource,
    state: Arc<ComputePipelineState>,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl ComputePipeline {
    pub(crate) fn create(
        ctx: &mut PipelineContext<'_>,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Self, GraphicsError> {
        profile_scope!("create_compute_pipeline");

        if desc.shader.stage() != ShaderStage::Compute {
            log::warn!(
                "ComputePipeline: {:?} was given a {} stage",
                desc.label,
                desc.shader.stage().name()
            );
            return Err(GraphicsError::Validation(format!(
                "compute pipeline needs a compute stage, got {}",
                desc.shader.stage().name()
            )));
        }
        if !ctx.caps.compute {
            log::warn!("ComputePipeline: compute is not supported by this context");
            return Err(GraphicsError::FeatureNotSupported("compute shaders".into()));
        }

        let linked = link_program(ctx, &[&desc.shader], &[], desc.label.as_deref())?;
        let state = ComputePipelineState {
            program: linked.program,
            uniforms: linked.uniforms,
            samplers: linked.samplers,
            work_group_size: desc.shader.description().compute_work_group_size,
        };

        log::debug!(
            "ComputePipeline: created {:?} (program {}, generation {})",
            desc.label,
            linked.program,
            ctx.generation
        );
        Ok(Self {
            id: crate::resources::next_resource_id(),
            generation: ctx.generation,
            label: desc.label.clone(),
            program: AtomicU32::new(linked.program),
            cache_key: linked.key,
            program_source: linked.source,
            state: Arc::new(state),
            release_queue: ctx.release_queue.clone(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn program(&self) -> GlHandle {
        self.program.load(Ordering::Acquire)
    }

    pub fn cache_key(&self) -> &PipelineCacheKey {
        &self.cache_key
    }

    pub fn program_source(&self) -> ProgramSource {
        self.program_source
    }

    pub fn state(&self) -> &Arc<ComputePipelineState> {
        &self.state
    }

    /// Queue the program for deletion. Safe to call more than once.
    pub fn destroy(&self) {
        let program = self.program.swap(0, Ordering::AcqRel);
        if program != 0 {
            log::debug!("ComputePipeline: queued program {} for release", program);
            super::release_program(&self.release_queue, program);
        }
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for ComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("label", &self.label)
            .field("program", &self.program())
            .finish()
    }
}

// Ensure ComputePipeline is Send + Sync
static_assertions::assert_impl_all!(ComputePipeline: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::cache::PipelineBlobCache;
    use crate::caps::Capabilities;
    use crate::driver::DummyDriver;
    use crate::driver::dummy::DummyProfile;
    use crate::shader::ShaderCompileCache;
    use redlilium_core::shader::{ShaderDescription, ShaderVersion};

    fn create(profile: DummyProfile, shader: Shader) -> Result<ComputePipeline, GraphicsError> {
        let driver = DummyDriver::with_profile(profile);
        let caps = Capabilities::detect(&driver).unwrap();
        let mut compile_cache = ShaderCompileCache::new(4);
        let mut blob_cache = PipelineBlobCache::new("dummy");
        let queue = Arc::new(DeferredReleaseQueue::new());
        let mut ctx = PipelineContext {
            driver: &driver,
            caps: &caps,
            compile_cache: &mut compile_cache,
            blob_cache: &mut blob_cache,
            disk_cache: None,
            save_to_blob_cache: false,
            release_queue: &queue,
            generation: 1,
        };
        ComputePipeline::create(&mut ctx, &ComputePipelineDescriptor::new(shader))
    }

    fn compute_shader() -> Shader {
        Shader::new(
            ShaderStage::Compute,
            ShaderDescription::new().with_work_group_size([64, 1, 1]),
        )
        .with_source(
            ShaderVersion::gles(310),
            "#version 310 es\nlayout(local_size_x = 64) in;\nvoid main() {}",
        )
    }

    #[test]
    fn test_create_on_gles31_plus() {
        let pipeline = create(DummyProfile::gles32(), compute_shader()).unwrap();
        assert_ne!(pipeline.program(), 0);
        assert_eq!(pipeline.state().work_group_size, [64, 1, 1]);
    }

    #[test]
    fn test_compute_unsupported_on_gles30() {
        assert!(matches!(
            create(DummyProfile::gles30(), compute_shader()),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn test_wrong_stage_is_rejected() {
        let shader = Shader::new(ShaderStage::Vertex, ShaderDescription::new())
            .with_source(ShaderVersion::gles(310), "void main() {}");
        assert!(matches!(
            create(DummyProfile::gles32(), shader),
            Err(GraphicsError::Validation(_))
        ));
    }
}
