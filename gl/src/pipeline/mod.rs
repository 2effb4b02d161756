//! Pipeline objects.
//!
//! A pipeline owns a linked program, the uniform and sampler tables resolved
//! from shader reflection, and (for graphics) the fixed-function state the
//! executor applies when the pipeline is bound.
//!
//! # Creation
//!
//! ```text
//!  descriptor ──► validate ──► select source variants ──► cache key
//!                                                            │
//!              ┌────────────── blob cache hit? ◄─────────────┤
//!              │                disk cache hit? ◄────────────┘
//!              │ no                   │ yes: glProgramBinary + verify link
//!              ▼                      │
//!   compile (compile cache) + bind    │
//!   attribute locations + link        │
//!              │                      │
//!              └──────────┬───────────┘
//!                         ▼
//!           uniform / sampler tables ──► save binary per policy
//! ```
//!
//! A failed binary load is a cache miss: the entry is dropped and the
//! program is built from source.

use std::sync::Arc;

use redlilium_core::profiling::profile_scope;
use redlilium_core::shader::{Shader, ShaderStage};

use crate::cache::{PipelineBlobCache, PipelineCacheKey, ShaderBinaryCache};
use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle, ProgramBinary};
use crate::error::GraphicsError;
use crate::release::{DeferredRelease, DeferredReleaseQueue};
use crate::shader::{ShaderCompileCache, select_variant};

mod compute;
mod graphics;
mod state;
mod uniforms;

pub use compute::{ComputePipeline, ComputePipelineDescriptor, ComputePipelineState};
pub use graphics::{GraphicsPipeline, GraphicsPipelineDescriptor, GraphicsPipelineState};
pub use state::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, ColorWrites, CullMode, DepthBias,
    DepthStencilState, FrontFace, PolygonMode, PrimitiveTopology, StencilFaceState,
    StencilOperation, TargetBlend, VertexAttribute, VertexAttributeFormat, VertexBufferLayout,
    VertexInputLayout, VertexStepMode, gl_compare,
};
pub use uniforms::{SamplerEntry, UniformEntry};

pub(crate) use uniforms::upload_uniform;

/// Backend state a pipeline creation works against.
pub(crate) struct PipelineContext<'a> {
    pub driver: &'a dyn GlDriver,
    pub caps: &'a Capabilities,
    pub compile_cache: &'a mut ShaderCompileCache,
    pub blob_cache: &'a mut PipelineBlobCache,
    pub disk_cache: Option<&'a dyn ShaderBinaryCache>,
    /// Keep fresh binaries in the blob cache for export.
    pub save_to_blob_cache: bool,
    pub release_queue: &'a Arc<DeferredReleaseQueue>,
    /// Stamp for the pipeline being created.
    pub generation: u64,
}

/// Where a linked program came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramSource {
    /// Compiled and linked from source.
    Compiled,
    /// Loaded from the in-memory pipeline blob cache.
    BlobCache,
    /// Loaded from the on-disk shader binary cache.
    DiskCache,
}

/// A linked program and its tables.
#[derive(Debug)]
pub(crate) struct LinkedProgram {
    pub program: GlHandle,
    pub key: PipelineCacheKey,
    pub source: ProgramSource,
    pub uniforms: Vec<UniformEntry>,
    pub samplers: Vec<SamplerEntry>,
}

/// Build a linked program for `stages`.
///
/// `attributes` are the vertex attribute name to location bindings applied
/// before linking; they take part in the cache key.
pub(crate) fn link_program(
    ctx: &mut PipelineContext<'_>,
    stages: &[&Shader],
    attributes: &[(String, u32)],
    label: Option<&str>,
) -> Result<LinkedProgram, GraphicsError> {
    profile_scope!("link_program");

    let candidates = ctx.caps.shader_version_candidates();
    let mut sources: Vec<(ShaderStage, &str)> = Vec::with_capacity(stages.len());
    for shader in stages {
        let (_, source) = select_variant(shader, &candidates)?;
        sources.push((shader.stage(), source));
    }
    let key = PipelineCacheKey::compute(&sources, attributes);

    let (program, source) = match load_cached_program(ctx, &key)? {
        Some(loaded) => loaded,
        None => (build_from_source(ctx, &sources, attributes, label)?, ProgramSource::Compiled),
    };

    let mut builder = uniforms::UniformTableBuilder::new(ctx.driver, program);
    for shader in stages {
        builder.add_stage(shader.description(), shader.separate_to_combined());
    }
    let (uniforms, samplers) = builder.finish();

    if source == ProgramSource::Compiled {
        save_program(ctx, &key, program);
    }

    log::debug!(
        "Pipeline: linked program {} for {:?} ({:?}, {} uniforms, {} samplers)",
        program,
        label,
        source,
        uniforms.len(),
        samplers.len()
    );
    Ok(LinkedProgram {
        program,
        key,
        source,
        uniforms,
        samplers,
    })
}

/// Try the blob cache, then the disk cache.
fn load_cached_program(
    ctx: &mut PipelineContext<'_>,
    key: &PipelineCacheKey,
) -> Result<Option<(GlHandle, ProgramSource)>, GraphicsError> {
    if !ctx.caps.program_binary {
        return Ok(None);
    }

    if let Some(binary) = ctx.blob_cache.get(key).cloned() {
        if let Some(program) = try_program_binary(ctx.driver, &binary) {
            log::trace!("Pipeline: blob cache hit for {}", key.to_hex());
            return Ok(Some((program, ProgramSource::BlobCache)));
        }
        log::debug!("Pipeline: dropping unusable blob cache entry {}", key.to_hex());
        ctx.blob_cache.remove(key);
    }

    if let Some(disk) = ctx.disk_cache
        && let Some(binary) = disk.load(key)
    {
        if let Some(program) = try_program_binary(ctx.driver, &binary) {
            log::trace!("Pipeline: disk cache hit for {}", key.to_hex());
            if ctx.save_to_blob_cache {
                ctx.blob_cache.insert(*key, binary);
            }
            return Ok(Some((program, ProgramSource::DiskCache)));
        }
        log::debug!("Pipeline: disk cache entry {} did not link", key.to_hex());
    }
    Ok(None)
}

/// Load `binary` into a fresh program and keep it only if it links. Any
/// driver failure counts as a miss.
fn try_program_binary(driver: &dyn GlDriver, binary: &ProgramBinary) -> Option<GlHandle> {
    let program = match driver.create_program() {
        Ok(program) => program,
        Err(e) => {
            log::warn!("Pipeline: cannot create a program for a cached binary: {}", e);
            return None;
        }
    };
    // Clear stale errors so only the load's own error is seen.
    for _ in 0..8 {
        if driver.get_error() == glow::NO_ERROR {
            break;
        }
    }
    driver.program_binary(program, binary);
    let error = driver.get_error();
    if error == glow::NO_ERROR && driver.get_program_link_status(program) {
        return Some(program);
    }
    driver.delete_program(program);
    None
}

fn build_from_source(
    ctx: &mut PipelineContext<'_>,
    sources: &[(ShaderStage, &str)],
    attributes: &[(String, u32)],
    label: Option<&str>,
) -> Result<GlHandle, GraphicsError> {
    let mut shaders = Vec::with_capacity(sources.len());
    for (stage, source) in sources {
        shaders.push(
            ctx.compile_cache
                .compile(ctx.driver, *stage, source, ctx.release_queue)?,
        );
    }

    let program = ctx
        .driver
        .create_program()
        .map_err(GraphicsError::ResourceCreationFailed)?;
    for shader in &shaders {
        ctx.driver.attach_shader(program, *shader);
    }
    for (name, location) in attributes {
        ctx.driver.bind_attrib_location(program, *location, name);
    }
    if ctx.caps.program_binary && (ctx.save_to_blob_cache || ctx.disk_cache.is_some()) {
        ctx.driver.program_binary_retrievable_hint(program);
    }
    ctx.driver.link_program(program);
    let linked = ctx.driver.get_program_link_status(program);
    for shader in &shaders {
        ctx.driver.detach_shader(program, *shader);
    }

    if !linked {
        let info = ctx.driver.get_program_info_log(program);
        ctx.driver.delete_program(program);
        log::error!("Pipeline: failed to link program for {:?}:\n{}", label, info);
        return Err(GraphicsError::ProgramLink(info.trim().to_string()));
    }
    Ok(program)
}

fn save_program(ctx: &mut PipelineContext<'_>, key: &PipelineCacheKey, program: GlHandle) {
    if !ctx.caps.program_binary || !(ctx.save_to_blob_cache || ctx.disk_cache.is_some()) {
        return;
    }
    let Some(binary) = ctx.driver.get_program_binary(program) else {
        log::debug!("Pipeline: driver returned no binary for program {}", program);
        return;
    };
    if let Some(disk) = ctx.disk_cache {
        disk.save(key, &binary);
    }
    if ctx.save_to_blob_cache {
        ctx.blob_cache.insert(*key, binary);
    }
}

/// Queue `program` for deletion.
pub(crate) fn release_program(queue: &DeferredReleaseQueue, program: GlHandle) {
    queue.push(DeferredRelease::Program(program));
}
