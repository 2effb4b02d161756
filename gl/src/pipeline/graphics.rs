//! Graphics pipelines.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use redlilium_core::profiling::profile_scope;
use redlilium_core::shader::{Shader, ShaderStage};

use super::state::{
    CullMode, DepthBias, DepthStencilState, FrontFace, PolygonMode, PrimitiveTopology,
    TargetBlend, VertexInputLayout,
};
use super::{PipelineContext, ProgramSource, SamplerEntry, UniformEntry, link_program};
use crate::bindings::{BindingResource, ShaderResourceBindings};
use crate::cache::PipelineCacheKey;
use crate::driver::GlHandle;
use crate::error::GraphicsError;
use crate::release::DeferredReleaseQueue;
use crate::resources::RenderPassDescriptor;
use crate::shader::stage_supported;

/// Descriptor for creating a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: Option<String>,
    pub stages: Vec<Shader>,
    pub vertex_input: VertexInputLayout,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    pub line_width: f32,
    pub depth_stencil: DepthStencilState,
    pub depth_bias: DepthBias,
    /// Blending per color attachment.
    pub targets: Vec<TargetBlend>,
    pub sample_count: u32,
    /// Vertices per patch when tessellating.
    pub patch_control_points: u32,
    /// Layout the shaders' bindings are checked against.
    pub shader_resource_bindings: Option<Arc<ShaderResourceBindings>>,
    /// Render pass the pipeline will be used with.
    pub render_pass: Option<RenderPassDescriptor>,
}

impl Default for GraphicsPipelineDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            stages: Vec::new(),
            vertex_input: VertexInputLayout::default(),
            topology: PrimitiveTopology::Triangles,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            polygon_mode: PolygonMode::Fill,
            line_width: 1.0,
            depth_stencil: DepthStencilState::default(),
            depth_bias: DepthBias::default(),
            targets: vec![TargetBlend::default()],
            sample_count: 1,
            patch_control_points: 0,
            shader_resource_bindings: None,
            render_pass: None,
        }
    }
}

impl GraphicsPipelineDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_stage(mut self, shader: Shader) -> Self {
        self.stages.push(shader);
        self
    }

    pub fn with_vertex_input(mut self, layout: VertexInputLayout) -> Self {
        self.vertex_input = layout;
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    pub fn with_depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = state;
        self
    }

    pub fn with_depth_bias(mut self, bias: DepthBias) -> Self {
        self.depth_bias = bias;
        self
    }

    pub fn with_targets(mut self, targets: Vec<TargetBlend>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    pub fn with_patch_control_points(mut self, count: u32) -> Self {
        self.patch_control_points = count;
        self
    }

    pub fn with_shader_resource_bindings(mut self, srb: Arc<ShaderResourceBindings>) -> Self {
        self.shader_resource_bindings = Some(srb);
        self
    }

    pub fn with_render_pass(mut self, render_pass: RenderPassDescriptor) -> Self {
        self.render_pass = Some(render_pass);
        self
    }

    fn stage(&self, stage: ShaderStage) -> Option<&Shader> {
        self.stages.iter().find(|s| s.stage() == stage)
    }
}

/// Immutable state the executor applies when a graphics pipeline is bound.
///
/// Commands hold it through an `Arc`, so replay never reaches back into the
/// pipeline object.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineState {
    pub program: GlHandle,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    pub line_width: f32,
    pub depth_stencil: DepthStencilState,
    pub depth_bias: DepthBias,
    pub blend: TargetBlend,
    pub patch_control_points: u32,
    pub vertex_input: VertexInputLayout,
    pub uniforms: Vec<UniformEntry>,
    pub samplers: Vec<SamplerEntry>,
}

/// A linked graphics pipeline.
///
/// Created by [`GlRhi::create_graphics_pipeline`](crate::GlRhi::create_graphics_pipeline).
/// A failed creation returns an error and leaves nothing to bind.
pub struct GraphicsPipeline {
    id: u64,
    generation: u64,
    label: Option<String>,
    program: AtomicU32,
    cache_key: PipelineCacheKey,
    program_source: ProgramSource,
    state: Arc<GraphicsPipelineState>,
    release_queue: Arc<DeferredReleaseQueue>,
}

impl GraphicsPipeline {
    pub(crate) fn create(
        ctx: &mut PipelineContext<'_>,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<Self, GraphicsError> {
        profile_scope!("create_graphics_pipeline");
        validate(ctx, desc)?;

        let vertex = desc
            .stage(ShaderStage::Vertex)
            .ok_or_else(|| GraphicsError::Validation("missing vertex stage".into()))?;
        let attributes = attribute_bindings(desc, vertex);

        // Link order follows the pipeline stage order so equal stage sets
        // produce equal programs regardless of descriptor order.
        let mut stages: Vec<&Shader> = desc.stages.iter().collect();
        stages.sort_by_key(|s| s.stage());
        let linked = link_program(ctx, &stages, &attributes, desc.label.as_deref())?;

        let blend = desc.targets.first().copied().unwrap_or_default();
        if desc.targets.len() > 1 && desc.targets.iter().any(|t| *t != blend) {
            log::warn!(
                "GraphicsPipeline: {:?} has per-target blend state, only the first target's is applied",
                desc.label
            );
        }

        let state = GraphicsPipelineState {
            program: linked.program,
            topology: desc.topology,
            cull_mode: desc.cull_mode,
            front_face: desc.front_face,
            polygon_mode: desc.polygon_mode,
            line_width: desc.line_width,
            depth_stencil: desc.depth_stencil,
            depth_bias: desc.depth_bias,
            blend,
            patch_control_points: desc.patch_control_points,
            vertex_input: desc.vertex_input.clone(),
            uniforms: linked.uniforms,
            samplers: linked.samplers,
        };

        log::debug!(
            "GraphicsPipeline: created {:?} (program {}, generation {})",
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

    /// Creation stamp; bound-state checks compare it with the id.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// GL program name, 0 once destroyed.
    pub fn program(&self) -> GlHandle {
        self.program.load(Ordering::Acquire)
    }

    pub fn cache_key(&self) -> &PipelineCacheKey {
        &self.cache_key
    }

    /// Where the program came from.
    pub fn program_source(&self) -> ProgramSource {
        self.program_source
    }

    pub fn uniforms(&self) -> &[UniformEntry] {
        &self.state.uniforms
    }

    pub fn samplers(&self) -> &[SamplerEntry] {
        &self.state.samplers
    }

    pub fn state(&self) -> &Arc<GraphicsPipelineState> {
        &self.state
    }

    /// Queue the program for deletion. Safe to call more than once.
    pub fn destroy(&self) {
        let program = self.program.swap(0, Ordering::AcqRel);
        if program != 0 {
            log::debug!("GraphicsPipeline: queued program {} for release", program);
            super::release_program(&self.release_queue, program);
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("label", &self.label)
            .field("program", &self.program())
            .field("source", &self.program_source)
            .finish()
    }
}

// Ensure GraphicsPipeline is Send + Sync
static_assertions::assert_impl_all!(GraphicsPipeline: Send, Sync);

fn validate(ctx: &PipelineContext<'_>, desc: &GraphicsPipelineDescriptor) -> Result<(), GraphicsError> {
    let fail = |message: String| {
        log::warn!("GraphicsPipeline: {:?}: {}", desc.label, message);
        Err(GraphicsError::Validation(message))
    };

    if desc.stage(ShaderStage::Vertex).is_none() || desc.stage(ShaderStage::Fragment).is_none() {
        return fail("a graphics pipeline needs a vertex and a fragment stage".into());
    }
    let mut seen = Vec::new();
    for shader in &desc.stages {
        let stage = shader.stage();
        if stage == ShaderStage::Compute {
            return fail("compute stage in a graphics pipeline".into());
        }
        if seen.contains(&stage) {
            return fail(format!("{} stage given twice", stage.name()));
        }
        seen.push(stage);
        if !stage_supported(stage, ctx.caps) {
            log::warn!(
                "GraphicsPipeline: {} shaders are not supported by this context",
                stage.name()
            );
            return Err(GraphicsError::FeatureNotSupported(format!(
                "{} shaders",
                stage.name()
            )));
        }
    }
    let tessellating = seen.contains(&ShaderStage::TessellationEvaluation);
    if tessellating != seen.contains(&ShaderStage::TessellationControl) {
        return fail("tessellation needs both control and evaluation stages".into());
    }
    if tessellating && (desc.topology != PrimitiveTopology::Patches || desc.patch_control_points == 0) {
        return fail("tessellation needs patch topology and a control point count".into());
    }
    if desc.polygon_mode == PolygonMode::Line && !ctx.caps.polygon_mode {
        log::warn!("GraphicsPipeline: line polygon mode is not supported, filling instead");
    }

    let layout = &desc.vertex_input;
    for attribute in &layout.attributes {
        if attribute.binding as usize >= layout.bindings.len() {
            return fail(format!(
                "attribute at location {} reads missing binding {}",
                attribute.location, attribute.binding
            ));
        }
        if ctx.caps.max_vertex_attribs > 0 && attribute.location >= ctx.caps.max_vertex_attribs {
            return fail(format!(
                "attribute location {} exceeds the {} supported",
                attribute.location, ctx.caps.max_vertex_attribs
            ));
        }
        if attribute.format.is_integer() && !ctx.caps.int_attributes {
            return Err(GraphicsError::FeatureNotSupported("integer vertex attributes".into()));
        }
        if attribute.format.is_half() && !ctx.caps.half_attributes {
            return Err(GraphicsError::FeatureNotSupported("half float vertex attributes".into()));
        }
    }
    if layout
        .bindings
        .iter()
        .any(|b| b.step_mode == super::VertexStepMode::Instance)
        && !ctx.caps.instancing
    {
        return Err(GraphicsError::FeatureNotSupported("instanced vertex input".into()));
    }

    if let Some(srb) = &desc.shader_resource_bindings {
        check_layout(desc, srb).or_else(fail)?;
    }
    Ok(())
}

/// Every binding the shaders declare must exist in the layout with a
/// matching kind.
fn check_layout(desc: &GraphicsPipelineDescriptor, srb: &ShaderResourceBindings) -> Result<(), String> {
    for shader in &desc.stages {
        let reflection = shader.description();
        for block in &reflection.uniform_blocks {
            match srb.find(block.binding).map(|b| &b.resource) {
                Some(BindingResource::UniformBuffer { .. }) => {}
                other => {
                    return Err(format!(
                        "uniform block {} expects a uniform buffer at binding {}, layout has {}",
                        block.block_name,
                        block.binding,
                        other.map_or("nothing", |r| r.kind_name())
                    ));
                }
            }
        }
        for sampler in &reflection.combined_image_samplers {
            match srb.find(sampler.binding).map(|b| &b.resource) {
                Some(BindingResource::SampledTexture { .. }) => {}
                other => {
                    return Err(format!(
                        "sampler {} expects a sampled texture at binding {}, layout has {}",
                        sampler.name,
                        sampler.binding,
                        other.map_or("nothing", |r| r.kind_name())
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Attribute name to location pairs, names from the layout or reflection.
fn attribute_bindings(desc: &GraphicsPipelineDescriptor, vertex: &Shader) -> Vec<(String, u32)> {
    let inputs = &vertex.description().input_variables;
    let mut out: Vec<(String, u32)> = desc
        .vertex_input
        .attributes
        .iter()
        .filter_map(|attribute| {
            if !attribute.name.is_empty() {
                return Some((attribute.name.clone(), attribute.location));
            }
            inputs
                .iter()
                .find(|v| v.location == attribute.location as i32)
                .map(|v| (v.name.clone(), attribute.location))
        })
        .collect();
    out.sort_by_key(|(_, location)| *location);
    out.dedup();
    out
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::cache::{DiskShaderCache, PipelineBlobCache, ShaderBinaryCache};
    use crate::caps::Capabilities;
    use crate::driver::dummy::DummyProfile;
    use crate::driver::{DummyCall, DummyDriver, GlDriver};
    use crate::pipeline::{VertexAttribute, VertexAttributeFormat, VertexBufferLayout};
    use crate::shader::ShaderCompileCache;
    use redlilium_core::shader::{InOutVariable, ShaderDescription, ShaderVersion, VariableType};

    const VS: &str = "#version 330\nin vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }";
    const FS: &str = "#version 330\nout vec4 color;\nvoid main() { color = vec4(1.0); }";

    struct Fixture {
        driver: DummyDriver,
        caps: Capabilities,
        compile_cache: ShaderCompileCache,
        blob_cache: PipelineBlobCache,
        queue: Arc<DeferredReleaseQueue>,
    }

    impl Fixture {
        fn new() -> Self {
            let driver = DummyDriver::with_profile(DummyProfile::desktop_gl46());
            let caps = Capabilities::detect(&driver).unwrap();
            Self {
                driver,
                caps,
                compile_cache: ShaderCompileCache::new(16),
                blob_cache: PipelineBlobCache::new("dummy"),
                queue: Arc::new(DeferredReleaseQueue::new()),
            }
        }

        fn create(
            &mut self,
            desc: &GraphicsPipelineDescriptor,
            save: bool,
            disk: Option<&dyn ShaderBinaryCache>,
        ) -> Result<GraphicsPipeline, GraphicsError> {
            let mut ctx = PipelineContext {
                driver: &self.driver,
                caps: &self.caps,
                compile_cache: &mut self.compile_cache,
                blob_cache: &mut self.blob_cache,
                disk_cache: disk,
                save_to_blob_cache: save,
                release_queue: &self.queue,
                generation: 7,
            };
            GraphicsPipeline::create(&mut ctx, desc)
        }
    }

    fn descriptor(location: u32) -> GraphicsPipelineDescriptor {
        let vs_desc = ShaderDescription::new()
            .with_input(InOutVariable::new("position", VariableType::Vec3, location as i32));
        GraphicsPipelineDescriptor::new()
            .with_stage(Shader::new(ShaderStage::Vertex, vs_desc).with_source(ShaderVersion::glsl(330), VS))
            .with_stage(
                Shader::new(ShaderStage::Fragment, ShaderDescription::new())
                    .with_source(ShaderVersion::glsl(330), FS),
            )
            .with_vertex_input(
                VertexInputLayout::new()
                    .with_binding(VertexBufferLayout::new(12))
                    .with_attribute(VertexAttribute::new(location, 0, VertexAttributeFormat::Float3, 0)),
            )
    }

    #[test]
    fn test_create_binds_reflected_attribute_names() {
        let mut fx = Fixture::new();
        let pipeline = fx.create(&descriptor(2), false, None).unwrap();
        assert_ne!(pipeline.program(), 0);
        assert_eq!(pipeline.generation(), 7);
        assert_eq!(pipeline.program_source(), ProgramSource::Compiled);
        assert_eq!(
            fx.driver.attrib_bindings(pipeline.program()),
            vec![("position".to_string(), 2)]
        );
    }

    #[test]
    fn test_missing_fragment_stage_is_rejected() {
        let mut fx = Fixture::new();
        let mut desc = descriptor(0);
        desc.stages.truncate(1);
        let before = fx.driver.live_programs();
        assert!(matches!(
            fx.create(&desc, false, None),
            Err(GraphicsError::Validation(_))
        ));
        assert_eq!(fx.driver.live_programs(), before);
    }

    #[test]
    fn test_compile_failure_surfaces_log_and_leaks_nothing() {
        let mut fx = Fixture::new();
        let mut desc = descriptor(0);
        desc.stages[1] = Shader::new(ShaderStage::Fragment, ShaderDescription::new())
            .with_source(ShaderVersion::glsl(330), "#error broken fragment\n");
        let err = fx.create(&desc, false, None).unwrap_err();
        assert!(matches!(err, GraphicsError::ShaderCompilation(_)));
        assert_eq!(fx.driver.live_programs(), 0);
    }

    #[test]
    fn test_blob_cache_hit_skips_compile() {
        let mut fx = Fixture::new();
        let first = fx.create(&descriptor(0), true, None).unwrap();
        assert_eq!(fx.blob_cache.len(), 1);
        assert!(fx.blob_cache.contains(first.cache_key()));

        fx.driver.clear_calls();
        let second = fx.create(&descriptor(0), true, None).unwrap();
        assert_eq!(second.program_source(), ProgramSource::BlobCache);
        assert_eq!(
            fx.driver.count_calls(|c| matches!(c, DummyCall::LinkProgram(_))),
            0
        );
        assert_eq!(first.cache_key(), second.cache_key());
    }

    #[test]
    fn test_corrupt_blob_entry_falls_back_to_compile() {
        let mut fx = Fixture::new();
        let first = fx.create(&descriptor(0), true, None).unwrap();
        let key = *first.cache_key();
        fx.blob_cache.insert(
            key,
            crate::driver::ProgramBinary {
                format: 0xdead,
                data: vec![1, 2, 3],
            },
        );
        let second = fx.create(&descriptor(0), true, None).unwrap();
        assert_eq!(second.program_source(), ProgramSource::Compiled);
        assert_ne!(second.program(), 0);
        // Recompiling refreshed the entry with a usable binary.
        assert_ne!(fx.blob_cache.get(&key).map(|b| b.format), Some(0xdead));
    }

    #[test]
    fn test_disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskShaderCache::new(dir.path(), "dummy").unwrap();
        let mut fx = Fixture::new();
        let first = fx.create(&descriptor(1), false, Some(&disk as &dyn ShaderBinaryCache)).unwrap();
        assert!(disk.load(first.cache_key()).is_some());
        assert!(fx.blob_cache.is_empty());

        let second = fx.create(&descriptor(1), false, Some(&disk as &dyn ShaderBinaryCache)).unwrap();
        assert_eq!(second.program_source(), ProgramSource::DiskCache);
    }

    #[test]
    fn test_destroy_defers_program_deletion() {
        let mut fx = Fixture::new();
        let pipeline = fx.create(&descriptor(0), false, None).unwrap();
        let programs = fx.driver.live_programs();
        pipeline.destroy();
        pipeline.destroy();
        assert_eq!(pipeline.program(), 0);
        assert_eq!(fx.driver.live_programs(), programs);
        assert_eq!(fx.queue.len(), 1);
        fx.queue.drain(&fx.driver);
        assert_eq!(fx.driver.live_programs(), programs - 1);
    }
}
