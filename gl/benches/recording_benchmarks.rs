use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_core::shader::{InOutVariable, Shader, ShaderDescription, ShaderStage, ShaderVersion, VariableType};
use redlilium_gl::driver::DummyDriver;
use redlilium_gl::pipeline::{
    GraphicsPipelineDescriptor, VertexAttribute, VertexAttributeFormat, VertexBufferLayout,
    VertexInputLayout,
};
use redlilium_gl::resources::{ColorAttachment, TextureRenderTargetDescriptor};
use redlilium_gl::{
    BufferDescriptor, BufferType, BufferUsage, CommandBuffer, GlRhi, HeadlessContext,
    RenderTarget, ResourceUpdateBatch, RhiParameters, TextureDescriptor, TextureFlags,
    TextureFormat,
};

const DRAWS: u32 = 256;

const VS: &str = "#version 330\nin vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }\n";
const FS: &str = "#version 330\nout vec4 color;\nvoid main() { color = vec4(1.0); }\n";

struct Scene {
    rhi: GlRhi,
    driver: DummyDriver,
    target: RenderTarget,
    pipeline: Arc<redlilium_gl::GraphicsPipeline>,
    vertices: Arc<redlilium_gl::Buffer>,
}

fn scene() -> Scene {
    let driver = DummyDriver::new();
    let mut rhi = GlRhi::create(
        RhiParameters::new(),
        Box::new(driver.clone()),
        Box::new(HeadlessContext::new()),
        None,
    )
    .unwrap();
    let color = rhi
        .create_texture(&TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Rgba8,
            TextureFlags::RENDER_TARGET,
        ))
        .unwrap();
    let target = rhi
        .create_texture_render_target(
            TextureRenderTargetDescriptor::new().with_color(ColorAttachment::texture(color)),
        )
        .unwrap();
    let vs_desc = ShaderDescription::new().with_input(InOutVariable::new("position", VariableType::Vec3, 0));
    let pipeline = rhi
        .create_graphics_pipeline(
            &GraphicsPipelineDescriptor::new()
                .with_stage(Shader::new(ShaderStage::Vertex, vs_desc).with_source(ShaderVersion::glsl(330), VS))
                .with_stage(
                    Shader::new(ShaderStage::Fragment, ShaderDescription::new())
                        .with_source(ShaderVersion::glsl(330), FS),
                )
                .with_vertex_input(
                    VertexInputLayout::new()
                        .with_binding(VertexBufferLayout::new(12))
                        .with_attribute(VertexAttribute::new(0, 0, VertexAttributeFormat::Float3, 0)),
                ),
        )
        .unwrap();
    let vertices = rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 36))
        .unwrap();
    Scene {
        rhi,
        driver,
        target: RenderTarget::Texture(target),
        pipeline,
        vertices,
    }
}

fn record_draws(cb: &mut CommandBuffer, scene: &Scene) {
    cb.begin_pass(&scene.target, [0.0; 4], Default::default(), None);
    for i in 0..DRAWS {
        // Same pipeline and vertex input every draw: all but the first bind are elided.
        cb.set_graphics_pipeline(&scene.pipeline);
        cb.set_vertex_input(0, &[(&scene.vertices, 0)], None);
        cb.set_stencil_ref(i % 4);
        cb.draw(3, 1, 0, 0);
    }
    cb.end_pass(None);
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

fn bench_record_draws(c: &mut Criterion) {
    let scene = scene();
    let mut cb = CommandBuffer::new();

    c.bench_function("record_256_draws_with_elision", |b| {
        b.iter(|| {
            cb.reset_commands();
            record_draws(&mut cb, &scene);
            black_box(cb.len());
        });
    });
}

fn bench_record_uploads(c: &mut Criterion) {
    let mut scene = scene();
    let buffer = scene
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Dynamic, BufferUsage::VERTEX, 4096))
        .unwrap();
    let payload = vec![7u8; 64];
    let mut cb = CommandBuffer::new();

    c.bench_function("record_64_buffer_updates", |b| {
        b.iter(|| {
            cb.reset_commands();
            let mut batch = ResourceUpdateBatch::new();
            for i in 0..64 {
                batch.update_dynamic_buffer(&buffer, i * 64, &payload);
            }
            cb.resource_update(batch);
            black_box(cb.retained_bytes());
        });
    });
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

fn bench_record_and_replay(c: &mut Criterion) {
    let mut scene = scene();

    c.bench_function("dummy_frame_256_draws", |b| {
        b.iter(|| {
            let (_, mut cb) = scene.rhi.begin_offscreen_frame();
            record_draws(&mut cb, &scene);
            black_box(scene.rhi.end_offscreen_frame(cb));
            scene.driver.clear_calls();
        });
    });
}

criterion_group!(
    benches,
    bench_record_draws,
    bench_record_uploads,
    bench_record_and_replay,
);
criterion_main!(benches);
