//! Rendering tests against a real driver through a headless EGL context.
//!
//! Built only with the `egl` feature. Each test skips when libEGL or a GLES 3
//! capable display is not available.
//!
//! Run with: `cargo test -p redlilium-gl --features egl --test real_gl_tests`

use std::sync::Arc;

use parking_lot::Mutex;

use redlilium_core::shader::{
    BlockVariable, InOutVariable, Shader, ShaderDescription, ShaderStage, ShaderVersion,
    UniformBlock, VariableType,
};
use redlilium_gl::command::{
    TextureReadbackDescription, TextureReadbackResult, TextureUploadDescription,
};
use redlilium_gl::pipeline::{
    GraphicsPipelineDescriptor, PrimitiveTopology, VertexAttribute, VertexAttributeFormat,
    VertexBufferLayout, VertexInputLayout,
};
use redlilium_gl::platform::{ContextProvider, EglContext};
use redlilium_gl::resources::{ColorAttachment, TextureRenderTargetDescriptor};
use redlilium_gl::types::{AddressMode, Viewport};
use redlilium_gl::{
    Binding, BufferDescriptor, BufferType, BufferUsage, FrameOpResult, GlRhi, RenderTarget,
    ResourceUpdateBatch, RhiParameters, SamplerDescriptor, ShaderStageFlags, TextureDescriptor,
    TextureFlags, TextureFormat,
};

const SIZE: u32 = 64;

fn create_rhi() -> Option<GlRhi> {
    let _ = env_logger::builder().is_test(true).try_init();

    let context = match EglContext::new(SIZE, SIZE) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("EGL not available, skipping: {e}");
            return None;
        }
    };
    if let Err(e) = context.make_current(None) {
        eprintln!("EGL context could not be made current, skipping: {e}");
        return None;
    }
    let driver = context.create_driver();
    match GlRhi::create(RhiParameters::new(), Box::new(driver), Box::new(context), None) {
        Ok(rhi) => Some(rhi),
        Err(e) => {
            eprintln!("GLES 3 backend not available, skipping: {e}");
            None
        }
    }
}

const VS: &str = "#version 300 es
in vec2 position;
out vec2 v_uv;
void main() {
    v_uv = position * 0.5 + 0.5;
    gl_Position = vec4(position, 0.0, 1.0);
}
";

const FS: &str = "#version 300 es
precision mediump float;
struct Params { vec4 tint; };
uniform Params params;
uniform sampler2D tex;
in vec2 v_uv;
out vec4 color;
void main() { color = texture(tex, v_uv) * params.tint; }
";

fn textured_quad_pipeline() -> GraphicsPipelineDescriptor {
    let vs_desc = ShaderDescription::new()
        .with_input(InOutVariable::new("position", VariableType::Vec2, 0));
    let fs_desc = ShaderDescription::new()
        .with_uniform_block(UniformBlock {
            block_name: "ParamsBlock".into(),
            struct_name: "params".into(),
            size: 16,
            binding: 0,
            descriptor_set: 0,
            members: vec![BlockVariable::new("tint", VariableType::Vec4, 0, 16)],
        })
        .with_combined_sampler(InOutVariable::new("tex", VariableType::Sampler2D, -1).with_binding(1));

    GraphicsPipelineDescriptor::new()
        .with_stage(Shader::new(ShaderStage::Vertex, vs_desc).with_source(ShaderVersion::gles(300), VS))
        .with_stage(Shader::new(ShaderStage::Fragment, fs_desc).with_source(ShaderVersion::gles(300), FS))
        .with_topology(PrimitiveTopology::TriangleStrip)
        .with_vertex_input(
            VertexInputLayout::new()
                .with_binding(VertexBufferLayout::new(8))
                .with_attribute(VertexAttribute::new(0, 0, VertexAttributeFormat::Float2, 0)),
        )
}

#[test]
fn test_textured_quad_samples_each_quadrant() {
    let Some(mut rhi) = create_rhi() else {
        return;
    };

    // Rows are bottom-up: texel (0, 0) lands in the bottom-left quadrant.
    let texels: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 255, 255],
    ];
    let source = rhi
        .create_texture(&TextureDescriptor::new_2d(2, 2, TextureFormat::Rgba8, TextureFlags::empty()))
        .unwrap();
    let sampler = rhi.create_sampler(&SamplerDescriptor::nearest().with_address_mode(AddressMode::Repeat));
    let color = rhi
        .create_texture(&TextureDescriptor::new_2d(
            SIZE,
            SIZE,
            TextureFormat::Rgba8,
            TextureFlags::RENDER_TARGET,
        ))
        .unwrap();
    let target = rhi
        .create_texture_render_target(
            TextureRenderTargetDescriptor::new().with_color(ColorAttachment::texture(Arc::clone(&color))),
        )
        .unwrap();

    let quad: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
    let vertices = rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Immutable, BufferUsage::VERTEX, 32))
        .unwrap();
    let uniforms = rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, 16))
        .unwrap();
    let pipeline = rhi.create_graphics_pipeline(&textured_quad_pipeline()).unwrap();
    let mut srb = rhi.new_shader_resource_bindings().with_bindings(vec![
        Binding::uniform_buffer(0, ShaderStageFlags::FRAGMENT, Arc::clone(&uniforms)),
        Binding::sampled_texture(1, ShaderStageFlags::FRAGMENT, Arc::clone(&source), sampler),
    ]);
    srb.create().unwrap();

    let result: Arc<Mutex<Option<TextureReadbackResult>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&result);

    let (status, mut cb) = rhi.begin_offscreen_frame();
    assert_eq!(status, FrameOpResult::Success);

    let mut setup = ResourceUpdateBatch::new();
    setup.upload_texture(&source, TextureUploadDescription::whole_image(texels.concat()));
    setup.upload_static_buffer(&vertices, 0, bytemuck::cast_slice(&quad));
    setup.update_dynamic_buffer(&uniforms, 0, bytemuck::cast_slice(&[1.0f32; 4]));

    let mut readback = ResourceUpdateBatch::new();
    readback.read_back_texture(TextureReadbackDescription::texture(Arc::clone(&color)), move |r| {
        *slot.lock() = Some(r);
    });

    let target = RenderTarget::Texture(target);
    cb.begin_pass(&target, [0.0, 0.0, 0.0, 1.0], Default::default(), Some(setup));
    cb.set_graphics_pipeline(&pipeline);
    cb.set_viewport(Viewport::from_dimensions(SIZE, SIZE));
    cb.set_vertex_input(0, &[(&vertices, 0)], None);
    cb.set_shader_resources(&srb, &[]);
    cb.draw(4, 1, 0, 0);
    cb.end_pass(Some(readback));
    assert_eq!(rhi.end_offscreen_frame(cb), FrameOpResult::Success);

    let image = result.lock().take().expect("readback callback ran");
    assert_eq!(image.pixel_size, (SIZE, SIZE));
    let pixel = |x: u32, y: u32| {
        let i = ((y * SIZE + x) * 4) as usize;
        [image.data[i], image.data[i + 1], image.data[i + 2], image.data[i + 3]]
    };
    let q = SIZE / 4;
    assert_eq!(pixel(q, q), texels[0], "bottom left");
    assert_eq!(pixel(SIZE - q, q), texels[1], "bottom right");
    assert_eq!(pixel(q, SIZE - q), texels[2], "top left");
    assert_eq!(pixel(SIZE - q, SIZE - q), texels[3], "top right");
}

#[test]
fn test_real_context_reports_gles_capabilities() {
    let Some(rhi) = create_rhi() else {
        return;
    };
    let caps = rhi.capabilities();
    assert!(caps.version.gles);
    assert!(caps.version.major >= 3);
    assert!(caps.max_texture_units >= 16);
    assert!(!caps.renderer.is_empty());
}
