//! End-to-end backend tests over the software driver.
//!
//! Tests are parameterized using `rstest` to run against several emulated
//! context profiles, from desktop GL 4.6 core down to GLES 2.0.
//!
//! Run with: `cargo test -p redlilium-gl --test backend_tests`

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use rstest::rstest;

use redlilium_core::shader::{
    InOutVariable, Shader, ShaderDescription, ShaderStage, ShaderVersion, VariableType,
};

use common::{Profile, TestContext, solid_rgba8, tinted_pipeline_descriptor};
use redlilium_gl::command::{
    BufferReadbackResult, TextureReadbackDescription, TextureReadbackResult,
    TextureUploadDescription,
};
use redlilium_gl::driver::DummyCall;
use redlilium_gl::pipeline::{
    GraphicsPipelineDescriptor, VertexAttribute, VertexAttributeFormat, VertexBufferLayout,
    VertexInputLayout,
};
use redlilium_gl::types::IndexFormat;
use redlilium_gl::{
    Binding, BufferDescriptor, BufferType, BufferUsage, FrameOpResult, GraphicsError,
    ResourceUpdateBatch, SamplerDescriptor, ShaderStageFlags, TextureDescriptor, TextureFlags,
    TextureFormat,
};

// ============================================================================
// Uploads and readbacks
// ============================================================================

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gl33(Profile::DesktopGl33)]
#[case::gles32(Profile::Gles32)]
#[case::gles20(Profile::Gles20)]
#[case::webgl2(Profile::WebGl2)]
fn test_texture_upload_readback_roundtrip(#[case] profile: Profile) {
    let mut ctx = TestContext::new(profile);
    let texture = ctx
        .rhi
        .create_texture(&TextureDescriptor::new_2d(
            256,
            256,
            TextureFormat::Rgba8,
            TextureFlags::empty(),
        ))
        .unwrap();
    let red = solid_rgba8(256, 256, [255, 0, 0, 255]);

    let result: Arc<Mutex<Option<TextureReadbackResult>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&result);

    let (status, mut cb) = ctx.rhi.begin_offscreen_frame();
    assert_eq!(status, FrameOpResult::Success);
    let mut batch = ResourceUpdateBatch::new();
    batch.upload_texture(&texture, TextureUploadDescription::whole_image(red.clone()));
    batch.read_back_texture(TextureReadbackDescription::texture(Arc::clone(&texture)), move |r| {
        *slot.lock() = Some(r);
    });
    cb.resource_update(batch);
    assert_eq!(ctx.rhi.end_offscreen_frame(cb), FrameOpResult::Success);

    let readback = result.lock().take().expect("readback callback ran");
    assert_eq!(readback.pixel_size, (256, 256));
    assert_eq!(readback.format, TextureFormat::Rgba8);
    assert_eq!(readback.data.len(), red.len());
    assert!(readback.data.chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
}

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gles30(Profile::Gles30)]
#[case::gles20(Profile::Gles20)]
fn test_uniform_buffer_sub_range_roundtrip(#[case] profile: Profile) {
    const SIZE: u32 = 64;
    let mut ctx = TestContext::new(profile);
    let buffer = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, SIZE))
        .unwrap();

    let (status, mut cb) = ctx.rhi.begin_offscreen_frame();
    assert_eq!(status, FrameOpResult::Success);

    for (k, n) in [(0u32, SIZE), (0, 1), (7, 13), (32, 32), (63, 1), (SIZE, 0)] {
        let bytes: Vec<u8> = (0..n).map(|i| (i as u8).wrapping_mul(31).wrapping_add(k as u8)).collect();
        let read: Arc<Mutex<Option<BufferReadbackResult>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&read);

        let mut batch = ResourceUpdateBatch::new();
        batch.update_dynamic_buffer(&buffer, k, &bytes);
        batch.read_back_buffer(&buffer, k, n, move |r| *slot.lock() = Some(r));
        cb.resource_update(batch);

        // Uniform buffers live in host memory, so the read completes while recording.
        let result = read.lock().take().expect("uniform readback is immediate");
        assert_eq!(result.data(), bytes.as_slice(), "range [{k}, {})", k + n);
    }

    assert_eq!(ctx.rhi.end_offscreen_frame(cb), FrameOpResult::Success);
    assert_eq!(ctx.driver.live_buffers(), 0);
}

#[test]
fn test_uniform_buffer_access_is_clipped() {
    let mut ctx = TestContext::new(Profile::DesktopGl46);
    let buffer = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, 16))
        .unwrap();
    let read: Arc<Mutex<Option<BufferReadbackResult>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&read);

    let (status, mut cb) = ctx.rhi.begin_offscreen_frame();
    assert_eq!(status, FrameOpResult::Success);
    let mut batch = ResourceUpdateBatch::new();
    // Eight bytes at 12: only the first four land.
    batch.update_dynamic_buffer(&buffer, 12, &[9u8; 8]);
    batch.update_dynamic_buffer(&buffer, 40, &[5u8; 4]);
    batch.read_back_buffer(&buffer, 8, 32, move |r| *slot.lock() = Some(r));
    cb.resource_update(batch);
    assert_eq!(ctx.rhi.end_offscreen_frame(cb), FrameOpResult::Success);

    let result = read.lock().take().expect("uniform readback is immediate");
    assert_eq!(result.data(), &[0, 0, 0, 0, 9, 9, 9, 9]);
}

// ============================================================================
// Validation
// ============================================================================

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gles30(Profile::Gles30)]
#[case::webgl2(Profile::WebGl2)]
fn test_array_and_3d_flags_are_rejected(#[case] profile: Profile) {
    let mut ctx = TestContext::new(profile);
    assert!(ctx.rhi.capabilities().texture_3d);
    ctx.driver.clear_calls();

    let desc = TextureDescriptor::new_2d(
        32,
        32,
        TextureFormat::Rgba8,
        TextureFlags::THREE_DIMENSIONAL | TextureFlags::TEXTURE_ARRAY,
    )
    .with_depth(4)
    .with_array_size(2);
    let err = ctx.rhi.create_texture(&desc).unwrap_err();

    assert!(matches!(err, GraphicsError::Validation(_)), "{err:?}");
    assert_eq!(ctx.driver.live_textures(), 0);
    assert_eq!(ctx.driver.count_calls(|c| matches!(c, DummyCall::CreateTexture(_))), 0);
}

#[test]
fn test_texture_flag_invariants_hold_for_all_combinations() {
    let mut ctx = TestContext::new(Profile::DesktopGl46);
    let dimension_flags = [
        TextureFlags::CUBE_MAP,
        TextureFlags::THREE_DIMENSIONAL,
        TextureFlags::ONE_DIMENSIONAL,
        TextureFlags::TEXTURE_ARRAY,
    ];

    for mask in 0u32..16 {
        let flags = dimension_flags
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .fold(TextureFlags::empty(), |acc, (_, f)| acc | *f);
        for depth in [1u32, 4] {
            for array_size in [0u32, 3] {
                let desc = TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8, flags)
                    .with_depth(depth)
                    .with_array_size(array_size);

                let cube = flags.contains(TextureFlags::CUBE_MAP);
                let three_d = flags.contains(TextureFlags::THREE_DIMENSIONAL);
                let one_d = flags.contains(TextureFlags::ONE_DIMENSIONAL);
                let array = flags.contains(TextureFlags::TEXTURE_ARRAY);
                let forbidden_pair =
                    (cube && three_d) || (cube && one_d) || (three_d && one_d) || (array && three_d);
                let valid = !forbidden_pair && (depth <= 1 || three_d) && ((array_size >= 1) == array);

                let result = ctx.rhi.create_texture(&desc);
                let rejected = matches!(result, Err(GraphicsError::Validation(_)));
                assert_eq!(
                    rejected, !valid,
                    "flags {flags:?} depth {depth} array size {array_size}: {result:?}"
                );
            }
        }
    }
}

// ============================================================================
// Context loss
// ============================================================================

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gl33(Profile::DesktopGl33)]
#[case::gles32(Profile::Gles32)]
#[case::gles20(Profile::Gles20)]
#[case::webgl2(Profile::WebGl2)]
fn test_context_loss_mid_frame(#[case] profile: Profile) {
    let mut ctx = TestContext::new(profile);
    let mut swapchain = ctx.swapchain(64, 64);

    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
    let target = swapchain.render_target();
    let cb = swapchain.command_buffer_mut();
    cb.begin_pass(&target, [0.0, 0.0, 1.0, 1.0], Default::default(), None);
    cb.end_pass(None);

    ctx.lose_context();
    assert_eq!(ctx.rhi.end_frame(&mut swapchain), FrameOpResult::DeviceLost);
    assert!(ctx.rhi.is_device_lost());

    ctx.driver.clear_calls();
    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::DeviceLost);
    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::DeviceLost);
    assert_eq!(ctx.driver.call_count(), 0);
    assert_eq!(swapchain.frame_count(), 0);
}

#[test]
fn test_resources_fail_after_loss() {
    let mut ctx = TestContext::new(Profile::Gles30);
    ctx.lose_context();
    assert_eq!(ctx.rhi.begin_offscreen_frame().0, FrameOpResult::DeviceLost);
    assert!(matches!(
        ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()),
        Err(GraphicsError::DeviceLost)
    ));
    assert!(matches!(
        ctx.rhi.create_buffer(&BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 16)),
        Err(GraphicsError::DeviceLost)
    ));
}

// ============================================================================
// Pipelines and uniforms
// ============================================================================

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gl33(Profile::DesktopGl33)]
#[case::gles30(Profile::Gles30)]
#[case::gles20(Profile::Gles20)]
#[case::webgl2(Profile::WebGl2)]
fn test_draw_uploads_snapshotted_uniforms(#[case] profile: Profile) {
    let mut ctx = TestContext::new(profile);
    let pipeline = ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let vertices = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Immutable, BufferUsage::VERTEX, 36))
        .unwrap();
    let uniforms = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, 16))
        .unwrap();
    let mut srb = ctx
        .rhi
        .new_shader_resource_bindings()
        .with_bindings(vec![Binding::uniform_buffer(
            0,
            ShaderStageFlags::FRAGMENT,
            Arc::clone(&uniforms),
        )]);
    srb.create().unwrap();

    let tint = [0.25f32, 0.5, 0.75, 1.0];
    let mut swapchain = ctx.swapchain(32, 32);
    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
    let target = swapchain.render_target();
    let cb = swapchain.command_buffer_mut();

    let mut batch = ResourceUpdateBatch::new();
    batch.upload_static_buffer(&vertices, 0, &[0u8; 36]);
    batch.update_dynamic_buffer(&uniforms, 0, bytemuck::cast_slice(&tint));
    cb.begin_pass(&target, [0.0; 4], Default::default(), Some(batch));
    cb.set_graphics_pipeline(&pipeline);
    cb.set_vertex_input(0, &[(&vertices, 0)], None);
    cb.set_shader_resources(&srb, &[]);

    cb.draw(3, 1, 0, 0);
    cb.end_pass(None);

    // Written after binding: must not reach the recorded draw.
    ctx.rhi
        .with_full_dynamic_buffer_update(&uniforms, |bytes| {
            bytes.copy_from_slice(bytemuck::cast_slice(&[9.0f32; 4]));
        })
        .unwrap();
    assert_eq!(ctx.rhi.end_frame(&mut swapchain), FrameOpResult::Success);

    assert_eq!(
        ctx.driver.uniform_f32(pipeline.program(), "material.tint"),
        Some(tint.to_vec())
    );
    assert_eq!(
        ctx.driver.count_calls(|c| matches!(c, DummyCall::DrawArrays { .. })),
        1
    );
    assert_eq!(swapchain.frame_count(), 1);
}

#[rstest]
#[case::gl46(Profile::DesktopGl46, true)]
#[case::gles32(Profile::Gles32, true)]
#[case::gles30(Profile::Gles30, false)]
#[case::gles20(Profile::Gles20, false)]
fn test_indexed_draws_offset_into_index_buffer(#[case] profile: Profile, #[case] base_vertex: bool) {
    let mut ctx = TestContext::new(profile);
    assert_eq!(ctx.rhi.capabilities().base_vertex, base_vertex);
    let pipeline = ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let vertices = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 36))
        .unwrap();
    let indices = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Static, BufferUsage::INDEX, 64))
        .unwrap();
    let mut swapchain = ctx.swapchain(16, 16);
    ctx.driver.clear_calls();

    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
    let target = swapchain.render_target();
    let cb = swapchain.command_buffer_mut();
    cb.begin_pass(&target, [0.0; 4], Default::default(), None);
    cb.set_graphics_pipeline(&pipeline);
    cb.set_vertex_input(0, &[(&vertices, 0)], Some((&indices, 8, IndexFormat::Uint32)));
    cb.draw_indexed(3, 1, 2, 5, 0);
    // Past the addressable range: warned and dropped.
    cb.draw_indexed(3, 1, 0x4000_0000, 0, 0);
    cb.draw_indexed(3, 1, u32::MAX, 0, 0);
    // Nothing to draw.
    cb.draw_indexed(3, 0, 0, 0, 0);
    cb.draw(3, 0, 0, 0);
    cb.end_pass(None);
    assert_eq!(ctx.rhi.end_frame(&mut swapchain), FrameOpResult::Success);

    let draws: Vec<DummyCall> = ctx
        .driver
        .calls()
        .into_iter()
        .filter(|c| matches!(c, DummyCall::DrawElements { .. } | DummyCall::DrawArrays { .. }))
        .collect();
    assert_eq!(draws.len(), 1);
    match &draws[0] {
        DummyCall::DrawElements {
            count,
            index_type,
            offset,
            instances,
            base_vertex: issued,
            ..
        } => {
            assert_eq!(*count, 3);
            assert_eq!(*index_type, IndexFormat::Uint32.gl_type());
            assert_eq!(*offset, 8 + 2 * 4);
            assert_eq!(*instances, 1);
            assert_eq!(*issued, if base_vertex { 5 } else { 0 });
        }
        other => panic!("expected an indexed draw, got {other:?}"),
    }
}

#[test]
fn test_sampled_texture_is_bound_with_sampler_state() {
    const VS: &str = "#version 330\nin vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }\n";
    const FS: &str = "#version 330\nuniform sampler2D tex;\nout vec4 color;\nvoid main() { color = texture(tex, vec2(0.5)); }\n";

    let mut ctx = TestContext::new(Profile::DesktopGl46);
    let vs_desc = ShaderDescription::new().with_input(InOutVariable::new("position", VariableType::Vec3, 0));
    let fs_desc = ShaderDescription::new()
        .with_combined_sampler(InOutVariable::new("tex", VariableType::Sampler2D, -1).with_binding(1));
    let pipeline = ctx
        .rhi
        .create_graphics_pipeline(
            &GraphicsPipelineDescriptor::new()
                .with_stage(Shader::new(ShaderStage::Vertex, vs_desc).with_source(ShaderVersion::glsl(330), VS))
                .with_stage(Shader::new(ShaderStage::Fragment, fs_desc).with_source(ShaderVersion::glsl(330), FS))
                .with_vertex_input(
                    VertexInputLayout::new()
                        .with_binding(VertexBufferLayout::new(12))
                        .with_attribute(VertexAttribute::new(0, 0, VertexAttributeFormat::Float3, 0)),
                ),
        )
        .unwrap();
    let texture = ctx
        .rhi
        .create_texture(&TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8, TextureFlags::empty()))
        .unwrap();
    let sampler = ctx.rhi.create_sampler(&SamplerDescriptor::nearest());
    let vertices = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 36))
        .unwrap();
    let mut srb = ctx.rhi.new_shader_resource_bindings().with_bindings(vec![Binding::sampled_texture(
        1,
        ShaderStageFlags::FRAGMENT,
        Arc::clone(&texture),
        sampler,
    )]);
    srb.create().unwrap();

    let mut swapchain = ctx.swapchain(16, 16);
    ctx.driver.clear_calls();
    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
    let target = swapchain.render_target();
    let cb = swapchain.command_buffer_mut();
    cb.begin_pass(&target, [0.0; 4], Default::default(), None);
    cb.set_graphics_pipeline(&pipeline);
    cb.set_shader_resources(&srb, &[]);
    cb.set_vertex_input(0, &[(&vertices, 0)], None);
    cb.draw(3, 1, 0, 0);
    cb.end_pass(None);
    assert_eq!(ctx.rhi.end_frame(&mut swapchain), FrameOpResult::Success);

    let handle = texture.handle();
    assert!(ctx.driver.count_calls(|c| matches!(
        c,
        DummyCall::BindTexture { target, texture } if *target == glow::TEXTURE_2D && *texture == handle
    )) >= 1);
    assert_eq!(
        ctx.driver.texture_parameter(handle, glow::TEXTURE_MAG_FILTER),
        Some(glow::NEAREST as i32)
    );
}

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gles20(Profile::Gles20)]
fn test_redundant_pipeline_bind_is_elided(#[case] profile: Profile) {
    let mut ctx = TestContext::new(profile);
    let pipeline = ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let mut swapchain = ctx.swapchain(16, 16);

    assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
    let target = swapchain.render_target();
    let cb = swapchain.command_buffer_mut();
    cb.begin_pass(&target, [0.0; 4], Default::default(), None);
    cb.set_graphics_pipeline(&pipeline);
    cb.set_graphics_pipeline(&pipeline);
    let binds = cb
        .commands()
        .iter()
        .filter(|c| c.name() == "BindGraphicsPipeline")
        .count();
    cb.end_pass(None);
    assert_eq!(binds, 1);
    assert_eq!(ctx.rhi.end_frame(&mut swapchain), FrameOpResult::Success);
}

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gles32(Profile::Gles32)]
fn test_read_only_passes_need_no_barrier(#[case] profile: Profile) {
    let mut ctx = TestContext::new(profile);
    assert!(ctx.rhi.capabilities().compute);
    let pipeline = ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let vertices = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(
            BufferType::Static,
            BufferUsage::VERTEX | BufferUsage::STORAGE,
            36,
        ))
        .unwrap();
    let mut swapchain = ctx.swapchain(16, 16);

    let mut record_frame = |ctx: &mut TestContext, passes: usize, upload: bool| {
        assert_eq!(ctx.rhi.begin_frame(&mut swapchain), FrameOpResult::Success);
        let target = swapchain.render_target();
        let cb = swapchain.command_buffer_mut();
        if upload {
            let mut batch = ResourceUpdateBatch::new();
            batch.upload_static_buffer(&vertices, 0, &[1u8; 36]);
            cb.resource_update(batch);
        }
        for _ in 0..passes {
            cb.begin_pass(&target, [0.0; 4], Default::default(), None);
            cb.set_graphics_pipeline(&pipeline);
            cb.set_vertex_input(0, &[(&vertices, 0)], None);
            cb.draw(3, 1, 0, 0);
            cb.end_pass(None);
        }
        assert_eq!(ctx.rhi.end_frame(&mut swapchain), FrameOpResult::Success);
    };

    // The upload is a write, so the first reading pass synchronizes once.
    record_frame(&mut ctx, 1, true);
    assert_eq!(
        ctx.driver.count_calls(|c| matches!(c, DummyCall::MemoryBarrier(_))),
        1
    );

    ctx.driver.clear_calls();
    record_frame(&mut ctx, 3, false);
    assert_eq!(
        ctx.driver.count_calls(|c| matches!(c, DummyCall::MemoryBarrier(_))),
        0
    );
}

// ============================================================================
// Deferred release
// ============================================================================

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gles30(Profile::Gles30)]
#[case::gles20(Profile::Gles20)]
fn test_destroyed_resources_outlive_recorded_frame(#[case] profile: Profile) {
    const N: usize = 5;
    let mut ctx = TestContext::new(profile);
    let textures: Vec<_> = (0..N)
        .map(|_| {
            ctx.rhi
                .create_texture(&TextureDescriptor::new_2d(
                    8,
                    8,
                    TextureFormat::Rgba8,
                    TextureFlags::empty(),
                ))
                .unwrap()
        })
        .collect();
    let handles: Vec<u32> = textures.iter().map(|t| t.handle()).collect();

    let (status, mut cb) = ctx.rhi.begin_offscreen_frame();
    assert_eq!(status, FrameOpResult::Success);
    let mut batch = ResourceUpdateBatch::new();
    for texture in &textures {
        batch.upload_texture(texture, TextureUploadDescription::whole_image(solid_rgba8(8, 8, [0, 255, 0, 255])));
    }
    cb.resource_update(batch);

    for texture in &textures {
        texture.destroy();
    }
    drop(textures);
    assert!(handles.iter().all(|h| ctx.driver.is_texture_alive(*h)));

    assert_eq!(ctx.rhi.end_offscreen_frame(cb), FrameOpResult::Success);
    assert!(handles.iter().all(|h| ctx.driver.is_texture_alive(*h)));
    assert_eq!(ctx.rhi.release_queue().len(), N);

    assert_eq!(ctx.rhi.finish(), FrameOpResult::Success);
    assert!(handles.iter().all(|h| !ctx.driver.is_texture_alive(*h)));
    assert_eq!(ctx.driver.live_textures(), 0);
    assert_eq!(ctx.rhi.statistics().deferred_releases, N as u64);
}

#[test]
fn test_destroy_drains_everything() {
    let mut ctx = TestContext::new(Profile::DesktopGl46);
    let buffer = ctx
        .rhi
        .create_buffer(&BufferDescriptor::new(BufferType::Static, BufferUsage::VERTEX, 64))
        .unwrap();
    let pipeline = ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    drop(buffer);
    drop(pipeline);
    assert_eq!(ctx.driver.live_buffers(), 1);

    ctx.rhi.destroy();
    assert_eq!(ctx.driver.live_buffers(), 0);
    assert_eq!(ctx.driver.live_programs(), 0);
    assert_eq!(ctx.driver.live_shaders(), 0);
    // Idempotent, and Drop calls it again.
    ctx.rhi.destroy();
}
