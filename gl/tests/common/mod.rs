//! Common utilities for backend integration tests.
//!
//! Every test runs the full backend against a [`DummyDriver`] emulating one
//! of several context profiles, driven through a [`HeadlessContext`] that
//! shares the driver's loss flag.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use redlilium_core::shader::{
    BlockVariable, InOutVariable, Shader, ShaderDescription, ShaderStage, ShaderVersion,
    UniformBlock, VariableType,
};
use redlilium_gl::driver::DummyDriver;
use redlilium_gl::driver::dummy::DummyProfile;
use redlilium_gl::pipeline::{
    GraphicsPipelineDescriptor, VertexAttribute, VertexAttributeFormat, VertexBufferLayout,
    VertexInputLayout,
};
use redlilium_gl::{GlRhi, HeadlessContext, HeadlessSurface, RhiParameters, Swapchain, SwapchainDescriptor};

// ============================================================================
// Profiles
// ============================================================================

/// Context profiles the scenario tests run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    DesktopGl46,
    DesktopGl33,
    Gles32,
    Gles30,
    Gles20,
    WebGl2,
}

impl Profile {
    pub fn dummy_profile(self) -> DummyProfile {
        match self {
            Profile::DesktopGl46 => DummyProfile::desktop_gl46(),
            Profile::DesktopGl33 => DummyProfile::desktop_gl33(),
            Profile::Gles32 => DummyProfile::gles32(),
            Profile::Gles30 => DummyProfile::gles30(),
            Profile::Gles20 => DummyProfile::gles20(),
            Profile::WebGl2 => DummyProfile::webgl2(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::DesktopGl46 => "gl46",
            Profile::DesktopGl33 => "gl33",
            Profile::Gles32 => "gles32",
            Profile::Gles30 => "gles30",
            Profile::Gles20 => "gles20",
            Profile::WebGl2 => "webgl2",
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A backend instance plus a handle for inspecting the emulated driver.
pub struct TestContext {
    pub rhi: GlRhi,
    /// Shares state with the driver owned by `rhi`.
    pub driver: DummyDriver,
    loss: Arc<AtomicBool>,
}

impl TestContext {
    pub fn new(profile: Profile) -> Self {
        Self::with_parameters(profile, RhiParameters::new())
    }

    pub fn with_parameters(profile: Profile, params: RhiParameters) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let driver = DummyDriver::with_profile(profile.dummy_profile());
        let loss = driver.loss_flag();
        let context = HeadlessContext::with_loss_flag(Arc::clone(&loss));
        let rhi = GlRhi::create(params, Box::new(driver.clone()), Box::new(context), None)
            .expect("backend creation over the dummy driver");
        Self { rhi, driver, loss }
    }

    /// Simulate a context loss seen by both the driver and the platform.
    pub fn lose_context(&self) {
        self.loss.store(true, Ordering::SeqCst);
    }

    /// A swapchain over a headless surface, ready for its first frame.
    pub fn swapchain(&mut self, width: u32, height: u32) -> Swapchain {
        self.driver.resize_default_framebuffer(width, height);
        let surface = Arc::new(HeadlessSurface::new(width, height));
        let mut swapchain = self.rhi.create_swapchain(surface, SwapchainDescriptor::new());
        swapchain
            .create_or_resize(&mut self.rhi)
            .expect("swapchain creation");
        swapchain
    }
}

// ============================================================================
// Shaders
// ============================================================================

const VS_330: &str = "#version 330\nin vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }\n";
const VS_100: &str = "attribute vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }\n";
const FS_330: &str = "#version 330\nstruct Material { vec4 tint; };\nuniform Material material;\nout vec4 color;\nvoid main() { color = material.tint; }\n";
const FS_100: &str = "precision mediump float;\nstruct Material { vec4 tint; };\nuniform Material material;\nvoid main() { gl_FragColor = material.tint; }\n";

/// The fragment stage reads `material.tint` (a vec4 at offset 0) from the
/// uniform buffer at binding 0.
pub fn material_block() -> UniformBlock {
    UniformBlock {
        block_name: "MaterialBlock".into(),
        struct_name: "material".into(),
        size: 16,
        binding: 0,
        descriptor_set: 0,
        members: vec![BlockVariable::new("tint", VariableType::Vec4, 0, 16)],
    }
}

/// A position-only pipeline with sources for desktop GLSL 3.30 and GLSL ES
/// 1.00, which every profile accepts.
pub fn tinted_pipeline_descriptor() -> GraphicsPipelineDescriptor {
    tinted_pipeline_descriptor_at(0)
}

/// [`tinted_pipeline_descriptor`] with `position` at attribute `location`.
pub fn tinted_pipeline_descriptor_at(location: u32) -> GraphicsPipelineDescriptor {
    let vs_desc = ShaderDescription::new()
        .with_input(InOutVariable::new("position", VariableType::Vec3, location as i32));
    let fs_desc = ShaderDescription::new().with_uniform_block(material_block());
    GraphicsPipelineDescriptor::new()
        .with_stage(
            Shader::new(ShaderStage::Vertex, vs_desc)
                .with_source(ShaderVersion::glsl(330), VS_330)
                .with_source(ShaderVersion::gles(100), VS_100),
        )
        .with_stage(
            Shader::new(ShaderStage::Fragment, fs_desc)
                .with_source(ShaderVersion::glsl(330), FS_330)
                .with_source(ShaderVersion::gles(100), FS_100),
        )
        .with_vertex_input(
            VertexInputLayout::new()
                .with_binding(VertexBufferLayout::new(12))
                .with_attribute(VertexAttribute::new(location, 0, VertexAttributeFormat::Float3, 0)),
        )
}

/// Tightly packed RGBA8 pixels of one color.
pub fn solid_rgba8(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.iter()
        .copied()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}
