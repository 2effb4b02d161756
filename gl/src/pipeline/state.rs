//! Fixed-function pipeline state.
//!
//! Plain value types plus their GL enum translations. The executor applies a
//! whole [`GraphicsPipeline`](super::GraphicsPipeline) state block when the
//! pipeline is bound.

use bitflags::bitflags;

use crate::types::CompareFunction;

// ============================================================================
// Rasterization
// ============================================================================

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    Points,
    /// Tessellation input; needs `patch_control_points`.
    Patches,
}

impl PrimitiveTopology {
    pub fn gl_mode(self) -> u32 {
        match self {
            Self::Triangles => glow::TRIANGLES,
            Self::TriangleStrip => glow::TRIANGLE_STRIP,
            Self::TriangleFan => glow::TRIANGLE_FAN,
            Self::Lines => glow::LINES,
            Self::LineStrip => glow::LINE_STRIP,
            Self::Points => glow::POINTS,
            Self::Patches => glow::PATCHES,
        }
    }
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Winding of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Polygon fill mode; `Line` is desktop only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

/// Depth bias applied with `glPolygonOffset`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    pub constant: f32,
    pub slope_scale: f32,
}

// ============================================================================
// Depth / stencil
// ============================================================================

/// Stencil buffer update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

impl StencilOperation {
    pub fn gl(self) -> u32 {
        match self {
            Self::Keep => glow::KEEP,
            Self::Zero => glow::ZERO,
            Self::Replace => glow::REPLACE,
            Self::IncrementClamp => glow::INCR,
            Self::DecrementClamp => glow::DECR,
            Self::Invert => glow::INVERT,
            Self::IncrementWrap => glow::INCR_WRAP,
            Self::DecrementWrap => glow::DECR_WRAP,
        }
    }
}

/// Stencil test for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

/// Depth and stencil test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub stencil_test: bool,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_compare: CompareFunction::Less,
            stencil_test: false,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
        }
    }
}

impl DepthStencilState {
    /// Depth test and write with `Less`.
    pub fn depth_test_write() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            ..Default::default()
        }
    }
}

/// GL comparison enum of `func`.
pub fn gl_compare(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::Never => glow::NEVER,
        CompareFunction::Less => glow::LESS,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Greater => glow::GREATER,
        CompareFunction::NotEqual => glow::NOTEQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Always => glow::ALWAYS,
    }
}

// ============================================================================
// Blending
// ============================================================================

/// Blend factor for color blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// 0.0
    #[default]
    Zero,
    /// 1.0
    One,
    /// Source color
    Src,
    /// 1 - source color
    OneMinusSrc,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination color
    Dst,
    /// 1 - destination color
    OneMinusDst,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
    /// min(source alpha, 1 - destination alpha)
    SrcAlphaSaturated,
    /// Constant color
    Constant,
    /// 1 - constant color
    OneMinusConstant,
}

impl BlendFactor {
    pub fn gl(self) -> u32 {
        match self {
            Self::Zero => glow::ZERO,
            Self::One => glow::ONE,
            Self::Src => glow::SRC_COLOR,
            Self::OneMinusSrc => glow::ONE_MINUS_SRC_COLOR,
            Self::SrcAlpha => glow::SRC_ALPHA,
            Self::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
            Self::Dst => glow::DST_COLOR,
            Self::OneMinusDst => glow::ONE_MINUS_DST_COLOR,
            Self::DstAlpha => glow::DST_ALPHA,
            Self::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
            Self::SrcAlphaSaturated => glow::SRC_ALPHA_SATURATE,
            Self::Constant => glow::CONSTANT_COLOR,
            Self::OneMinusConstant => glow::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

/// Blend operation for combining colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// source + destination
    #[default]
    Add,
    /// source - destination
    Subtract,
    /// destination - source
    ReverseSubtract,
    /// min(source, destination)
    Min,
    /// max(source, destination)
    Max,
}

impl BlendOperation {
    pub fn gl(self) -> u32 {
        match self {
            Self::Add => glow::FUNC_ADD,
            Self::Subtract => glow::FUNC_SUBTRACT,
            Self::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
            Self::Min => glow::MIN,
            Self::Max => glow::MAX,
        }
    }
}

/// Blend component configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

impl BlendComponent {
    /// Standard alpha blending (src over dst).
    pub fn over() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        }
    }

    pub fn premultiplied() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state for color blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent::over(),
            alpha: BlendComponent::over(),
        }
    }

    pub fn premultiplied_alpha() -> Self {
        Self {
            color: BlendComponent::premultiplied(),
            alpha: BlendComponent::premultiplied(),
        }
    }

    pub fn additive() -> Self {
        let add = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };
        Self {
            color: add,
            alpha: add,
        }
    }
}

bitflags! {
    /// Color channels written by a target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

impl Default for ColorWrites {
    fn default() -> Self {
        Self::all()
    }
}

/// Blending of one color attachment. GL has a single blend state, so only
/// the first target is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TargetBlend {
    /// `None` disables blending.
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrites,
}

// ============================================================================
// Vertex input
// ============================================================================

/// Format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    Uint,
    Uint2,
    Uint3,
    Uint4,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
    /// Two 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x2,
    /// Four 8-bit signed integers (normalized to -1.0-1.0).
    Snorm8x4,
    Half2,
    Half4,
}

impl VertexAttributeFormat {
    /// Size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::Uint => 4,
            Self::Float2 | Self::Int2 | Self::Uint2 => 8,
            Self::Float3 | Self::Int3 | Self::Uint3 => 12,
            Self::Float4 | Self::Int4 | Self::Uint4 => 16,
            Self::Unorm8x4 | Self::Snorm8x4 | Self::Half2 => 4,
            Self::Unorm8x2 => 2,
            Self::Half4 => 8,
        }
    }

    pub fn components(self) -> i32 {
        match self {
            Self::Float | Self::Int | Self::Uint => 1,
            Self::Float2 | Self::Int2 | Self::Uint2 | Self::Unorm8x2 | Self::Half2 => 2,
            Self::Float3 | Self::Int3 | Self::Uint3 => 3,
            Self::Float4
            | Self::Int4
            | Self::Uint4
            | Self::Unorm8x4
            | Self::Snorm8x4
            | Self::Half4 => 4,
        }
    }

    pub fn gl_type(self) -> u32 {
        match self {
            Self::Float | Self::Float2 | Self::Float3 | Self::Float4 => glow::FLOAT,
            Self::Int | Self::Int2 | Self::Int3 | Self::Int4 => glow::INT,
            Self::Uint | Self::Uint2 | Self::Uint3 | Self::Uint4 => glow::UNSIGNED_INT,
            Self::Unorm8x4 | Self::Unorm8x2 => glow::UNSIGNED_BYTE,
            Self::Snorm8x4 => glow::BYTE,
            Self::Half2 | Self::Half4 => glow::HALF_FLOAT,
        }
    }

    pub fn normalized(self) -> bool {
        matches!(self, Self::Unorm8x4 | Self::Unorm8x2 | Self::Snorm8x4)
    }

    /// Read by the shader as an integer; uses `glVertexAttribIPointer`.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::Int2
                | Self::Int3
                | Self::Int4
                | Self::Uint
                | Self::Uint2
                | Self::Uint3
                | Self::Uint4
        )
    }

    pub fn is_half(self) -> bool {
        matches!(self, Self::Half2 | Self::Half4)
    }
}

/// How the vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

/// One vertex buffer binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub step_mode: VertexStepMode,
    /// Instances per attribute advance; only 1 is supported by GL.
    pub step_rate: u32,
}

impl VertexBufferLayout {
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Vertex,
            step_rate: 1,
        }
    }

    pub fn per_instance(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Instance,
            step_rate: 1,
        }
    }
}

/// A single vertex attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Index into [`VertexInputLayout::bindings`].
    pub binding: u32,
    pub format: VertexAttributeFormat,
    /// Byte offset within one element of the binding.
    pub offset: u32,
    /// Shader input name, bound with `glBindAttribLocation`. Taken from
    /// reflection when empty.
    pub name: String,
}

impl VertexAttribute {
    pub fn new(location: u32, binding: u32, format: VertexAttributeFormat, offset: u32) -> Self {
        Self {
            location,
            binding,
            format,
            offset,
            name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Vertex buffer bindings and the attributes reading them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexInputLayout {
    pub bindings: Vec<VertexBufferLayout>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexInputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, binding: VertexBufferLayout) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_format_properties() {
        assert_eq!(VertexAttributeFormat::Float3.size(), 12);
        assert_eq!(VertexAttributeFormat::Float3.components(), 3);
        assert!(VertexAttributeFormat::Unorm8x4.normalized());
        assert!(VertexAttributeFormat::Uint2.is_integer());
        assert!(!VertexAttributeFormat::Half4.is_integer());
        assert_eq!(VertexAttributeFormat::Half4.gl_type(), glow::HALF_FLOAT);
    }

    #[test]
    fn test_blend_translation() {
        let blend = BlendState::alpha_blending();
        assert_eq!(blend.color.src_factor.gl(), glow::SRC_ALPHA);
        assert_eq!(blend.color.dst_factor.gl(), glow::ONE_MINUS_SRC_ALPHA);
        assert_eq!(BlendOperation::ReverseSubtract.gl(), glow::FUNC_REVERSE_SUBTRACT);
        assert_eq!(ColorWrites::default(), ColorWrites::all());
    }

    #[test]
    fn test_depth_stencil_defaults() {
        let ds = DepthStencilState::default();
        assert!(!ds.depth_test);
        assert_eq!(ds.stencil_read_mask, 0xFF);
        assert_eq!(gl_compare(ds.depth_compare), glow::LESS);
        assert_eq!(StencilOperation::IncrementWrap.gl(), glow::INCR_WRAP);
        assert_eq!(PrimitiveTopology::TriangleStrip.gl_mode(), glow::TRIANGLE_STRIP);
    }
}
