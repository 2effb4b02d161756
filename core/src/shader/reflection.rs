//! Shader reflection model.
//!
//! A [`ShaderDescription`] describes the interface of one compiled shader stage:
//! its inputs and outputs, uniform blocks with member layout, combined and
//! separate image samplers, storage blocks and images, built-ins, the compute
//! work group size and tessellation parameters.
//!
//! The model is pure data. Apart from equality it only knows how to
//! (de)serialize itself into a versioned binary form.

use serde::{Deserialize, Serialize};

/// Version tag written in front of serialized descriptions.
pub const REFLECTION_FORMAT_VERSION: u32 = 2;

/// Errors produced while decoding a serialized [`ShaderDescription`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectionError {
    /// The payload is not a valid encoding.
    #[error("malformed shader description: {0}")]
    Format(String),
    /// The payload was written by an incompatible format version.
    #[error("unsupported shader description version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the payload.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },
}

/// Type of a shader variable or block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VariableType {
    #[default]
    Unknown,

    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat2x3,
    Mat2x4,
    Mat3,
    Mat3x2,
    Mat3x4,
    Mat4,
    Mat4x2,
    Mat4x3,

    Int,
    Int2,
    Int3,
    Int4,

    Uint,
    Uint2,
    Uint3,
    Uint4,

    Bool,
    Bool2,
    Bool3,
    Bool4,

    Sampler1D,
    Sampler2D,
    Sampler2DMS,
    Sampler3D,
    SamplerCube,
    Sampler1DArray,
    Sampler2DArray,
    Sampler2DMSArray,
    SamplerCubeArray,
    SamplerRect,
    SamplerExternalOES,
    /// Separate sampler object (`sampler` in Vulkan-flavoured GLSL).
    Sampler,

    Image1D,
    Image2D,
    Image2DMS,
    Image3D,
    ImageCube,
    Image1DArray,
    Image2DArray,
    ImageRect,

    Struct,
}

impl VariableType {
    /// Whether this is a combined image sampler type.
    pub fn is_combined_sampler(self) -> bool {
        matches!(
            self,
            Self::Sampler1D
                | Self::Sampler2D
                | Self::Sampler2DMS
                | Self::Sampler3D
                | Self::SamplerCube
                | Self::Sampler1DArray
                | Self::Sampler2DArray
                | Self::Sampler2DMSArray
                | Self::SamplerCubeArray
                | Self::SamplerRect
                | Self::SamplerExternalOES
        )
    }

    /// Whether this is a storage image type.
    pub fn is_image(self) -> bool {
        matches!(
            self,
            Self::Image1D
                | Self::Image2D
                | Self::Image2DMS
                | Self::Image3D
                | Self::ImageCube
                | Self::Image1DArray
                | Self::Image2DArray
                | Self::ImageRect
        )
    }
}

/// Storage image format declared in the shader (`layout(rgba8)` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    Unknown,
    Rgba32f,
    Rgba16f,
    R32f,
    Rgba8,
    Rgba8Snorm,
    Rg32f,
    Rg16f,
    R16f,
    Rgb10A2,
    Rg8,
    R8,
    Rgba32i,
    Rgba16i,
    Rgba8i,
    R32i,
    Rgba32ui,
    Rgba16ui,
    Rgba8ui,
    R32ui,
}

/// Qualifiers of a storage image or storage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccessQualifiers {
    /// Declared `readonly`.
    pub read_only: bool,
    /// Declared `writeonly`.
    pub write_only: bool,
}

/// A stage input, stage output, sampler or image variable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InOutVariable {
    pub name: String,
    pub ty: VariableType,
    /// `layout(location = N)`, or -1.
    pub location: i32,
    /// `layout(binding = N)`, or -1.
    pub binding: i32,
    pub descriptor_set: i32,
    pub image_format: ImageFormat,
    pub image_access: AccessQualifiers,
    pub array_dims: Vec<u32>,
    /// Tessellation per-patch variable.
    pub per_patch: bool,
    pub struct_members: Vec<BlockVariable>,
}

impl InOutVariable {
    /// Create a variable with the given name, type and location.
    pub fn new(name: impl Into<String>, ty: VariableType, location: i32) -> Self {
        Self {
            name: name.into(),
            ty,
            location,
            binding: -1,
            ..Default::default()
        }
    }

    /// Set the binding point.
    pub fn with_binding(mut self, binding: i32) -> Self {
        self.binding = binding;
        self
    }

    /// Set array dimensions.
    pub fn with_array_dims(mut self, dims: Vec<u32>) -> Self {
        self.array_dims = dims;
        self
    }
}

/// A member of a uniform, push-constant or storage block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockVariable {
    pub name: String,
    pub ty: VariableType,
    /// Byte offset within the enclosing block.
    pub offset: u32,
    /// Byte size of the member (including all array elements).
    pub size: u32,
    pub array_dims: Vec<u32>,
    pub array_stride: u32,
    pub matrix_stride: u32,
    pub matrix_is_row_major: bool,
    /// Members when `ty` is [`VariableType::Struct`].
    pub struct_members: Vec<BlockVariable>,
}

impl BlockVariable {
    /// Create a block member.
    pub fn new(name: impl Into<String>, ty: VariableType, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            offset,
            size,
            ..Default::default()
        }
    }

    /// Set array dimensions and stride.
    pub fn with_array(mut self, dims: Vec<u32>, stride: u32) -> Self {
        self.array_dims = dims;
        self.array_stride = stride;
        self
    }

    /// Set struct members (turns the variable into a struct).
    pub fn with_struct_members(mut self, members: Vec<BlockVariable>) -> Self {
        self.ty = VariableType::Struct;
        self.struct_members = members;
        self
    }
}

/// A uniform block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UniformBlock {
    pub block_name: String,
    /// Instance name. Backends that flatten blocks into plain uniforms use it
    /// as the prefix of member names.
    pub struct_name: String,
    pub size: u32,
    pub binding: i32,
    pub descriptor_set: i32,
    pub members: Vec<BlockVariable>,
}

/// A push constant block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PushConstantBlock {
    pub name: String,
    pub size: u32,
    pub members: Vec<BlockVariable>,
}

/// A shader storage block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageBlock {
    pub block_name: String,
    pub instance_name: String,
    /// Size of the statically-sized part of the block.
    pub known_size: u32,
    pub binding: i32,
    pub descriptor_set: i32,
    pub members: Vec<BlockVariable>,
    /// Stride of a trailing runtime-sized array, 0 when absent.
    pub runtime_array_stride: u32,
    pub access: AccessQualifiers,
}

/// Built-in variable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    Position,
    PointSize,
    ClipDistance,
    CullDistance,
    VertexId,
    InstanceId,
    PrimitiveId,
    InvocationId,
    Layer,
    ViewportIndex,
    TessLevelOuter,
    TessLevelInner,
    TessCoord,
    PatchVertices,
    FragCoord,
    PointCoord,
    FrontFacing,
    SampleId,
    SamplePosition,
    SampleMask,
    FragDepth,
    NumWorkGroups,
    WorkGroupSize,
    WorkGroupId,
    LocalInvocationId,
    GlobalInvocationId,
    LocalInvocationIndex,
    VertexIndex,
    InstanceIndex,
}

/// A built-in variable used by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuiltinVariable {
    pub ty: BuiltinType,
    pub array_dims_len: u32,
}

/// Tessellation primitive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TessellationMode {
    #[default]
    Unknown,
    Triangles,
    Quads,
    Isolines,
}

/// Tessellation output winding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TessellationWindingOrder {
    #[default]
    Unknown,
    Cw,
    Ccw,
}

/// Tessellation spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TessellationPartitioning {
    #[default]
    Unknown,
    Equal,
    FractionalEven,
    FractionalOdd,
}

/// Interface description of one compiled shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShaderDescription {
    pub input_variables: Vec<InOutVariable>,
    pub output_variables: Vec<InOutVariable>,
    pub uniform_blocks: Vec<UniformBlock>,
    pub push_constant_blocks: Vec<PushConstantBlock>,
    pub storage_blocks: Vec<StorageBlock>,
    pub combined_image_samplers: Vec<InOutVariable>,
    pub separate_images: Vec<InOutVariable>,
    pub separate_samplers: Vec<InOutVariable>,
    pub storage_images: Vec<InOutVariable>,
    pub input_builtins: Vec<BuiltinVariable>,
    pub output_builtins: Vec<BuiltinVariable>,
    pub compute_work_group_size: [u32; 3],
    pub tessellation_output_vertex_count: u32,
    pub tessellation_mode: TessellationMode,
    pub tessellation_winding_order: TessellationWindingOrder,
    pub tessellation_partitioning: TessellationPartitioning,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    description: &'a ShaderDescription,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    #[allow(dead_code)]
    version: u32,
    description: ShaderDescription,
}

impl ShaderDescription {
    /// Create an empty description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the description carries any data at all.
    pub fn is_valid(&self) -> bool {
        *self != Self::default()
    }

    /// Add a stage input.
    pub fn with_input(mut self, var: InOutVariable) -> Self {
        self.input_variables.push(var);
        self
    }

    /// Add a stage output.
    pub fn with_output(mut self, var: InOutVariable) -> Self {
        self.output_variables.push(var);
        self
    }

    /// Add a uniform block.
    pub fn with_uniform_block(mut self, block: UniformBlock) -> Self {
        self.uniform_blocks.push(block);
        self
    }

    /// Add a combined image sampler.
    pub fn with_combined_sampler(mut self, var: InOutVariable) -> Self {
        self.combined_image_samplers.push(var);
        self
    }

    /// Add a storage block.
    pub fn with_storage_block(mut self, block: StorageBlock) -> Self {
        self.storage_blocks.push(block);
        self
    }

    /// Add a storage image.
    pub fn with_storage_image(mut self, var: InOutVariable) -> Self {
        self.storage_images.push(var);
        self
    }

    /// Set the compute work group size.
    pub fn with_work_group_size(mut self, size: [u32; 3]) -> Self {
        self.compute_work_group_size = size;
        self
    }

    /// Encode into the versioned binary form.
    pub fn serialize(&self) -> Result<Vec<u8>, ReflectionError> {
        bincode::serialize(&EnvelopeRef {
            version: REFLECTION_FORMAT_VERSION,
            description: self,
        })
        .map_err(|e| ReflectionError::Format(e.to_string()))
    }

    /// Decode from the versioned binary form.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, ReflectionError> {
        let header: EnvelopeHeader =
            bincode::deserialize(bytes).map_err(|e| ReflectionError::Format(e.to_string()))?;
        if header.version != REFLECTION_FORMAT_VERSION {
            return Err(ReflectionError::UnsupportedVersion {
                found: header.version,
                expected: REFLECTION_FORMAT_VERSION,
            });
        }
        let envelope: Envelope =
            bincode::deserialize(bytes).map_err(|e| ReflectionError::Format(e.to_string()))?;
        Ok(envelope.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_description() -> ShaderDescription {
        ShaderDescription::new()
            .with_input(InOutVariable::new("position", VariableType::Vec4, 0))
            .with_uniform_block(UniformBlock {
                block_name: "buf".into(),
                struct_name: "ubuf".into(),
                size: 80,
                binding: 0,
                descriptor_set: 0,
                members: vec![
                    BlockVariable::new("mvp", VariableType::Mat4, 0, 64),
                    BlockVariable::new("color", VariableType::Vec4, 64, 16),
                ],
            })
            .with_combined_sampler(
                InOutVariable::new("tex", VariableType::Sampler2D, -1).with_binding(1),
            )
    }

    #[test]
    fn test_serialize_roundtrip() {
        let desc = sample_description();
        let bytes = desc.serialize().unwrap();
        let decoded = ShaderDescription::deserialize(&bytes).unwrap();
        assert_eq!(desc, decoded);
    }

    #[test]
    fn test_rejects_other_version() {
        let bytes = bincode::serialize(&EnvelopeRef {
            version: REFLECTION_FORMAT_VERSION + 1,
            description: &sample_description(),
        })
        .unwrap();
        assert!(matches!(
            ShaderDescription::deserialize(&bytes),
            Err(ReflectionError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = sample_description().serialize().unwrap();
        let result = ShaderDescription::deserialize(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(ReflectionError::Format(_))));
    }

    #[test]
    fn test_default_is_invalid() {
        assert!(!ShaderDescription::default().is_valid());
        assert!(sample_description().is_valid());
    }

    #[test]
    fn test_sampler_type_classification() {
        assert!(VariableType::Sampler2D.is_combined_sampler());
        assert!(!VariableType::Sampler.is_combined_sampler());
        assert!(VariableType::Image2D.is_image());
        assert!(!VariableType::Vec4.is_image());
    }
}
