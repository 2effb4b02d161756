//! Shader stages, source variants and reflection.
//!
//! The shader compiler hands the backends a [`Shader`] per stage: a set of
//! source variants keyed by [`ShaderVersion`] plus a [`ShaderDescription`]
//! reflecting the stage interface. Backends pick a variant; they never parse
//! the source.

mod reflection;
mod source;

pub use reflection::{
    AccessQualifiers, BlockVariable, BuiltinType, BuiltinVariable, ImageFormat, InOutVariable,
    PushConstantBlock, REFLECTION_FORMAT_VERSION, ReflectionError, ShaderDescription,
    StorageBlock, TessellationMode, TessellationPartitioning, TessellationWindingOrder,
    UniformBlock, VariableType,
};
pub use source::{SeparateToCombined, Shader, ShaderStage, ShaderVersion};
