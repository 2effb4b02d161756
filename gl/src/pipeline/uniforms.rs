//! Uniform and sampler location tables.
//!
//! Uniform blocks are never bound as buffer objects. Every block member is
//! looked up as an individual uniform named `StructName.member` and set with
//! `glUniform*` from the bytes of the bound uniform buffer at draw time.
//!
//! Supported nesting is one struct level and one level of arrays of structs:
//!
//! ```text
//! Block.color            vec4
//! Block.lights[2].pos    array of struct, one entry per element and member
//! Block.a.b.c            struct in struct: warned and skipped
//! ```

use redlilium_core::shader::{BlockVariable, ShaderDescription, UniformBlock, VariableType};

use crate::driver::{GlDriver, GlHandle};

/// One uniform to set from a uniform buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformEntry {
    pub name: String,
    pub location: u32,
    /// Binding of the uniform block the value comes from.
    pub binding: i32,
    /// Byte offset inside the block.
    pub offset: u32,
    pub ty: VariableType,
    /// Element count, 1 for non-arrays.
    pub array_size: u32,
    pub array_stride: u32,
    pub matrix_stride: u32,
}

/// One sampler uniform and the binding its texture comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerEntry {
    pub name: String,
    pub location: u32,
    /// Combined sampler binding, or the separate texture binding.
    pub binding: i32,
    /// Element of a sampler array.
    pub array_index: u32,
    /// Separate sampler binding when translated from a texture + sampler pair.
    pub sampler_binding: Option<i32>,
}

fn is_supported_uniform_type(ty: VariableType) -> bool {
    use VariableType::*;
    matches!(
        ty,
        Float
            | Vec2
            | Vec3
            | Vec4
            | Int
            | Int2
            | Int3
            | Int4
            | Uint
            | Uint2
            | Uint3
            | Uint4
            | Bool
            | Bool2
            | Bool3
            | Bool4
            | Mat2
            | Mat3
            | Mat4
    )
}

/// Walks reflection data and resolves locations in a linked program.
pub(crate) struct UniformTableBuilder<'a> {
    driver: &'a dyn GlDriver,
    program: GlHandle,
    pub uniforms: Vec<UniformEntry>,
    pub samplers: Vec<SamplerEntry>,
}

impl<'a> UniformTableBuilder<'a> {
    pub fn new(driver: &'a dyn GlDriver, program: GlHandle) -> Self {
        Self {
            driver,
            program,
            uniforms: Vec::new(),
            samplers: Vec::new(),
        }
    }

    /// Add every uniform and sampler of one stage.
    pub fn add_stage(&mut self, desc: &ShaderDescription, separate: &[redlilium_core::shader::SeparateToCombined]) {
        for block in &desc.uniform_blocks {
            self.add_block(block);
        }
        for var in &desc.combined_image_samplers {
            let count = var.array_dims.first().copied().unwrap_or(1).max(1);
            for i in 0..count {
                let name = if var.array_dims.is_empty() {
                    var.name.clone()
                } else {
                    format!("{}[{}]", var.name, i)
                };
                self.add_sampler(name, var.binding, i, None);
            }
        }
        for mapping in separate {
            self.add_sampler(
                mapping.combined_sampler_name.clone(),
                mapping.texture_binding,
                0,
                Some(mapping.sampler_binding),
            );
        }
    }

    /// Sort the uniform table and hand both tables out.
    pub fn finish(mut self) -> (Vec<UniformEntry>, Vec<SamplerEntry>) {
        self.uniforms
            .sort_by(|a, b| a.binding.cmp(&b.binding).then(a.offset.cmp(&b.offset)));
        (self.uniforms, self.samplers)
    }

    fn add_block(&mut self, block: &UniformBlock) {
        let prefix = if block.struct_name.is_empty() {
            String::new()
        } else {
            format!("{}.", block.struct_name)
        };
        for member in &block.members {
            if member.ty == VariableType::Struct {
                self.add_struct_member(block, &prefix, member);
            } else {
                self.add_uniform(block.binding, format!("{prefix}{}", member.name), member, 0);
            }
        }
    }

    fn add_struct_member(&mut self, block: &UniformBlock, prefix: &str, member: &BlockVariable) {
        let elements = if member.array_dims.is_empty() {
            None
        } else {
            if member.array_dims.len() > 1 {
                log::warn!(
                    "Pipeline: multi-dimensional struct array {}.{} is not supported, using the first dimension",
                    block.block_name,
                    member.name
                );
            }
            Some(member.array_dims[0])
        };
        for sub in &member.struct_members {
            if sub.ty == VariableType::Struct {
                log::warn!(
                    "Pipeline: nested struct {}.{}.{} in uniform block {} is not supported, skipping",
                    prefix.trim_end_matches('.'),
                    member.name,
                    sub.name,
                    block.block_name
                );
                continue;
            }
            match elements {
                None => {
                    let name = format!("{prefix}{}.{}", member.name, sub.name);
                    self.add_uniform(block.binding, name, sub, member.offset);
                }
                Some(count) => {
                    for i in 0..count {
                        let name = format!("{prefix}{}[{}].{}", member.name, i, sub.name);
                        let base = member.offset + i * member.array_stride;
                        self.add_uniform(block.binding, name, sub, base);
                    }
                }
            }
        }
    }

    fn add_uniform(&mut self, binding: i32, name: String, var: &BlockVariable, base_offset: u32) {
        if !is_supported_uniform_type(var.ty) {
            log::warn!("Pipeline: uniform {} has unsupported type {:?}, skipping", name, var.ty);
            return;
        }
        let Some(location) = self.driver.get_uniform_location(self.program, &name) else {
            log::trace!("Pipeline: uniform {} is inactive", name);
            return;
        };
        if self.uniforms.iter().any(|u| u.location == location) {
            return;
        }
        self.uniforms.push(UniformEntry {
            name,
            location,
            binding,
            offset: base_offset + var.offset,
            ty: var.ty,
            array_size: var.array_dims.first().copied().unwrap_or(1).max(1),
            array_stride: var.array_stride,
            matrix_stride: var.matrix_stride,
        });
    }

    fn add_sampler(&mut self, name: String, binding: i32, array_index: u32, sampler_binding: Option<i32>) {
        let Some(location) = self.driver.get_uniform_location(self.program, &name) else {
            log::trace!("Pipeline: sampler {} is inactive", name);
            return;
        };
        if self.samplers.iter().any(|s| s.location == location) {
            return;
        }
        self.samplers.push(SamplerEntry {
            name,
            location,
            binding,
            array_index,
            sampler_binding,
        });
    }
}

// ============================================================================
// Upload
// ============================================================================

fn read_f32(data: &[u8], offset: usize) -> f32 {
    data.get(offset..offset + 4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .unwrap_or(0.0)
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    data.get(offset..offset + 4)
        .map(bytemuck::pod_read_unaligned::<i32>)
        .unwrap_or(0)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    data.get(offset..offset + 4)
        .map(bytemuck::pod_read_unaligned::<u32>)
        .unwrap_or(0)
}

/// Set one uniform from a uniform buffer snapshot. `data` starts at the
/// bound range of the buffer.
pub(crate) fn upload_uniform(driver: &dyn GlDriver, entry: &UniformEntry, data: &[u8]) {
    use VariableType::*;

    let base = entry.offset as usize;
    let count = entry.array_size as usize;
    let (components, columns) = match entry.ty {
        Float | Int | Uint | Bool => (1, 0),
        Vec2 | Int2 | Uint2 | Bool2 => (2, 0),
        Vec3 | Int3 | Uint3 | Bool3 => (3, 0),
        Vec4 | Int4 | Uint4 | Bool4 => (4, 0),
        Mat2 => (2, 2),
        Mat3 => (3, 3),
        Mat4 => (4, 4),
        _ => return,
    };

    if columns > 0 {
        let column_stride = if entry.matrix_stride > 0 {
            entry.matrix_stride as usize
        } else {
            16
        };
        let element_stride = if entry.array_stride > 0 {
            entry.array_stride as usize
        } else {
            column_stride * columns
        };
        let mut values = Vec::with_capacity(count * columns * components);
        for e in 0..count {
            for c in 0..columns {
                for r in 0..components {
                    values.push(read_f32(data, base + e * element_stride + c * column_stride + r * 4));
                }
            }
        }
        driver.uniform_matrix_f32_slice(entry.location, columns as u32, &values);
        return;
    }

    // Arrays of scalars and vectors use the std140 stride of 16 when the
    // reflection does not say otherwise.
    let element_stride = if entry.array_stride > 0 {
        entry.array_stride as usize
    } else if count > 1 {
        16
    } else {
        components * 4
    };
    let offsets = (0..count).flat_map(|e| (0..components).map(move |c| base + e * element_stride + c * 4));
    match entry.ty {
        Float | Vec2 | Vec3 | Vec4 => {
            let values: Vec<f32> = offsets.map(|o| read_f32(data, o)).collect();
            driver.uniform_f32_slice(entry.location, components as u32, &values);
        }
        Int | Int2 | Int3 | Int4 => {
            let values: Vec<i32> = offsets.map(|o| read_i32(data, o)).collect();
            driver.uniform_i32_slice(entry.location, components as u32, &values);
        }
        Uint | Uint2 | Uint3 | Uint4 => {
            let values: Vec<u32> = offsets.map(|o| read_u32(data, o)).collect();
            driver.uniform_u32_slice(entry.location, components as u32, &values);
        }
        _ => {
            let values: Vec<i32> = offsets.map(|o| (read_u32(data, o) != 0) as i32).collect();
            driver.uniform_i32_slice(entry.location, components as u32, &values);
        }
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use redlilium_core::shader::{InOutVariable, SeparateToCombined};

    const VS: &str = "uniform Params { vec4 color; mat4 mvp; Light lights[2]; } ubuf;\n\
                      Light { vec3 pos; Inner inner; }\n\
                      uniform sampler2D tex; uniform sampler2D combined_tex_smp;\nvoid main() {}";

    fn program(driver: &DummyDriver) -> GlHandle {
        let vs = driver.create_shader(glow::VERTEX_SHADER).unwrap();
        driver.shader_source(vs, VS);
        driver.compile_shader(vs);
        let program = driver.create_program().unwrap();
        driver.attach_shader(program, vs);
        driver.link_program(program);
        program
    }

    fn block() -> UniformBlock {
        UniformBlock {
            block_name: "Params".into(),
            struct_name: "ubuf".into(),
            size: 128,
            binding: 0,
            descriptor_set: 0,
            members: vec![
                BlockVariable::new("color", VariableType::Vec4, 0, 16),
                BlockVariable::new("mvp", VariableType::Mat4, 16, 64),
                BlockVariable::new("lights", VariableType::Struct, 80, 64)
                    .with_array(vec![2], 32)
                    .with_struct_members(vec![
                        BlockVariable::new("pos", VariableType::Vec3, 0, 12),
                        BlockVariable::new("inner", VariableType::Struct, 16, 16),
                    ]),
                BlockVariable::new("unused", VariableType::Float, 124, 4),
            ],
        }
    }

    #[test]
    fn test_table_from_reflection() {
        let driver = DummyDriver::new();
        let program = program(&driver);
        let desc = ShaderDescription::new()
            .with_uniform_block(block())
            .with_combined_sampler(InOutVariable::new("tex", VariableType::Sampler2D, -1).with_binding(1));
        let mut builder = UniformTableBuilder::new(&driver, program);
        builder.add_stage(
            &desc,
            &[SeparateToCombined {
                combined_sampler_name: "combined_tex_smp".into(),
                texture_binding: 2,
                sampler_binding: 3,
            }],
        );
        let (uniforms, samplers) = builder.finish();

        let names: Vec<&str> = uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["ubuf.color", "ubuf.mvp", "ubuf.lights[0].pos", "ubuf.lights[1].pos"]
        );
        assert_eq!(uniforms[3].offset, 80 + 32);
        assert_eq!(samplers.len(), 2);
        assert_eq!(samplers[0].binding, 1);
        assert_eq!(samplers[1].sampler_binding, Some(3));
    }

    #[test]
    fn test_upload_vec4_and_matrix() {
        let driver = DummyDriver::new();
        let program = program(&driver);
        driver.use_program(program);
        let mut builder = UniformTableBuilder::new(&driver, program);
        builder.add_block(&block());
        let (uniforms, _) = builder.finish();

        let mut data = vec![0u8; 128];
        data[0..16].copy_from_slice(bytemuck::cast_slice(&[1.0f32, 0.5, 0.25, 1.0]));
        let identity: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ];
        data[16..80].copy_from_slice(bytemuck::cast_slice(&identity));
        for entry in &uniforms {
            upload_uniform(&driver, entry, &data);
        }
        assert_eq!(
            driver.uniform_f32(program, "ubuf.color"),
            Some(vec![1.0, 0.5, 0.25, 1.0])
        );
        assert_eq!(driver.uniform_f32(program, "ubuf.mvp"), Some(identity.to_vec()));
    }
}
