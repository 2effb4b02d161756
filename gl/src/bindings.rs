//! Shader resource binding tables.
//!
//! A [`ShaderResourceBindings`] is an ordered list of resources addressed by
//! binding number. It is decoupled from pipelines so one pipeline can draw
//! with many tables. Nothing here touches the driver: the command buffer
//! snapshots the table when it is bound and the executor resolves it against
//! the bound pipeline's uniform and sampler tables.

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::GraphicsError;
use crate::resources::{Buffer, Sampler, Texture};
use crate::types::{BufferUsage, TextureFlags};

bitflags! {
    /// Shader stages that can see a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const TESSELLATION_CONTROL = 1 << 1;
        const TESSELLATION_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

impl ShaderStageFlags {
    /// Vertex and fragment.
    pub fn vertex_fragment() -> Self {
        Self::VERTEX | Self::FRAGMENT
    }
}

/// The resource behind a binding.
#[derive(Debug, Clone)]
pub enum BindingResource {
    /// Host-side uniform data, decomposed into uniforms at draw time.
    UniformBuffer {
        buffer: Arc<Buffer>,
        offset: u32,
        /// Bytes visible to the shader; 0 means up to the end of the buffer.
        size: u32,
        /// The offset can be overridden per `set_shader_resources` call.
        dynamic_offset: bool,
    },
    /// Combined image samplers; more than one entry for sampler arrays.
    SampledTexture {
        textures: Vec<(Arc<Texture>, Arc<Sampler>)>,
    },
    /// Separate textures, paired with separate samplers through the
    /// shader's combined-sampler mapping.
    Texture { textures: Vec<Arc<Texture>> },
    /// Separate samplers.
    Sampler { samplers: Vec<Arc<Sampler>> },
    ImageLoad { texture: Arc<Texture>, level: u32 },
    ImageStore { texture: Arc<Texture>, level: u32 },
    ImageLoadStore { texture: Arc<Texture>, level: u32 },
    BufferLoad { buffer: Arc<Buffer>, offset: u32, size: u32 },
    BufferStore { buffer: Arc<Buffer>, offset: u32, size: u32 },
    BufferLoadStore { buffer: Arc<Buffer>, offset: u32, size: u32 },
}

impl BindingResource {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::UniformBuffer { .. } => "uniform buffer",
            Self::SampledTexture { .. } => "sampled texture",
            Self::Texture { .. } => "texture",
            Self::Sampler { .. } => "sampler",
            Self::ImageLoad { .. } => "image load",
            Self::ImageStore { .. } => "image store",
            Self::ImageLoadStore { .. } => "image load/store",
            Self::BufferLoad { .. } => "buffer load",
            Self::BufferStore { .. } => "buffer store",
            Self::BufferLoadStore { .. } => "buffer load/store",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            Self::ImageLoad { .. } | Self::ImageStore { .. } | Self::ImageLoadStore { .. }
        )
    }

    pub fn is_storage_buffer(&self) -> bool {
        matches!(
            self,
            Self::BufferLoad { .. } | Self::BufferStore { .. } | Self::BufferLoadStore { .. }
        )
    }
}

/// One entry of a binding table.
#[derive(Debug, Clone)]
pub struct Binding {
    pub binding: i32,
    pub stages: ShaderStageFlags,
    pub resource: BindingResource,
}

impl Binding {
    /// Whole uniform buffer.
    pub fn uniform_buffer(binding: i32, stages: ShaderStageFlags, buffer: Arc<Buffer>) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::UniformBuffer {
                buffer,
                offset: 0,
                size: 0,
                dynamic_offset: false,
            },
        }
    }

    /// Uniform buffer range.
    pub fn uniform_buffer_range(
        binding: i32,
        stages: ShaderStageFlags,
        buffer: Arc<Buffer>,
        offset: u32,
        size: u32,
    ) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::UniformBuffer {
                buffer,
                offset,
                size,
                dynamic_offset: false,
            },
        }
    }

    /// Uniform buffer whose offset is supplied when the table is bound.
    pub fn uniform_buffer_with_dynamic_offset(
        binding: i32,
        stages: ShaderStageFlags,
        buffer: Arc<Buffer>,
        size: u32,
    ) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::UniformBuffer {
                buffer,
                offset: 0,
                size,
                dynamic_offset: true,
            },
        }
    }

    pub fn sampled_texture(
        binding: i32,
        stages: ShaderStageFlags,
        texture: Arc<Texture>,
        sampler: Arc<Sampler>,
    ) -> Self {
        Self::sampled_textures(binding, stages, vec![(texture, sampler)])
    }

    pub fn sampled_textures(
        binding: i32,
        stages: ShaderStageFlags,
        textures: Vec<(Arc<Texture>, Arc<Sampler>)>,
    ) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::SampledTexture { textures },
        }
    }

    pub fn texture(binding: i32, stages: ShaderStageFlags, texture: Arc<Texture>) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::Texture {
                textures: vec![texture],
            },
        }
    }

    pub fn sampler(binding: i32, stages: ShaderStageFlags, sampler: Arc<Sampler>) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::Sampler {
                samplers: vec![sampler],
            },
        }
    }

    pub fn image_load(binding: i32, stages: ShaderStageFlags, texture: Arc<Texture>, level: u32) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::ImageLoad { texture, level },
        }
    }

    pub fn image_store(binding: i32, stages: ShaderStageFlags, texture: Arc<Texture>, level: u32) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::ImageStore { texture, level },
        }
    }

    pub fn image_load_store(
        binding: i32,
        stages: ShaderStageFlags,
        texture: Arc<Texture>,
        level: u32,
    ) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::ImageLoadStore { texture, level },
        }
    }

    /// Whole storage buffer, read only.
    pub fn buffer_load(binding: i32, stages: ShaderStageFlags, buffer: Arc<Buffer>) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::BufferLoad {
                buffer,
                offset: 0,
                size: 0,
            },
        }
    }

    /// Whole storage buffer, write only.
    pub fn buffer_store(binding: i32, stages: ShaderStageFlags, buffer: Arc<Buffer>) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::BufferStore {
                buffer,
                offset: 0,
                size: 0,
            },
        }
    }

    /// Whole storage buffer, read and write.
    pub fn buffer_load_store(binding: i32, stages: ShaderStageFlags, buffer: Arc<Buffer>) -> Self {
        Self {
            binding,
            stages,
            resource: BindingResource::BufferLoadStore {
                buffer,
                offset: 0,
                size: 0,
            },
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.binding < 0 {
            return Err(format!("binding number {} is negative", self.binding));
        }
        if self.stages.is_empty() {
            return Err(format!("binding {} is visible to no stage", self.binding));
        }
        let range_ok = |buffer: &Buffer, offset: u32, size: u32| {
            offset <= buffer.size() && offset.saturating_add(size) <= buffer.size()
        };
        match &self.resource {
            BindingResource::UniformBuffer {
                buffer,
                offset,
                size,
                ..
            } => {
                if !buffer.is_uniform() {
                    return Err(format!("binding {}: buffer is not a uniform buffer", self.binding));
                }
                if !range_ok(buffer, *offset, *size) {
                    return Err(format!(
                        "binding {}: range {}+{} exceeds buffer size {}",
                        self.binding,
                        offset,
                        size,
                        buffer.size()
                    ));
                }
            }
            BindingResource::SampledTexture { textures } if textures.is_empty() => {
                return Err(format!("binding {}: no textures", self.binding));
            }
            BindingResource::Texture { textures } if textures.is_empty() => {
                return Err(format!("binding {}: no textures", self.binding));
            }
            BindingResource::Sampler { samplers } if samplers.is_empty() => {
                return Err(format!("binding {}: no samplers", self.binding));
            }
            BindingResource::ImageLoad { texture, level }
            | BindingResource::ImageStore { texture, level }
            | BindingResource::ImageLoadStore { texture, level } => {
                if !texture.flags().contains(TextureFlags::USED_WITH_LOAD_STORE) {
                    return Err(format!(
                        "binding {}: texture lacks USED_WITH_LOAD_STORE",
                        self.binding
                    ));
                }
                if *level >= texture.mip_levels() {
                    return Err(format!(
                        "binding {}: level {} out of range ({} levels)",
                        self.binding,
                        level,
                        texture.mip_levels()
                    ));
                }
            }
            BindingResource::BufferLoad {
                buffer,
                offset,
                size,
            }
            | BindingResource::BufferStore {
                buffer,
                offset,
                size,
            }
            | BindingResource::BufferLoadStore {
                buffer,
                offset,
                size,
            } => {
                if !buffer.usage().contains(BufferUsage::STORAGE) {
                    return Err(format!("binding {}: buffer is not a storage buffer", self.binding));
                }
                if !range_ok(buffer, *offset, *size) {
                    return Err(format!(
                        "binding {}: range {}+{} exceeds buffer size {}",
                        self.binding,
                        offset,
                        size,
                        buffer.size()
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A binding table.
///
/// # Example
///
/// ```ignore
/// let mut srb = rhi.new_shader_resource_bindings();
/// srb.set_bindings(vec![
///     Binding::uniform_buffer(0, ShaderStageFlags::vertex_fragment(), ubuf.clone()),
///     Binding::sampled_texture(1, ShaderStageFlags::FRAGMENT, texture.clone(), sampler.clone()),
/// ]);
/// srb.create()?;
/// ```
pub struct ShaderResourceBindings {
    id: u64,
    bindings: Vec<Binding>,
    generation: u64,
    has_dynamic_offset: bool,
    valid: bool,
}

impl ShaderResourceBindings {
    pub(crate) fn new() -> Self {
        Self {
            id: crate::resources::next_resource_id(),
            bindings: Vec::new(),
            generation: 0,
            has_dynamic_offset: false,
            valid: false,
        }
    }

    /// Set the bindings and return self, for chaining before `create`.
    pub fn with_bindings(mut self, bindings: Vec<Binding>) -> Self {
        self.set_bindings(bindings);
        self
    }

    /// Replace the binding list. Takes effect at the next [`create`](Self::create).
    pub fn set_bindings(&mut self, bindings: Vec<Binding>) {
        self.bindings = bindings;
        self.valid = false;
    }

    /// Validate the bindings and make the table usable.
    pub fn create(&mut self) -> Result<(), GraphicsError> {
        self.valid = false;
        let mut seen = std::collections::HashSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.binding) {
                log::warn!("ShaderResourceBindings: binding {} used twice", binding.binding);
                return Err(GraphicsError::Validation(format!(
                    "binding {} used twice",
                    binding.binding
                )));
            }
            if let Err(message) = binding.validate() {
                log::warn!("ShaderResourceBindings: {message}");
                return Err(GraphicsError::Validation(message));
            }
        }
        self.bindings.sort_by_key(|b| b.binding);
        self.has_dynamic_offset = self.bindings.iter().any(|b| {
            matches!(
                b.resource,
                BindingResource::UniformBuffer {
                    dynamic_offset: true,
                    ..
                }
            )
        });
        self.generation += 1;
        self.valid = true;
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Incremented by every successful [`create`](Self::create).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_dynamic_offset(&self) -> bool {
        self.has_dynamic_offset
    }

    /// Whether the last `create` succeeded and no bindings changed since.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// The binding with number `binding`.
    pub fn find(&self, binding: i32) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

impl std::fmt::Debug for ShaderResourceBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderResourceBindings")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("bindings", &self.bindings.len())
            .field("has_dynamic_offset", &self.has_dynamic_offset)
            .finish()
    }
}

// Ensure ShaderResourceBindings is Send + Sync
static_assertions::assert_impl_all!(ShaderResourceBindings: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use crate::release::DeferredReleaseQueue;
    use crate::types::{BufferDescriptor, BufferType, SamplerDescriptor};

    fn uniform(size: u32) -> Arc<Buffer> {
        let driver = DummyDriver::new();
        Arc::new(
            Buffer::create(
                &driver,
                BufferDescriptor::new(BufferType::Dynamic, BufferUsage::UNIFORM, size),
                Arc::new(DeferredReleaseQueue::new()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_create_bumps_generation_and_sorts() {
        let ubuf = uniform(64);
        let sampler = Arc::new(Sampler::new(SamplerDescriptor::default()));
        let mut srb = ShaderResourceBindings::new().with_bindings(vec![
            Binding::sampler(3, ShaderStageFlags::FRAGMENT, sampler),
            Binding::uniform_buffer(0, ShaderStageFlags::vertex_fragment(), ubuf),
        ]);
        assert!(!srb.is_valid());
        srb.create().unwrap();
        assert_eq!(srb.generation(), 1);
        assert_eq!(srb.bindings()[0].binding, 0);
        assert!(!srb.has_dynamic_offset());
        srb.create().unwrap();
        assert_eq!(srb.generation(), 2);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let ubuf = uniform(64);
        let mut srb = ShaderResourceBindings::new().with_bindings(vec![
            Binding::uniform_buffer(0, ShaderStageFlags::VERTEX, ubuf.clone()),
            Binding::uniform_buffer(0, ShaderStageFlags::FRAGMENT, ubuf),
        ]);
        assert!(matches!(srb.create(), Err(GraphicsError::Validation(_))));
        assert!(!srb.is_valid());
        assert_eq!(srb.generation(), 0);
    }

    #[test]
    fn test_dynamic_offset_and_range_checks() {
        let ubuf = uniform(256);
        let mut srb = ShaderResourceBindings::new().with_bindings(vec![
            Binding::uniform_buffer_with_dynamic_offset(0, ShaderStageFlags::VERTEX, ubuf.clone(), 64),
        ]);
        srb.create().unwrap();
        assert!(srb.has_dynamic_offset());

        srb.set_bindings(vec![Binding::uniform_buffer_range(
            0,
            ShaderStageFlags::VERTEX,
            ubuf,
            200,
            128,
        )]);
        assert!(srb.create().is_err());
    }
}
