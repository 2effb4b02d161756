//! Shader variant selection and compilation.
//!
//! A [`Shader`] carries one source per shading-language version. At pipeline
//! creation the backend walks the context's candidate list (highest version
//! first, see [`Capabilities::shader_version_candidates`]) and picks the first
//! version the shader has a non-empty source for.
//!
//! Compiled shader objects are reused across pipelines through
//! [`ShaderCompileCache`], keyed by stage and exact source text.

use std::collections::HashMap;

use redlilium_core::profiling::profile_scope;
use redlilium_core::shader::{Shader, ShaderStage, ShaderVersion};

use crate::caps::Capabilities;
use crate::driver::{GlDriver, GlHandle};
use crate::error::GraphicsError;
use crate::release::{DeferredRelease, DeferredReleaseQueue};

/// GL shader type enum of a stage.
pub fn gl_shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::TessellationControl => glow::TESS_CONTROL_SHADER,
        ShaderStage::TessellationEvaluation => glow::TESS_EVALUATION_SHADER,
        ShaderStage::Geometry => glow::GEOMETRY_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Compute => glow::COMPUTE_SHADER,
    }
}

/// Pick the source variant for `shader` from `candidates`, highest first.
pub fn select_variant<'a>(
    shader: &'a Shader,
    candidates: &[ShaderVersion],
) -> Result<(ShaderVersion, &'a str), GraphicsError> {
    for version in candidates {
        if let Some(source) = shader.source(version) {
            log::trace!(
                "Shader: selected GLSL {} for the {} stage",
                version,
                shader.stage().name()
            );
            return Ok((*version, source));
        }
    }
    let available: Vec<String> = shader.versions().map(|v| v.to_string()).collect();
    log::error!(
        "Shader: no {} stage variant matches the context (have [{}], accept [{}])",
        shader.stage().name(),
        available.join(", "),
        candidates
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Err(GraphicsError::NoShaderVariant(shader.stage().name().to_string()))
}

/// Whether the context can run `stage` at all.
pub fn stage_supported(stage: ShaderStage, caps: &Capabilities) -> bool {
    match stage {
        ShaderStage::Vertex | ShaderStage::Fragment => true,
        ShaderStage::TessellationControl | ShaderStage::TessellationEvaluation => {
            caps.tessellation
        }
        ShaderStage::Geometry => caps.geometry_shader,
        ShaderStage::Compute => caps.compute,
    }
}

// ============================================================================
// Compile cache
// ============================================================================

/// Bounded cache of compiled shader objects.
///
/// When an insert would exceed the limit the whole cache is cleared and the
/// old shader objects are queued for deferred release; programs that already
/// link them keep working.
#[derive(Debug)]
pub struct ShaderCompileCache {
    limit: usize,
    entries: HashMap<(ShaderStage, String), GlHandle>,
    hits: u64,
}

impl ShaderCompileCache {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: HashMap::new(),
            hits: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of compiles avoided so far.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn get(&self, stage: ShaderStage, source: &str) -> Option<GlHandle> {
        // Borrowed lookup without allocating a key would need a custom Borrow impl.
        self.entries
            .iter()
            .find(|((s, src), _)| *s == stage && src == source)
            .map(|(_, h)| *h)
    }

    /// Return a compiled shader for `source`, compiling it on a miss.
    ///
    /// A compile failure deletes the shader object and carries the driver log.
    pub fn compile(
        &mut self,
        driver: &dyn GlDriver,
        stage: ShaderStage,
        source: &str,
        release_queue: &DeferredReleaseQueue,
    ) -> Result<GlHandle, GraphicsError> {
        if let Some(handle) = self.entries.get(&(stage, source.to_string())) {
            self.hits += 1;
            log::trace!("Shader: compile cache hit for the {} stage", stage.name());
            return Ok(*handle);
        }

        profile_scope!("compile_shader");
        let shader = driver
            .create_shader(gl_shader_type(stage))
            .map_err(GraphicsError::ResourceCreationFailed)?;
        driver.shader_source(shader, source);
        driver.compile_shader(shader);
        if !driver.get_shader_compile_status(shader) {
            let info = driver.get_shader_info_log(shader);
            driver.delete_shader(shader);
            log::error!("Shader: failed to compile {} shader:\n{}", stage.name(), info);
            return Err(GraphicsError::ShaderCompilation(format!(
                "{} stage: {}",
                stage.name(),
                info.trim()
            )));
        }

        if self.entries.len() >= self.limit {
            log::debug!(
                "Shader: compile cache reached {} entries, clearing",
                self.entries.len()
            );
            self.clear(release_queue);
        }
        self.entries.insert((stage, source.to_string()), shader);
        Ok(shader)
    }

    /// Drop every cached shader object.
    pub fn clear(&mut self, release_queue: &DeferredReleaseQueue) {
        for (_, handle) in self.entries.drain() {
            release_queue.push(DeferredRelease::Shader(handle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlilium_core::shader::ShaderDescription;

    fn shader() -> Shader {
        Shader::new(ShaderStage::Vertex, ShaderDescription::new())
            .with_source(ShaderVersion::gles(100), "void main() {}")
            .with_source(ShaderVersion::gles(300), "#version 300 es\nvoid main() {}")
            .with_source(ShaderVersion::glsl(330), "#version 330\nvoid main() {}")
    }

    #[test]
    fn test_select_highest_supported_variant() {
        let s = shader();
        let candidates = [
            ShaderVersion::gles(320),
            ShaderVersion::gles(310),
            ShaderVersion::gles(300),
            ShaderVersion::gles(100),
        ];
        let (version, source) = select_variant(&s, &candidates).unwrap();
        assert_eq!(version, ShaderVersion::gles(300));
        assert!(source.starts_with("#version 300 es"));

        let (version, _) = select_variant(&s, &[ShaderVersion::gles(100)]).unwrap();
        assert_eq!(version, ShaderVersion::gles(100));
    }

    #[test]
    fn test_empty_source_is_skipped() {
        let s = Shader::new(ShaderStage::Fragment, ShaderDescription::new())
            .with_source(ShaderVersion::glsl(450), "")
            .with_source(ShaderVersion::glsl(330), "#version 330\nvoid main() {}");
        let candidates = [ShaderVersion::glsl(450), ShaderVersion::glsl(330)];
        let (version, _) = select_variant(&s, &candidates).unwrap();
        assert_eq!(version, ShaderVersion::glsl(330));
    }

    #[test]
    fn test_no_variant() {
        let s = shader();
        let err = select_variant(&s, &[ShaderVersion::glsl(460)]).unwrap_err();
        assert_eq!(err, GraphicsError::NoShaderVariant("vertex".into()));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_compile_cache_reuses_and_clears() {
        use crate::driver::DummyDriver;

        let driver = DummyDriver::new();
        let queue = DeferredReleaseQueue::new();
        let mut cache = ShaderCompileCache::new(2);

        let a = cache
            .compile(&driver, ShaderStage::Vertex, "void main() {}", &queue)
            .unwrap();
        let again = cache
            .compile(&driver, ShaderStage::Vertex, "void main() {}", &queue)
            .unwrap();
        assert_eq!(a, again);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.get(ShaderStage::Vertex, "void main() {}"), Some(a));
        assert_eq!(cache.get(ShaderStage::Fragment, "void main() {}"), None);

        cache
            .compile(&driver, ShaderStage::Fragment, "void main() {}", &queue)
            .unwrap();
        assert_eq!(cache.len(), 2);
        cache
            .compile(&driver, ShaderStage::Fragment, "void main() { }", &queue)
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_compile_failure_carries_log() {
        use crate::driver::DummyDriver;

        let driver = DummyDriver::new();
        let queue = DeferredReleaseQueue::new();
        let mut cache = ShaderCompileCache::new(4);
        let err = cache
            .compile(&driver, ShaderStage::Fragment, "#error broken\n", &queue)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ShaderCompilation(log) if log.contains("#error")));
        assert!(cache.is_empty());
        assert_eq!(driver.live_shaders(), 0);
    }
}
