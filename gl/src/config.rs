//! Backend creation parameters.

use std::path::PathBuf;

/// Default bound of the compiled-shader cache.
pub const DEFAULT_SHADER_COMPILE_CACHE_LIMIT: usize = 128;

/// Environment variable enabling debug groups and markers.
pub const ENV_DEBUG_MARKERS: &str = "REDLILIUM_GL_DEBUG_MARKERS";
/// Environment variable disabling the on-disk shader binary cache.
pub const ENV_DISABLE_DISK_CACHE: &str = "REDLILIUM_GL_DISABLE_DISK_CACHE";
/// Environment variable selecting the on-disk shader binary cache directory.
pub const ENV_DISK_CACHE_DIR: &str = "REDLILIUM_GL_DISK_CACHE_DIR";

/// Requested format of the default surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceFormat {
    /// 8-bit RGBA, linear.
    #[default]
    Rgba8,
    /// 8-bit RGBA with sRGB encoding on write.
    Srgb8Alpha8,
}

/// Parameters for [`GlRhi::create`](crate::GlRhi::create).
///
/// # Example
///
/// ```ignore
/// let params = RhiParameters::new()
///     .with_debug_markers(true)
///     .with_disk_cache_dir("/tmp/shader-cache");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhiParameters {
    /// Debug label of the backend instance.
    pub label: Option<String>,
    /// Emit debug groups and markers into command streams.
    pub debug_markers: bool,
    /// Keep linked program binaries in the pipeline blob cache so they can be
    /// exported with [`GlRhi::pipeline_cache_data`](crate::GlRhi::pipeline_cache_data).
    pub pipeline_cache_save: bool,
    /// Directory of the on-disk shader binary cache, `None` disables it.
    pub disk_cache_dir: Option<PathBuf>,
    /// Maximum number of compiled shader objects kept for reuse.
    pub shader_compile_cache_limit: usize,
    /// Requested surface format.
    pub surface_format: SurfaceFormat,
}

impl Default for RhiParameters {
    fn default() -> Self {
        Self {
            label: None,
            debug_markers: false,
            pipeline_cache_save: false,
            disk_cache_dir: None,
            shader_compile_cache_limit: DEFAULT_SHADER_COMPILE_CACHE_LIMIT,
            surface_format: SurfaceFormat::Rgba8,
        }
    }
}

impl RhiParameters {
    /// Create parameters with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create parameters from defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup function.
    ///
    /// Split out of [`from_env`](Self::from_env) so tests can feed values
    /// without touching the process environment.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let truthy = |v: &str| matches!(v.trim(), "1" | "true" | "yes" | "on");

        if let Some(v) = lookup(ENV_DEBUG_MARKERS) {
            self.debug_markers = truthy(&v);
        }
        if let Some(dir) = lookup(ENV_DISK_CACHE_DIR)
            && !dir.is_empty()
        {
            self.disk_cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(v) = lookup(ENV_DISABLE_DISK_CACHE)
            && truthy(&v)
        {
            if self.disk_cache_dir.is_some() {
                log::info!("RhiParameters: disk shader cache disabled by {ENV_DISABLE_DISK_CACHE}");
            }
            self.disk_cache_dir = None;
        }
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enable or disable debug markers.
    pub fn with_debug_markers(mut self, enabled: bool) -> Self {
        self.debug_markers = enabled;
        self
    }

    /// Enable or disable retaining program binaries for export.
    pub fn with_pipeline_cache_save(mut self, enabled: bool) -> Self {
        self.pipeline_cache_save = enabled;
        self
    }

    /// Enable the on-disk shader binary cache in `dir`.
    pub fn with_disk_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_cache_dir = Some(dir.into());
        self
    }

    /// Set the compiled-shader cache bound.
    pub fn with_shader_compile_cache_limit(mut self, limit: usize) -> Self {
        self.shader_compile_cache_limit = limit.max(1);
        self
    }

    /// Set the requested surface format.
    pub fn with_surface_format(mut self, format: SurfaceFormat) -> Self {
        self.surface_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let params = RhiParameters::new();
        assert!(!params.debug_markers);
        assert!(params.disk_cache_dir.is_none());
        assert_eq!(
            params.shader_compile_cache_limit,
            DEFAULT_SHADER_COMPILE_CACHE_LIMIT
        );
    }

    #[test]
    fn test_env_overrides() {
        let params = RhiParameters::new().with_env_overrides(lookup(&[
            (ENV_DEBUG_MARKERS, "1"),
            (ENV_DISK_CACHE_DIR, "/tmp/cache"),
        ]));
        assert!(params.debug_markers);
        assert_eq!(params.disk_cache_dir, Some(PathBuf::from("/tmp/cache")));
    }

    #[test]
    fn test_disable_disk_cache_wins() {
        let params = RhiParameters::new()
            .with_disk_cache_dir("/var/cache")
            .with_env_overrides(lookup(&[(ENV_DISABLE_DISK_CACHE, "true")]));
        assert!(params.disk_cache_dir.is_none());
    }

    #[test]
    fn test_compile_cache_limit_is_at_least_one() {
        let params = RhiParameters::new().with_shader_compile_cache_limit(0);
        assert_eq!(params.shader_compile_cache_limit, 1);
    }
}
