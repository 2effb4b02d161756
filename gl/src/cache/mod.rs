//! Program caches.
//!
//! Three layers avoid recompiling shaders:
//!
//! ```text
//! PipelineCacheKey ──► PipelineBlobCache (in memory, exportable)
//!                  └─► ShaderBinaryCache (persistent, e.g. DiskShaderCache)
//!                  └─► compile + link (ShaderCompileCache reuses shader objects)
//! ```
//!
//! Every persisted payload starts with a [`CacheHeader`]. A header that does
//! not match the running process and driver turns the payload into a miss.

mod blob;
mod disk;
mod key;

pub use blob::PipelineBlobCache;
pub use disk::{DiskShaderCache, ShaderBinaryCache};
pub use key::PipelineCacheKey;

use serde::{Deserialize, Serialize};

use crate::caps::Capabilities;

/// "RLPC"
pub const CACHE_MAGIC: u32 = 0x524C_5043;

/// Bumped whenever the payload layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Driver identification strings are truncated to this many bytes.
pub const DRIVER_ID_MAX_LEN: usize = 240;

/// Validation header of cache payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub magic: u32,
    pub format_version: u32,
    pub pointer_width: u32,
    pub driver_id: String,
}

impl CacheHeader {
    /// Header for the running process and `driver_id`.
    pub fn current(driver_id: &str) -> Self {
        Self {
            magic: CACHE_MAGIC,
            format_version: CACHE_FORMAT_VERSION,
            pointer_width: usize::BITS,
            driver_id: truncate_driver_id(driver_id),
        }
    }

    /// Describe the first mismatch against `expected`, if any.
    pub fn mismatch(&self, expected: &CacheHeader) -> Option<String> {
        if self.magic != expected.magic {
            Some(format!("bad magic 0x{:08X}", self.magic))
        } else if self.format_version != expected.format_version {
            Some(format!(
                "format version {} (expected {})",
                self.format_version, expected.format_version
            ))
        } else if self.pointer_width != expected.pointer_width {
            Some(format!(
                "pointer width {} (expected {})",
                self.pointer_width, expected.pointer_width
            ))
        } else if self.driver_id != expected.driver_id {
            Some(format!("driver '{}' (expected '{}')", self.driver_id, expected.driver_id))
        } else {
            None
        }
    }
}

/// Identification of the driver a program binary came from.
pub fn driver_id(caps: &Capabilities) -> String {
    truncate_driver_id(&format!(
        "{} {} {}",
        caps.vendor, caps.renderer, caps.version_string
    ))
}

fn truncate_driver_id(id: &str) -> String {
    if id.len() <= DRIVER_ID_MAX_LEN {
        return id.to_string();
    }
    let mut end = DRIVER_ID_MAX_LEN;
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    id[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_mismatch() {
        let a = CacheHeader::current("Mesa llvmpipe 4.5");
        assert_eq!(a.mismatch(&a.clone()), None);

        let mut b = a.clone();
        b.pointer_width = 16;
        assert!(a.mismatch(&b).unwrap().contains("pointer width"));

        let c = CacheHeader::current("Other driver");
        assert!(a.mismatch(&c).unwrap().contains("driver"));
    }

    #[test]
    fn test_driver_id_truncation() {
        let long = "é".repeat(200);
        let header = CacheHeader::current(&long);
        assert!(header.driver_id.len() <= DRIVER_ID_MAX_LEN);
        assert!(long.starts_with(&header.driver_id));
    }
}
