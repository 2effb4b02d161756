//! Persistent shader binary cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{CacheHeader, PipelineCacheKey};
use crate::driver::ProgramBinary;

/// Best-effort persistent store of linked programs.
///
/// A failed load is a miss and a failed save is dropped; neither is an error.
pub trait ShaderBinaryCache: Send + Sync {
    fn load(&self, key: &PipelineCacheKey) -> Option<ProgramBinary>;
    fn save(&self, key: &PipelineCacheKey, binary: &ProgramBinary);
}

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    header: CacheHeader,
    key: PipelineCacheKey,
    binary: ProgramBinary,
}

/// One file per program under a directory.
#[derive(Debug, Clone)]
pub struct DiskShaderCache {
    dir: PathBuf,
    header: CacheHeader,
}

impl DiskShaderCache {
    /// Open (creating if needed) a cache directory for `driver_id`.
    pub fn new(dir: impl Into<PathBuf>, driver_id: &str) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::debug!("DiskShaderCache: using {}", dir.display());
        Ok(Self {
            dir,
            header: CacheHeader::current(driver_id),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &PipelineCacheKey) -> PathBuf {
        self.dir.join(format!("{}.bin", key.to_hex()))
    }

    fn write(&self, key: &PipelineCacheKey, binary: &ProgramBinary) -> io::Result<()> {
        let entry = DiskEntry {
            header: self.header.clone(),
            key: *key,
            binary: binary.clone(),
        };
        let bytes =
            bincode::serialize(&entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)
    }
}

impl ShaderBinaryCache for DiskShaderCache {
    fn load(&self, key: &PipelineCacheKey) -> Option<ProgramBinary> {
        let path = self.path(key);
        let bytes = fs::read(&path).ok()?;
        let entry: DiskEntry = match bincode::deserialize(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("DiskShaderCache: corrupt entry {}: {e}", path.display());
                return None;
            }
        };
        if let Some(reason) = entry.header.mismatch(&self.header) {
            log::debug!("DiskShaderCache: stale entry {}: {reason}", path.display());
            return None;
        }
        if entry.key != *key {
            log::debug!("DiskShaderCache: key mismatch in {}", path.display());
            return None;
        }
        log::trace!("DiskShaderCache: hit {:?}", key);
        Some(entry.binary)
    }

    fn save(&self, key: &PipelineCacheKey, binary: &ProgramBinary) {
        if let Err(e) = self.write(key, binary) {
            log::warn!("DiskShaderCache: failed to save {:?}: {e}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlilium_core::shader::ShaderStage;

    fn key() -> PipelineCacheKey {
        PipelineCacheKey::compute(&[(ShaderStage::Compute, "void main() {}")], &[])
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskShaderCache::new(dir.path(), "driver").unwrap();
        assert!(cache.load(&key()).is_none());

        let binary = ProgramBinary {
            format: 7,
            data: vec![1, 2, 3],
        };
        cache.save(&key(), &binary);
        assert_eq!(cache.load(&key()), Some(binary));
    }

    #[test]
    fn test_corruption_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskShaderCache::new(dir.path(), "driver").unwrap();
        fs::write(cache.path(&key()), b"garbage").unwrap();
        assert!(cache.load(&key()).is_none());
    }

    #[test]
    fn test_other_driver_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let a = DiskShaderCache::new(dir.path(), "driver A").unwrap();
        a.save(
            &key(),
            &ProgramBinary {
                format: 1,
                data: vec![9],
            },
        );
        let b = DiskShaderCache::new(dir.path(), "driver B").unwrap();
        assert!(b.load(&key()).is_none());
    }
}
