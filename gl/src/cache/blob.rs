//! In-memory pipeline blob cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{CacheHeader, PipelineCacheKey};
use crate::driver::ProgramBinary;
use crate::error::GraphicsError;

#[derive(Serialize, Deserialize)]
struct BlobFile {
    header: CacheHeader,
    entries: Vec<(PipelineCacheKey, ProgramBinary)>,
}

/// Program binaries keyed by [`PipelineCacheKey`], exportable as one blob.
///
/// An imported blob is applied entirely or not at all.
#[derive(Debug, Default)]
pub struct PipelineBlobCache {
    driver_id: String,
    entries: HashMap<PipelineCacheKey, ProgramBinary>,
}

impl PipelineBlobCache {
    pub fn new(driver_id: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &PipelineCacheKey) -> Option<&ProgramBinary> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &PipelineCacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: PipelineCacheKey, binary: ProgramBinary) {
        self.entries.insert(key, binary);
    }

    /// Forget a binary the driver refused to load.
    pub fn remove(&mut self, key: &PipelineCacheKey) -> Option<ProgramBinary> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serialize every entry behind a validation header.
    pub fn export(&self) -> Vec<u8> {
        let mut entries: Vec<(PipelineCacheKey, ProgramBinary)> = self
            .entries
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        let file = BlobFile {
            header: CacheHeader::current(&self.driver_id),
            entries,
        };
        match bincode::serialize(&file) {
            Ok(bytes) => {
                log::debug!(
                    "PipelineBlobCache: exported {} programs ({} bytes)",
                    file.entries.len(),
                    bytes.len()
                );
                bytes
            }
            Err(e) => {
                log::warn!("PipelineBlobCache: export failed: {e}");
                Vec::new()
            }
        }
    }

    /// Merge a blob produced by [`export`](Self::export).
    ///
    /// Returns the number of imported programs. A payload from another
    /// format version, architecture or driver is rejected as a whole.
    pub fn import(&mut self, data: &[u8]) -> Result<usize, GraphicsError> {
        if data.is_empty() {
            return Ok(0);
        }
        let file: BlobFile = bincode::deserialize(data).map_err(|e| {
            log::warn!("PipelineBlobCache: rejected blob: {e}");
            GraphicsError::Cache(format!("undecodable pipeline cache blob: {e}"))
        })?;
        if let Some(reason) = file.header.mismatch(&CacheHeader::current(&self.driver_id)) {
            log::warn!("PipelineBlobCache: rejected blob: {reason}");
            return Err(GraphicsError::Cache(format!(
                "incompatible pipeline cache blob: {reason}"
            )));
        }
        let count = file.entries.len();
        self.entries.extend(file.entries);
        log::debug!("PipelineBlobCache: imported {count} programs");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlilium_core::shader::ShaderStage;

    fn key(src: &str) -> PipelineCacheKey {
        PipelineCacheKey::compute(&[(ShaderStage::Compute, src)], &[])
    }

    fn binary(byte: u8) -> ProgramBinary {
        ProgramBinary {
            format: 0x1234,
            data: vec![byte; 8],
        }
    }

    #[test]
    fn test_export_import() {
        let mut cache = PipelineBlobCache::new("driver A");
        cache.insert(key("a"), binary(1));
        cache.insert(key("b"), binary(2));
        let blob = cache.export();

        let mut other = PipelineBlobCache::new("driver A");
        assert_eq!(other.import(&blob).unwrap(), 2);
        assert_eq!(other.get(&key("b")), Some(&binary(2)));
    }

    #[test]
    fn test_rejects_other_driver_entirely() {
        let mut cache = PipelineBlobCache::new("driver A");
        cache.insert(key("a"), binary(1));
        let blob = cache.export();

        let mut other = PipelineBlobCache::new("driver B");
        assert!(matches!(other.import(&blob), Err(GraphicsError::Cache(_))));
        assert!(other.is_empty());
    }

    #[test]
    fn test_rejects_corrupt_blob() {
        let mut cache = PipelineBlobCache::new("driver A");
        cache.insert(key("a"), binary(1));
        let mut blob = cache.export();
        blob.truncate(blob.len() / 2);
        let mut other = PipelineBlobCache::new("driver A");
        assert!(other.import(&blob).is_err());
        assert!(other.import(&[0xFF; 3]).is_err());
        assert!(other.is_empty());
        assert_eq!(other.import(&[]).unwrap(), 0);
    }
}
