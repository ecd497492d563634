//! In-place writes into reserved regions of an assembled artifact.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::{LayoutResult, PatchError, PatchResult};
use crate::region::{RegionName, RegionTable, ReservedRegion};

/// Writes bytes into the reserved regions of one artifact file.
///
/// The artifact is opened once per operation and closed before returning.
/// A patch never changes the file length and never touches a byte outside
/// `[offset, offset + len)`.
#[derive(Debug, Clone)]
pub struct SectionPatcher {
    artifact: PathBuf,
    regions: RegionTable,
}

impl SectionPatcher {
    /// Patch `artifact` using a region table resolved from its carrier.
    pub fn new(artifact: impl Into<PathBuf>, regions: RegionTable) -> Self {
        Self {
            artifact: artifact.into(),
            regions,
        }
    }

    /// Patch `artifact`, reading the region table from its own ELF headers.
    ///
    /// Valid because the carrier is the head of the artifact: section offsets
    /// are unchanged by the appended payload.
    pub fn open(artifact: impl Into<PathBuf>) -> LayoutResult<Self> {
        let artifact = artifact.into();
        let regions = RegionTable::from_elf_file(&artifact)?;
        Ok(Self { artifact, regions })
    }

    /// Find a region by name. Absence is reported, not an error.
    pub fn locate(&self, name: RegionName) -> Option<ReservedRegion> {
        self.regions.get(name).copied()
    }

    /// Find a region that must exist.
    pub fn require(&self, name: RegionName) -> PatchResult<ReservedRegion> {
        self.locate(name).ok_or(PatchError::RegionMissing(name))
    }

    /// Write `data` at `offset`.
    ///
    /// `offset` must fall inside a reserved region and `data` must fit in the
    /// remainder of that region; otherwise nothing is written.
    pub fn patch(&self, offset: u64, data: &[u8]) -> PatchResult<()> {
        let region = *self
            .regions
            .containing(offset)
            .ok_or(PatchError::OutsideRegions { offset })?;

        let len = data.len() as u64;
        let available = region.end() - offset;
        if len > available {
            return Err(PatchError::Overflow {
                region: region.name,
                len,
                size: available,
            });
        }

        self.write_at(offset, data)
    }

    /// Write `data` at the start of a region that may be absent.
    ///
    /// Returns `Ok(None)` without touching the artifact when the carrier does
    /// not reserve the region.
    pub fn patch_region(&self, name: RegionName, data: &[u8]) -> PatchResult<Option<ReservedRegion>> {
        match self.locate(name) {
            Some(region) => {
                self.write_region(&region, data)?;
                Ok(Some(region))
            }
            None => Ok(None),
        }
    }

    /// Write `data` at the start of a region that must exist.
    pub fn patch_required(&self, name: RegionName, data: &[u8]) -> PatchResult<ReservedRegion> {
        let region = self.require(name)?;
        self.write_region(&region, data)?;
        Ok(region)
    }

    fn write_region(&self, region: &ReservedRegion, data: &[u8]) -> PatchResult<()> {
        let len = data.len() as u64;
        if len > region.size {
            return Err(PatchError::Overflow {
                region: region.name,
                len,
                size: region.size,
            });
        }
        self.write_at(region.offset, data)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> PatchResult<()> {
        let mut file = OpenOptions::new().write(true).open(&self.artifact)?;

        let file_len = file.metadata()?.len();
        let end = offset + data.len() as u64;
        if end > file_len {
            return Err(PatchError::BeyondEnd { end, file_len });
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::ElfImageBuilder;
    use std::fs;
    use tempfile::TempDir;

    fn zero_carrier(dir: &TempDir, len: usize) -> PathBuf {
        let path = dir.path().join("bundle.AppImage");
        fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    fn update_info_table() -> RegionTable {
        RegionTable::new(
            vec![ReservedRegion::new(RegionName::UpdateInfo, 40, 20)],
            100,
        )
        .unwrap()
    }

    #[test]
    fn test_patch_update_info_scenario() {
        let dir = TempDir::new().unwrap();
        let path = zero_carrier(&dir, 100);
        let patcher = SectionPatcher::new(&path, update_info_table());

        let region = patcher
            .patch_region(RegionName::UpdateInfo, b"http://x")
            .unwrap()
            .unwrap();
        assert_eq!(region.offset, 40);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 100);
        assert_eq!(&bytes[40..48], b"http://x");
        assert!(bytes[..40].iter().all(|&b| b == 0));
        assert!(bytes[48..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_patch_leaves_outside_bytes_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        let original: Vec<u8> = (0..100u8).collect();
        fs::write(&path, &original).unwrap();
        let patcher = SectionPatcher::new(&path, update_info_table());

        patcher.patch(45, &[0xAA; 10]).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..45], &original[..45]);
        assert_eq!(&bytes[45..55], &[0xAA; 10]);
        assert_eq!(&bytes[55..], &original[55..]);
    }

    #[test]
    fn test_oversized_patch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = zero_carrier(&dir, 100);
        let patcher = SectionPatcher::new(&path, update_info_table());

        let result = patcher.patch_region(RegionName::UpdateInfo, &[0xFF; 21]);
        assert!(matches!(
            result,
            Err(PatchError::Overflow { len: 21, size: 20, .. })
        ));

        // Raw patch that starts inside the region but runs past its end.
        let result = patcher.patch(50, &[0xFF; 11]);
        assert!(matches!(result, Err(PatchError::Overflow { .. })));

        assert!(fs::read(&path).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_patch_outside_any_region() {
        let dir = TempDir::new().unwrap();
        let path = zero_carrier(&dir, 100);
        let patcher = SectionPatcher::new(&path, update_info_table());

        let result = patcher.patch(10, b"x");
        assert!(matches!(result, Err(PatchError::OutsideRegions { offset: 10 })));
        assert!(fs::read(&path).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_absent_optional_region_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = zero_carrier(&dir, 100);
        let patcher = SectionPatcher::new(&path, update_info_table());

        let result = patcher.patch_region(RegionName::Signature, b"sig").unwrap();
        assert!(result.is_none());
        assert!(fs::read(&path).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_absent_required_region_fails() {
        let dir = TempDir::new().unwrap();
        let path = zero_carrier(&dir, 100);
        let patcher = SectionPatcher::new(&path, RegionTable::empty());

        let result = patcher.patch_required(RegionName::SignerKey, b"key");
        assert!(matches!(
            result,
            Err(PatchError::RegionMissing(RegionName::SignerKey))
        ));
    }

    #[test]
    fn test_patch_beyond_artifact_end() {
        let dir = TempDir::new().unwrap();
        // Table declared for a 100-byte carrier, file truncated to 45 bytes.
        let path = zero_carrier(&dir, 45);
        let patcher = SectionPatcher::new(&path, update_info_table());

        let result = patcher.patch_region(RegionName::UpdateInfo, b"http://x");
        assert!(matches!(result, Err(PatchError::BeyondEnd { end: 48, file_len: 45 })));
        assert_eq!(fs::read(&path).unwrap().len(), 45);
    }

    #[test]
    fn test_open_reads_table_from_assembled_artifact() {
        let dir = TempDir::new().unwrap();
        let image = ElfImageBuilder::new()
            .section(".upd_info", 64)
            .section(".sha256_sig", 128)
            .build();
        let path = dir.path().join("bundle.AppImage");
        let mut bytes = image.bytes.clone();
        bytes.extend_from_slice(b"payload bytes after the carrier");
        fs::write(&path, &bytes).unwrap();

        let patcher = SectionPatcher::open(&path).unwrap();
        patcher
            .patch_required(RegionName::Signature, b"SIGNATURE")
            .unwrap();

        let offset = image.section_offset(".sha256_sig").unwrap() as usize;
        let patched = fs::read(&path).unwrap();
        assert_eq!(patched.len(), bytes.len());
        assert_eq!(&patched[offset..offset + 9], b"SIGNATURE");
        assert!(patched.ends_with(b"payload bytes after the carrier"));
    }
}
