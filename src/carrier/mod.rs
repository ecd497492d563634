//! Runtime carrier acquisition
//!
//! A carrier is cached once per architecture under `<build_dir>/prime` and
//! reused by later builds. Downloads land in a temporary file beside the
//! cache entry and are renamed into place only once complete.

mod arch;
mod source;

pub use arch::Architecture;
pub use source::{CarrierSource, HttpCarrierSource, MirrorCarrierSource};

use carrier_layout::{read_layout, LayoutError, RegionTable};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::checksum::{ChecksumEngine, ChecksumError, DigestAlgorithm};
use crate::config::BundleConfig;

/// Errors while obtaining a carrier
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("no {arch} runtime published at {location}")]
    NotPublished { arch: Architecture, location: String },

    #[error("carrier from {location} is empty")]
    Empty { location: String },

    #[error("carrier checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("carrier is built for ELF machine {machine}, expected {expected}")]
    ArchMismatch { expected: Architecture, machine: u16 },

    #[error("carrier layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("carrier checksum error: {0}")]
    Checksum(#[from] ChecksumError),
}

pub type AcquireResult<T> = Result<T, AcquisitionError>;

/// A runtime stub on disk with its reserved region table.
#[derive(Debug, Clone, Serialize)]
pub struct Carrier {
    pub path: PathBuf,
    pub arch: Architecture,
    pub regions: RegionTable,
    pub len: u64,
}

impl Carrier {
    /// Load a carrier and read its region table from the ELF section headers.
    pub fn load(path: impl Into<PathBuf>, arch: Architecture) -> AcquireResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let layout = read_layout(&mut BufReader::new(file))?;

        if Architecture::from_elf_machine(layout.machine) != Some(arch) {
            return Err(AcquisitionError::ArchMismatch {
                expected: arch,
                machine: layout.machine,
            });
        }

        let regions = RegionTable::from_layout(&layout, len)?;
        Ok(Self {
            path,
            arch,
            regions,
            len,
        })
    }

    /// Use a carrier whose regions are declared rather than read from ELF.
    pub fn with_regions(
        path: impl Into<PathBuf>,
        arch: Architecture,
        regions: RegionTable,
    ) -> AcquireResult<Self> {
        let path = path.into();
        let len = fs::metadata(&path)?.len();
        let regions = RegionTable::new(regions.iter().copied().collect(), len)?;
        Ok(Self {
            path,
            arch,
            regions,
            len,
        })
    }
}

/// Resolves carriers from the cache, falling back to a [`CarrierSource`].
pub struct CarrierProvider {
    cache_dir: PathBuf,
    source: Box<dyn CarrierSource>,
    pin: Option<String>,
}

impl CarrierProvider {
    pub fn new(cache_dir: impl Into<PathBuf>, source: Box<dyn CarrierSource>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            source,
            pin: None,
        }
    }

    /// Require carriers to match this lowercase hex SHA-256.
    pub fn with_pin(mut self, pin: Option<String>) -> Self {
        self.pin = pin.map(|p| p.to_lowercase());
        self
    }

    /// Mirror directory when configured, HTTP otherwise.
    pub fn from_config(cache_dir: impl Into<PathBuf>, config: &BundleConfig) -> AcquireResult<Self> {
        let source: Box<dyn CarrierSource> = match &config.carrier.mirror_dir {
            Some(dir) => Box::new(MirrorCarrierSource::new(dir)),
            None => Box::new(HttpCarrierSource::new(&config.carrier.url_base)?),
        };
        Ok(Self::new(cache_dir, source).with_pin(config.carrier.sha256.clone()))
    }

    pub fn cache_path(&self, arch: Architecture) -> PathBuf {
        self.cache_dir.join(arch.runtime_file_name())
    }

    /// Return the cached carrier for `arch`, fetching it on a miss.
    pub fn acquire(&self, arch: Architecture) -> AcquireResult<Carrier> {
        let path = self.cache_path(arch);

        if path.is_file() {
            match &self.pin {
                None => {
                    info!(path = %path.display(), "Using cached carrier");
                    return Carrier::load(path, arch);
                }
                Some(pin) => {
                    let actual = sha256_hex(&path)?;
                    if &actual == pin {
                        info!(path = %path.display(), "Using cached carrier (pinned)");
                        return Carrier::load(path, arch);
                    }
                    warn!(
                        path = %path.display(),
                        expected = %pin,
                        actual = %actual,
                        "Cached carrier does not match pin, fetching again"
                    );
                    fs::remove_file(&path)?;
                }
            }
        }

        self.fetch_into_cache(arch, &path)?;
        Carrier::load(path, arch)
    }

    fn fetch_into_cache(&self, arch: Architecture, path: &Path) -> AcquireResult<()> {
        let location = self.source.describe(arch);
        info!(source = %location, "Fetching carrier");

        fs::create_dir_all(&self.cache_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
        let written = self.source.fetch(arch, tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;

        if written == 0 {
            return Err(AcquisitionError::Empty { location });
        }

        if let Some(pin) = &self.pin {
            let actual = sha256_hex(tmp.path())?;
            if &actual != pin {
                return Err(AcquisitionError::ChecksumMismatch {
                    expected: pin.clone(),
                    actual,
                });
            }
        }

        tmp.persist(path).map_err(|e| AcquisitionError::Io(e.error))?;
        info!(path = %path.display(), bytes = written, "Cached carrier");
        Ok(())
    }
}

fn sha256_hex(path: &Path) -> AcquireResult<String> {
    let digests = ChecksumEngine::new().digest_file(path, &[DigestAlgorithm::Sha256])?;
    Ok(digests.hex(DigestAlgorithm::Sha256).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrier_layout::fixture::ElfImageBuilder;
    use carrier_layout::{RegionName, ReservedRegion};
    use sha2::{Digest, Sha256};
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Serves fixed bytes and counts how often it was asked.
    struct CountingSource {
        bytes: Vec<u8>,
        calls: Rc<Cell<u32>>,
    }

    fn counting(bytes: Vec<u8>) -> (Box<dyn CarrierSource>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let source = CountingSource {
            bytes,
            calls: calls.clone(),
        };
        (Box::new(source), calls)
    }

    impl CarrierSource for CountingSource {
        fn fetch(&self, _arch: Architecture, dest: &mut dyn Write) -> AcquireResult<u64> {
            self.calls.set(self.calls.get() + 1);
            dest.write_all(&self.bytes)?;
            Ok(self.bytes.len() as u64)
        }

        fn describe(&self, arch: Architecture) -> String {
            format!("memory:{}", arch)
        }
    }

    fn runtime_bytes() -> Vec<u8> {
        ElfImageBuilder::new()
            .section(".upd_info", 64)
            .section(".sha256_sig", 128)
            .section(".sig_key", 128)
            .build()
            .bytes
    }

    #[test]
    fn test_fetches_then_reuses_cache() {
        let dir = TempDir::new().unwrap();
        let (source, calls) = counting(runtime_bytes());
        let provider = CarrierProvider::new(dir.path().join("prime"), source);

        let first = provider.acquire(Architecture::X86_64).unwrap();
        assert_eq!(first.path, dir.path().join("prime/runtime-x86_64"));
        assert_eq!(first.regions.len(), 3);
        assert_eq!(calls.get(), 1);

        let second = provider.acquire(Architecture::X86_64).unwrap();
        assert_eq!(second.len, first.len);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_pin_mismatch_leaves_no_cache_file() {
        let dir = TempDir::new().unwrap();
        let (source, _) = counting(runtime_bytes());
        let provider = CarrierProvider::new(dir.path(), source)
            .with_pin(Some("00".repeat(32)));

        let result = provider.acquire(Architecture::X86_64);
        assert!(matches!(result, Err(AcquisitionError::ChecksumMismatch { .. })));
        assert!(!provider.cache_path(Architecture::X86_64).exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stale_cached_carrier_is_refetched_when_pinned() {
        let dir = TempDir::new().unwrap();
        let bytes = runtime_bytes();
        let pin = hex::encode(Sha256::digest(&bytes));
        let (source, calls) = counting(bytes.clone());
        let provider = CarrierProvider::new(dir.path(), source).with_pin(Some(pin.to_uppercase()));

        fs::write(provider.cache_path(Architecture::X86_64), b"stale").unwrap();

        let carrier = provider.acquire(Architecture::X86_64).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(fs::read(&carrier.path).unwrap(), bytes);
    }

    #[test]
    fn test_arch_mismatch() {
        let dir = TempDir::new().unwrap();
        let bytes = ElfImageBuilder::new().machine(183).section(".upd_info", 8).build().bytes;
        let (source, _) = counting(bytes);
        let provider = CarrierProvider::new(dir.path(), source);

        let result = provider.acquire(Architecture::X86_64);
        assert!(matches!(
            result,
            Err(AcquisitionError::ArchMismatch { machine: 183, .. })
        ));
    }

    #[test]
    fn test_empty_fetch_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (source, _) = counting(Vec::new());
        let provider = CarrierProvider::new(dir.path(), source);

        let result = provider.acquire(Architecture::I686);
        assert!(matches!(result, Err(AcquisitionError::Empty { .. })));
        assert!(!provider.cache_path(Architecture::I686).exists());
    }

    #[test]
    fn test_with_regions_revalidates_against_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runtime-x86_64");
        fs::write(&path, vec![0u8; 50]).unwrap();

        let table = RegionTable::new(
            vec![ReservedRegion::new(RegionName::UpdateInfo, 40, 20)],
            100,
        )
        .unwrap();

        let result = Carrier::with_regions(&path, Architecture::X86_64, table);
        assert!(matches!(result, Err(AcquisitionError::Layout(_))));
    }
}
