//! Shared fixtures for pipeline integration tests
//!
//! - A scratch workspace with a carrier mirror, build and output directories
//! - In-process stand-ins for mksquashfs, the signer and zsyncmake

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use appimage_primer::carrier::{CarrierProvider, MirrorCarrierSource};
use appimage_primer::config::merge_layers;
use appimage_primer::packager::{PackagingError, PackagingResult, PayloadPackager};
use appimage_primer::signing::{BundleSigner, Ed25519FileSigner, SigningError, SigningResult};
use appimage_primer::update_index::{index_path_for, IndexResult, UpdateIndexGenerator};
use appimage_primer::{BuildContext, EffectiveConfig, Pipeline};
use carrier_layout::fixture::{ElfImage, ElfImageBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const UPD_INFO_SIZE: usize = 512;
pub const SIG_SIZE: usize = 1024;
pub const KEY_SIZE: usize = 1024;
pub const MD5_SIZE: usize = 16;

/// Runtime image reserving every region
pub fn full_runtime() -> ElfImage {
    ElfImageBuilder::new()
        .section(".text", 256)
        .section(".upd_info", UPD_INFO_SIZE)
        .section(".sha256_sig", SIG_SIZE)
        .section(".sig_key", KEY_SIZE)
        .section(".digest_md5", MD5_SIZE)
        .build()
}

/// Scratch directories for one build
pub struct Workspace {
    pub dir: TempDir,
    pub runtime: ElfImage,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_runtime(full_runtime())
    }

    pub fn with_runtime(runtime: ElfImage) -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("mirror")).unwrap();
        fs::write(dir.path().join("mirror/runtime-x86_64"), &runtime.bytes).unwrap();

        let appdir = dir.path().join("AppDir");
        fs::create_dir_all(appdir.join("usr/bin")).unwrap();
        fs::write(appdir.join("AppRun"), "#!/bin/sh\nexec usr/bin/demo\n").unwrap();

        Self { dir, runtime }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn mirror_dir(&self) -> PathBuf {
        self.path().join("mirror")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.path().join("build")
    }

    pub fn appdir(&self) -> PathBuf {
        self.path().join("AppDir")
    }

    /// Recipe pointing at this workspace, with `overrides` merged on top
    pub fn recipe(&self, overrides: Value) -> Value {
        merge_layers(vec![
            json!({
                "app-info": {"name": "Demo", "version": "1.0"},
                "build": {
                    "build-dir": self.build_dir(),
                    "output-dir": self.path().join("out")
                },
                "carrier": {"mirror-dir": self.mirror_dir()}
            }),
            overrides,
        ])
    }

    pub fn context(&self, overrides: Value) -> BuildContext {
        let config = EffectiveConfig::build(None, Some(self.recipe(overrides)))
            .unwrap()
            .bundle_config()
            .unwrap();
        BuildContext::new(config)
    }

    pub fn carriers(&self) -> CarrierProvider {
        CarrierProvider::new(
            self.build_dir().join("prime"),
            Box::new(MirrorCarrierSource::new(self.mirror_dir())),
        )
    }

    /// Pipeline with fake packager and indexer and the Ed25519 signer
    pub fn pipeline(&self, payload: &[u8]) -> (Pipeline, Rc<RefCell<Vec<PathBuf>>>) {
        let indexed = Rc::new(RefCell::new(Vec::new()));
        let pipeline = Pipeline::new(
            self.carriers(),
            Box::new(FakePackager::new(payload)),
            Box::new(Ed25519FileSigner),
            Box::new(RecordingIndexer {
                calls: indexed.clone(),
            }),
        );
        (pipeline, indexed)
    }

    pub fn write_payload(&self, bytes: &[u8]) -> PathBuf {
        let path = self.path().join("payload.squashfs");
        fs::write(&path, bytes).unwrap();
        path
    }
}

/// Writes fixed bytes where mksquashfs would put the image.
pub struct FakePackager {
    bytes: Vec<u8>,
}

impl FakePackager {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl PayloadPackager for FakePackager {
    fn package(&self, appdir: &Path) -> PackagingResult<PathBuf> {
        if !appdir.is_dir() {
            return Err(PackagingError::AppDirMissing(appdir.to_path_buf()));
        }
        let output = appdir.with_file_name("AppDir.squashfs");
        fs::write(&output, &self.bytes).map_err(|_| PackagingError::NoOutput(output.clone()))?;
        Ok(output)
    }
}

/// Writes a placeholder `.zsync` and remembers the artifact it was given.
pub struct RecordingIndexer {
    pub calls: Rc<RefCell<Vec<PathBuf>>>,
}

impl UpdateIndexGenerator for RecordingIndexer {
    fn generate(&self, artifact: &Path) -> IndexResult<PathBuf> {
        self.calls.borrow_mut().push(artifact.to_path_buf());
        let index = index_path_for(artifact);
        fs::write(&index, b"zsync-index").unwrap();
        Ok(index)
    }
}

/// Signer that always fails, as gpg does for an unknown key.
pub struct RejectingSigner;

impl BundleSigner for RejectingSigner {
    fn algorithm(&self) -> &'static str {
        "OpenPGP"
    }

    fn sign(&self, _digest_hex: &str, key_id: &str) -> SigningResult<Vec<u8>> {
        Err(SigningError::UnknownKey(key_id.to_string()))
    }

    fn export_key(&self, key_id: &str) -> SigningResult<Vec<u8>> {
        Err(SigningError::UnknownKey(key_id.to_string()))
    }
}

/// Byte range of a named section in a runtime image
pub fn section_range(image: &ElfImage, name: &str) -> std::ops::Range<usize> {
    let (_, offset, size) = image
        .sections
        .iter()
        .find(|(n, _, _)| n == name)
        .unwrap();
    *offset as usize..(*offset + *size) as usize
}
