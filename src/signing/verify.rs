//! Checking an embedded Ed25519 signature.
//!
//! The digest a signer saw was taken before the signature, signer-key and
//! MD5 regions were written. Those regions start out zeroed in the carrier,
//! so reading the artifact with them masked to zero reproduces it.

use carrier_layout::{RegionName, RegionTable};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::ed25519::{compute_key_fingerprint, parse_exported_key, verify_digest};
use super::{SigningError, SigningResult};
use crate::checksum::{ChecksumEngine, DigestAlgorithm};

/// Leading line of an ASCII-armored OpenPGP key export
const PGP_ARMOR: &[u8] = b"-----BEGIN PGP";

/// Regions written after the digest was taken
const POST_DIGEST_REGIONS: [RegionName; 3] = [
    RegionName::Signature,
    RegionName::SignerKey,
    RegionName::DigestMd5,
];

/// Reader that yields zeros inside the given byte ranges.
pub struct MaskedReader<R> {
    inner: R,
    position: u64,
    masks: Vec<(u64, u64)>,
}

impl<R: Read> MaskedReader<R> {
    /// `masks` are `[start, end)` ranges.
    pub fn new(inner: R, masks: Vec<(u64, u64)>) -> Self {
        Self {
            inner,
            position: 0,
            masks,
        }
    }
}

impl<R: Read> Read for MaskedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let start = self.position;
        let end = start + n as u64;

        for &(mask_start, mask_end) in &self.masks {
            let lo = mask_start.max(start);
            let hi = mask_end.min(end);
            if lo < hi {
                buf[(lo - start) as usize..(hi - start) as usize].fill(0);
            }
        }

        self.position = end;
        Ok(n)
    }
}

/// SHA-256 hex of `artifact` as it was when the signer saw it.
pub fn signed_digest_hex(artifact: &Path, regions: &RegionTable) -> SigningResult<String> {
    let masks = POST_DIGEST_REGIONS
        .iter()
        .filter_map(|name| regions.get(*name))
        .map(|r| (r.offset, r.end()))
        .collect();

    let reader = MaskedReader::new(BufReader::new(File::open(artifact)?), masks);
    let digests = ChecksumEngine::new().digest_reader(reader, &[DigestAlgorithm::Sha256])?;
    Ok(digests.hex(DigestAlgorithm::Sha256).unwrap_or_default())
}

/// Outcome of [`verify_artifact`]
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactVerification {
    pub valid: bool,
    pub digest: String,
    pub fingerprint: String,
}

/// Verify an Ed25519-signed artifact against the key embedded in it.
pub fn verify_artifact(artifact: &Path) -> SigningResult<ArtifactVerification> {
    let regions = RegionTable::from_elf_file(artifact)?;

    let key_region = regions
        .get(RegionName::SignerKey)
        .ok_or_else(|| SigningError::InvalidKey("artifact has no signer-key region".to_string()))?;
    let sig_region = regions.get(RegionName::Signature).ok_or_else(|| {
        SigningError::InvalidSignature("artifact has no signature region".to_string())
    })?;

    let mut file = File::open(artifact)?;
    let key_text = read_region(&mut file, key_region.offset, key_region.size)?;
    if key_text.starts_with(PGP_ARMOR) {
        return Err(SigningError::NotEd25519 {
            path: artifact.to_path_buf(),
            found: super::GPG_ALGORITHM,
        });
    }
    let key = parse_exported_key(&key_text)?;

    let raw = read_region(&mut file, sig_region.offset, sig_region.size.min(64))?;
    let digest = signed_digest_hex(artifact, &regions)?;
    let valid = verify_digest(&key, &digest, &raw)?;

    Ok(ArtifactVerification {
        valid,
        digest,
        fingerprint: compute_key_fingerprint(&key),
    })
}

fn read_region(file: &mut fs::File, offset: u64, size: u64) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; size as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrier_layout::fixture::ElfImageBuilder;
    use carrier_layout::ReservedRegion;
    use sha2::{Digest, Sha256};
    use std::io::Cursor;

    #[test]
    fn test_masked_reader_zeroes_ranges_across_chunks() {
        let data: Vec<u8> = (1..=20u8).collect();
        let mut reader = MaskedReader::new(Cursor::new(data), vec![(3, 6), (15, 25)]);

        let mut out = Vec::new();
        let mut chunk = [0u8; 4];
        loop {
            let n = reader.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }

        let mut expected: Vec<u8> = (1..=20u8).collect();
        expected[3..6].fill(0);
        expected[15..20].fill(0);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_gpg_signed_bundle_is_reported_as_such() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = ElfImageBuilder::new()
            .section(".sha256_sig", 256)
            .section(".sig_key", 256)
            .build();
        let mut bytes = image.bytes.clone();
        let key_at = image.section_offset(".sig_key").unwrap() as usize;
        let armor = b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQINBF...";
        bytes[key_at..key_at + armor.len()].copy_from_slice(armor);
        let path = dir.path().join("Demo.AppImage");
        fs::write(&path, &bytes).unwrap();

        let err = verify_artifact(&path).unwrap_err();

        assert!(matches!(err, SigningError::NotEd25519 { found: "OpenPGP", .. }));
        assert!(err.to_string().contains("not an Ed25519-signed bundle"));
    }

    #[test]
    fn test_signed_digest_ignores_post_digest_regions() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        let pristine = vec![0x11u8; 10]
            .into_iter()
            .chain(vec![0u8; 10])
            .chain(vec![0x22u8; 10])
            .collect::<Vec<_>>();
        let mut patched = pristine.clone();
        patched[10..14].copy_from_slice(b"SIGN");
        fs::write(&path, &patched).unwrap();

        let table = RegionTable::new(
            vec![ReservedRegion::new(RegionName::Signature, 10, 10)],
            30,
        )
        .unwrap();

        assert_eq!(
            signed_digest_hex(&path, &table).unwrap(),
            hex::encode(Sha256::digest(&pristine))
        );
    }
}
