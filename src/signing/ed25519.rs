//! File-based Ed25519 signer.
//!
//! The key identifier is the path of a file holding the base64 secret key.
//! The exported key text is two lines: the base64 verifying key and its
//! SHA-256 fingerprint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

use super::{BundleSigner, SigningError, SigningResult};

/// Algorithm tag for Ed25519 signatures
pub const ED25519_ALGORITHM: &str = "Ed25519";

/// Signs with the Ed25519 secret key stored at the key-id path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519FileSigner;

impl Ed25519FileSigner {
    fn load(key_id: &str) -> SigningResult<SigningKey> {
        let encoded = fs::read_to_string(key_id).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SigningError::UnknownKey(key_id.to_string()),
            _ => SigningError::Io(e),
        })?;
        decode_signing_key(encoded.trim())
    }
}

impl BundleSigner for Ed25519FileSigner {
    fn algorithm(&self) -> &'static str {
        ED25519_ALGORITHM
    }

    fn sign(&self, digest_hex: &str, key_id: &str) -> SigningResult<Vec<u8>> {
        let key = Self::load(key_id)?;
        Ok(key.sign(digest_hex.as_bytes()).to_bytes().to_vec())
    }

    fn export_key(&self, key_id: &str) -> SigningResult<Vec<u8>> {
        let key = Self::load(key_id)?;
        Ok(export_text(&key.verifying_key()).into_bytes())
    }
}

/// Text embedded in the signer-key region
pub fn export_text(key: &VerifyingKey) -> String {
    format!(
        "{}\n{}\n",
        encode_verifying_key(key),
        compute_key_fingerprint(key)
    )
}

/// Recover the verifying key from region bytes written by [`export_text`].
///
/// Trailing NUL padding from the region is ignored. When the fingerprint
/// line is present it must match the key.
pub fn parse_exported_key(bytes: &[u8]) -> SigningResult<VerifyingKey> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let encoded = lines
        .next()
        .ok_or_else(|| SigningError::InvalidKey("signer-key region is empty".to_string()))?;
    let key = decode_verifying_key(encoded)?;

    if let Some(fingerprint) = lines.next() {
        let actual = compute_key_fingerprint(&key);
        if fingerprint != actual {
            return Err(SigningError::InvalidKey(format!(
                "fingerprint mismatch: expected {}, got {}",
                fingerprint, actual
            )));
        }
    }

    Ok(key)
}

/// Check a raw signature over the hex text of a digest.
pub fn verify_digest(key: &VerifyingKey, digest_hex: &str, signature: &[u8]) -> SigningResult<bool> {
    let signature = Signature::from_slice(signature)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    Ok(key.verify(digest_hex.as_bytes(), &signature).is_ok())
}

/// Compute SHA-256 fingerprint of an Ed25519 public key
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

pub fn encode_signing_key(key: &SigningKey) -> String {
    STANDARD.encode(key.to_bytes())
}

pub fn decode_signing_key(encoded: &str) -> SigningResult<SigningKey> {
    let bytes: [u8; 32] = STANDARD
        .decode(encoded)?
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.as_bytes())
}

pub fn decode_verifying_key(encoded: &str) -> SigningResult<VerifyingKey> {
    let bytes: [u8; 32] = STANDARD
        .decode(encoded)?
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Write a secret key file readable only by its owner.
pub fn write_signing_key(path: &Path, key: &SigningKey) -> SigningResult<()> {
    fs::write(path, format!("{}\n", encode_signing_key(key)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key_file(dir: &TempDir) -> (String, SigningKey) {
        let key = generate_keypair();
        let path = dir.path().join("signing.key");
        write_signing_key(&path, &key).unwrap();
        (path.to_string_lossy().to_string(), key)
    }

    #[test]
    fn test_sign_and_verify_hex_digest() {
        let dir = TempDir::new().unwrap();
        let (key_id, key) = key_file(&dir);
        let digest_hex = "ab".repeat(32);

        let signature = Ed25519FileSigner.sign(&digest_hex, &key_id).unwrap();
        assert_eq!(signature.len(), 64);

        let vk = key.verifying_key();
        assert!(verify_digest(&vk, &digest_hex, &signature).unwrap());
        assert!(!verify_digest(&vk, &"cd".repeat(32), &signature).unwrap());
    }

    #[test]
    fn test_export_round_trip_with_padding() {
        let dir = TempDir::new().unwrap();
        let (key_id, key) = key_file(&dir);

        let mut region = Ed25519FileSigner.export_key(&key_id).unwrap();
        region.resize(1024, 0);

        let parsed = parse_exported_key(&region).unwrap();
        assert_eq!(parsed, key.verifying_key());
    }

    #[test]
    fn test_tampered_fingerprint_rejected() {
        let key = generate_keypair().verifying_key();
        let text = format!("{}\n{}\n", encode_verifying_key(&key), "00".repeat(32));

        let result = parse_exported_key(text.as_bytes());
        assert!(matches!(result, Err(SigningError::InvalidKey(_))));
    }

    #[test]
    fn test_missing_key_file_is_unknown_key() {
        let result = Ed25519FileSigner.sign("00", "/nonexistent/signing.key");
        assert!(matches!(result, Err(SigningError::UnknownKey(_))));
    }

    #[test]
    fn test_key_encoding_round_trip() {
        let key = generate_keypair();
        let decoded = decode_signing_key(&encode_signing_key(&key)).unwrap();
        assert_eq!(decoded.to_bytes(), key.to_bytes());

        assert!(matches!(
            decode_signing_key("AAAA"),
            Err(SigningError::InvalidKey(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let (key_id, _) = key_file(&dir);
        let mode = fs::metadata(&key_id).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
