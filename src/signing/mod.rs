//! Bundle signing
//!
//! The signer receives the lowercase hex text of the artifact's SHA-256
//! digest, never the raw digest bytes, and its output is embedded verbatim.
//! Two backends exist: GnuPG (the AppImage convention) and a file-based
//! Ed25519 key for hosts without GnuPG.

mod ed25519;
mod gpg;
mod verify;

pub use ed25519::{
    compute_key_fingerprint, decode_signing_key, decode_verifying_key, encode_signing_key,
    encode_verifying_key, export_text, generate_keypair, parse_exported_key, verify_digest,
    write_signing_key, Ed25519FileSigner, ED25519_ALGORITHM,
};
pub use gpg::{GpgSigner, GPG_ALGORITHM};
pub use verify::{signed_digest_hex, verify_artifact, ArtifactVerification, MaskedReader};

use carrier_layout::{PatchResult, RegionName, ReservedRegion, SectionPatcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BundleConfig;
use crate::tool::ToolError;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("signer failed: {0}")]
    Tool(#[from] ToolError),

    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    #[error("signer produced an empty signature for key {0}")]
    EmptySignature(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("{} is not an Ed25519-signed bundle (embedded key is {found})", path.display())]
    NotEd25519 {
        path: std::path::PathBuf,
        found: &'static str,
    },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("artifact layout error: {0}")]
    Layout(#[from] carrier_layout::LayoutError),

    #[error("digest error: {0}")]
    Checksum(#[from] crate::checksum::ChecksumError),
}

pub type SigningResult<T> = Result<T, SigningError>;

/// Which [`BundleSigner`] a build uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerBackend {
    #[default]
    Gpg,
    Ed25519,
}

impl fmt::Display for SignerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignerBackend::Gpg => "gpg",
            SignerBackend::Ed25519 => "ed25519",
        })
    }
}

impl FromStr for SignerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpg" | "gnupg" => Ok(SignerBackend::Gpg),
            "ed25519" => Ok(SignerBackend::Ed25519),
            other => Err(format!("unknown signer backend: {}", other)),
        }
    }
}

/// External signer seam.
pub trait BundleSigner {
    /// Algorithm tag recorded in the build report
    fn algorithm(&self) -> &'static str;

    /// Produce a detached signature over `digest_hex` with `key_id`.
    fn sign(&self, digest_hex: &str, key_id: &str) -> SigningResult<Vec<u8>>;

    /// Canonical exported public key text for `key_id`.
    fn export_key(&self, key_id: &str) -> SigningResult<Vec<u8>>;
}

/// Build the signer a configuration asks for.
pub fn signer_for(config: &BundleConfig) -> Box<dyn BundleSigner> {
    match config.signing.backend {
        SignerBackend::Gpg => Box::new(GpgSigner::new(
            &config.tools.gpg,
            config.signing.gpg_home.clone(),
        )),
        SignerBackend::Ed25519 => Box::new(Ed25519FileSigner),
    }
}

/// Signature and exported key, ready to embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub algorithm: &'static str,
    pub signature: Vec<u8>,
    pub signer_key: Vec<u8>,
}

/// Regions written by [`SignatureEmbedder::embed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbeddedSignature {
    pub signature: ReservedRegion,
    pub signer_key: Option<ReservedRegion>,
}

/// Signs a digest and writes the result into the artifact's regions.
pub struct SignatureEmbedder<'a> {
    signer: &'a dyn BundleSigner,
}

impl<'a> SignatureEmbedder<'a> {
    pub fn new(signer: &'a dyn BundleSigner) -> Self {
        Self { signer }
    }

    /// Sign the hex text of `sha256` and export the signer's public key.
    pub fn sign(&self, sha256: &[u8], key_id: &str) -> SigningResult<DetachedSignature> {
        let digest_hex = hex::encode(sha256);
        info!(key = %key_id, algorithm = self.signer.algorithm(), "Signing bundle digest");

        let signature = self.signer.sign(&digest_hex, key_id)?;
        if signature.is_empty() {
            return Err(SigningError::EmptySignature(key_id.to_string()));
        }
        let signer_key = self.signer.export_key(key_id)?;
        if signer_key.is_empty() {
            return Err(SigningError::UnknownKey(key_id.to_string()));
        }

        Ok(DetachedSignature {
            algorithm: self.signer.algorithm(),
            signature,
            signer_key,
        })
    }

    /// Patch the signature region and, when reserved, the signer-key region.
    pub fn embed(
        &self,
        patcher: &SectionPatcher,
        detached: &DetachedSignature,
    ) -> PatchResult<EmbeddedSignature> {
        let signature = patcher.patch_required(RegionName::Signature, &detached.signature)?;

        let signer_key = patcher.patch_region(RegionName::SignerKey, &detached.signer_key)?;
        if signer_key.is_none() {
            warn!("Carrier reserves no signer-key region, embedding signature only");
        }

        Ok(EmbeddedSignature {
            signature,
            signer_key,
        })
    }
}
