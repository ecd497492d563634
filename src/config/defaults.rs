//! Built-in recipe defaults (layer 1)
//!
//! Every optional stage is absent here, so a recipe that configures nothing
//! beyond the app identity builds an unsigned bundle without update metadata.

use serde::{Deserialize, Serialize};

/// Where runtime carriers are published, one file per architecture
pub const DEFAULT_CARRIER_URL_BASE: &str =
    "https://github.com/AppImage/AppImageKit/releases/download/continuous";

/// Default working directory for cached carriers and scratch files
pub const DEFAULT_BUILD_DIR: &str = "appimage-build";

/// Default squashfs compressor
pub const DEFAULT_PAYLOAD_COMPRESSION: &str = "xz";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Target architecture (default: "x86_64")
    pub arch: String,

    /// Build directory (default: "appimage-build")
    pub build_dir: String,

    /// Output directory for the finished bundle (default: ".")
    pub output_dir: String,

    /// Base URL carriers are fetched from
    pub carrier_url_base: String,

    /// Signing backend (default: "gpg")
    pub signer: String,

    /// Payload compressor (default: "xz")
    pub payload_compression: String,

    /// Patch the MD5 digest into the carrier (default: false)
    pub embed_md5_digest: bool,

    /// External tool executables
    pub mksquashfs: String,
    pub zsyncmake: String,
    pub gpg: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            arch: "x86_64".to_string(),
            build_dir: DEFAULT_BUILD_DIR.to_string(),
            output_dir: ".".to_string(),
            carrier_url_base: DEFAULT_CARRIER_URL_BASE.to_string(),
            signer: "gpg".to_string(),
            payload_compression: DEFAULT_PAYLOAD_COMPRESSION.to_string(),
            embed_md5_digest: false,
            mksquashfs: "mksquashfs".to_string(),
            zsyncmake: "zsyncmake".to_string(),
            gpg: "gpg".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to the recipe shape for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "appimage": {
                "arch": self.arch,
                "embed-md5-digest": self.embed_md5_digest
            },
            "build": {
                "build-dir": self.build_dir,
                "output-dir": self.output_dir
            },
            "carrier": {
                "url-base": self.carrier_url_base
            },
            "signing": {
                "backend": self.signer
            },
            "payload": {
                "compression": self.payload_compression
            },
            "tools": {
                "mksquashfs": self.mksquashfs,
                "zsyncmake": self.zsyncmake,
                "gpg": self.gpg
            }
        })
    }
}
