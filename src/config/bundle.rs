//! Typed bundle configuration
//!
//! The merged recipe value is deserialized into [`BundleConfig`]. Optional
//! stages are `Option` fields; `None` means the stage is skipped.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::effective::ConfigError;
use crate::carrier::Architecture;
use crate::signing::SignerBackend;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppImageSection {
    pub arch: Architecture,

    /// Artifact file name inside the output directory
    #[serde(default)]
    pub file_name: Option<String>,

    /// Signing key identifier; absent leaves the bundle unsigned
    #[serde(default)]
    pub sign_key: Option<String>,

    /// Update descriptor patched into the carrier; absent skips the
    /// update-info patch and the update index
    #[serde(default)]
    pub update_information: Option<String>,

    #[serde(default)]
    pub embed_md5_digest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSection {
    pub build_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CarrierSection {
    pub url_base: String,

    /// Local directory holding `runtime-<arch>` files; replaces HTTP when set
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,

    /// Expected SHA-256 of the carrier, lowercase hex
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SigningSection {
    pub backend: SignerBackend,
    #[serde(default)]
    pub gpg_home: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadSection {
    pub compression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolsSection {
    pub mksquashfs: String,
    pub zsyncmake: String,
    pub gpg: String,
}

/// Everything one build needs to know
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BundleConfig {
    #[serde(default)]
    pub app_info: AppInfo,
    pub appimage: AppImageSection,
    pub build: BuildSection,
    pub carrier: CarrierSection,
    pub signing: SigningSection,
    pub payload: PayloadSection,
    pub tools: ToolsSection,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl BundleConfig {
    /// Normalize and check the configuration.
    ///
    /// Empty strings count as absent, so `sign-key = ""` skips signing.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.app_info.name = non_empty(self.app_info.name.take());
        self.app_info.version = non_empty(self.app_info.version.take());
        self.appimage.file_name = non_empty(self.appimage.file_name.take());
        self.appimage.sign_key = non_empty(self.appimage.sign_key.take());
        self.appimage.update_information = non_empty(self.appimage.update_information.take());
        self.carrier.sha256 = non_empty(self.carrier.sha256.take()).map(|s| s.to_lowercase());

        if self.appimage.file_name.is_none()
            && (self.app_info.name.is_none() || self.app_info.version.is_none())
        {
            return Err(ConfigError::Invalid(
                "app-info.name and app-info.version are required when appimage.file-name is not set"
                    .to_string(),
            ));
        }

        if let Some(file_name) = &self.appimage.file_name {
            if file_name.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "appimage.file-name must be a bare file name: {}",
                    file_name
                )));
            }
        }

        if let Some(pin) = &self.carrier.sha256 {
            if pin.len() != 64 || !pin.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::Invalid(format!(
                    "carrier.sha256 must be 64 hex characters: {}",
                    pin
                )));
            }
        }

        if self.payload.compression.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "payload.compression must not be empty".to_string(),
            ));
        }

        Ok(self)
    }

    /// `<name>-<version>-<arch>.AppImage` unless a file name is configured
    pub fn artifact_file_name(&self) -> String {
        match &self.appimage.file_name {
            Some(name) => name.clone(),
            None => format!(
                "{}-{}-{}.AppImage",
                self.app_info.name.as_deref().unwrap_or_default(),
                self.app_info.version.as_deref().unwrap_or_default(),
                self.appimage.arch
            ),
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.build.output_dir.join(self.artifact_file_name())
    }
}
