//! Per-invocation build state passed to every stage.

use std::path::{Path, PathBuf};
use tracing::Span;

use crate::carrier::Architecture;
use crate::config::BundleConfig;

/// Cache subdirectory of the build directory holding carriers
pub const CARRIER_CACHE_DIR: &str = "prime";

/// Validated configuration plus the artifact this invocation owns.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub config: BundleConfig,
    pub artifact_path: PathBuf,
    span: Span,
}

impl BuildContext {
    pub fn new(config: BundleConfig) -> Self {
        let artifact_path = config.artifact_path();
        let span = tracing::info_span!(
            "build",
            app = config.app_info.name.as_deref().unwrap_or("-"),
            arch = %config.appimage.arch,
        );
        Self {
            config,
            artifact_path,
            span,
        }
    }

    /// Write the artifact somewhere other than the configured location.
    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn arch(&self) -> Architecture {
        self.config.appimage.arch
    }

    pub fn build_dir(&self) -> &Path {
        &self.config.build.build_dir
    }

    pub fn carrier_cache_dir(&self) -> PathBuf {
        self.build_dir().join(CARRIER_CACHE_DIR)
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
