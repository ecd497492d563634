//! Bundle pipeline orchestration
//!
//! Stages run strictly in order and the first failure is terminal:
//!
//! acquire → package → assemble → patch-update-info → digest → patch-digest
//! → sign → patch-signature → generate-index → finalize
//!
//! Optional stages whose configuration is absent are skipped and recorded
//! as such in the [`BuildReport`]. A failure leaves any partial artifact on
//! disk.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use carrier_layout::{PatchError, RegionName, SectionPatcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::assemble::{assemble, AssemblyError};
use crate::carrier::{AcquisitionError, Architecture, Carrier, CarrierProvider};
use crate::checksum::{ChecksumEngine, ChecksumError, DigestAlgorithm, DigestSet};
use crate::config::ConfigError;
use crate::context::BuildContext;
use crate::finalize::mark_executable;
use crate::packager::{PackagingError, PayloadPackager, SquashfsPackager};
use crate::signing::{signer_for, BundleSigner, SignatureEmbedder, SigningError};
use crate::update_index::{IndexGenerationError, UpdateIndexGenerator, ZsyncIndexGenerator};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Acquire,
    Package,
    Assemble,
    PatchUpdateInfo,
    Digest,
    PatchDigest,
    Sign,
    PatchSignature,
    GenerateIndex,
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Package => "package",
            Stage::Assemble => "assemble",
            Stage::PatchUpdateInfo => "patch-update-info",
            Stage::Digest => "digest",
            Stage::PatchDigest => "patch-digest",
            Stage::Sign => "sign",
            Stage::PatchSignature => "patch-signature",
            Stage::GenerateIndex => "generate-index",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline errors, tagged with the stage that raised them
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("acquire stage failed: {0}")]
    Acquire(#[from] AcquisitionError),

    #[error("package stage failed: {0}")]
    Package(#[from] PackagingError),

    #[error("assemble stage failed: {0}")]
    Assemble(#[from] AssemblyError),

    #[error("{stage} stage failed: {source}")]
    Patch {
        stage: Stage,
        #[source]
        source: PatchError,
    },

    #[error("digest stage failed: {0}")]
    Digest(#[from] ChecksumError),

    #[error("sign stage failed: {0}")]
    Sign(#[from] SigningError),

    #[error("generate-index stage failed: {0}")]
    Index(#[from] IndexGenerationError),

    #[error("finalize stage failed: {0}")]
    Finalize(#[source] io::Error),
}

impl PipelineError {
    /// Stage that failed; `None` for errors raised before any stage ran
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Acquire(_) => Some(Stage::Acquire),
            PipelineError::Package(_) => Some(Stage::Package),
            PipelineError::Assemble(_) => Some(Stage::Assemble),
            PipelineError::Patch { stage, .. } => Some(*stage),
            PipelineError::Digest(_) => Some(Stage::Digest),
            PipelineError::Sign(_) => Some(Stage::Sign),
            PipelineError::Index(_) => Some(Stage::GenerateIndex),
            PipelineError::Finalize(_) => Some(Stage::Finalize),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.stage() {
            None => 2,
            Some(Stage::Acquire) => 10,
            Some(Stage::Package) => 11,
            Some(Stage::Assemble) => 12,
            Some(Stage::PatchUpdateInfo)
            | Some(Stage::PatchDigest)
            | Some(Stage::PatchSignature) => 13,
            Some(Stage::Digest) => 14,
            Some(Stage::Sign) => 15,
            Some(Stage::GenerateIndex) => 16,
            Some(Stage::Finalize) => 17,
        }
    }

    fn patch(stage: Stage) -> impl FnOnce(PatchError) -> PipelineError {
        move |source| PipelineError::Patch { stage, source }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Signature details recorded in the report
#[derive(Debug, Clone, Serialize)]
pub struct SignatureReport {
    pub algorithm: String,
    pub key_id: String,
    pub signature_len: usize,
    pub signer_key_embedded: bool,
}

/// Summary of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub artifact: PathBuf,
    pub arch: Architecture,
    pub carrier: PathBuf,
    pub artifact_size: u64,
    pub payload_size: u64,
    /// Digests taken before any signature was embedded
    pub digests: DigestSet,
    pub update_info_embedded: bool,
    pub md5_embedded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_index: Option<PathBuf>,
    pub skipped: Vec<Stage>,
    pub built_at: DateTime<Utc>,
}

/// The pipeline and its external collaborators.
pub struct Pipeline {
    carriers: CarrierProvider,
    packager: Box<dyn PayloadPackager>,
    signer: Box<dyn BundleSigner>,
    indexer: Box<dyn UpdateIndexGenerator>,
    checksum: ChecksumEngine,
}

impl Pipeline {
    pub fn new(
        carriers: CarrierProvider,
        packager: Box<dyn PayloadPackager>,
        signer: Box<dyn BundleSigner>,
        indexer: Box<dyn UpdateIndexGenerator>,
    ) -> Self {
        Self {
            carriers,
            packager,
            signer,
            indexer,
            checksum: ChecksumEngine::new(),
        }
    }

    /// Collaborators as configured: HTTP or mirror carriers, mksquashfs,
    /// the configured signer backend and zsyncmake.
    pub fn from_context(ctx: &BuildContext) -> PipelineResult<Self> {
        let config = &ctx.config;
        let carriers = CarrierProvider::from_config(ctx.carrier_cache_dir(), config)?;
        Ok(Self::new(
            carriers,
            Box::new(SquashfsPackager::new(
                &config.tools.mksquashfs,
                &config.payload.compression,
            )),
            signer_for(config),
            Box::new(ZsyncIndexGenerator::new(&config.tools.zsyncmake)),
        ))
    }

    pub fn with_checksum_engine(mut self, engine: ChecksumEngine) -> Self {
        self.checksum = engine;
        self
    }

    /// Build a bundle from a prepared application directory.
    pub fn run(&self, ctx: &BuildContext, appdir: &Path) -> PipelineResult<BuildReport> {
        let _span = ctx.span().enter();

        let carrier = self.acquire(ctx)?;

        info!(stage = %Stage::Package, appdir = %appdir.display(), "Stage started");
        let payload = self.packager.package(appdir)?;

        self.seal(ctx, &carrier, &payload)
    }

    /// Build a bundle from an already packaged payload image.
    pub fn run_with_payload(&self, ctx: &BuildContext, payload: &Path) -> PipelineResult<BuildReport> {
        let _span = ctx.span().enter();

        let carrier = self.acquire(ctx)?;
        let mut report = self.seal(ctx, &carrier, payload)?;
        report.skipped.insert(0, Stage::Package);
        Ok(report)
    }

    /// Run every stage after packaging against a carrier already in hand.
    pub fn seal(
        &self,
        ctx: &BuildContext,
        carrier: &Carrier,
        payload: &Path,
    ) -> PipelineResult<BuildReport> {
        let appimage = &ctx.config.appimage;
        let mut skipped = Vec::new();

        info!(stage = %Stage::Assemble, artifact = %ctx.artifact_path.display(), "Stage started");
        let assembled = assemble(&carrier.path, payload, &ctx.artifact_path)?;
        let patcher = SectionPatcher::new(&assembled.artifact, carrier.regions.clone());

        let update_info_embedded = match &appimage.update_information {
            Some(update_information) => {
                info!(stage = %Stage::PatchUpdateInfo, update_information = %update_information, "Stage started");
                self.patch_optional(
                    &patcher,
                    Stage::PatchUpdateInfo,
                    RegionName::UpdateInfo,
                    update_information.as_bytes(),
                )?
            }
            None => {
                skipped.push(Stage::PatchUpdateInfo);
                false
            }
        };

        info!(stage = %Stage::Digest, "Stage started");
        let digests = self.checksum.digest_file(
            &assembled.artifact,
            &[DigestAlgorithm::Md5, DigestAlgorithm::Sha256],
        )?;

        let md5_embedded = if appimage.embed_md5_digest {
            info!(stage = %Stage::PatchDigest, "Stage started");
            let md5 = digests.get(DigestAlgorithm::Md5).unwrap_or_default();
            self.patch_optional(&patcher, Stage::PatchDigest, RegionName::DigestMd5, md5)?
        } else {
            skipped.push(Stage::PatchDigest);
            false
        };

        let signature = match &appimage.sign_key {
            Some(key_id) if patcher.locate(RegionName::Signature).is_some() => {
                let sha256 = digests.get(DigestAlgorithm::Sha256).unwrap_or_default();
                let embedder = SignatureEmbedder::new(self.signer.as_ref());

                info!(stage = %Stage::Sign, "Stage started");
                let detached = embedder.sign(sha256, key_id)?;

                info!(stage = %Stage::PatchSignature, "Stage started");
                let embedded = embedder
                    .embed(&patcher, &detached)
                    .map_err(PipelineError::patch(Stage::PatchSignature))?;

                Some(SignatureReport {
                    algorithm: detached.algorithm.to_string(),
                    key_id: key_id.clone(),
                    signature_len: detached.signature.len(),
                    signer_key_embedded: embedded.signer_key.is_some(),
                })
            }
            Some(_) => {
                warn!(
                    region = %RegionName::Signature,
                    "Carrier reserves no signature region, leaving bundle unsigned"
                );
                skipped.extend([Stage::Sign, Stage::PatchSignature]);
                None
            }
            None => {
                skipped.extend([Stage::Sign, Stage::PatchSignature]);
                None
            }
        };

        let update_index = if appimage.update_information.is_some() {
            info!(stage = %Stage::GenerateIndex, "Stage started");
            Some(self.indexer.generate(&assembled.artifact)?)
        } else {
            skipped.push(Stage::GenerateIndex);
            None
        };

        info!(stage = %Stage::Finalize, "Stage started");
        mark_executable(&assembled.artifact).map_err(PipelineError::Finalize)?;

        info!(artifact = %assembled.artifact.display(), bytes = assembled.len(), "Bundle ready");

        Ok(BuildReport {
            artifact: assembled.artifact.clone(),
            arch: carrier.arch,
            carrier: carrier.path.clone(),
            artifact_size: assembled.len(),
            payload_size: assembled.payload_len,
            digests,
            update_info_embedded,
            md5_embedded,
            signature,
            update_index,
            skipped,
            built_at: Utc::now(),
        })
    }

    fn acquire(&self, ctx: &BuildContext) -> PipelineResult<Carrier> {
        info!(stage = %Stage::Acquire, arch = %ctx.arch(), "Stage started");
        Ok(self.carriers.acquire(ctx.arch())?)
    }

    /// Returns whether the region existed and was written.
    fn patch_optional(
        &self,
        patcher: &SectionPatcher,
        stage: Stage,
        region: RegionName,
        data: &[u8],
    ) -> PipelineResult<bool> {
        let written = patcher
            .patch_region(region, data)
            .map_err(PipelineError::patch(stage))?;
        if written.is_none() {
            warn!(region = %region, "Carrier reserves no such region, skipping");
        }
        Ok(written.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_are_stable() {
        assert_eq!(Stage::PatchUpdateInfo.to_string(), "patch-update-info");
        assert_eq!(
            serde_json::to_value(Stage::GenerateIndex).unwrap(),
            "generate-index"
        );
    }

    #[test]
    fn test_exit_codes_follow_stage() {
        let err = PipelineError::Patch {
            stage: Stage::PatchSignature,
            source: PatchError::RegionMissing(RegionName::Signature),
        };
        assert_eq!(err.stage(), Some(Stage::PatchSignature));
        assert_eq!(err.exit_code(), 13);
        assert!(err.to_string().starts_with("patch-signature stage failed"));

        let err = PipelineError::Digest(ChecksumError::NoAlgorithms);
        assert_eq!(err.exit_code(), 14);

        let err = PipelineError::Config(ConfigError::Invalid("x".to_string()));
        assert_eq!(err.stage(), None);
        assert_eq!(err.exit_code(), 2);
    }
}
