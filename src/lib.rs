//! appimage-primer - AppImage bundle assembly and signing
//!
//! Turns a prepared AppDir into a single self-contained executable: a
//! pre-built runtime carrier with a squashfs payload appended, update
//! information and a detached signature patched into the carrier's reserved
//! regions, an optional zsync index beside it, and the execute bit set.
//!
//! The reserved-region model and the bounds-checked patcher live in the
//! `carrier-layout` crate; this crate orchestrates the rest.

pub mod assemble;
pub mod carrier;
pub mod checksum;
pub mod config;
pub mod context;
pub mod finalize;
pub mod packager;
pub mod pipeline;
pub mod signing;
pub mod tool;
pub mod update_index;

pub use carrier::{Architecture, Carrier, CarrierProvider};
pub use carrier_layout::{RegionName, RegionTable, ReservedRegion, SectionPatcher};
pub use checksum::{ChecksumEngine, DigestAlgorithm, DigestSet};
pub use config::{BundleConfig, ConfigError, EffectiveConfig};
pub use context::BuildContext;
pub use pipeline::{BuildReport, Pipeline, PipelineError, PipelineResult, Stage};
