//! Error types for layout parsing and patching.

use std::io;

use thiserror::Error;

use crate::region::RegionName;

/// Errors raised while reading a carrier's region table.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not an ELF image")]
    NotElf,

    #[error("unsupported ELF {field}: {value}")]
    Unsupported { field: &'static str, value: u8 },

    #[error("ELF image truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("malformed ELF: {0}")]
    Malformed(String),

    #[error("ELF parse error: {0}")]
    Parse(#[from] goblin::error::Error),

    #[error("region {name} [{offset}, +{size}) exceeds carrier length {carrier_len}")]
    OutOfBounds {
        name: RegionName,
        offset: u64,
        size: u64,
        carrier_len: u64,
    },

    #[error("regions {first} and {second} overlap")]
    Overlap { first: RegionName, second: RegionName },

    #[error("region {0} declared twice")]
    Duplicate(RegionName),
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Errors raised while writing into a reserved region.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("reserved region {0} not present in carrier")]
    RegionMissing(RegionName),

    #[error("{len} bytes do not fit in region {region} ({size} bytes)")]
    Overflow {
        region: RegionName,
        len: u64,
        size: u64,
    },

    #[error("offset {offset} is not inside any reserved region")]
    OutsideRegions { offset: u64 },

    #[error("patch end {end} lies past artifact end {file_len}")]
    BeyondEnd { end: u64, file_len: u64 },
}

/// Result type for patch operations
pub type PatchResult<T> = Result<T, PatchError>;
