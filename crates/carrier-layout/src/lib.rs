//! Reserved region layout of AppImage runtime carriers.
//!
//! A carrier is the small pre-built runtime stub that heads every bundle. It
//! reserves a handful of fixed byte ranges (ELF sections such as `.upd_info`
//! or `.sha256_sig`) that are filled in after the payload has been appended.
//! This crate reads the table of those ranges and patches them in place
//! without ever resizing or restructuring the carrier.

mod elf;
mod error;
mod patch;
mod region;

#[cfg(any(test, feature = "test-support"))]
pub mod fixture;

pub use elf::{read_layout, ElfClass, ElfLayout, ElfSection, Endian, SHT_NOBITS};
pub use error::{LayoutError, LayoutResult, PatchError, PatchResult};
pub use patch::SectionPatcher;
pub use region::{RegionName, RegionTable, ReservedRegion};
