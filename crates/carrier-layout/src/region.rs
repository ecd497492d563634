//! Named reserved regions and the ordered table that holds them.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::elf::{read_layout, ElfLayout, SHT_NOBITS};
use crate::error::{LayoutError, LayoutResult};

/// Logical names of the regions a carrier reserves for patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionName {
    /// Free-form update descriptor string.
    UpdateInfo,
    /// Detached signature over the bundle digest.
    Signature,
    /// Exported public key of the signer.
    SignerKey,
    /// Raw MD5 digest of the bundle.
    DigestMd5,
}

impl RegionName {
    /// Every known region, in carrier declaration order.
    pub const ALL: [RegionName; 4] = [
        RegionName::UpdateInfo,
        RegionName::Signature,
        RegionName::SignerKey,
        RegionName::DigestMd5,
    ];

    /// Stable kebab-case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionName::UpdateInfo => "update-info",
            RegionName::Signature => "signature",
            RegionName::SignerKey => "signer-key",
            RegionName::DigestMd5 => "digest-md5",
        }
    }

    /// ELF section that backs this region in the AppImage runtime.
    pub fn section_name(&self) -> &'static str {
        match self {
            RegionName::UpdateInfo => ".upd_info",
            RegionName::Signature => ".sha256_sig",
            RegionName::SignerKey => ".sig_key",
            RegionName::DigestMd5 => ".digest_md5",
        }
    }

    /// Reverse lookup from an ELF section name.
    pub fn from_section_name(section: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.section_name() == section)
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s || r.section_name() == s)
            .ok_or_else(|| format!("unknown region: {}", s))
    }
}

/// A fixed byte range inside the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedRegion {
    pub name: RegionName,
    pub offset: u64,
    pub size: u64,
}

impl ReservedRegion {
    pub fn new(name: RegionName, offset: u64, size: u64) -> Self {
        Self { name, offset, size }
    }

    /// One past the last byte of the region.
    ///
    /// Saturates; tables reject regions whose end overflows.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Whether `offset` falls inside the region.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.end()
    }
}

/// Ordered, validated table of reserved regions.
///
/// Regions are sorted by offset, never overlap and lie entirely inside the
/// carrier they were declared for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionTable {
    regions: Vec<ReservedRegion>,
}

impl RegionTable {
    /// Build a table from explicit declarations.
    pub fn new(mut regions: Vec<ReservedRegion>, carrier_len: u64) -> LayoutResult<Self> {
        regions.sort_by_key(|r| r.offset);

        for region in &regions {
            let in_bounds = region
                .offset
                .checked_add(region.size)
                .map(|end| end <= carrier_len)
                .unwrap_or(false);
            if !in_bounds {
                return Err(LayoutError::OutOfBounds {
                    name: region.name,
                    offset: region.offset,
                    size: region.size,
                    carrier_len,
                });
            }
        }

        for (i, region) in regions.iter().enumerate() {
            if regions[..i].iter().any(|r| r.name == region.name) {
                return Err(LayoutError::Duplicate(region.name));
            }
        }

        for pair in regions.windows(2) {
            if pair[0].end() > pair[1].offset {
                return Err(LayoutError::Overlap {
                    first: pair[0].name,
                    second: pair[1].name,
                });
            }
        }

        Ok(Self { regions })
    }

    /// A table with no regions; every optional patch becomes a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extract the known reserved sections from a parsed ELF layout.
    pub fn from_layout(layout: &ElfLayout, carrier_len: u64) -> LayoutResult<Self> {
        let regions = layout
            .sections
            .iter()
            .filter(|s| s.kind != SHT_NOBITS)
            .filter_map(|s| {
                RegionName::from_section_name(&s.name)
                    .map(|name| ReservedRegion::new(name, s.offset, s.size))
            })
            .collect();
        Self::new(regions, carrier_len)
    }

    /// Read the region table straight from an ELF file's section headers.
    ///
    /// Only the header, the section header table and the section name string
    /// table are read, so this is cheap even on a fully assembled bundle.
    pub fn from_elf_file(path: &Path) -> LayoutResult<Self> {
        let file = File::open(path)?;
        let carrier_len = file.metadata()?.len();
        let layout = read_layout(&mut BufReader::new(file))?;
        Self::from_layout(&layout, carrier_len)
    }

    /// Read the region table from an in-memory ELF image.
    pub fn from_elf_bytes(bytes: &[u8]) -> LayoutResult<Self> {
        let layout = read_layout(&mut std::io::Cursor::new(bytes))?;
        Self::from_layout(&layout, bytes.len() as u64)
    }

    pub fn get(&self, name: RegionName) -> Option<&ReservedRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Region that contains `offset`, if any.
    pub fn containing(&self, offset: u64) -> Option<&ReservedRegion> {
        self.regions.iter().find(|r| r.contains(offset))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReservedRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
