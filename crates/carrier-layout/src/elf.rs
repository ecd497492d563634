//! ELF section header reader.
//!
//! Only the pieces needed to name and place sections are read from the
//! stream: the file header, the section header table and the section name
//! string table. Decoding is done by `goblin`; this module decides which
//! bytes to hand it and bounds-checks every range against the stream length
//! first, so a corrupt header yields an error rather than a huge allocation.

use std::io::{Read, Seek, SeekFrom};

use goblin::container::Ctx;
use goblin::elf::header::{EI_CLASS, EI_DATA, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ELFMAG, SELFMAG};
use goblin::elf::section_header::SectionHeader;
use goblin::elf::Elf;
use goblin::strtab::Strtab;

use crate::error::{LayoutError, LayoutResult};

pub use goblin::elf::section_header::SHT_NOBITS;

/// Upper bound on section header count; runtimes carry a few dozen.
const MAX_SECTIONS: u16 = 4096;

/// Upper bound on the section name table.
const MAX_STRTAB_LEN: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A named section and where its bytes live in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSection {
    pub name: String,
    pub kind: u32,
    pub offset: u64,
    pub size: u64,
}

/// The decoded subset of an ELF image.
#[derive(Debug, Clone)]
pub struct ElfLayout {
    pub class: ElfClass,
    pub endian: Endian,
    /// `e_machine` from the file header.
    pub machine: u16,
    pub sections: Vec<ElfSection>,
}

impl ElfLayout {
    pub fn section(&self, name: &str) -> Option<&ElfSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Read the section layout from an ELF image.
pub fn read_layout<R: Read + Seek>(reader: &mut R) -> LayoutResult<ElfLayout> {
    let stream_len = reader.seek(SeekFrom::End(0))?;

    let mut ident = [0u8; 16];
    read_span(reader, &mut ident, 0, stream_len)?;

    if &ident[..SELFMAG] != ELFMAG {
        return Err(LayoutError::NotElf);
    }
    let (class, header_len) = match ident[EI_CLASS] {
        ELFCLASS32 => (ElfClass::Elf32, 52),
        ELFCLASS64 => (ElfClass::Elf64, 64),
        other => return Err(LayoutError::Unsupported { field: "class", value: other }),
    };
    let endian = match ident[EI_DATA] {
        ELFDATA2LSB => Endian::Little,
        ELFDATA2MSB => Endian::Big,
        other => {
            return Err(LayoutError::Unsupported { field: "data encoding", value: other })
        }
    };

    let mut header_bytes = vec![0u8; header_len];
    read_span(reader, &mut header_bytes, 0, stream_len)?;
    let header = Elf::parse_header(&header_bytes)?;
    let machine = header.e_machine;

    if header.e_shoff == 0 || header.e_shnum == 0 {
        return Ok(ElfLayout { class, endian, machine, sections: Vec::new() });
    }

    let ctx = Ctx::new(header.container()?, header.endianness()?);
    let entry_len = SectionHeader::size(ctx);
    if usize::from(header.e_shentsize) != entry_len {
        return Err(LayoutError::Malformed(format!(
            "section header entry size {} (expected {})",
            header.e_shentsize, entry_len
        )));
    }
    if header.e_shnum > MAX_SECTIONS {
        return Err(LayoutError::Malformed(format!(
            "{} section headers",
            header.e_shnum
        )));
    }

    let shnum = usize::from(header.e_shnum);
    let mut table = vec![0u8; entry_len * shnum];
    read_span(reader, &mut table, header.e_shoff, stream_len)?;
    let headers = SectionHeader::parse(&table, 0, shnum, ctx)?;

    let names = match headers.get(usize::from(header.e_shstrndx)) {
        Some(sh) if sh.sh_type != SHT_NOBITS => {
            if sh.sh_size > MAX_STRTAB_LEN {
                return Err(LayoutError::Malformed(format!(
                    "section name table of {} bytes",
                    sh.sh_size
                )));
            }
            let mut buf = vec![0u8; sh.sh_size as usize];
            read_span(reader, &mut buf, sh.sh_offset, stream_len)?;
            buf
        }
        _ => Vec::new(),
    };
    let strtab = if names.is_empty() {
        None
    } else {
        Some(Strtab::parse(&names, 0, names.len(), 0x0)?)
    };

    let sections = headers
        .iter()
        .map(|sh| ElfSection {
            name: strtab
                .as_ref()
                .and_then(|t| t.get_at(sh.sh_name))
                .unwrap_or_default()
                .to_string(),
            kind: sh.sh_type,
            offset: sh.sh_offset,
            size: sh.sh_size,
        })
        .collect();

    Ok(ElfLayout { class, endian, machine, sections })
}

/// Fill `buf` from `offset`, refusing ranges that run past the stream end.
fn read_span<R: Read + Seek>(
    reader: &mut R,
    buf: &mut [u8],
    offset: u64,
    stream_len: u64,
) -> LayoutResult<()> {
    match offset.checked_add(buf.len() as u64) {
        Some(end) if end <= stream_len => {}
        _ => return Err(LayoutError::Truncated { offset }),
    }
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(buf)?;
    Ok(())
}
