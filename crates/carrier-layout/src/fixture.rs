//! Synthetic ELF images for tests.
//!
//! Produces just enough of an ELF file (header, zero-filled section bodies,
//! a `.shstrtab` and the section header table) for the layout reader to
//! resolve sections by name.

use crate::elf::{ElfClass, Endian};

const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;

/// An image produced by [`ElfImageBuilder`].
#[derive(Debug, Clone)]
pub struct ElfImage {
    pub bytes: Vec<u8>,
    /// `(name, offset, size)` of every declared section.
    pub sections: Vec<(String, u64, u64)>,
}

impl ElfImage {
    pub fn section_offset(&self, name: &str) -> Option<u64> {
        self.sections
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, offset, _)| *offset)
    }
}

/// Builder for minimal ELF images with named, zero-filled sections.
#[derive(Debug, Clone)]
pub struct ElfImageBuilder {
    class: ElfClass,
    endian: Endian,
    machine: u16,
    sections: Vec<(String, usize)>,
}

impl Default for ElfImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElfImageBuilder {
    /// 64-bit little-endian x86_64 image with no sections.
    pub fn new() -> Self {
        Self {
            class: ElfClass::Elf64,
            endian: Endian::Little,
            machine: 0x3E,
            sections: Vec::new(),
        }
    }

    pub fn elf32(mut self) -> Self {
        self.class = ElfClass::Elf32;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.endian = Endian::Big;
        self
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Append a zero-filled `SHT_PROGBITS` section.
    pub fn section(mut self, name: &str, size: usize) -> Self {
        self.sections.push((name.to_string(), size));
        self
    }

    pub fn build(self) -> ElfImage {
        let (ehsize, shentsize) = match self.class {
            ElfClass::Elf32 => (52usize, 40usize),
            ElfClass::Elf64 => (64usize, 64usize),
        };

        let mut bytes = vec![0u8; ehsize];
        let mut placed = Vec::with_capacity(self.sections.len());
        for (name, size) in &self.sections {
            let offset = bytes.len();
            bytes.resize(offset + size, 0);
            placed.push((name.clone(), offset as u64, *size as u64));
        }

        // Section name string table: leading NUL, then each name.
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::with_capacity(placed.len() + 1);
        for (name, _, _) in &placed {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }
        let shstrtab_name = strtab.len() as u32;
        strtab.extend_from_slice(b".shstrtab\0");
        let strtab_offset = bytes.len() as u64;
        bytes.extend_from_slice(&strtab);

        while bytes.len() % 8 != 0 {
            bytes.push(0);
        }
        let shoff = bytes.len() as u64;

        let w = Writer { class: self.class, endian: self.endian };

        // Null section header.
        bytes.extend(std::iter::repeat(0u8).take(shentsize));
        for ((_, offset, size), name) in placed.iter().zip(&name_offsets) {
            w.section_header(&mut bytes, *name, SHT_PROGBITS, *offset, *size);
        }
        w.section_header(
            &mut bytes,
            shstrtab_name,
            SHT_STRTAB,
            strtab_offset,
            strtab.len() as u64,
        );

        let shnum = (placed.len() + 2) as u16;
        let shstrndx = shnum - 1;

        bytes[0..4].copy_from_slice(b"\x7fELF");
        bytes[4] = match self.class {
            ElfClass::Elf32 => 1,
            ElfClass::Elf64 => 2,
        };
        bytes[5] = match self.endian {
            Endian::Little => 1,
            Endian::Big => 2,
        };
        bytes[6] = 1;
        w.put_u16(&mut bytes, 16, 2);
        w.put_u16(&mut bytes, 18, self.machine);
        w.put_u32(&mut bytes, 20, 1);
        match self.class {
            ElfClass::Elf32 => {
                w.put_u32(&mut bytes, 32, shoff as u32);
                w.put_u16(&mut bytes, 40, ehsize as u16);
                w.put_u16(&mut bytes, 46, shentsize as u16);
                w.put_u16(&mut bytes, 48, shnum);
                w.put_u16(&mut bytes, 50, shstrndx);
            }
            ElfClass::Elf64 => {
                w.put_u64(&mut bytes, 40, shoff);
                w.put_u16(&mut bytes, 52, ehsize as u16);
                w.put_u16(&mut bytes, 58, shentsize as u16);
                w.put_u16(&mut bytes, 60, shnum);
                w.put_u16(&mut bytes, 62, shstrndx);
            }
        }

        ElfImage { bytes, sections: placed }
    }
}

struct Writer {
    class: ElfClass,
    endian: Endian,
}

impl Writer {
    fn put_u16(&self, buf: &mut [u8], at: usize, v: u16) {
        let b = match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        buf[at..at + 2].copy_from_slice(&b);
    }

    fn put_u32(&self, buf: &mut [u8], at: usize, v: u32) {
        let b = match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        buf[at..at + 4].copy_from_slice(&b);
    }

    fn put_u64(&self, buf: &mut [u8], at: usize, v: u64) {
        let b = match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        buf[at..at + 8].copy_from_slice(&b);
    }

    fn section_header(&self, out: &mut Vec<u8>, name: u32, kind: u32, offset: u64, size: u64) {
        let start = out.len();
        match self.class {
            ElfClass::Elf32 => {
                out.resize(start + 40, 0);
                self.put_u32(out, start, name);
                self.put_u32(out, start + 4, kind);
                self.put_u32(out, start + 16, offset as u32);
                self.put_u32(out, start + 20, size as u32);
                self.put_u32(out, start + 32, 1);
            }
            ElfClass::Elf64 => {
                out.resize(start + 64, 0);
                self.put_u32(out, start, name);
                self.put_u32(out, start + 4, kind);
                self.put_u64(out, start + 24, offset);
                self.put_u64(out, start + 32, size);
                self.put_u64(out, start + 48, 1);
            }
        }
    }
}
