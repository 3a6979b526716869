//! ELF container view.
//!
//! `Image` wraps the raw bytes of an ELF file together with the header
//! information the dynamic-table analysis needs: the ELF class, byte order,
//! loadable segments, section headers and the location of every dynamic table.
//! Header parsing is delegated to `object`; all later reads are positional on
//! the byte slice so that no component shares a read cursor with another.

use object::elf;
use object::endian::{U16Bytes, U32Bytes, U64Bytes};
use object::read::elf::{FileHeader, ProgramHeader, SectionHeader};
use object::{Endianness, FileKind, ReadRef};

use crate::dynamic::{Dynamic, Origin};
use crate::error::{Error, Result};
use crate::layout::{LoadContext, Section, Segment};

/// ELF class: decides pointer width and every record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    pub fn pointer_width(self) -> u64 {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    /// Size of one `ElfN_Dyn`.
    pub fn dyn_size(self) -> u64 {
        self.pointer_width() * 2
    }

    /// Size of one `ElfN_Sym`.
    pub fn sym_size(self) -> u64 {
        match self {
            Class::Elf32 => 16,
            Class::Elf64 => 24,
        }
    }

    /// Size of one `ElfN_Rel` or `ElfN_Rela`.
    pub fn rel_size(self, with_addend: bool) -> u64 {
        let words = if with_addend { 3 } else { 2 };
        self.pointer_width() * words
    }
}

pub struct Image<'data> {
    data: &'data [u8],
    class: Class,
    endian: Endianness,
    context: LoadContext,
    sections: Vec<Section>,
    dynamic_segments: Vec<Segment>,
}

impl<'data> Image<'data> {
    /// Parse the headers of an ELF image.
    ///
    /// `load_bias` is present when the image is analyzed as mapped into a
    /// running process.
    pub fn parse(data: &'data [u8], load_bias: Option<u64>) -> Result<Self> {
        match FileKind::parse(data)? {
            FileKind::Elf32 => {
                Self::parse_headers::<elf::FileHeader32<Endianness>>(data, Class::Elf32, load_bias)
            }
            FileKind::Elf64 => {
                Self::parse_headers::<elf::FileHeader64<Endianness>>(data, Class::Elf64, load_bias)
            }
            other => Err(Error::MalformedContainer(format!(
                "not an ELF image ({other:?})"
            ))),
        }
    }

    fn parse_headers<Elf: FileHeader<Endian = Endianness>>(
        data: &'data [u8],
        class: Class,
        load_bias: Option<u64>,
    ) -> Result<Self> {
        let header = Elf::parse(data)?;
        let endian = header.endian()?;

        let mut segments = Vec::new();
        let mut dynamic_segments = Vec::new();
        for phdr in header.program_headers(endian, data)? {
            let segment = Segment {
                virtual_address: phdr.p_vaddr(endian).into(),
                file_offset: phdr.p_offset(endian).into(),
                file_size: phdr.p_filesz(endian).into(),
                memory_size: phdr.p_memsz(endian).into(),
                flags: phdr.p_flags(endian),
            };
            match phdr.p_type(endian) {
                elf::PT_LOAD => segments.push(segment),
                elf::PT_DYNAMIC => dynamic_segments.push(segment),
                _ => {}
            }
        }

        // Section headers are optional for this analysis: a stripped or
        // damaged section table only costs us the authoritative symbol count.
        let mut sections = Vec::new();
        match header.sections(endian, data) {
            Ok(table) => {
                for shdr in table.iter() {
                    let name = table
                        .section_name(endian, shdr)
                        .map(|n| String::from_utf8_lossy(n).into_owned())
                        .unwrap_or_default();
                    sections.push(Section {
                        name,
                        kind: shdr.sh_type(endian),
                        address: shdr.sh_addr(endian).into(),
                        file_offset: shdr.sh_offset(endian).into(),
                        size: shdr.sh_size(endian).into(),
                        entry_size: shdr.sh_entsize(endian).into(),
                        link: shdr.sh_link(endian),
                        info: shdr.sh_info(endian),
                    });
                }
            }
            Err(err) => tracing::debug!("ignoring section headers: {}", err),
        }

        tracing::debug!(
            "parsed {:?} image: {} loadable segments, {} dynamic segments, {} sections",
            class,
            segments.len(),
            dynamic_segments.len(),
            sections.len()
        );

        Ok(Self {
            data,
            class,
            endian,
            context: LoadContext::new(load_bias, segments),
            sections,
            dynamic_segments,
        })
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn context(&self) -> &LoadContext {
        &self.context
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: u32) -> Option<&Section> {
        self.sections.get(index as usize)
    }

    /// Every `PT_DYNAMIC` segment, in program header order.
    pub fn dynamic_segments(&self) -> Vec<Dynamic<'_>> {
        self.dynamic_segments
            .iter()
            .map(|segment| Dynamic::new(self, Origin::Segment(*segment)))
            .collect()
    }

    /// Every `SHT_DYNAMIC` section, in section header order.
    pub fn dynamic_sections(&self) -> Vec<Dynamic<'_>> {
        self.sections
            .iter()
            .filter(|s| s.kind == elf::SHT_DYNAMIC)
            .map(|section| Dynamic::new(self, Origin::Section(section.clone())))
            .collect()
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16> {
        self.data
            .read_at::<U16Bytes<Endianness>>(offset)
            .map(|v| v.get(self.endian))
            .map_err(|()| Error::Truncated { offset, len: 2 })
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        self.data
            .read_at::<U32Bytes<Endianness>>(offset)
            .map(|v| v.get(self.endian))
            .map_err(|()| Error::Truncated { offset, len: 4 })
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        self.data
            .read_at::<U64Bytes<Endianness>>(offset)
            .map(|v| v.get(self.endian))
            .map_err(|()| Error::Truncated { offset, len: 8 })
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8> {
        self.data
            .read_at::<u8>(offset)
            .copied()
            .map_err(|()| Error::Truncated { offset, len: 1 })
    }

    /// `base + delta` as a file offset, if it does not leave the file.
    ///
    /// Offsets derived from header and tag values are attacker controlled;
    /// every record address goes through here before it is read.
    pub fn offset_in(&self, base: u64, delta: u64) -> Result<u64> {
        base.checked_add(delta)
            .filter(|&offset| offset <= self.len())
            .ok_or(Error::Truncated { offset: base, len: delta })
    }

    /// Read one pointer-sized word.
    pub fn read_word(&self, offset: u64) -> Result<u64> {
        match self.class {
            Class::Elf32 => self.read_u32(offset).map(u64::from),
            Class::Elf64 => self.read_u64(offset),
        }
    }

    /// Read a NUL-terminated string; the terminator is not included.
    pub fn read_cstr(&self, offset: u64) -> Result<String> {
        let end = self.data.len() as u64;
        self.data
            .read_bytes_at_until(offset..end, 0)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .map_err(|()| Error::Truncated {
                offset,
                len: end.saturating_sub(offset),
            })
    }
}
