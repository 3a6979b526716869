//! Relocation tables reached through `DT_REL`, `DT_RELA` and `DT_JMPREL`.

use std::fmt;

use crate::error::{Error, Result};
use crate::image::{Class, Image};

/// One `ElfN_Rel` or `ElfN_Rela` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    /// Link-time virtual address of the location to patch (the GOT slot for
    /// PLT relocations).
    pub offset: u64,
    /// Raw `r_info`.
    pub info: u64,
    pub symbol_index: u32,
    pub kind: u32,
    /// Present for RELA records only.
    pub addend: Option<i64>,
}

impl RelocationEntry {
    fn decode(class: Class, offset: u64, info: u64, addend: Option<i64>) -> Self {
        let (symbol_index, kind) = match class {
            Class::Elf32 => ((info >> 8) as u32, (info & 0xff) as u32),
            Class::Elf64 => ((info >> 32) as u32, (info & 0xffff_ffff) as u32),
        };
        Self {
            offset,
            info,
            symbol_index,
            kind,
            addend,
        }
    }
}

/// A contiguous array of fixed-size relocation records in the file.
#[derive(Clone, Copy)]
pub struct RelocationTable<'a> {
    image: &'a Image<'a>,
    offset: u64,
    size: u64,
    with_addend: bool,
}

impl fmt::Debug for RelocationTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocationTable")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("size", &self.size)
            .field("with_addend", &self.with_addend)
            .finish()
    }
}

impl<'a> RelocationTable<'a> {
    /// `offset` is a file offset; `size` the byte size of the array.
    pub fn new(image: &'a Image<'a>, offset: u64, size: u64, with_addend: bool) -> Self {
        Self {
            image,
            offset,
            size,
            with_addend,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_rela(&self) -> bool {
        self.with_addend
    }

    pub fn record_size(&self) -> u64 {
        self.image.class().rel_size(self.with_addend)
    }

    /// Number of records. A size that is not a whole number of records is
    /// reported, not truncated.
    pub fn count(&self) -> Result<u64> {
        let record_size = self.record_size();
        if self.size % record_size != 0 {
            return Err(Error::MalformedTable {
                offset: self.offset,
                size: self.size,
                record_size,
            });
        }
        Ok(self.size / record_size)
    }

    pub fn get(&self, n: u64) -> Result<RelocationEntry> {
        let count = self.count()?;
        if n >= count {
            return Err(Error::IndexOutOfRange { index: n, count });
        }
        self.read(n)
    }

    fn read(&self, n: u64) -> Result<RelocationEntry> {
        let class = self.image.class();
        let word = class.pointer_width();
        let base = self.image.offset_in(self.offset, n * self.record_size())?;
        let offset = self.image.read_word(base)?;
        let info = self.image.read_word(base + word)?;
        let addend = if self.with_addend {
            let raw = self.image.read_word(base + 2 * word)?;
            Some(match class {
                Class::Elf32 => i64::from(raw as u32 as i32),
                Class::Elf64 => raw as i64,
            })
        } else {
            None
        };
        Ok(RelocationEntry::decode(class, offset, info, addend))
    }

    /// Every record in index order.
    pub fn iter(&self) -> Result<RelocationIter<'a>> {
        Ok(RelocationIter {
            table: *self,
            next: 0,
            count: self.count()?,
        })
    }
}

pub struct RelocationIter<'a> {
    table: RelocationTable<'a>,
    next: u64,
    count: u64,
}

impl Iterator for RelocationIter<'_> {
    type Item = Result<RelocationEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let entry = self.table.read(self.next);
        self.next += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}
