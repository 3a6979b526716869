//! Dynamic symbol table access.
//!
//! The dynamic table gives the address of the symbol array but not its length.
//! When a count is known (from the `SHT_DYNSYM` header or `DT_HASH`) iteration
//! stops there. Otherwise it stops at the first symbol whose name index is
//! nonzero but whose name reads back empty, which marks the end of the usable
//! prefix on typical toolchains. That rule is a heuristic, not a property of
//! the format. Either way iteration never leaves the containing segment.

use std::fmt;

use object::elf;

use crate::error::{Error, Result};
use crate::image::{Class, Image};

/// One `ElfN_Sym` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Resolved name; `None` without a string table or if unreadable.
    pub name: Option<String>,
    /// Raw `st_name`.
    pub name_index: u32,
    pub value: u64,
    pub size: u64,
    pub info: u8,
    pub other: u8,
    pub section_index: u16,
}

impl SymbolEntry {
    pub fn binding(&self) -> u8 {
        self.info >> 4
    }

    pub fn kind(&self) -> u8 {
        self.info & 0xf
    }

    pub fn is_undefined(&self) -> bool {
        self.section_index == elf::SHN_UNDEF
    }

    /// Name for reports: resolved name, or the raw index when unresolved.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{}", self.name_index),
        }
    }

    /// The end-of-table heuristic.
    fn ends_table(&self) -> bool {
        self.name_index > 0 && self.name.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Clone, Copy)]
pub struct SymbolTable<'a> {
    image: &'a Image<'a>,
    offset: u64,
    strtab: Option<u64>,
    count: Option<u64>,
    limit: u64,
}

impl fmt::Debug for SymbolTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("strtab", &self.strtab)
            .field("count", &self.count)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<'a> SymbolTable<'a> {
    /// `offset` and `strtab` are file offsets. `count` is an authoritative
    /// symbol count when one is known; `limit` bounds every walk.
    pub fn new(
        image: &'a Image<'a>,
        offset: u64,
        strtab: Option<u64>,
        count: Option<u64>,
        limit: u64,
    ) -> Self {
        Self {
            image,
            offset,
            strtab,
            count,
            limit,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn known_count(&self) -> Option<u64> {
        self.count
    }

    fn bound(&self) -> u64 {
        self.count.map_or(self.limit, |count| count.min(self.limit))
    }

    pub fn get(&self, n: u64) -> Result<SymbolEntry> {
        let bound = self.bound();
        if n >= bound {
            return Err(Error::IndexOutOfRange {
                index: n,
                count: bound,
            });
        }
        self.read(n)
    }

    fn read(&self, n: u64) -> Result<SymbolEntry> {
        let image = self.image;
        let base = image.offset_in(self.offset, n * image.class().sym_size())?;
        let name_index = image.read_u32(base)?;
        let (value, size, info, other, section_index) = match image.class() {
            Class::Elf64 => (
                image.read_u64(base + 8)?,
                image.read_u64(base + 16)?,
                image.read_u8(base + 4)?,
                image.read_u8(base + 5)?,
                image.read_u16(base + 6)?,
            ),
            Class::Elf32 => (
                u64::from(image.read_u32(base + 4)?),
                u64::from(image.read_u32(base + 8)?),
                image.read_u8(base + 12)?,
                image.read_u8(base + 13)?,
                image.read_u16(base + 14)?,
            ),
        };
        let name = self
            .strtab
            .and_then(|strtab| image.offset_in(strtab, u64::from(name_index)).ok())
            .and_then(|offset| image.read_cstr(offset).ok());
        Ok(SymbolEntry {
            name,
            name_index,
            value,
            size,
            info,
            other,
            section_index,
        })
    }

    /// Walk the usable symbols in index order.
    pub fn iter(&self) -> SymbolIter<'a> {
        SymbolIter {
            table: *self,
            next: 0,
            done: false,
        }
    }
}

pub struct SymbolIter<'a> {
    table: SymbolTable<'a>,
    next: u64,
    done: bool,
}

impl Iterator for SymbolIter<'_> {
    type Item = Result<SymbolEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next >= self.table.bound() {
            return None;
        }
        let symbol = match self.table.read(self.next) {
            Ok(symbol) => symbol,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        self.next += 1;
        if self.table.count.is_none() && self.table.strtab.is_some() && symbol.ends_table() {
            tracing::debug!("symbol table ends at index {}", self.next - 1);
            self.done = true;
            return None;
        }
        Some(Ok(symbol))
    }
}
