//! Dynamic tables.
//!
//! A dynamic table is an array of `(d_tag, d_val)` records terminated by
//! `DT_NULL`. `DynamicTable` reads it lazily from the image, never past the
//! terminator, and caches per-tag resolutions. `Dynamic` pairs a table with
//! the segment or section header it was found through.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::layout::{Section, Segment};
use crate::reloc::RelocationTable;
use crate::resolve;
use crate::symbol::SymbolTable;
use crate::tags::{Tag, TagEntry};

/// The semantic view of one dynamic entry. The variant depends on the tag only.
#[derive(Debug, Clone)]
pub enum ResolvedTag<'a> {
    Raw(u64),
    String(String),
    Relocations(RelocationTable<'a>),
    Symbols(SymbolTable<'a>),
}

impl<'a> ResolvedTag<'a> {
    pub fn as_raw(&self) -> Option<u64> {
        match self {
            ResolvedTag::Raw(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedTag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_relocations(self) -> Option<RelocationTable<'a>> {
        match self {
            ResolvedTag::Relocations(table) => Some(table),
            _ => None,
        }
    }

    pub fn into_symbols(self) -> Option<SymbolTable<'a>> {
        match self {
            ResolvedTag::Symbols(table) => Some(table),
            _ => None,
        }
    }
}

/// The header a dynamic table was located through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Segment(Segment),
    Section(Section),
}

impl Origin {
    pub fn file_offset(&self) -> u64 {
        match self {
            Origin::Segment(s) => s.file_offset,
            Origin::Section(s) => s.file_offset,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Origin::Segment(s) => s.file_size,
            Origin::Section(s) => s.size,
        }
    }

    pub fn virtual_address(&self) -> u64 {
        match self {
            Origin::Segment(s) => s.virtual_address,
            Origin::Section(s) => s.address,
        }
    }
}

/// Tag store over one dynamic table.
pub struct DynamicTable<'a> {
    image: &'a Image<'a>,
    offset: u64,
    entry_size: u64,
    /// Upper bound on entries, from the size of the containing region.
    max_entries: u64,
    count: Cell<Option<u64>>,
    cache: RefCell<HashMap<Tag, ResolvedTag<'a>>>,
    scans: Cell<usize>,
}

impl<'a> DynamicTable<'a> {
    pub fn new(image: &'a Image<'a>, offset: u64, region_size: u64) -> Self {
        let entry_size = image.class().dyn_size();
        Self {
            image,
            offset,
            entry_size,
            max_entries: region_size / entry_size,
            count: Cell::new(None),
            cache: RefCell::new(HashMap::new()),
            scans: Cell::new(0),
        }
    }

    pub fn image(&self) -> &'a Image<'a> {
        self.image
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of full-table scans performed so far.
    pub fn scan_count(&self) -> usize {
        self.scans.get()
    }

    fn read_entry(&self, n: u64) -> Result<TagEntry> {
        if n >= self.max_entries {
            return Err(Error::MalformedContainer(format!(
                "dynamic table at {:#x} has no DT_NULL within {} entries",
                self.offset, self.max_entries
            )));
        }
        let offset = self.image.offset_in(self.offset, n * self.entry_size)?;
        let word = self.image.class().pointer_width();
        let tag = self.image.read_word(offset)?;
        let value = self.image.read_word(offset + word)?;
        Ok(TagEntry {
            tag: Tag::from_raw(tag),
            value,
        })
    }

    /// Iterate the entries from the start of the table, `DT_NULL` included.
    pub fn iter(&self) -> TagIter<'_, 'a> {
        TagIter {
            table: self,
            next: 0,
            done: false,
        }
    }

    /// Number of entries including the terminator.
    pub fn count(&self) -> Result<u64> {
        if let Some(count) = self.count.get() {
            return Ok(count);
        }
        self.scans.set(self.scans.get() + 1);
        let mut count = 0;
        for entry in self.iter() {
            entry?;
            count += 1;
        }
        self.count.set(Some(count));
        Ok(count)
    }

    /// The `n`th entry.
    pub fn entry(&self, n: u64) -> Result<TagEntry> {
        let count = self.count()?;
        if n >= count {
            return Err(Error::IndexOutOfRange { index: n, count });
        }
        self.read_entry(n)
    }

    /// The first entry carrying `tag`, without resolving it.
    pub fn find(&self, tag: Tag) -> Result<Option<TagEntry>> {
        self.scans.set(self.scans.get() + 1);
        for entry in self.iter() {
            let entry = entry?;
            if entry.tag == tag {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Resolve the first entry carrying `tag`; cached per tag.
    pub fn lookup(&self, tag: Tag) -> Result<ResolvedTag<'a>> {
        if let Some(resolved) = self.cache.borrow().get(&tag) {
            return Ok(resolved.clone());
        }
        let entry = self.find(tag)?.ok_or(Error::NotFound(tag))?;
        let resolved = self.resolve(&entry)?;
        self.cache.borrow_mut().insert(tag, resolved.clone());
        Ok(resolved)
    }

    /// Resolve one entry of this table. Not cached: multi-valued tags such as
    /// `DT_NEEDED` resolve each entry separately.
    pub fn resolve(&self, entry: &TagEntry) -> Result<ResolvedTag<'a>> {
        resolve::resolve(entry, self)
    }

    /// Resolve every entry carrying `tag`, in table order.
    pub fn resolve_all(&self, tag: Tag) -> Result<Vec<ResolvedTag<'a>>> {
        let mut out = Vec::new();
        for entry in self.iter() {
            let entry = entry?;
            if entry.tag == tag {
                out.push(self.resolve(&entry)?);
            }
        }
        Ok(out)
    }
}

/// Lazy walk over a dynamic table; stops after yielding `DT_NULL` or an error.
pub struct TagIter<'t, 'a> {
    table: &'t DynamicTable<'a>,
    next: u64,
    done: bool,
}

impl Iterator for TagIter<'_, '_> {
    type Item = Result<TagEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let entry = self.table.read_entry(self.next);
        self.next += 1;
        match &entry {
            Ok(e) if !e.is_null() => {}
            _ => self.done = true,
        }
        Some(entry)
    }
}

/// A dynamic table together with the header it was found through.
pub struct Dynamic<'a> {
    origin: Origin,
    table: DynamicTable<'a>,
}

impl<'a> Dynamic<'a> {
    pub fn new(image: &'a Image<'a>, origin: Origin) -> Self {
        let table = DynamicTable::new(image, origin.file_offset(), origin.size());
        Self { origin, table }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn table(&self) -> &DynamicTable<'a> {
        &self.table
    }

    pub fn soname(&self) -> Result<String> {
        self.string(Tag::SoName)
    }

    pub fn rpath(&self) -> Result<String> {
        self.string(Tag::RPath)
    }

    pub fn runpath(&self) -> Result<String> {
        self.string(Tag::RunPath)
    }

    /// Every `DT_NEEDED` library name, in table order.
    pub fn needed(&self) -> Result<Vec<String>> {
        Ok(self
            .table
            .resolve_all(Tag::Needed)?
            .into_iter()
            .filter_map(|r| match r {
                ResolvedTag::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    pub fn symbols(&self) -> Result<SymbolTable<'a>> {
        let resolved = self.table.lookup(Tag::SymTab)?;
        resolved
            .into_symbols()
            .ok_or(Error::NotFound(Tag::SymTab))
    }

    pub fn plt_relocations(&self) -> Result<RelocationTable<'a>> {
        let resolved = self.table.lookup(Tag::JmpRel)?;
        resolved
            .into_relocations()
            .ok_or(Error::NotFound(Tag::JmpRel))
    }

    fn string(&self, tag: Tag) -> Result<String> {
        match self.table.lookup(tag)? {
            ResolvedTag::String(s) => Ok(s),
            _ => Err(Error::NotFound(tag)),
        }
    }
}
