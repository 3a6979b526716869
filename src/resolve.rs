//! Tag resolution.
//!
//! Turns a raw `TagEntry` into a `ResolvedTag`: string tags are read from the
//! dynamic string table, relocation tags become `RelocationTable`s and
//! `DT_SYMTAB` becomes a `SymbolTable`. Companion tags (`DT_STRTAB`, size tags,
//! `DT_PLTREL`, `DT_HASH`) are looked up in the same table.
//!
//! In a live image the loader has rewritten the mangled tags to runtime
//! addresses. Where section headers give the same location (`.dynstr`,
//! `.dynsym`, `.rel[a].plt`, `.hash`) they are used instead of the tag value.

use object::elf;
use tracing::debug;

use crate::dynamic::{DynamicTable, ResolvedTag};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::layout::{Address, LoadContext, Section};
use crate::reloc::RelocationTable;
use crate::symbol::SymbolTable;
use crate::tags::{Tag, TagEntry, TagKind};

pub(crate) fn resolve<'a>(entry: &TagEntry, table: &DynamicTable<'a>) -> Result<ResolvedTag<'a>> {
    let resolved = match (entry.tag.kind(), entry.tag.size_companion()) {
        (TagKind::String, _) => ResolvedTag::String(resolve_string(entry, table)?),
        (TagKind::Relocations, Some(size_tag)) => {
            ResolvedTag::Relocations(resolve_relocations(entry, size_tag, table)?)
        }
        (TagKind::Symbols, _) => ResolvedTag::Symbols(resolve_symbols(entry, table)?),
        _ => ResolvedTag::Raw(entry.value),
    };
    debug!("resolved {} -> {:?}", entry, resolved);
    Ok(resolved)
}

/// Provenance of a tag's value given the load context.
pub fn tag_address(context: &LoadContext, entry: &TagEntry) -> Address {
    if context.is_live() && entry.tag.is_mangled() {
        Address::Runtime(entry.value)
    } else {
        Address::LinkTime(entry.value)
    }
}

/// File offset of the data an address-valued tag points at.
///
/// A mangled tag in a live image is first read as a runtime address; if that
/// lands nowhere the file was never relocated and the value is link-time.
pub fn tag_file_offset(context: &LoadContext, entry: &TagEntry) -> Result<u64> {
    let address = tag_address(context, entry);
    match context.to_file_offset(context.to_link_time(address)) {
        Ok(offset) => Ok(offset),
        Err(err) if matches!(address, Address::Runtime(_)) => {
            debug!(
                "{} value {:#x} is not load-biased, reading it as link-time",
                entry.tag, entry.value
            );
            context.to_file_offset(entry.value).map_err(|_| err)
        }
        Err(err) => Err(err),
    }
}

fn companion(table: &DynamicTable<'_>, tag: Tag) -> Result<Option<TagEntry>> {
    match table.lookup(tag) {
        Ok(resolved) => Ok(resolved.as_raw().map(|value| TagEntry { tag, value })),
        Err(Error::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

fn dynsym_section<'i>(image: &'i Image<'_>) -> Option<&'i Section> {
    image.sections().iter().find(|s| s.kind == elf::SHT_DYNSYM)
}

/// The section holding the PLT relocations: `.rel[a].plt` by name, or the
/// relocation section whose `sh_info` names the PLT or its GOT.
fn plt_relocation_section<'i>(image: &'i Image<'_>, with_addend: bool) -> Option<&'i Section> {
    let kind = if with_addend { elf::SHT_RELA } else { elf::SHT_REL };
    let applies_to_plt = |s: &Section| {
        image
            .section(s.info)
            .is_some_and(|target| matches!(target.name.as_str(), ".plt" | ".got.plt"))
    };
    let candidates = || image.sections().iter().filter(move |s| s.kind == kind);
    candidates()
        .find(|s| s.name == ".rela.plt" || s.name == ".rel.plt")
        .or_else(|| candidates().find(|s| s.info != 0 && applies_to_plt(*s)))
}

/// File offset of `entry`'s data, taken from a section header in a live
/// image when one describes it, otherwise from the tag value.
fn located(table: &DynamicTable<'_>, entry: &TagEntry, section: Option<&Section>) -> Result<u64> {
    let context = table.image().context();
    match section {
        Some(section) if context.is_live() => {
            debug!("{} read through section {}", entry.tag, section.name);
            Ok(section.file_offset)
        }
        _ => tag_file_offset(context, entry),
    }
}

/// File offset of the dynamic string table serving `requester`.
fn string_table_offset(table: &DynamicTable<'_>, requester: Tag) -> Result<u64> {
    let strtab = companion(table, Tag::StrTab)?.ok_or(Error::MissingStringTable(requester))?;
    let image = table.image();
    let context = image.context();

    if context.is_live() {
        let fresh = dynsym_section(image)
            .and_then(|dynsym| image.section(dynsym.link))
            .filter(|s| s.kind == elf::SHT_STRTAB);
        if let Some(section) = fresh {
            return Ok(section.file_offset);
        }
    }

    tag_file_offset(context, &strtab).map_err(|_| Error::MissingSegment {
        address: strtab.value,
    })
}

fn resolve_string(entry: &TagEntry, table: &DynamicTable<'_>) -> Result<String> {
    let base = string_table_offset(table, entry.tag)?;
    let image = table.image();
    image.read_cstr(image.offset_in(base, entry.value)?)
}

fn resolve_relocations<'a>(
    entry: &TagEntry,
    size_tag: Tag,
    table: &DynamicTable<'a>,
) -> Result<RelocationTable<'a>> {
    let size = companion(table, size_tag)?.ok_or(Error::MissingSizeTag {
        tag: entry.tag,
        size_tag,
    })?;

    let with_addend = match entry.tag {
        Tag::Rel => false,
        Tag::Rela => true,
        // DT_PLTREL names the record layout; RELA unless it says DT_REL.
        _ => companion(table, Tag::PltRel)?.map_or(true, |e| e.value != Tag::Rel.raw()),
    };

    let image = table.image();
    let section = match entry.tag {
        Tag::JmpRel => plt_relocation_section(image, with_addend),
        _ => None,
    };
    let offset = located(table, entry, section)?;
    Ok(RelocationTable::new(image, offset, size.value, with_addend))
}

fn resolve_symbols<'a>(entry: &TagEntry, table: &DynamicTable<'a>) -> Result<SymbolTable<'a>> {
    let strtab = string_table_offset(table, entry.tag)?;
    let image = table.image();
    let context = image.context();
    let record_size = image.class().sym_size();

    let section = dynsym_section(image).filter(|s| context.is_live() || s.address == entry.value);
    let (offset, count) = match section {
        Some(dynsym) => {
            let entry_size = if dynsym.entry_size == 0 {
                record_size
            } else {
                dynsym.entry_size
            };
            (dynsym.file_offset, Some(dynsym.size / entry_size))
        }
        None => (tag_file_offset(context, entry)?, hash_symbol_count(table)),
    };

    let limit = context
        .remaining_from_offset(offset)
        .unwrap_or_else(|| image.len().saturating_sub(offset))
        / record_size;

    debug!(
        "symbol table at {:#x}, strings at {:#x}, count {:?}, limit {}",
        offset, strtab, count, limit
    );
    Ok(SymbolTable::new(image, offset, Some(strtab), count, limit))
}

/// `nchain` of the SysV hash table equals the number of dynamic symbols.
fn hash_symbol_count(table: &DynamicTable<'_>) -> Option<u64> {
    let hash = match companion(table, Tag::Hash) {
        Ok(Some(hash)) => hash,
        Ok(None) => return None,
        Err(err) => {
            debug!("DT_HASH unusable: {}", err);
            return None;
        }
    };
    let image = table.image();
    let section = image.sections().iter().find(|s| s.kind == elf::SHT_HASH);
    located(table, &hash, section)
        .and_then(|offset| image.offset_in(offset, 4))
        .and_then(|offset| image.read_u32(offset))
        .map(u64::from)
        .map_err(|err| debug!("DT_HASH unreadable: {}", err))
        .ok()
}
