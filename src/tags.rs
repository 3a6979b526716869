//! Dynamic tag kinds.
//!
//! `Tag` is the closed set of `DT_*` kinds the analysis knows how to interpret,
//! plus `Other` for everything else. The kind alone decides how an entry is
//! resolved (see [`TagKind`]).

use std::fmt;

use object::elf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Null,
    Needed,
    PltRelSz,
    PltGot,
    Hash,
    StrTab,
    SymTab,
    Rela,
    RelaSz,
    RelaEnt,
    StrSz,
    SymEnt,
    Init,
    Fini,
    SoName,
    RPath,
    Symbolic,
    Rel,
    RelSz,
    RelEnt,
    PltRel,
    Debug,
    TextRel,
    JmpRel,
    BindNow,
    RunPath,
    Flags,
    GnuHash,
    VerSym,
    Auxiliary,
    Filter,
    Other(u64),
}

/// How a tag's value is interpreted by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Offset into the dynamic string table.
    String,
    /// Address of a relocation array with a size companion.
    Relocations,
    /// Address of the dynamic symbol array.
    Symbols,
    /// Anything else: the literal value.
    Raw,
}

impl Tag {
    pub fn from_raw(raw: u64) -> Self {
        let Ok(value) = u32::try_from(raw) else {
            return Tag::Other(raw);
        };
        match value {
            elf::DT_NULL => Tag::Null,
            elf::DT_NEEDED => Tag::Needed,
            elf::DT_PLTRELSZ => Tag::PltRelSz,
            elf::DT_PLTGOT => Tag::PltGot,
            elf::DT_HASH => Tag::Hash,
            elf::DT_STRTAB => Tag::StrTab,
            elf::DT_SYMTAB => Tag::SymTab,
            elf::DT_RELA => Tag::Rela,
            elf::DT_RELASZ => Tag::RelaSz,
            elf::DT_RELAENT => Tag::RelaEnt,
            elf::DT_STRSZ => Tag::StrSz,
            elf::DT_SYMENT => Tag::SymEnt,
            elf::DT_INIT => Tag::Init,
            elf::DT_FINI => Tag::Fini,
            elf::DT_SONAME => Tag::SoName,
            elf::DT_RPATH => Tag::RPath,
            elf::DT_SYMBOLIC => Tag::Symbolic,
            elf::DT_REL => Tag::Rel,
            elf::DT_RELSZ => Tag::RelSz,
            elf::DT_RELENT => Tag::RelEnt,
            elf::DT_PLTREL => Tag::PltRel,
            elf::DT_DEBUG => Tag::Debug,
            elf::DT_TEXTREL => Tag::TextRel,
            elf::DT_JMPREL => Tag::JmpRel,
            elf::DT_BIND_NOW => Tag::BindNow,
            elf::DT_RUNPATH => Tag::RunPath,
            elf::DT_FLAGS => Tag::Flags,
            elf::DT_GNU_HASH => Tag::GnuHash,
            elf::DT_VERSYM => Tag::VerSym,
            elf::DT_AUXILIARY => Tag::Auxiliary,
            elf::DT_FILTER => Tag::Filter,
            _ => Tag::Other(raw),
        }
    }

    pub fn raw(self) -> u64 {
        let value = match self {
            Tag::Null => elf::DT_NULL,
            Tag::Needed => elf::DT_NEEDED,
            Tag::PltRelSz => elf::DT_PLTRELSZ,
            Tag::PltGot => elf::DT_PLTGOT,
            Tag::Hash => elf::DT_HASH,
            Tag::StrTab => elf::DT_STRTAB,
            Tag::SymTab => elf::DT_SYMTAB,
            Tag::Rela => elf::DT_RELA,
            Tag::RelaSz => elf::DT_RELASZ,
            Tag::RelaEnt => elf::DT_RELAENT,
            Tag::StrSz => elf::DT_STRSZ,
            Tag::SymEnt => elf::DT_SYMENT,
            Tag::Init => elf::DT_INIT,
            Tag::Fini => elf::DT_FINI,
            Tag::SoName => elf::DT_SONAME,
            Tag::RPath => elf::DT_RPATH,
            Tag::Symbolic => elf::DT_SYMBOLIC,
            Tag::Rel => elf::DT_REL,
            Tag::RelSz => elf::DT_RELSZ,
            Tag::RelEnt => elf::DT_RELENT,
            Tag::PltRel => elf::DT_PLTREL,
            Tag::Debug => elf::DT_DEBUG,
            Tag::TextRel => elf::DT_TEXTREL,
            Tag::JmpRel => elf::DT_JMPREL,
            Tag::BindNow => elf::DT_BIND_NOW,
            Tag::RunPath => elf::DT_RUNPATH,
            Tag::Flags => elf::DT_FLAGS,
            Tag::GnuHash => elf::DT_GNU_HASH,
            Tag::VerSym => elf::DT_VERSYM,
            Tag::Auxiliary => elf::DT_AUXILIARY,
            Tag::Filter => elf::DT_FILTER,
            Tag::Other(raw) => return raw,
        };
        u64::from(value)
    }

    pub fn kind(self) -> TagKind {
        match self {
            Tag::Needed
            | Tag::RPath
            | Tag::RunPath
            | Tag::SoName
            | Tag::Filter
            | Tag::Auxiliary => TagKind::String,
            Tag::Rel | Tag::Rela | Tag::JmpRel => TagKind::Relocations,
            Tag::SymTab => TagKind::Symbols,
            _ => TagKind::Raw,
        }
    }

    /// Tags whose value the dynamic loader rewrites in memory after load.
    ///
    /// In a live image these hold runtime addresses, so their on-disk
    /// interpretation cannot be trusted.
    pub fn is_mangled(self) -> bool {
        matches!(
            self,
            Tag::Hash
                | Tag::GnuHash
                | Tag::StrTab
                | Tag::SymTab
                | Tag::Debug
                | Tag::PltGot
                | Tag::JmpRel
                | Tag::Rela
                | Tag::Rel
                | Tag::VerSym
        )
    }

    /// The tag holding the byte size of this relocation array.
    pub fn size_companion(self) -> Option<Tag> {
        match self {
            Tag::Rel => Some(Tag::RelSz),
            Tag::Rela => Some(Tag::RelaSz),
            Tag::JmpRel => Some(Tag::PltRelSz),
            _ => None,
        }
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Tag::Null => "DT_NULL",
            Tag::Needed => "DT_NEEDED",
            Tag::PltRelSz => "DT_PLTRELSZ",
            Tag::PltGot => "DT_PLTGOT",
            Tag::Hash => "DT_HASH",
            Tag::StrTab => "DT_STRTAB",
            Tag::SymTab => "DT_SYMTAB",
            Tag::Rela => "DT_RELA",
            Tag::RelaSz => "DT_RELASZ",
            Tag::RelaEnt => "DT_RELAENT",
            Tag::StrSz => "DT_STRSZ",
            Tag::SymEnt => "DT_SYMENT",
            Tag::Init => "DT_INIT",
            Tag::Fini => "DT_FINI",
            Tag::SoName => "DT_SONAME",
            Tag::RPath => "DT_RPATH",
            Tag::Symbolic => "DT_SYMBOLIC",
            Tag::Rel => "DT_REL",
            Tag::RelSz => "DT_RELSZ",
            Tag::RelEnt => "DT_RELENT",
            Tag::PltRel => "DT_PLTREL",
            Tag::Debug => "DT_DEBUG",
            Tag::TextRel => "DT_TEXTREL",
            Tag::JmpRel => "DT_JMPREL",
            Tag::BindNow => "DT_BIND_NOW",
            Tag::RunPath => "DT_RUNPATH",
            Tag::Flags => "DT_FLAGS",
            Tag::GnuHash => "DT_GNU_HASH",
            Tag::VerSym => "DT_VERSYM",
            Tag::Auxiliary => "DT_AUXILIARY",
            Tag::Filter => "DT_FILTER",
            Tag::Other(_) => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "DT_{:#x}", self.raw()),
        }
    }
}

/// One raw entry of a dynamic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: Tag,
    /// `d_val`/`d_ptr`: an address, a size or flags depending on the tag.
    pub value: u64,
}

impl TagEntry {
    pub fn is_null(&self) -> bool {
        self.tag == Tag::Null
    }
}

impl fmt::Display for TagEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#x}", self.tag, self.value)
    }
}
