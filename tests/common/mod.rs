//! Synthetic ELF64 images for the integration tests.
//!
//! The layout is fixed: a read-only segment holding the dynamic string table,
//! the SysV hash table, the dynamic symbols and the PLT relocations, and a
//! writable segment (loaded at a different file/address delta) holding the
//! dynamic table and the GOT. Both ELF classes use the same offsets.
#![allow(dead_code)]

use object::elf;
use object::endian::{I64, U16, U32, U64};
use object::pod::bytes_of;
use object::Endianness;

pub const BASE: u64 = 0x400000;
pub const DATA_VADDR: u64 = 0x601000;
pub const BIAS: u64 = 0x7f00_0000_0000;

const TEXT_SIZE: u64 = 0x1000;
const DATA_OFFSET: u64 = 0x1000;
const DATA_SIZE: u64 = 0x1000;

const DYNSTR: u64 = 0x100;
const HASH: u64 = 0x300;
const DYNSYM: u64 = 0x400;
const RELA_PLT: u64 = 0x800;
const DYNAMIC: u64 = 0x1000;
const GOT: u64 = 0x1400;
const SHSTRTAB: u64 = 0x1700;
const SHDRS: u64 = 0x1800;

const R_X86_64_JUMP_SLOT: u32 = 7;
const R_386_JMP_SLOT: u32 = 7;

fn u16(v: u16) -> U16<Endianness> {
    U16::new(Endianness::Little, v)
}
fn u32(v: u32) -> U32<Endianness> {
    U32::new(Endianness::Little, v)
}
fn u64(v: u64) -> U64<Endianness> {
    U64::new(Endianness::Little, v)
}

/// Virtual address of a file offset in the fixed layout.
pub fn vaddr(offset: u64) -> u64 {
    if offset < TEXT_SIZE {
        BASE + offset
    } else {
        DATA_VADDR + (offset - DATA_OFFSET)
    }
}

/// Link-time address of the GOT slot of PLT relocation `n`.
pub fn got_slot(n: usize) -> u64 {
    vaddr(GOT) + 8 * n as u64
}

pub struct ImageBuilder {
    pub soname: Option<String>,
    pub needed: Vec<String>,
    /// `(name, value)`; value 0 makes an undefined import.
    pub symbols: Vec<(String, u64)>,
    /// `(1-based symbol index, value currently in the GOT slot)`.
    pub plt: Vec<(u32, u64)>,
    pub strtab: bool,
    pub symtab: bool,
    pub hash: bool,
    pub sections: bool,
    pub terminate: bool,
    /// Added to the mangled tag values, as a loader would in memory.
    pub tag_bias: u64,
    /// Raw `(tag, value)` pairs appended before `DT_NULL`.
    pub extra: Vec<(u32, u64)>,
    /// ELFCLASS32 / i386 layout: 4-byte words and REL-shaped PLT records.
    pub elf32: bool,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self {
            soname: None,
            needed: Vec::new(),
            symbols: Vec::new(),
            plt: Vec::new(),
            strtab: true,
            symtab: true,
            hash: true,
            sections: false,
            terminate: true,
            tag_bias: 0,
            extra: Vec::new(),
            elf32: false,
        }
    }
}

fn put(buf: &mut [u8], offset: u64, bytes: &[u8]) {
    let offset = offset as usize;
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

struct Strings {
    data: Vec<u8>,
}

impl Strings {
    fn new() -> Self {
        Self { data: vec![0] }
    }

    fn add(&mut self, s: &str) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        offset
    }
}

/// One section header's fields, written in either class.
struct Shdr {
    name: u32,
    kind: u32,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    entsize: u64,
}

impl ImageBuilder {
    fn word(&self) -> u64 {
        if self.elf32 {
            4
        } else {
            8
        }
    }

    fn sym_size(&self) -> u64 {
        if self.elf32 {
            16
        } else {
            24
        }
    }

    fn plt_record_size(&self) -> u64 {
        if self.elf32 {
            8
        } else {
            24
        }
    }

    fn ehdr_size(&self) -> u64 {
        if self.elf32 {
            52
        } else {
            64
        }
    }

    fn phdr_size(&self) -> u64 {
        if self.elf32 {
            32
        } else {
            56
        }
    }

    fn shdr_size(&self) -> u64 {
        if self.elf32 {
            40
        } else {
            64
        }
    }

    /// Link-time address of the GOT slot of PLT relocation `n` in this layout.
    pub fn got_slot(&self, n: usize) -> u64 {
        vaddr(GOT) + self.word() * n as u64
    }

    fn put_word(&self, buf: &mut [u8], offset: u64, value: u64) {
        if self.elf32 {
            put(buf, offset, &(value as u32).to_le_bytes());
        } else {
            put(buf, offset, &value.to_le_bytes());
        }
    }

    fn symbol_bytes(&self, name: u32, value: u64) -> Vec<u8> {
        let info = (elf::STB_GLOBAL << 4) | elf::STT_FUNC;
        let shndx = u16(if value == 0 { elf::SHN_UNDEF } else { 1 });
        if self.elf32 {
            bytes_of(&elf::Sym32::<Endianness> {
                st_name: u32(name),
                st_value: u32(value as u32),
                st_size: u32(0),
                st_info: info,
                st_other: 0,
                st_shndx: shndx,
            })
            .to_vec()
        } else {
            bytes_of(&elf::Sym64::<Endianness> {
                st_name: u32(name),
                st_info: info,
                st_other: 0,
                st_shndx: shndx,
                st_value: u64(value),
                st_size: u64(0),
            })
            .to_vec()
        }
    }

    fn plt_bytes(&self, slot: u64, sym: u32) -> Vec<u8> {
        if self.elf32 {
            bytes_of(&elf::Rel32::<Endianness> {
                r_offset: u32(slot as u32),
                r_info: u32((sym << 8) | R_386_JMP_SLOT),
            })
            .to_vec()
        } else {
            bytes_of(&elf::Rela64::<Endianness> {
                r_offset: u64(slot),
                r_info: u64((u64::from(sym) << 32) | u64::from(R_X86_64_JUMP_SLOT)),
                r_addend: I64::new(Endianness::Little, 0),
            })
            .to_vec()
        }
    }

    fn dyn_bytes(&self, tag: u32, value: u64) -> Vec<u8> {
        if self.elf32 {
            bytes_of(&elf::Dyn32::<Endianness> {
                d_tag: u32(tag),
                d_val: u32(value as u32),
            })
            .to_vec()
        } else {
            bytes_of(&elf::Dyn64::<Endianness> {
                d_tag: u64(u64::from(tag)),
                d_val: u64(value),
            })
            .to_vec()
        }
    }

    fn phdr_bytes(&self, p_type: u32, flags: u32, offset: u64, size: u64) -> Vec<u8> {
        let address = vaddr(offset);
        if self.elf32 {
            bytes_of(&elf::ProgramHeader32::<Endianness> {
                p_type: u32(p_type),
                p_offset: u32(offset as u32),
                p_vaddr: u32(address as u32),
                p_paddr: u32(address as u32),
                p_filesz: u32(size as u32),
                p_memsz: u32(size as u32),
                p_flags: u32(flags),
                p_align: u32(0x1000),
            })
            .to_vec()
        } else {
            bytes_of(&elf::ProgramHeader64::<Endianness> {
                p_type: u32(p_type),
                p_flags: u32(flags),
                p_offset: u64(offset),
                p_vaddr: u64(address),
                p_paddr: u64(address),
                p_filesz: u64(size),
                p_memsz: u64(size),
                p_align: u64(0x1000),
            })
            .to_vec()
        }
    }

    fn shdr_bytes(&self, h: &Shdr) -> Vec<u8> {
        let address = if h.offset == 0 || h.offset == SHSTRTAB {
            0
        } else {
            vaddr(h.offset)
        };
        if self.elf32 {
            bytes_of(&elf::SectionHeader32::<Endianness> {
                sh_name: u32(h.name),
                sh_type: u32(h.kind),
                sh_flags: u32(0),
                sh_addr: u32(address as u32),
                sh_offset: u32(h.offset as u32),
                sh_size: u32(h.size as u32),
                sh_link: u32(h.link),
                sh_info: u32(h.info),
                sh_addralign: u32(4),
                sh_entsize: u32(h.entsize as u32),
            })
            .to_vec()
        } else {
            bytes_of(&elf::SectionHeader64::<Endianness> {
                sh_name: u32(h.name),
                sh_type: u32(h.kind),
                sh_flags: u64(0),
                sh_addr: u64(address),
                sh_offset: u64(h.offset),
                sh_size: u64(h.size),
                sh_link: u32(h.link),
                sh_info: u32(h.info),
                sh_addralign: u64(8),
                sh_entsize: u64(h.entsize),
            })
            .to_vec()
        }
    }

    fn ident(&self) -> elf::Ident {
        elf::Ident {
            magic: elf::ELFMAG,
            class: if self.elf32 {
                elf::ELFCLASS32
            } else {
                elf::ELFCLASS64
            },
            data: elf::ELFDATA2LSB,
            version: elf::EV_CURRENT,
            os_abi: elf::ELFOSABI_SYSV,
            abi_version: 0,
            padding: [0; 7],
        }
    }

    fn header_bytes(&self, phnum: u16, shoff: u64, shnum: u16) -> Vec<u8> {
        let shstrndx = u16(if shnum == 0 { 0 } else { shnum - 1 });
        if self.elf32 {
            bytes_of(&elf::FileHeader32::<Endianness> {
                e_ident: self.ident(),
                e_type: u16(elf::ET_DYN),
                e_machine: u16(elf::EM_386),
                e_version: u32(elf::EV_CURRENT as u32),
                e_entry: u32(0),
                e_phoff: u32(self.ehdr_size() as u32),
                e_shoff: u32(shoff as u32),
                e_flags: u32(0),
                e_ehsize: u16(self.ehdr_size() as u16),
                e_phentsize: u16(self.phdr_size() as u16),
                e_phnum: u16(phnum),
                e_shentsize: u16(self.shdr_size() as u16),
                e_shnum: u16(shnum),
                e_shstrndx: shstrndx,
            })
            .to_vec()
        } else {
            bytes_of(&elf::FileHeader64::<Endianness> {
                e_ident: self.ident(),
                e_type: u16(elf::ET_DYN),
                e_machine: u16(elf::EM_X86_64),
                e_version: u32(elf::EV_CURRENT as u32),
                e_entry: u64(0),
                e_phoff: u64(self.ehdr_size()),
                e_shoff: u64(shoff),
                e_flags: u32(0),
                e_ehsize: u16(self.ehdr_size() as u16),
                e_phentsize: u16(self.phdr_size() as u16),
                e_phnum: u16(phnum),
                e_shentsize: u16(self.shdr_size() as u16),
                e_shnum: u16(shnum),
                e_shstrndx: shstrndx,
            })
            .to_vec()
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; (DATA_OFFSET + DATA_SIZE) as usize];

        // .dynstr
        let mut dynstr = Strings::new();
        let soname = self.soname.as_deref().map(|s| dynstr.add(s));
        let needed: Vec<u32> = self.needed.iter().map(|s| dynstr.add(s)).collect();
        let names: Vec<u32> = self.symbols.iter().map(|(s, _)| dynstr.add(s)).collect();
        put(&mut buf, DYNSTR, &dynstr.data);

        // .hash: one bucket, nchain = number of symbols including the null one.
        let nsyms = self.symbols.len() as u32 + 1;
        put(&mut buf, HASH, &1u32.to_le_bytes());
        put(&mut buf, HASH + 4, &nsyms.to_le_bytes());

        // .dynsym
        for (i, ((_, value), name)) in self.symbols.iter().zip(&names).enumerate() {
            let offset = DYNSYM + self.sym_size() * (i as u64 + 1);
            put(&mut buf, offset, &self.symbol_bytes(*name, *value));
        }

        // .rel[a].plt and .got
        for (n, (sym, target)) in self.plt.iter().enumerate() {
            let record = self.plt_bytes(self.got_slot(n), *sym);
            put(&mut buf, RELA_PLT + self.plt_record_size() * n as u64, &record);
            self.put_word(&mut buf, GOT + self.word() * n as u64, *target);
        }

        // .dynamic
        let mangled = |offset: u64| vaddr(offset) + self.tag_bias;
        let mut tags: Vec<(u32, u64)> = Vec::new();
        if let Some(soname) = soname {
            tags.push((elf::DT_SONAME, u64::from(soname)));
        }
        for offset in &needed {
            tags.push((elf::DT_NEEDED, u64::from(*offset)));
        }
        if self.strtab {
            tags.push((elf::DT_STRTAB, mangled(DYNSTR)));
            tags.push((elf::DT_STRSZ, dynstr.data.len() as u64));
        }
        if self.symtab {
            tags.push((elf::DT_SYMTAB, mangled(DYNSYM)));
            tags.push((elf::DT_SYMENT, self.sym_size()));
        }
        if self.hash {
            tags.push((elf::DT_HASH, mangled(HASH)));
        }
        if !self.plt.is_empty() {
            let format = if self.elf32 { elf::DT_REL } else { elf::DT_RELA };
            tags.push((elf::DT_JMPREL, mangled(RELA_PLT)));
            tags.push((elf::DT_PLTRELSZ, self.plt_record_size() * self.plt.len() as u64));
            tags.push((elf::DT_PLTREL, u64::from(format)));
        }
        tags.extend(self.extra.iter().copied());
        if self.terminate {
            tags.push((elf::DT_NULL, 0));
        }
        let dyn_size = 2 * self.word();
        for (i, (tag, value)) in tags.iter().enumerate() {
            put(&mut buf, DYNAMIC + dyn_size * i as u64, &self.dyn_bytes(*tag, *value));
        }
        let dynamic_size = dyn_size * tags.len() as u64;

        // Program headers: text, data, dynamic.
        let phdrs = [
            self.phdr_bytes(elf::PT_LOAD, elf::PF_R | elf::PF_X, 0, TEXT_SIZE),
            self.phdr_bytes(elf::PT_LOAD, elf::PF_R | elf::PF_W, DATA_OFFSET, DATA_SIZE),
            self.phdr_bytes(elf::PT_DYNAMIC, elf::PF_R | elf::PF_W, DYNAMIC, dynamic_size),
        ];
        for (i, p) in phdrs.iter().enumerate() {
            put(&mut buf, self.ehdr_size() + self.phdr_size() * i as u64, p);
        }

        let (shoff, shnum) = if self.sections {
            let shnum = self.write_sections(&mut buf, dynstr.data.len() as u64, dynamic_size);
            (SHDRS, shnum)
        } else {
            (0, 0)
        };

        let header = self.header_bytes(phdrs.len() as u16, shoff, shnum);
        put(&mut buf, 0, &header);
        buf
    }

    /// Writes the section headers, `.shstrtab` last; returns their number.
    fn write_sections(&self, buf: &mut [u8], dynstr_size: u64, dynamic_size: u64) -> u16 {
        let mut shstrtab = Strings::new();
        let mut headers = vec![
            Shdr {
                name: 0,
                kind: elf::SHT_NULL,
                offset: 0,
                size: 0,
                link: 0,
                info: 0,
                entsize: 0,
            },
            Shdr {
                name: shstrtab.add(".dynstr"),
                kind: elf::SHT_STRTAB,
                offset: DYNSTR,
                size: dynstr_size,
                link: 0,
                info: 0,
                entsize: 0,
            },
            Shdr {
                name: shstrtab.add(".dynsym"),
                kind: elf::SHT_DYNSYM,
                offset: DYNSYM,
                size: self.sym_size() * (self.symbols.len() as u64 + 1),
                link: 1,
                info: 0,
                entsize: self.sym_size(),
            },
            Shdr {
                name: shstrtab.add(".dynamic"),
                kind: elf::SHT_DYNAMIC,
                offset: DYNAMIC,
                size: dynamic_size,
                link: 1,
                info: 0,
                entsize: 2 * self.word(),
            },
        ];
        if self.hash {
            headers.push(Shdr {
                name: shstrtab.add(".hash"),
                kind: elf::SHT_HASH,
                offset: HASH,
                size: 4 * (2 + 1 + self.symbols.len() as u64 + 1),
                link: 2,
                info: 0,
                entsize: 4,
            });
        }
        if !self.plt.is_empty() {
            let (name, kind) = if self.elf32 {
                (".rel.plt", elf::SHT_REL)
            } else {
                (".rela.plt", elf::SHT_RELA)
            };
            headers.push(Shdr {
                name: shstrtab.add(name),
                kind,
                offset: RELA_PLT,
                size: self.plt_record_size() * self.plt.len() as u64,
                link: 2,
                info: 0,
                entsize: self.plt_record_size(),
            });
        }
        let shstrtab_name = shstrtab.add(".shstrtab");
        headers.push(Shdr {
            name: shstrtab_name,
            kind: elf::SHT_STRTAB,
            offset: SHSTRTAB,
            size: shstrtab.data.len() as u64,
            link: 0,
            info: 0,
            entsize: 0,
        });
        put(buf, SHSTRTAB, &shstrtab.data);

        for (i, h) in headers.iter().enumerate() {
            put(buf, SHDRS + self.shdr_size() * i as u64, &self.shdr_bytes(h));
        }
        headers.len() as u16
    }
}

/// Overwrites the value of the first `tag` entry in an ELF64 image's
/// dynamic table.
pub fn set_tag(bytes: &mut [u8], tag: u32, value: u64) {
    for entry in bytes[DYNAMIC as usize..].chunks_exact_mut(16) {
        let d_tag = u64::from_le_bytes(entry[..8].try_into().unwrap());
        if d_tag == u64::from(tag) {
            entry[8..].copy_from_slice(&value.to_le_bytes());
            return;
        }
        if d_tag == u64::from(elf::DT_NULL) {
            break;
        }
    }
    panic!("tag {:#x} not in the dynamic table", tag);
}

/// An indexed memory map line.
pub fn map_line(index: usize, start: u64, end: u64, perms: &str) -> String {
    format!("{} {:#x} {:#x} {}", index, start, end, perms)
}
