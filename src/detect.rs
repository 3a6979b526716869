//! PLT hook detection.
//!
//! For every dynamic segment of the image the detector collects the SONAME
//! and `DT_NEEDED` dependencies, binds the dynamic symbols, then reads the
//! current value of the GOT slot behind each PLT relocation. A slot that
//! points into a region mapped readable, writable and executable at once is
//! reported as a hook: legitimate code is never mapped that way.
//!
//! Missing pieces of a segment (no SONAME, no symbol table, no PLT, an
//! unmapped GOT slot) only reduce what that segment contributes. Container
//! and I/O errors abort the run.

use std::collections::BTreeMap;
use std::io::{self, Write};

use tracing::{debug, trace, warn};

use crate::dynamic::{Dynamic, ResolvedTag};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::maps::{self, MemoryRegion};
use crate::reloc::{RelocationEntry, RelocationTable};
use crate::symbol::SymbolTable;
use crate::tags::Tag;

/// Label used for a segment without `DT_SONAME`: the executable itself.
pub const MAIN_LABEL: &str = "main";

/// Label of an image with no dynamic segment at all.
pub const UNKNOWN_LABEL: &str = "?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    DependenciesCollected,
    SymbolsBound,
    RelocationsScanned,
    Done,
    Failed,
}

/// A PLT relocation whose GOT slot resolves into `rwx` memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCandidate {
    pub relocation: RelocationEntry,
    pub symbol_name: String,
    /// Runtime address of the GOT slot.
    pub got_address: u64,
    /// Value currently stored in the slot.
    pub observed_target: u64,
}

/// A defined dynamic symbol at its runtime address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol {
    pub name: String,
    pub address: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub label: String,
    pub dependencies: Vec<String>,
    pub exports: Vec<ExportedSymbol>,
    pub hooks: Vec<HookCandidate>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            dependencies: Vec::new(),
            exports: Vec::new(),
            hooks: Vec::new(),
        }
    }
}

impl Report {
    /// Hooks keyed by observed target. When several slots share a target the
    /// relocation scanned last names it.
    pub fn hooks_by_target(&self) -> BTreeMap<u64, &str> {
        self.hooks
            .iter()
            .map(|hook| (hook.observed_target, hook.symbol_name.as_str()))
            .collect()
    }

    /// Line-oriented output: `=label`, `<dependency`, optional `~address:name`
    /// exports, then `!target:symbol` hooks.
    pub fn write_to<W: Write>(&self, mut out: W, with_exports: bool) -> io::Result<()> {
        writeln!(out, "={}", self.label)?;
        for dep in &self.dependencies {
            writeln!(out, "<{}", dep)?;
        }
        if with_exports {
            for export in &self.exports {
                writeln!(out, "~{:016x}:{}", export.address, export.name)?;
            }
        }
        for (target, name) in self.hooks_by_target() {
            writeln!(out, "!{:016x}:{}", target, name)?;
        }
        Ok(())
    }
}

/// Log a per-segment failure, or hand it back if it is fatal.
fn downgrade(err: Error, what: &str) -> Result<()> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!("{}: {}", what, err);
    Ok(())
}

pub struct HookDetector<'a> {
    image: &'a Image<'a>,
    regions: &'a [MemoryRegion],
    stage: Stage,
}

impl<'a> HookDetector<'a> {
    pub fn new(image: &'a Image<'a>, regions: &'a [MemoryRegion]) -> Self {
        Self {
            image,
            regions,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        trace!("{:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    pub fn run(&mut self) -> Result<Report> {
        let mut report = Report::default();
        let image = self.image;
        for dynamic in image.dynamic_segments() {
            self.advance(Stage::Start);
            if let Err(err) = self.scan_segment(&dynamic, &mut report) {
                self.advance(Stage::Failed);
                return Err(err);
            }
        }
        self.advance(Stage::Done);
        Ok(report)
    }

    fn scan_segment(&mut self, dynamic: &Dynamic<'a>, report: &mut Report) -> Result<()> {
        debug!(
            "dynamic segment at {:#x} ({} bytes)",
            dynamic.origin().file_offset(),
            dynamic.origin().size()
        );

        report.label = match dynamic.soname() {
            Ok(name) => name,
            Err(Error::NotFound(_)) => MAIN_LABEL.to_string(),
            Err(err) => {
                downgrade(err, "DT_SONAME")?;
                MAIN_LABEL.to_string()
            }
        };
        debug!("soname {}", report.label);

        self.collect_dependencies(dynamic, report)?;
        self.advance(Stage::DependenciesCollected);

        let symtab = match dynamic.symbols() {
            Ok(symtab) => symtab,
            Err(err) => {
                downgrade(err, "no usable DT_SYMTAB, skipping symbols and PLT")?;
                return Ok(());
            }
        };
        self.bind_symbols(&symtab, report)?;
        self.advance(Stage::SymbolsBound);

        let plt = match dynamic.plt_relocations() {
            Ok(plt) => plt,
            Err(Error::NotFound(_)) => {
                debug!("no DT_JMPREL, nothing to scan");
                return Ok(());
            }
            Err(err) => {
                downgrade(err, "DT_JMPREL")?;
                return Ok(());
            }
        };
        self.scan_relocations(&plt, &symtab, report)?;
        self.advance(Stage::RelocationsScanned);
        Ok(())
    }

    fn collect_dependencies(&self, dynamic: &Dynamic<'a>, report: &mut Report) -> Result<()> {
        let table = dynamic.table();
        for entry in table.iter() {
            let entry = entry?;
            if entry.tag != Tag::Needed {
                continue;
            }
            match table.resolve(&entry) {
                Ok(ResolvedTag::String(name)) => {
                    debug!("needed {}", name);
                    report.dependencies.push(name);
                }
                Ok(_) => {}
                Err(err) => downgrade(err, "DT_NEEDED")?,
            }
        }
        Ok(())
    }

    fn bind_symbols(&self, symtab: &SymbolTable<'a>, report: &mut Report) -> Result<()> {
        let bias = self.image.context().bias();
        for symbol in symtab.iter() {
            let symbol = match symbol {
                Ok(symbol) => symbol,
                Err(err) => {
                    downgrade(err, "symbol table")?;
                    break;
                }
            };
            if symbol.value == 0 {
                continue;
            }
            let export = ExportedSymbol {
                name: symbol.display_name(),
                address: symbol.value.wrapping_add(bias),
            };
            debug!("~{:016x}:{}", export.address, export.name);
            report.exports.push(export);
        }
        Ok(())
    }

    fn scan_relocations(
        &self,
        plt: &RelocationTable<'a>,
        symtab: &SymbolTable<'a>,
        report: &mut Report,
    ) -> Result<()> {
        let relocations = match plt.iter() {
            Ok(iter) => iter,
            Err(err) => return downgrade(err, "PLT relocations"),
        };
        for reloc in relocations {
            match reloc {
                Ok(reloc) => self.check_relocation(&reloc, symtab, report)?,
                Err(err) => {
                    downgrade(err, "PLT relocations")?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn check_relocation(
        &self,
        reloc: &RelocationEntry,
        symtab: &SymbolTable<'a>,
        report: &mut Report,
    ) -> Result<()> {
        let context = self.image.context();
        // The GOT usually lives in a different segment than the dynamic
        // table, so the slot gets its own segment lookup.
        let got_address = reloc.offset.wrapping_add(context.bias());
        let slot = match context.runtime_to_file_offset(got_address) {
            Ok(slot) => slot,
            Err(err) => return downgrade(err, "GOT slot"),
        };
        let target = match self.image.read_word(slot) {
            Ok(target) => target,
            Err(err) => return downgrade(err, "GOT slot"),
        };

        let index = u64::from(reloc.symbol_index);
        let symbol_name = match symtab.get(index) {
            Ok(symbol) => symbol.display_name(),
            Err(err) => {
                downgrade(err, "PLT symbol")?;
                format!("#{}", index)
            }
        };
        trace!("{:>16}: {:#x}", symbol_name, target);

        let Some(region) = maps::region_for(self.regions, target) else {
            return Ok(());
        };
        if region.permissions.is_rwx() {
            warn!(
                "hook: slot {:#x} (file {:#x}) -> {:#x} [{} = {}] in {:#x}-{:#x}",
                got_address, slot, target, reloc.symbol_index, symbol_name, region.start, region.end
            );
            report.hooks.push(HookCandidate {
                relocation: *reloc,
                symbol_name,
                got_address,
                observed_target: target,
            });
        }
        Ok(())
    }
}

/// Run the detector over `image` against the process's memory map.
pub fn detect_hooks(image: &Image<'_>, regions: &[MemoryRegion]) -> Result<Report> {
    HookDetector::new(image, regions).run()
}
