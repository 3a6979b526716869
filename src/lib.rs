//! PLT hook detection for ELF images.
//!
//! This library inspects the dynamic-linking metadata of an ELF file, as it
//! sits on disk or as mapped into a running process, and reports PLT
//! relocations whose GOT slot resolves into writable+executable memory.
//! It is organized into several modules:
//! - `image`: ELF container view and positional reads.
//! - `layout`: Loadable segments and address translation.
//! - `tags`: Dynamic tag kinds.
//! - `dynamic`: Dynamic tables (tag store) and resolved tag views.
//! - `resolve`: Resolution of tags into strings, relocations and symbols.
//! - `reloc`: Relocation tables.
//! - `symbol`: Dynamic symbol tables.
//! - `maps`: Memory map parsing.
//! - `detect`: The hook detector.
//! - `config`: CLI configuration.

pub mod config;
pub mod detect;
pub mod dynamic;
pub mod error;
pub mod image;
pub mod layout;
pub mod maps;
pub mod reloc;
pub mod resolve;
pub mod symbol;
pub mod tags;

pub use error::{Error, Result};
