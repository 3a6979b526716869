//! Configuration module.
//!
//! This module defines the command-line interface (CLI) using `clap`.

use clap::Parser;
use std::path::PathBuf;

/// Detect PLT/GOT hooks in an ELF image loaded into a running process.
///
/// The memory map of the process is read from standard input (or `--maps`),
/// one region per line: `<index> <start> <end> <rwx>` or `/proc/<pid>/maps`
/// format.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// ELF file backing the analyzed image
    pub elf: PathBuf,

    /// Load bias of the image in the process, in hex
    #[arg(value_parser = parse_hex)]
    pub load_base: u64,

    /// Read the memory map from this file instead of standard input
    #[arg(long)]
    pub maps: Option<PathBuf>,

    /// Also print every defined dynamic symbol as `~address:name`
    #[arg(long)]
    pub exports: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", help = "Set the logging level")]
    pub log_level: String,
}

/// Parse a hex number with or without a `0x` prefix.
pub fn parse_hex(text: &str) -> Result<u64, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex number {text:?}: {e}"))
}
