//! Memory map input.
//!
//! The region list of the analyzed process arrives as text, one region per
//! line. Two shapes are accepted:
//!
//! ```text
//! 3 0x7f2a1c000000 0x7f2a1c021000 rwx ...
//! 7f2a1c000000-7f2a1c021000 rwxp 00000000 00:00 0
//! ```
//!
//! The first is an indexed listing, the second the `/proc/<pid>/maps` format.
//! Trailing text is ignored and lines of any other shape are skipped.

use std::fmt;
use std::io::BufRead;

use bitflags::bitflags;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_INDEXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+\s+(?:0x)?([0-9a-fA-F]+)\s+(?:0x)?([0-9a-fA-F]+)\s+([r-][w-][x-])([ps])?")
        .expect("valid indexed map regex")
});

static RE_PROC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([0-9a-fA-F]+)-([0-9a-fA-F]+)\s+([r-][w-][x-])([ps])?")
        .expect("valid proc map regex")
});

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const PRIVATE = 1 << 3;
        const SHARED = 1 << 4;
    }
}

impl Permissions {
    pub const RWX: Permissions = Permissions::READ
        .union(Permissions::WRITE)
        .union(Permissions::EXECUTE);

    /// Parse `rwx`-style flags with an optional `p`/`s` suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() < 3 {
            return None;
        }
        let mut perms = Permissions::empty();
        for (byte, set, flag) in [
            (bytes[0], b'r', Permissions::READ),
            (bytes[1], b'w', Permissions::WRITE),
            (bytes[2], b'x', Permissions::EXECUTE),
        ] {
            match byte {
                b'-' => {}
                b if b == set => perms |= flag,
                _ => return None,
            }
        }
        match bytes.get(3) {
            Some(b'p') => perms |= Permissions::PRIVATE,
            Some(b's') => perms |= Permissions::SHARED,
            _ => {}
        }
        Some(perms)
    }

    /// Readable, writable and executable at once.
    pub fn is_rwx(self) -> bool {
        self.contains(Self::RWX)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |p: Permissions, c: char| if self.contains(p) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(Permissions::READ, 'r'),
            flag(Permissions::WRITE, 'w'),
            flag(Permissions::EXECUTE, 'x')
        )
    }
}

/// One mapped region of the runtime address space, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,
    pub permissions: Permissions,
}

impl MemoryRegion {
    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end
    }

    /// Parse one line; `None` if it has neither accepted shape.
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = RE_INDEXED
            .captures(line)
            .or_else(|| RE_PROC.captures(line))?;
        let start = u64::from_str_radix(&caps[1], 16).ok()?;
        let end = u64::from_str_radix(&caps[2], 16).ok()?;
        let mut flags = caps[3].to_string();
        if let Some(suffix) = caps.get(4) {
            flags.push_str(suffix.as_str());
        }
        Some(Self {
            start,
            end,
            permissions: Permissions::parse(&flags)?,
        })
    }
}

/// Parse a whole memory map, skipping lines that do not describe a region.
pub fn parse_maps<R: BufRead>(reader: R) -> std::io::Result<Vec<MemoryRegion>> {
    let mut regions = Vec::new();
    for line in reader.lines() {
        let line = line?;
        match MemoryRegion::parse_line(&line) {
            Some(region) => regions.push(region),
            None if line.trim().is_empty() => {}
            None => tracing::debug!("skipping memory map line: {:?}", line),
        }
    }
    Ok(regions)
}

/// The region containing `address`, if any.
pub fn region_for(regions: &[MemoryRegion], address: u64) -> Option<&MemoryRegion> {
    regions.iter().find(|r| r.contains(address))
}
