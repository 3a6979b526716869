//! Image layout and address translation.
//!
//! This module defines the loadable segments of an ELF image and the
//! `LoadContext` that maps link-time virtual addresses back to file offsets.
//! Addresses seen in a running process are shifted by the load bias; they must
//! be brought back to link-time before they can be looked up here.

use crate::error::{Error, Result};

/// A loadable (`PT_LOAD`) segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Link-time virtual address where the segment starts.
    pub virtual_address: u64,
    /// File offset of the first byte of the segment.
    pub file_offset: u64,
    /// Number of bytes backed by the file.
    pub file_size: u64,
    /// Number of bytes occupied in memory (may exceed `file_size`).
    pub memory_size: u64,
    /// `PF_*` flags.
    pub flags: u32,
}

impl Segment {
    /// Whether `vaddr` falls in the file-backed part of this segment.
    pub fn contains(&self, vaddr: u64) -> bool {
        vaddr >= self.virtual_address && vaddr - self.virtual_address < self.file_size
    }
}

/// A section header, reduced to what the analysis needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub kind: u32,
    pub address: u64,
    pub file_offset: u64,
    pub size: u64,
    pub entry_size: u64,
    pub link: u32,
    pub info: u32,
}

/// Where an address came from.
///
/// Values of mangled dynamic tags in a live image are runtime addresses;
/// everything read from section or program headers is link-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    LinkTime(u64),
    Runtime(u64),
}

/// Everything needed to turn a virtual address into a file offset.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Runtime base minus link-time base; `None` for static on-disk analysis.
    pub load_bias: Option<u64>,
    /// Loadable segments in program header order.
    pub segments: Vec<Segment>,
}

impl LoadContext {
    pub fn new(load_bias: Option<u64>, segments: Vec<Segment>) -> Self {
        Self {
            load_bias,
            segments,
        }
    }

    pub fn bias(&self) -> u64 {
        self.load_bias.unwrap_or(0)
    }

    pub fn is_live(&self) -> bool {
        self.load_bias.is_some()
    }

    /// The segment whose file-backed range contains the link-time `vaddr`.
    pub fn segment_for(&self, vaddr: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(vaddr))
    }

    /// Convert a link-time virtual address to a file offset.
    pub fn to_file_offset(&self, vaddr: u64) -> Result<u64> {
        self.segment_for(vaddr)
            .and_then(|s| s.file_offset.checked_add(vaddr - s.virtual_address))
            .ok_or(Error::UnmappedAddress(vaddr))
    }

    /// Remove the load bias from a runtime address.
    pub fn to_link_time(&self, address: Address) -> u64 {
        match address {
            Address::LinkTime(vaddr) => vaddr,
            Address::Runtime(vaddr) => vaddr.wrapping_sub(self.bias()),
        }
    }

    pub fn runtime_to_file_offset(&self, runtime: u64) -> Result<u64> {
        self.to_file_offset(self.to_link_time(Address::Runtime(runtime)))
    }

    /// Bytes of the segment containing file offset `offset` left after it.
    pub fn remaining_from_offset(&self, offset: u64) -> Option<u64> {
        self.segments
            .iter()
            .find(|s| offset >= s.file_offset && offset - s.file_offset < s.file_size)
            .map(|s| s.file_size - (offset - s.file_offset))
    }
}
