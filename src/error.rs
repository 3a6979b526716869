//! Error types.
//!
//! Failures fall into two groups. Container-level problems (the file is not a
//! usable ELF image, I/O failed, a table index is inconsistent) abort the whole
//! analysis. Everything else describes a missing or unreachable piece of
//! dynamic-linking metadata and only degrades the feature that needed it.

use thiserror::Error;

use crate::tags::Tag;

#[derive(Debug, Error)]
pub enum Error {
    /// The dynamic table (or the ELF container around it) cannot be parsed.
    #[error("malformed ELF container: {0}")]
    MalformedContainer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tag does not appear before `DT_NULL`.
    #[error("{0} not present in dynamic table")]
    NotFound(Tag),

    /// A string-valued tag was resolved in a table without `DT_STRTAB`.
    #[error("cannot resolve {0}: no DT_STRTAB in the same table")]
    MissingStringTable(Tag),

    #[error("cannot resolve {tag}: size tag {size_tag} is missing")]
    MissingSizeTag { tag: Tag, size_tag: Tag },

    /// `DT_STRTAB` points outside every loadable segment.
    #[error("string table at {address:#x} is not covered by any segment (wrong load base?)")]
    MissingSegment { address: u64 },

    #[error("address {0:#x} is not covered by any loadable segment")]
    UnmappedAddress(u64),

    #[error("index {index} out of range (count {count})")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("table at offset {offset:#x}: size {size} is not a multiple of record size {record_size}")]
    MalformedTable {
        offset: u64,
        size: u64,
        record_size: u64,
    },

    #[error("read of {len} bytes at offset {offset:#x} runs past the end of the image")]
    Truncated { offset: u64, len: u64 },
}

impl Error {
    /// Whether this error makes the whole image unanalyzable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedContainer(_) | Error::Io(_) | Error::IndexOutOfRange { .. }
        )
    }
}

impl From<object::read::Error> for Error {
    fn from(err: object::read::Error) -> Self {
        Error::MalformedContainer(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
