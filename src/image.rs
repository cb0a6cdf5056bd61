//! Object image ownership.
//!
//! An `ObjectImage` owns the raw bytes of a plugin file for the duration of a
//! load. Every file-range access in the crate goes through `read_at`, so a
//! declared offset/size that runs past the end of the stream surfaces as
//! `TruncatedRead` before any derived work happens.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;

use crate::{LoadError, Result};

#[derive(Debug)]
enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

/// The raw byte content of a plugin object file.
#[derive(Debug)]
pub struct ObjectImage {
    data: Backing,
}

impl ObjectImage {
    /// Wraps an in-memory object.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            data: Backing::Owned(bytes),
        }
    }

    /// Maps an object file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            data: Backing::Mapped(mmap),
        })
    }

    /// Reads an object to the end of a byte stream.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(bytes))
    }

    pub fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            Backing::Owned(v) => v,
            Backing::Mapped(m) => m,
        }
    }

    /// Returns the `len` bytes starting at `offset`, or `TruncatedRead` if the
    /// range is not fully contained in the stream.
    pub fn read_at(&self, offset: u64, len: u64, what: &'static str) -> Result<&[u8]> {
        let have = self.len();
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= have => {
                Ok(&self.as_bytes()[offset as usize..end as usize])
            }
            _ => Err(LoadError::TruncatedRead {
                what,
                offset,
                need: len,
                have: have.saturating_sub(offset.min(have)),
            }),
        }
    }
}
