//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates all
//! architecture-specific relocation logic. The parser, segment loader and
//! symbol resolver stay architecture-agnostic; the strategy is selected at
//! load time from the header's machine field, so new architectures are one
//! new implementation away.

use object::elf;
use object::Endianness;

use crate::symbol::Symbol;
use crate::{LoadError, Result};

pub mod arm;

/// A trait representing a target architecture's relocation semantics.
pub trait Architecture {
    /// ELF machine identifier this strategy handles (`e_machine`).
    fn machine(&self) -> u16;

    /// Byte order of the target's code and data words.
    fn endianness(&self) -> Endianness;

    /// Applies a single relocation entry to the loaded segment, in place.
    ///
    /// # Arguments
    /// * `offset` - Byte offset of the patch site within `data`.
    /// * `rel_type` - Architecture relocation type code from the entry.
    /// * `symbol` - The symbol the entry refers to.
    /// * `delta` - Runtime base minus link-time base, truncated to the word size.
    /// * `data` - The mutable contents of the segment being patched.
    fn apply_relocation(
        &self,
        offset: usize,
        rel_type: u32,
        symbol: &Symbol,
        delta: u32,
        data: &mut [u8],
    ) -> Result<()>;
}

/// Selects the relocation strategy for an object's machine identifier.
pub fn for_machine(machine: u16) -> Result<Box<dyn Architecture>> {
    match machine {
        elf::EM_ARM => Ok(Box::new(arm::Arm)),
        other => Err(LoadError::UnsupportedObject(format!(
            "no relocation strategy for machine {other:#x}"
        ))),
    }
}

/// Reads the 32-bit little-endian word at `offset`, validating the full word
/// lies inside the segment.
pub(crate) fn read_word(data: &[u8], offset: usize) -> Result<u32> {
    let end = word_end(data, offset)?;
    Ok(u32::from_le_bytes(data[offset..end].try_into().unwrap()))
}

/// Writes a 32-bit little-endian word at `offset` with the same validation.
pub(crate) fn write_word(data: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let end = word_end(data, offset)?;
    data[offset..end].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn word_end(data: &[u8], offset: usize) -> Result<usize> {
    match offset.checked_add(4) {
        Some(end) if end <= data.len() => Ok(end),
        _ => Err(LoadError::MalformedSectionTable(format!(
            "patch site at offset {offset:#x} extends past segment end"
        ))),
    }
}
