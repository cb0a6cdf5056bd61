//! ARM architecture backend.
//!
//! Implements the `Architecture` trait for 32-bit little-endian ARM plugins.

use object::elf;
use object::Endianness;

use super::{read_word, write_word, Architecture};
use crate::symbol::Symbol;
use crate::{LoadError, Result};

/// The ARM relocation strategy.
pub struct Arm;

impl Architecture for Arm {
    fn machine(&self) -> u16 {
        elf::EM_ARM
    }

    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn apply_relocation(
        &self,
        offset: usize,
        rel_type: u32,
        symbol: &Symbol,
        delta: u32,
        data: &mut [u8],
    ) -> Result<()> {
        match rel_type {
            // Absolute 32-bit address (TARGET1 is its platform alias). The word
            // at the patch site holds the link-time address and doubles as the
            // addend; shift it only for symbols defined in a loaded section.
            elf::R_ARM_ABS32 | elf::R_ARM_TARGET1 => {
                if symbol.shndx < elf::SHN_LORESERVE {
                    let addend = read_word(data, offset)?;
                    let patched = addend.wrapping_add(delta);
                    write_word(data, offset, patched)?;
                    tracing::trace!(
                        "absolute fixup at {offset:#x}: {addend:#x} -> {patched:#x}"
                    );
                }
                Ok(())
            }

            // PC-relative branches and calls encode a displacement between two
            // instructions that move by the same uniform shift; the encoded
            // value stays valid unmodified. THM_PC22 is the Thumb call
            // relocation (the ABI's R_ARM_THM_CALL).
            elf::R_ARM_PC24 | elf::R_ARM_THM_PC22 | elf::R_ARM_CALL | elf::R_ARM_JUMP24 => {
                Ok(())
            }

            // Interworking marker, carries no address.
            elf::R_ARM_V4BX => Ok(()),

            other => Err(LoadError::UnsupportedRelocationType {
                rel_type: other,
                machine: elf::EM_ARM,
            }),
        }
    }
}
