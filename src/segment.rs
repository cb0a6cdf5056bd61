//! Segment loader.
//!
//! Collects the runtime-resident sections of a parsed object, allocates one
//! anonymous mapping covering their contiguous link-time span, and copies the
//! file bytes verbatim. The resulting `LoadedSegment` records the pair
//! (runtime base, link-time base) that all relocation arithmetic derives from.

use memmap2::{MmapMut, MmapOptions};
use object::elf;

use crate::image::ObjectImage;
use crate::parser::SectionDescriptor;
use crate::utils::align_up;
use crate::{LoadError, Result};

/// Access permissions a segment requires at runtime.
///
/// The mapping itself stays read/write for the plugin's lifetime; this value
/// is metadata for hosts that enforce protection themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadWrite,
    ReadExecute,
    ReadWriteExecute,
}

/// A contiguous block of plugin memory at a runtime-chosen base address.
pub struct LoadedSegment {
    map: MmapMut,
    len: usize,
    /// Link-time virtual address the block replaces.
    link_base: u32,
    protection: Protection,
}

impl LoadedSegment {
    /// Base address the segment actually landed at.
    pub fn runtime_base(&self) -> u64 {
        self.map.as_ptr() as u64
    }

    /// Link-time virtual address of the start of the segment.
    pub fn link_base(&self) -> u32 {
        self.link_base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// The uniform shift applied by absolute fixups, truncated to the 32-bit
    /// word size the patched code uses.
    pub fn delta(&self) -> u32 {
        (self.runtime_base() as u32).wrapping_sub(self.link_base)
    }

    /// Translates a link-time address into an in-segment byte offset.
    ///
    /// The address must fall strictly inside the segment; a violation is a
    /// format error in the object, never a permissible adjustment.
    pub fn translate(&self, vma: u32) -> Result<usize> {
        let offset = vma.wrapping_sub(self.link_base) as usize;
        if vma < self.link_base || offset >= self.len {
            return Err(LoadError::MalformedSectionTable(format!(
                "relocation target {vma:#x} outside segment {:#x}..{:#x}",
                self.link_base,
                self.link_base as usize + self.len
            )));
        }
        Ok(offset)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.map[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.map[..len]
    }
}

/// Allocates memory for the loadable sections of the object and copies their
/// bytes in. `SHT_NOBITS` ranges are left zeroed by the fresh mapping.
pub fn load(image: &ObjectImage, sections: &[SectionDescriptor]) -> Result<LoadedSegment> {
    let mut start: Option<u32> = None;
    let mut end: u32 = 0;
    let mut align: u32 = 1;
    let mut executable = false;
    let mut writable = false;

    for section in sections.iter().filter(|s| s.is_alloc()) {
        let section_end = section.addr.checked_add(section.size).ok_or_else(|| {
            LoadError::MalformedSectionTable(format!(
                "section `{}` wraps the address space",
                section.name
            ))
        })?;
        // sh_addralign must be 0, 1, or a power of two; anything else is a
        // format error, not a panic.
        if section.addralign > 1 && !section.addralign.is_power_of_two() {
            return Err(LoadError::MalformedSectionTable(format!(
                "section `{}` has non-power-of-two alignment {}",
                section.name, section.addralign
            )));
        }
        start = Some(start.map_or(section.addr, |s| s.min(section.addr)));
        end = end.max(section_end);
        align = align.max(section.addralign.max(1));
        executable |= section.flags & elf::SHF_EXECINSTR != 0;
        writable |= section.flags & elf::SHF_WRITE != 0;
    }

    let Some(link_base) = start else {
        return Err(LoadError::MalformedSectionTable(
            "object has no loadable sections".into(),
        ));
    };
    let len = align_up((end - link_base) as u64, align as u64) as usize;
    let protection = match (writable, executable) {
        (true, true) => Protection::ReadWriteExecute,
        (false, true) => Protection::ReadExecute,
        _ => Protection::ReadWrite,
    };

    // An anonymous mapping is page-aligned, which covers any sane section
    // alignment on the supported targets.
    let mut map = MmapOptions::new()
        .len(len.max(1))
        .map_anon()
        .map_err(|source| LoadError::AllocationFailure {
            what: "plugin segment",
            size: len,
            source,
        })?;

    for section in sections.iter().filter(|s| s.is_alloc()) {
        if section.sh_type == elf::SHT_NOBITS || section.size == 0 {
            continue;
        }
        let bytes = image.read_at(
            section.offset as u64,
            section.size as u64,
            "loadable section contents",
        )?;
        let dest = (section.addr - link_base) as usize;
        map[dest..dest + section.size as usize].copy_from_slice(bytes);
        tracing::trace!(
            "copied section {} (vma {:#x}, {} bytes) into segment",
            section.name,
            section.addr,
            section.size
        );
    }

    let segment = LoadedSegment {
        map,
        len,
        link_base,
        protection,
    };
    tracing::debug!(
        "segment loaded: base={:#x} vma={:#x} size={} protection={:?}",
        segment.runtime_base(),
        link_base,
        len,
        protection
    );
    Ok(segment)
}
