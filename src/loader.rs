//! Load orchestration.
//!
//! The `Loader` runs the load stages strictly in order: parse the header,
//! select the relocation strategy, index the section table, load the segment,
//! parse and eagerly resolve symbols, apply every qualifying relocation
//! section, and finally locate the plugin's registration symbol. A failure at
//! any stage propagates out and drops everything allocated so far; no
//! half-built `Plugin` ever escapes.

use object::elf;
use object::pod;
use object::LittleEndian;

use crate::arch::{self, Architecture};
use crate::image::ObjectImage;
use crate::parser::{self, SectionDescriptor};
use crate::segment::{self, LoadedSegment};
use crate::symbol::{ExportTable, SymbolTable};
use crate::{LoadError, Result};

type Rel = elf::Rel32<LittleEndian>;

/// Name of the registration symbol looked up when none is configured.
pub const DEFAULT_ENTRY_SYMBOL: &str = "plugin_register";

/// Loads relocatable plugin objects.
pub struct Loader {
    entry_symbol: String,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self {
            entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
        }
    }

    /// Overrides the name of the registration symbol the plugin exports.
    pub fn with_entry_symbol(mut self, name: impl Into<String>) -> Self {
        self.entry_symbol = name.into();
        self
    }

    /// Performs a single, synchronous, all-or-nothing load.
    ///
    /// The image is consumed and released when the load returns; the returned
    /// `Plugin` owns only its segment and resolved symbol table.
    pub fn load(&self, image: ObjectImage, exports: &ExportTable) -> Result<Plugin> {
        let header = parser::parse_header(&image)?;
        let arch = arch::for_machine(header.machine)?;
        let sections = parser::parse_sections(&image, &header)?;
        let mut segment = segment::load(&image, &sections)?;

        let mut symbols = SymbolTable::parse(&image, &sections)?;
        symbols.resolve(exports)?;

        apply_relocations(&image, &sections, &symbols, &mut segment, arch.as_ref())?;

        let entry = symbols
            .lookup(&self.entry_symbol)
            .and_then(|sym| sym.runtime_address(&segment));
        match entry {
            Some(address) => {
                tracing::debug!("entry symbol {} resolved to {address:#x}", self.entry_symbol)
            }
            None => tracing::warn!(
                "plugin has no entry symbol {}; load kept, entry unavailable",
                self.entry_symbol
            ),
        }

        Ok(Plugin {
            segment,
            symbols,
            entry,
            entry_symbol: self.entry_symbol.clone(),
        })
    }
}

/// Walks every qualifying relocation section and patches the segment in place.
///
/// A section qualifies when it links to the chosen symbol table and relocates
/// an existing, runtime-resident section. A qualifying section in the
/// addend-carrying encoding is rejected outright; one with an unexpected entry
/// size is skipped. One relocation table is in flight at a time and is
/// released before the next section is processed.
fn apply_relocations(
    image: &ObjectImage,
    sections: &[SectionDescriptor],
    symbols: &SymbolTable,
    segment: &mut LoadedSegment,
    arch: &dyn Architecture,
) -> Result<()> {
    let delta = segment.delta();

    for (index, section) in sections.iter().enumerate() {
        if section.sh_type != elf::SHT_REL && section.sh_type != elf::SHT_RELA {
            continue;
        }
        if section.link as usize != symbols.section_index() {
            tracing::trace!("relocation section {index} links elsewhere, skipping");
            continue;
        }
        // Parser guarantees `info` names an existing section.
        if !sections[section.info as usize].is_alloc() {
            tracing::trace!("relocation section {index} targets a non-resident section, skipping");
            continue;
        }
        if section.sh_type == elf::SHT_RELA {
            return Err(LoadError::UnsupportedRelocationSectionFormat { section: index });
        }
        if section.entsize as usize != size_of::<Rel>() {
            tracing::debug!(
                "relocation section {index} has entry size {}, skipping",
                section.entsize
            );
            continue;
        }

        let bytes = image.read_at(section.offset as u64, section.size as u64, "relocation table")?;
        let count = bytes.len() / size_of::<Rel>();
        let (entries, _) = pod::slice_from_bytes::<Rel>(bytes, count).map_err(|()| {
            LoadError::MalformedSectionTable(format!("misaligned relocation section {index}"))
        })?;

        tracing::debug!(
            "applying relocation table {}: {count} entries, base {:#x}",
            section.name,
            segment.runtime_base()
        );

        for rel in entries {
            let sym_index = rel.r_sym(LittleEndian) as usize;
            let rel_type = rel.r_type(LittleEndian);
            let symbol = symbols.get(sym_index).ok_or_else(|| {
                LoadError::MalformedSectionTable(format!(
                    "relocation references symbol {sym_index}, table has {}",
                    symbols.len()
                ))
            })?;
            let offset = segment.translate(rel.r_offset.get(LittleEndian))?;
            arch.apply_relocation(offset, rel_type, symbol, delta, segment.as_bytes_mut())?;
        }
    }

    Ok(())
}

/// A successfully loaded, relocated plugin.
///
/// Dropping (or explicitly unloading) the plugin releases its segment and
/// invalidates every address previously derived from it; the host must ensure
/// no calls into the plugin are in flight at that point.
pub struct Plugin {
    segment: LoadedSegment,
    symbols: SymbolTable,
    entry: Option<u64>,
    entry_symbol: String,
}

impl core::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Plugin")
            .field("base", &format_args!("{:#x}", self.segment.runtime_base()))
            .field("size", &self.segment.len())
            .field("entry", &self.entry.map(|a| format!("{a:#x}")))
            .field("entry_symbol", &self.entry_symbol)
            .finish_non_exhaustive()
    }
}

impl Plugin {
    /// Runtime address of the plugin's registration symbol.
    ///
    /// Absence is a warning-severity condition: the plugin stays loaded and
    /// relocated, but the host cannot hand control to it.
    pub fn entry(&self) -> Result<u64> {
        self.entry
            .ok_or_else(|| LoadError::EntrySymbolMissing(self.entry_symbol.clone()))
    }

    /// Looks up any symbol of the plugin by name, post-relocation.
    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols
            .lookup(name)
            .and_then(|sym| sym.runtime_address(&self.segment))
    }

    /// The plugin's loaded memory, for hosts that inspect or protect it.
    pub fn segment(&self) -> &LoadedSegment {
        &self.segment
    }

    /// Releases the plugin's memory. Equivalent to dropping it; provided so
    /// unload reads as an operation at call sites.
    pub fn unload(self) {}
}
