//! Symbol table management.
//!
//! Parses the object's symbol table into position-indexed `Symbol` entries and
//! resolves undefined references against the host-supplied export table.
//! Resolution is eager: it happens once, before any relocation is applied, so
//! relocation patching never blocks on a lookup.

use std::collections::HashMap;

use object::elf;
use object::pod;
use object::LittleEndian;

use crate::image::ObjectImage;
use crate::parser::SectionDescriptor;
use crate::segment::LoadedSegment;
use crate::{LoadError, Result};

type Sym = elf::Sym32<LittleEndian>;

/// Host-supplied table of exported names and their runtime addresses.
///
/// The host fills this with the services a plugin may call back into; any
/// undefined plugin symbol is resolved against it by name.
#[derive(Debug, Default)]
pub struct ExportTable {
    exports: HashMap<String, u64>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: u64) {
        self.exports.insert(name.into(), address);
    }

    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.exports.get(name).copied()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for ExportTable {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            exports: iter.into_iter().map(|(n, a)| (n.into(), a)).collect(),
        }
    }
}

/// One entry of the object's symbol table.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Link-time value; an address for defined symbols.
    pub value: u32,
    /// Defining-section index. Indices below `SHN_LORESERVE` name real loaded
    /// sections; the reserved range marks absolute and external symbols.
    pub shndx: u16,
    /// Binding class (`STB_LOCAL`, `STB_GLOBAL`, `STB_WEAK`).
    pub binding: u8,
    /// Runtime address filled in by export resolution for undefined symbols.
    pub resolved: Option<u64>,
}

impl Symbol {
    pub fn is_undefined(&self) -> bool {
        self.shndx == elf::SHN_UNDEF
    }

    /// The symbol's address in the running process, if it has one.
    ///
    /// Internal symbols are translated with the same VMA-shift rule as
    /// absolute relocations; external ones report their resolved export.
    pub fn runtime_address(&self, segment: &LoadedSegment) -> Option<u64> {
        match self.shndx {
            elf::SHN_UNDEF => self.resolved,
            elf::SHN_ABS => Some(self.value as u64),
            n if n < elf::SHN_LORESERVE => Some(
                segment
                    .runtime_base()
                    .wrapping_add(self.value.wrapping_sub(segment.link_base()) as u64),
            ),
            _ => None,
        }
    }
}

/// The object's symbol table, indexed by position. Index 0 is reserved.
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
    /// Index of the `SHT_SYMTAB` section these entries came from; relocation
    /// sections must link to it to qualify.
    section_index: usize,
}

impl SymbolTable {
    /// Parses the first `SHT_SYMTAB` section and its associated string table.
    pub fn parse(image: &ObjectImage, sections: &[SectionDescriptor]) -> Result<Self> {
        let (section_index, symtab) = sections
            .iter()
            .enumerate()
            .find(|(_, s)| s.sh_type == elf::SHT_SYMTAB)
            .ok_or_else(|| {
                LoadError::MalformedSectionTable("object has no symbol table".into())
            })?;

        if symtab.entsize as usize != size_of::<Sym>() {
            return Err(LoadError::MalformedSectionTable(format!(
                "symbol entry size {} (expected {})",
                symtab.entsize,
                size_of::<Sym>()
            )));
        }
        // Parser guarantees the link index exists.
        let strsec = &sections[symtab.link as usize];
        if strsec.sh_type != elf::SHT_STRTAB {
            return Err(LoadError::MalformedSectionTable(format!(
                "symbol table links to section {} which is not a string table",
                symtab.link
            )));
        }
        let strtab = image.read_at(
            strsec.offset as u64,
            strsec.size as u64,
            "symbol string table",
        )?;
        let bytes = image.read_at(symtab.offset as u64, symtab.size as u64, "symbol table")?;
        let count = bytes.len() / size_of::<Sym>();
        let (entries, _) = pod::slice_from_bytes::<Sym>(bytes, count)
            .map_err(|()| LoadError::MalformedSectionTable("misaligned symbol table".into()))?;

        let mut symbols = Vec::with_capacity(count);
        let mut by_name = HashMap::new();
        for (index, sym) in entries.iter().enumerate() {
            let symbol = Symbol {
                name: symbol_name(strtab, sym.st_name.get(LittleEndian), index)?,
                value: sym.st_value.get(LittleEndian),
                shndx: sym.st_shndx.get(LittleEndian),
                binding: sym.st_bind(),
                resolved: None,
            };
            if index > 0 && !symbol.name.is_empty() {
                by_name.entry(symbol.name.clone()).or_insert(index);
            }
            symbols.push(symbol);
        }

        tracing::debug!("parsed symbol table: {} entries", symbols.len());
        Ok(Self {
            symbols,
            by_name,
            section_index,
        })
    }

    /// Resolves every undefined symbol against the host export table.
    ///
    /// Weak undefined symbols resolve to address 0; a missing strong symbol
    /// aborts the load with `UnresolvedSymbol`.
    pub fn resolve(&mut self, exports: &ExportTable) -> Result<()> {
        for symbol in self.symbols.iter_mut().skip(1) {
            if !symbol.is_undefined() || symbol.name.is_empty() {
                continue;
            }
            match exports.lookup(&symbol.name) {
                Some(address) => {
                    tracing::trace!("resolved export {} to {address:#x}", symbol.name);
                    symbol.resolved = Some(address);
                }
                None if symbol.binding == elf::STB_WEAK => {
                    tracing::debug!("weak undefined symbol {} resolves to 0", symbol.name);
                    symbol.resolved = Some(0);
                }
                None => return Err(LoadError::UnresolvedSymbol(symbol.name.clone())),
            }
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&i| &self.symbols[i])
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Section index of the symbol table within the object.
    pub fn section_index(&self) -> usize {
        self.section_index
    }
}

fn symbol_name(strtab: &[u8], offset: u32, index: usize) -> Result<String> {
    let tail = strtab.get(offset as usize..).ok_or_else(|| {
        LoadError::MalformedSectionTable(format!(
            "name offset {offset:#x} of symbol {index} outside string table"
        ))
    })?;
    let end = tail.iter().position(|&b| b == 0).ok_or_else(|| {
        LoadError::MalformedSectionTable(format!("unterminated name for symbol {index}"))
    })?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}
