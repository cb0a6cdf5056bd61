//! Object parser.
//!
//! Validates the fixed ELF32 header of a plugin object and indexes its section
//! table into an ordered sequence of `SectionDescriptor`s. The parser is
//! architecture-agnostic: it only checks word size and endianness and hands
//! the machine identifier to `arch::for_machine` for strategy selection.

use object::elf;
use object::pod;
use object::{LittleEndian, U32};

use crate::image::ObjectImage;
use crate::{LoadError, Result};

type FileHeader = elf::FileHeader32<LittleEndian>;
type SectionHeader = elf::SectionHeader32<LittleEndian>;

/// The validated fields of the object's ELF header.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    /// Target machine identifier (`e_machine`), selects the relocation strategy.
    pub machine: u16,
    /// Object type (`e_type`); informational, plugins ship as ET_EXEC or ET_REL.
    pub kind: u16,
    pub shoff: u32,
    pub shnum: u16,
    pub shstrndx: u16,
}

/// One entry of the object's section table, with its name resolved.
#[derive(Debug, Clone)]
pub struct SectionDescriptor {
    pub name: String,
    pub sh_type: u32,
    pub flags: u32,
    /// Link-time virtual address of the section.
    pub addr: u32,
    pub offset: u32,
    pub size: u32,
    /// Related-section index; e.g. the string table of a symbol table, or the
    /// symbol table a relocation section draws from.
    pub link: u32,
    /// Auxiliary index; for relocation sections, the section being relocated.
    pub info: u32,
    pub addralign: u32,
    pub entsize: u32,
}

impl SectionDescriptor {
    /// Whether the section occupies runtime memory.
    pub fn is_alloc(&self) -> bool {
        self.flags & elf::SHF_ALLOC != 0
    }
}

/// Validates the object's magic, word size and endianness.
///
/// Mismatches are `UnsupportedObject`: the bytes may well be a valid object
/// for some other target, just not one this loader can run.
pub fn parse_header(image: &ObjectImage) -> Result<ObjectHeader> {
    let bytes = image.read_at(0, size_of::<FileHeader>() as u64, "ELF header")?;
    let (ehdr, _) = pod::from_bytes::<FileHeader>(bytes)
        .map_err(|()| LoadError::UnsupportedObject("unreadable ELF header".into()))?;

    let ident = &ehdr.e_ident;
    if ident.magic != elf::ELFMAG {
        return Err(LoadError::UnsupportedObject(format!(
            "bad magic {:02x?}",
            ident.magic
        )));
    }
    if ident.class != elf::ELFCLASS32 {
        return Err(LoadError::UnsupportedObject(format!(
            "wrong word size (class {})",
            ident.class
        )));
    }
    if ident.data != elf::ELFDATA2LSB {
        return Err(LoadError::UnsupportedObject(
            "endian-incompatible object".into(),
        ));
    }
    if ident.version != elf::EV_CURRENT {
        return Err(LoadError::UnsupportedObject(format!(
            "unknown ELF version {}",
            ident.version
        )));
    }

    let header = ObjectHeader {
        machine: ehdr.e_machine.get(LittleEndian),
        kind: ehdr.e_type.get(LittleEndian),
        shoff: ehdr.e_shoff.get(LittleEndian),
        shnum: ehdr.e_shnum.get(LittleEndian),
        shstrndx: ehdr.e_shstrndx.get(LittleEndian),
    };

    if header.shoff == 0 || header.shnum == 0 {
        return Err(LoadError::MalformedSectionTable(
            "object has no section table".into(),
        ));
    }
    let shentsize = ehdr.e_shentsize.get(LittleEndian) as usize;
    if shentsize != size_of::<SectionHeader>() {
        return Err(LoadError::MalformedSectionTable(format!(
            "section header entry size {} (expected {})",
            shentsize,
            size_of::<SectionHeader>()
        )));
    }

    tracing::debug!(
        "parsed object header: machine={} type={} sections={}",
        header.machine,
        header.kind,
        header.shnum
    );
    Ok(header)
}

/// Indexes the section table into descriptors with resolved names.
///
/// Fails with `MalformedSectionTable` when a section's `link` index, a
/// relocation section's `info` index, or the header's `shstrndx` references a
/// non-existent section, or when a name offset lies outside the string table.
pub fn parse_sections(
    image: &ObjectImage,
    header: &ObjectHeader,
) -> Result<Vec<SectionDescriptor>> {
    let count = header.shnum as usize;
    let table_len = (count * size_of::<SectionHeader>()) as u64;
    let bytes = image.read_at(header.shoff as u64, table_len, "section table")?;
    let (shdrs, _) = pod::slice_from_bytes::<SectionHeader>(bytes, count)
        .map_err(|()| LoadError::MalformedSectionTable("misaligned section table".into()))?;

    // Section-name string table, named by the header.
    if header.shstrndx as usize >= count {
        return Err(LoadError::MalformedSectionTable(format!(
            "shstrndx {} out of range ({} sections)",
            header.shstrndx, count
        )));
    }
    let strshdr = &shdrs[header.shstrndx as usize];
    let strtab = image.read_at(
        strshdr.sh_offset.get(LittleEndian) as u64,
        strshdr.sh_size.get(LittleEndian) as u64,
        "section name string table",
    )?;

    let get = |field: U32<LittleEndian>| field.get(LittleEndian);
    let mut sections = Vec::with_capacity(count);
    for (index, shdr) in shdrs.iter().enumerate() {
        let descriptor = SectionDescriptor {
            name: string_at(strtab, get(shdr.sh_name), index)?,
            sh_type: get(shdr.sh_type),
            flags: get(shdr.sh_flags),
            addr: get(shdr.sh_addr),
            offset: get(shdr.sh_offset),
            size: get(shdr.sh_size),
            link: get(shdr.sh_link),
            info: get(shdr.sh_info),
            addralign: get(shdr.sh_addralign),
            entsize: get(shdr.sh_entsize),
        };

        if descriptor.link as usize >= count {
            return Err(LoadError::MalformedSectionTable(format!(
                "section {index} links to non-existent section {}",
                descriptor.link
            )));
        }
        // `info` is a section index only for relocation sections; elsewhere it
        // carries unrelated data (e.g. the first global symbol index).
        if matches!(descriptor.sh_type, elf::SHT_REL | elf::SHT_RELA)
            && descriptor.info as usize >= count
        {
            return Err(LoadError::MalformedSectionTable(format!(
                "relocation section {index} targets non-existent section {}",
                descriptor.info
            )));
        }

        sections.push(descriptor);
    }

    Ok(sections)
}

fn string_at(strtab: &[u8], offset: u32, section: usize) -> Result<String> {
    let tail = strtab.get(offset as usize..).ok_or_else(|| {
        LoadError::MalformedSectionTable(format!(
            "name offset {offset:#x} of section {section} outside string table"
        ))
    })?;
    let end = tail.iter().position(|&b| b == 0).ok_or_else(|| {
        LoadError::MalformedSectionTable(format!(
            "unterminated name for section {section}"
        ))
    })?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}
