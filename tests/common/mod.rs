//! Shared fixture builder: assembles synthetic ELF32 plugin objects byte by
//! byte, using the raw `object::elf` structures.

#![allow(dead_code)]

use object::elf;
use object::endian::{U16, U32};
use object::pod::bytes_of;
use object::LittleEndian;

pub const LE: LittleEndian = LittleEndian;

fn u16v(v: u16) -> U16<LittleEndian> {
    U16::new(LE, v)
}
fn u32v(v: u32) -> U32<LittleEndian> {
    U32::new(LE, v)
}

const EHDR_SIZE: usize = size_of::<elf::FileHeader32<LittleEndian>>();
const SHDR_SIZE: usize = size_of::<elf::SectionHeader32<LittleEndian>>();

/// One section of a fixture object. Indices are final section-table indices
/// (the null section is index 0, the first spec'd section index 1).
pub struct SectionSpec {
    pub name: &'static str,
    pub sh_type: u32,
    pub flags: u32,
    pub addr: u32,
    pub data: Vec<u8>,
    pub link: u32,
    pub info: u32,
    pub entsize: u32,
    pub addralign: u32,
    /// Declared size override, for truncation fixtures. Defaults to `data.len()`.
    pub size: Option<u32>,
}

impl SectionSpec {
    pub fn new(name: &'static str, sh_type: u32) -> Self {
        Self {
            name,
            sh_type,
            flags: 0,
            addr: 0,
            data: Vec::new(),
            link: 0,
            info: 0,
            entsize: 0,
            addralign: 4,
            size: None,
        }
    }

    /// A loadable code section at the given link-time address.
    pub fn text(addr: u32, data: Vec<u8>) -> Self {
        Self {
            flags: elf::SHF_ALLOC | elf::SHF_EXECINSTR,
            addr,
            data,
            ..Self::new(".text", elf::SHT_PROGBITS)
        }
    }

    /// A symbol table linking to the string table at `strtab_index`.
    pub fn symtab(strtab_index: u32, data: Vec<u8>) -> Self {
        Self {
            link: strtab_index,
            info: 1,
            entsize: size_of::<elf::Sym32<LittleEndian>>() as u32,
            data,
            ..Self::new(".symtab", elf::SHT_SYMTAB)
        }
    }

    pub fn strtab(data: Vec<u8>) -> Self {
        Self {
            addralign: 1,
            data,
            ..Self::new(".strtab", elf::SHT_STRTAB)
        }
    }

    /// A simple-encoding relocation section for section `target_index`,
    /// drawing symbols from `symtab_index`.
    pub fn rel(symtab_index: u32, target_index: u32, entries: &[(u32, u32, u32)]) -> Self {
        let mut data = Vec::new();
        for &(offset, sym, rel_type) in entries {
            let entry = elf::Rel32::<LittleEndian> {
                r_offset: u32v(offset),
                r_info: u32v(sym << 8 | (rel_type & 0xff)),
            };
            data.extend_from_slice(bytes_of(&entry));
        }
        Self {
            link: symtab_index,
            info: target_index,
            entsize: size_of::<elf::Rel32<LittleEndian>>() as u32,
            data,
            ..Self::new(".rel.text", elf::SHT_REL)
        }
    }

    /// Like `rel`, but in the addend-carrying encoding.
    pub fn rela(symtab_index: u32, target_index: u32, entries: &[(u32, u32, u32, i32)]) -> Self {
        let mut data = Vec::new();
        for &(offset, sym, rel_type, addend) in entries {
            let entry = elf::Rela32::<LittleEndian> {
                r_offset: u32v(offset),
                r_info: u32v(sym << 8 | (rel_type & 0xff)),
                r_addend: object::endian::I32::new(LE, addend),
            };
            data.extend_from_slice(bytes_of(&entry));
        }
        Self {
            link: symtab_index,
            info: target_index,
            entsize: size_of::<elf::Rela32<LittleEndian>>() as u32,
            data,
            ..Self::new(".rela.text", elf::SHT_RELA)
        }
    }
}

/// A symbol-table entry spec; `build_symtab` packs these plus a string table.
pub struct SymSpec {
    pub name: &'static str,
    pub value: u32,
    pub shndx: u16,
    pub bind: u8,
}

impl SymSpec {
    pub fn defined(name: &'static str, value: u32, shndx: u16) -> Self {
        Self {
            name,
            value,
            shndx,
            bind: elf::STB_GLOBAL,
        }
    }

    pub fn undefined(name: &'static str) -> Self {
        Self {
            name,
            value: 0,
            shndx: elf::SHN_UNDEF,
            bind: elf::STB_GLOBAL,
        }
    }

    pub fn weak_undefined(name: &'static str) -> Self {
        Self {
            bind: elf::STB_WEAK,
            ..Self::undefined(name)
        }
    }
}

/// Builds symbol-table and string-table section contents. Entry 0 is the
/// reserved null symbol; spec'd symbols get indices starting at 1.
pub fn build_symtab(syms: &[SymSpec]) -> (Vec<u8>, Vec<u8>) {
    let mut strtab = vec![0u8];
    let mut symtab = Vec::new();

    let null = elf::Sym32::<LittleEndian> {
        st_name: u32v(0),
        st_value: u32v(0),
        st_size: u32v(0),
        st_info: 0,
        st_other: 0,
        st_shndx: u16v(0),
    };
    symtab.extend_from_slice(bytes_of(&null));

    for sym in syms {
        let name_offset = strtab.len() as u32;
        strtab.extend_from_slice(sym.name.as_bytes());
        strtab.push(0);
        let entry = elf::Sym32::<LittleEndian> {
            st_name: u32v(name_offset),
            st_value: u32v(sym.value),
            st_size: u32v(0),
            st_info: sym.bind << 4 | elf::STT_NOTYPE,
            st_other: 0,
            st_shndx: u16v(sym.shndx),
        };
        symtab.extend_from_slice(bytes_of(&entry));
    }
    (symtab, strtab)
}

fn align4(buffer: &mut Vec<u8>) {
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}

/// Assembles a complete ELF32 object for the given machine. A null section and
/// a trailing `.shstrtab` are added automatically.
pub fn build_object(machine: u16, sections: Vec<SectionSpec>) -> Vec<u8> {
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for section in &sections {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(section.name.as_bytes());
        shstrtab.push(0);
    }
    let shstrtab_name = shstrtab.len() as u32;
    shstrtab.extend_from_slice(b".shstrtab\0");

    let mut buffer = vec![0u8; EHDR_SIZE];
    let mut shdrs = vec![elf::SectionHeader32::<LittleEndian> {
        sh_name: u32v(0),
        sh_type: u32v(elf::SHT_NULL),
        sh_flags: u32v(0),
        sh_addr: u32v(0),
        sh_offset: u32v(0),
        sh_size: u32v(0),
        sh_link: u32v(0),
        sh_info: u32v(0),
        sh_addralign: u32v(0),
        sh_entsize: u32v(0),
    }];

    for (spec, &name) in sections.iter().zip(&name_offsets) {
        align4(&mut buffer);
        let offset = buffer.len() as u32;
        buffer.extend_from_slice(&spec.data);
        shdrs.push(elf::SectionHeader32::<LittleEndian> {
            sh_name: u32v(name),
            sh_type: u32v(spec.sh_type),
            sh_flags: u32v(spec.flags),
            sh_addr: u32v(spec.addr),
            sh_offset: u32v(offset),
            sh_size: u32v(spec.size.unwrap_or(spec.data.len() as u32)),
            sh_link: u32v(spec.link),
            sh_info: u32v(spec.info),
            sh_addralign: u32v(spec.addralign),
            sh_entsize: u32v(spec.entsize),
        });
    }

    align4(&mut buffer);
    let shstrtab_offset = buffer.len() as u32;
    buffer.extend_from_slice(&shstrtab);
    shdrs.push(elf::SectionHeader32::<LittleEndian> {
        sh_name: u32v(shstrtab_name),
        sh_type: u32v(elf::SHT_STRTAB),
        sh_flags: u32v(0),
        sh_addr: u32v(0),
        sh_offset: u32v(shstrtab_offset),
        sh_size: u32v(shstrtab.len() as u32),
        sh_link: u32v(0),
        sh_info: u32v(0),
        sh_addralign: u32v(1),
        sh_entsize: u32v(0),
    });

    align4(&mut buffer);
    let shoff = buffer.len() as u32;
    for shdr in &shdrs {
        buffer.extend_from_slice(bytes_of(shdr));
    }

    let ehdr = elf::FileHeader32::<LittleEndian> {
        e_ident: elf::Ident {
            magic: elf::ELFMAG,
            class: elf::ELFCLASS32,
            data: elf::ELFDATA2LSB,
            version: elf::EV_CURRENT,
            os_abi: elf::ELFOSABI_SYSV,
            abi_version: 0,
            padding: [0; 7],
        },
        e_type: u16v(elf::ET_EXEC),
        e_machine: u16v(machine),
        e_version: u32v(elf::EV_CURRENT as u32),
        e_entry: u32v(0),
        e_phoff: u32v(0),
        e_shoff: u32v(shoff),
        e_flags: u32v(0),
        e_ehsize: u16v(EHDR_SIZE as u16),
        e_phentsize: u16v(0),
        e_phnum: u16v(0),
        e_shentsize: u16v(SHDR_SIZE as u16),
        e_shnum: u16v(shdrs.len() as u16),
        e_shstrndx: u16v(shdrs.len() as u16 - 1),
    };
    buffer[..EHDR_SIZE].copy_from_slice(bytes_of(&ehdr));

    buffer
}

/// Standard fixture: one loadable `.text` at VMA 0x8000, a symbol table with a
/// registration symbol at its start, and the given relocation entries.
///
/// Section indices: 1 = .text, 2 = .symtab, 3 = .strtab, 4 = .rel.text.
pub fn plugin_object(text: Vec<u8>, rels: &[(u32, u32, u32)]) -> Vec<u8> {
    let (symtab, strtab) = build_symtab(&[SymSpec::defined("plugin_register", 0x8000, 1)]);
    build_object(
        elf::EM_ARM,
        vec![
            SectionSpec::text(0x8000, text),
            SectionSpec::symtab(3, symtab),
            SectionSpec::strtab(strtab),
            SectionSpec::rel(2, 1, rels),
        ],
    )
}

/// `.text` contents for the end-to-end scenario: 0x20 bytes, with the word at
/// offset 0x10 holding the link-time address 0x8000.
pub fn sample_text() -> Vec<u8> {
    let mut text: Vec<u8> = (0u8..0x20).collect();
    text[0x10..0x14].copy_from_slice(&0x8000u32.to_le_bytes());
    text
}
