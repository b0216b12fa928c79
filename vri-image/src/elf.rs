//! Native ELF segment source
//!
//! Reads program headers straight from a 32-bit ELF file and serves the
//! segment contents in the same hex-dump shape the `readelf` source produces.

use std::path::Path;

use object::elf::{PT_LOAD, SHF_ALLOC};
use object::read::elf::{ElfFile32, ProgramHeader};
use object::{Endianness, Object, ObjectSection, SectionFlags};

use crate::error::VriError;
use crate::flags::Flags;
use crate::source::{HexTuple, SegmentHeader, SegmentSource};
use crate::words::words_from_bytes;

/// Bytes per hex-dump line
const LINE_BYTES: usize = 16;

/// Loadable segments of a parsed ELF file, with their file data
pub struct ElfSegments {
    segments: Vec<(SegmentHeader, Vec<u8>)>,
}

impl ElfSegments {
    /// Read and parse the ELF file at `path`
    pub fn open(path: &Path) -> Result<Self, VriError> {
        let elf_data = std::fs::read(path).map_err(|source| VriError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&elf_data)
    }

    /// Collect every `PT_LOAD` program header of `elf_data`
    pub fn parse(elf_data: &[u8]) -> Result<Self, VriError> {
        let elf = ElfFile32::<Endianness>::parse(elf_data)?;
        let endian = elf.endian();
        let mut segments = Vec::new();

        for (index, ph) in elf.elf_program_headers().iter().enumerate() {
            if ph.p_type(endian) != PT_LOAD {
                continue;
            }

            let virt = ph.p_vaddr(endian);
            let phys = ph.p_paddr(endian);
            if virt != phys {
                return Err(VriError::AddressAliasing { index, virt, phys });
            }

            let offset = ph.p_offset(endian) as usize;
            let file_size = ph.p_filesz(endian);
            let mem_size = ph.p_memsz(endian);
            let data = elf_data
                .get(offset..offset + file_size as usize)
                .ok_or_else(|| {
                    VriError::Elf(format!(
                        "segment {} data 0x{:x}+0x{:x} is outside the file",
                        index, offset, file_size
                    ))
                })?;

            let start = phys as u64;
            let end = start + mem_size as u64;
            let sections = elf
                .sections()
                .filter(|s| match s.flags() {
                    SectionFlags::Elf { sh_flags } => sh_flags & SHF_ALLOC as u64 != 0,
                    _ => false,
                })
                .filter(|s| s.size() > 0 && s.address() >= start && s.address() < end)
                .filter_map(|s| s.name().ok().map(str::to_string))
                .collect();

            segments.push((
                SegmentHeader {
                    index,
                    addr: phys,
                    file_size,
                    mem_size,
                    flags: Flags::from_elf(ph.p_flags(endian)),
                    sections,
                },
                data.to_vec(),
            ));
        }

        log::debug!("ELF has {} loadable segments", segments.len());
        Ok(Self { segments })
    }
}

impl SegmentSource for ElfSegments {
    fn segments(&mut self) -> Result<Vec<SegmentHeader>, VriError> {
        Ok(self.segments.iter().map(|(h, _)| h.clone()).collect())
    }

    fn hex_dump(&mut self, segment: &SegmentHeader) -> Result<Vec<HexTuple>, VriError> {
        let (header, data) = self
            .segments
            .iter()
            .find(|(h, _)| h.index == segment.index)
            .ok_or_else(|| VriError::Elf(format!("no program header {}", segment.index)))?;

        Ok(data
            .chunks(LINE_BYTES)
            .enumerate()
            .map(|(i, line)| HexTuple {
                address: header.addr.wrapping_add((i * LINE_BYTES) as u32),
                words: words_from_bytes(line),
            })
            .collect())
    }
}
