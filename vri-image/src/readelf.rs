//! Segment source backed by the `readelf` utility
//!
//! `readelf <elf> -l` gives the program header table and the section to
//! segment mapping, `readelf <elf> -x <section>` the contents of each
//! section as hex-dump lines. Only 32-bit reports are understood.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::VriError;
use crate::flags::Flags;
use crate::source::{HexTuple, SegmentHeader, SegmentSource};

/// Width of the hex columns in a dump line: four groups of eight digits,
/// each followed by a space. The ASCII rendering comes after.
const HEX_COLUMNS: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    None,
    ProgramHeaders,
    SegmentSections,
}

/// Parse the output of `readelf -l`.
///
/// Every entry of the program header table is returned, whatever its type,
/// so that indices line up with the segment mapping.
pub fn parse_program_headers(report: &str) -> Result<Vec<SegmentHeader>, VriError> {
    let mut headers: Vec<SegmentHeader> = Vec::new();
    let mut phase = Phase::None;

    for line in report.lines() {
        match phase {
            Phase::ProgramHeaders => {
                let line = line.trim();
                if line.starts_with("Type") || line.starts_with('[') {
                    continue;
                }
                match parse_header_line(line, headers.len())? {
                    Some(header) => headers.push(header),
                    None => phase = Phase::None,
                }
            }
            Phase::SegmentSections => match parse_mapping_line(line) {
                Some((index, sections)) => {
                    if let Some(header) = headers.get_mut(index) {
                        header.sections = sections;
                    }
                }
                None => phase = Phase::None,
            },
            Phase::None => {
                if line.contains("Program Headers:") {
                    phase = Phase::ProgramHeaders;
                } else if line.contains("Segment Sections") {
                    phase = Phase::SegmentSections;
                }
            }
        }
    }

    Ok(headers)
}

fn parse_hex(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u32::from_str_radix(digits, 16).ok()
}

/// `Type Offset VirtAddr PhysAddr FileSiz MemSiz Flg Align`, where the flag
/// letters may be split over several tokens (`R E`)
fn parse_header_line(line: &str, index: usize) -> Result<Option<SegmentHeader>, VriError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 8 {
        return Ok(None);
    }

    let numbers: Option<Vec<u32>> = tokens[1..6].iter().map(|t| parse_hex(t)).collect();
    let (Some(numbers), Some(_align)) = (numbers, parse_hex(tokens[tokens.len() - 1])) else {
        return Ok(None);
    };
    let letters = tokens[6..tokens.len() - 1].concat();
    if !letters.chars().all(|c| matches!(c, 'R' | 'W' | 'E')) {
        return Ok(None);
    }

    let (virt, phys) = (numbers[1], numbers[2]);
    if virt != phys {
        return Err(VriError::AddressAliasing { index, virt, phys });
    }

    Ok(Some(SegmentHeader {
        index,
        addr: phys,
        file_size: numbers[3],
        mem_size: numbers[4],
        flags: Flags::from_letters(&letters),
        sections: Vec::new(),
    }))
}

/// `NN     .sect1 .sect2 ...`
fn parse_mapping_line(line: &str) -> Option<(usize, Vec<String>)> {
    let mut tokens = line.split_whitespace();
    let index = tokens.next()?.parse().ok()?;
    Some((index, tokens.map(str::to_string).collect()))
}

/// Parse one line of `readelf -x` output.
///
/// Only the hex columns are read. A group shorter than eight digits holds
/// the first bytes of its word; the missing low bytes are zero.
pub fn parse_hex_dump_line(line: &str) -> Option<HexTuple> {
    let digits = line.trim_start().strip_prefix("0x")?;
    let end = digits.find(' ').unwrap_or(digits.len());
    let address = u32::from_str_radix(&digits[..end], 16).ok()?;

    let columns = &digits[end..];
    let columns = columns.strip_prefix(' ').unwrap_or(columns);
    let hex_area = columns
        .char_indices()
        .nth(HEX_COLUMNS)
        .map_or(columns, |(i, _)| &columns[..i]);

    let words: Vec<u32> = hex_area
        .split_whitespace()
        .take(4)
        .map(parse_group)
        .collect::<Option<_>>()?;
    if words.is_empty() {
        return None;
    }

    Some(HexTuple { address, words })
}

fn parse_group(group: &str) -> Option<u32> {
    if group.is_empty() || group.len() > 8 {
        return None;
    }
    let value = u32::from_str_radix(group, 16).ok()?;
    Some(value << (4 * (8 - group.len())))
}

/// Parse a whole `readelf -x` report, skipping banner and note lines
pub fn parse_hex_dump(report: &str) -> Vec<HexTuple> {
    report.lines().filter_map(parse_hex_dump_line).collect()
}

/// Runs `readelf` on an ELF file for each request
pub struct ReadelfSegments {
    program: String,
    elf_path: PathBuf,
}

impl ReadelfSegments {
    /// Check that `elf_path` is readable and remember which `readelf` to run
    pub fn open(elf_path: &Path, program: impl Into<String>) -> Result<Self, VriError> {
        let metadata =
            std::fs::metadata(elf_path).map_err(|source| VriError::SourceUnavailable {
                path: elf_path.to_path_buf(),
                source,
            })?;
        log::debug!("ELF file {} is {} bytes", elf_path.display(), metadata.len());

        Ok(Self {
            program: program.into(),
            elf_path: elf_path.to_path_buf(),
        })
    }

    fn run(&self, args: &[&str]) -> Result<String, VriError> {
        let command = format!(
            "{} {} {}",
            self.program,
            self.elf_path.display(),
            args.join(" ")
        );
        log::debug!("  EX: {}", command);

        let output = Command::new(&self.program)
            .arg(&self.elf_path)
            .args(args)
            .output()
            .map_err(|e| VriError::Tool {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VriError::Tool {
                command,
                message: format!("{} {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SegmentSource for ReadelfSegments {
    fn segments(&mut self) -> Result<Vec<SegmentHeader>, VriError> {
        let report = self.run(&["-l"])?;
        parse_program_headers(&report)
    }

    fn hex_dump(&mut self, segment: &SegmentHeader) -> Result<Vec<HexTuple>, VriError> {
        let mut tuples = Vec::new();
        for section in &segment.sections {
            let report = self.run(&["-x", section])?;
            tuples.extend(parse_hex_dump(&report));
        }
        Ok(tuples)
    }
}
