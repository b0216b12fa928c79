//! Loadable units fed to the image assembler

use std::path::PathBuf;

use crate::error::VriError;
use crate::flags::Flags;

/// One ELF program header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Position in the program header table
    pub index: usize,
    /// Physical load address
    pub addr: u32,
    pub file_size: u32,
    pub mem_size: u32,
    pub flags: Flags,
    /// Sections mapped into this segment
    pub sections: Vec<String>,
}

impl SegmentHeader {
    /// Name used in diagnostics
    pub fn label(&self) -> String {
        if self.sections.is_empty() {
            format!("segment {}", self.index)
        } else {
            format!("segment {} ({})", self.index, self.sections.join(" "))
        }
    }
}

/// Consecutive words of segment data starting at `address`, as one line of
/// a hex dump holds them (up to four)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexTuple {
    pub address: u32,
    pub words: Vec<u32>,
}

/// Supplies the structured part of an image: program headers and the data
/// behind them
pub trait SegmentSource {
    /// Program headers in table order
    fn segments(&mut self) -> Result<Vec<SegmentHeader>, VriError>;

    /// Hex-dump records covering the file-backed bytes of `segment`, in
    /// ascending address order
    fn hex_dump(&mut self, segment: &SegmentHeader) -> Result<Vec<HexTuple>, VriError>;
}

/// A binary file loaded as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource {
    pub path: PathBuf,
    /// `None` places the file at the current cursor
    pub address: Option<u32>,
    pub flags: Flags,
}

impl RawSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            address: None,
            flags: Flags::default(),
        }
    }

    pub fn at(mut self, address: u32) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = Flags::from_user(flags.bits());
        self
    }
}
