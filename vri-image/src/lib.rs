//! VRI boot image encoder
//!
//! This crate builds VRI images for VLSI Solution's RISC-V boot loader.
//! An image is the magic `VRI1` followed by independent records, each giving
//! a load address, a size and flags. Literal records carry their data; BSS
//! records stand for zero-filled memory and carry none. Long runs of zero
//! words inside the data are split out into BSS records to shrink the image.
//!
//! Inputs are raw binary files and the loadable segments of an ELF file,
//! read either natively or through `readelf`.

mod error;
mod flags;

pub mod elf;
pub mod encoding;
pub mod image;
pub mod readelf;
pub mod record;
pub mod rle;
pub mod source;
pub mod words;

pub use elf::ElfSegments;
pub use error::VriError;
pub use flags::Flags;
pub use image::{ImageAssembler, ImageJob, ImageSummary, MAGIC, SourceStats, assemble};
pub use readelf::ReadelfSegments;
pub use source::{HexTuple, RawSource, SegmentHeader, SegmentSource};
