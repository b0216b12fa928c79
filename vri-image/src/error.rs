//! Error type shared by every stage of the encoder

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VriError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "{label}: address 0x{found:08x} doesn't match current (non-offset) address 0x{expected:08x}"
    )]
    AddressDiscontinuity {
        label: String,
        expected: u32,
        found: u32,
    },

    #[error(
        "{label}: padding 0x{gap:x} bytes from 0x{expected:08x} to 0x{found:08x} failed, \
         must be divisible by 4"
    )]
    UnalignedGap {
        label: String,
        expected: u32,
        found: u32,
        gap: u32,
    },

    /// Emitted byte count differs from the declared size. Reported as a
    /// warning, never returned as an error by the assembler.
    #[error("{label}: wrote 0x{actual:x} bytes while size was 0x{expected:x} bytes")]
    SizeMismatch {
        label: String,
        expected: u32,
        actual: u32,
    },

    #[error("Program header {index}: virtual 0x{virt:x} != physical 0x{phys:x} address")]
    AddressAliasing { index: usize, virt: u32, phys: u32 },

    #[error("ELF error: {0}")]
    Elf(String),

    #[error("`{command}` failed: {message}")]
    Tool { command: String, message: String },
}

impl VriError {
    /// Whether the pipeline may keep going after this condition
    pub(crate) fn is_fatal(&self) -> bool {
        !matches!(self, VriError::SizeMismatch { .. })
    }
}

impl From<object::Error> for VriError {
    fn from(e: object::Error) -> Self {
        VriError::Elf(e.to_string())
    }
}
