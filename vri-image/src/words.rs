//! Word stream materialization
//!
//! Raw files are packed big-endian four bytes to a word. ELF segments arrive
//! as hex-dump tuples that must line up with a running address; holes between
//! sections are filled with zero words.

use std::iter;

use crate::error::VriError;
use crate::source::HexTuple;

/// Round a byte count up to a whole number of words
pub fn round_up_to_word(size: u32) -> u32 {
    size.wrapping_add(3) & !3
}

/// Pack raw bytes into big-endian words, zero-filling a short last word
pub fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u32, |w, (i, &b)| w | (b as u32) << (24 - 8 * i))
        })
        .collect()
}

/// Builds the word buffer of one ELF segment from hex-dump tuples
pub struct WordStream {
    label: String,
    start: u32,
    addr: u32,
    file_size: u32,
    words: Vec<u32>,
}

impl WordStream {
    /// `label` names the segment in errors, `start` is its un-rebased load
    /// address and `file_size` its word-rounded initialized size.
    pub fn new(label: impl Into<String>, start: u32, file_size: u32) -> Self {
        Self {
            label: label.into(),
            start,
            addr: start,
            file_size,
            words: Vec::with_capacity(file_size as usize / 4),
        }
    }

    /// Append one tuple, zero-padding any gap in front of it
    pub fn push(&mut self, tuple: &HexTuple) -> Result<(), VriError> {
        if tuple.address > self.addr {
            let gap = tuple.address - self.addr;
            if gap & 3 != 0 {
                return Err(VriError::UnalignedGap {
                    label: self.label.clone(),
                    expected: self.addr,
                    found: tuple.address,
                    gap,
                });
            }
            log::debug!("  Padding {:x} bytes", gap);
            self.words.extend(iter::repeat_n(0, (gap / 4) as usize));
            self.addr = tuple.address;
        }

        if tuple.address != self.addr {
            return Err(VriError::AddressDiscontinuity {
                label: self.label.clone(),
                expected: self.addr,
                found: tuple.address,
            });
        }

        self.words.extend_from_slice(&tuple.words);
        self.addr = self.addr.wrapping_add(4 * tuple.words.len() as u32);
        Ok(())
    }

    /// Bytes produced so far, padding included
    pub fn produced(&self) -> u32 {
        self.addr.wrapping_sub(self.start)
    }

    /// Hand over the words, with a warning if they don't cover `file_size`
    pub fn finish(self) -> (Vec<u32>, Option<VriError>) {
        let produced = self.produced();
        let warning = (produced != self.file_size).then(|| VriError::SizeMismatch {
            label: self.label,
            expected: self.file_size,
            actual: produced,
        });
        (self.words, warning)
    }
}
