//! VRI record serialization
//!
//! Every record is a 16-byte header (address, size, flags, extension) in
//! header byte order. A literal record is followed by `size` bytes of payload
//! words; a BSS record has no payload.

use std::io::{self, Write};

use crate::encoding::{header_word, payload_word};
use crate::flags::Flags;
use crate::rle::Segment;

/// Size of a record header in bytes
pub const HEADER_SIZE: u32 = 16;

/// Writes records to an output stream and counts the bytes it wrote
pub struct RecordWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Total bytes written through this writer
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Write raw bytes such as the image magic
    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.put(bytes)
    }

    fn write_header(&mut self, addr: u32, size: u32, flags: Flags) -> io::Result<()> {
        self.put(&header_word(addr))?;
        self.put(&header_word(size))?;
        self.put(&header_word(flags.bits()))?;
        // extension, reserved
        self.put(&header_word(0))
    }

    /// Write a literal record holding `words`. Returns the address after it.
    pub fn write_literal(&mut self, addr: u32, flags: Flags, words: &[u32]) -> io::Result<u32> {
        let size = 4 * words.len() as u32;
        self.write_header(addr, size, flags.difference(Flags::BSS))?;
        for &w in words {
            self.put(&payload_word(w))?;
        }
        Ok(addr.wrapping_add(size))
    }

    /// Write a BSS record of `size` zero bytes. Returns the address after it.
    pub fn write_zero_run(&mut self, addr: u32, size: u32, flags: Flags) -> io::Result<u32> {
        self.write_header(addr, size, flags | Flags::BSS)?;
        Ok(addr.wrapping_add(size))
    }

    /// Write one planned segment of `words`: its literal record, then its
    /// zero run, each only if nonempty. Returns the address after both.
    pub fn write_segment(
        &mut self,
        addr: u32,
        flags: Flags,
        words: &[u32],
        segment: &Segment,
    ) -> io::Result<u32> {
        log::debug!(
            "    RLE: a={:08x}, lit {:6x}, bss {:6x}",
            addr,
            4 * segment.literal,
            4 * segment.zeros
        );

        let mut addr = addr;
        if segment.literal > 0 {
            addr = self.write_literal(addr, flags, segment.literal_words(words))?;
        }
        if segment.zeros > 0 {
            addr = self.write_zero_run(addr, 4 * segment.zeros as u32, flags)?;
        }
        Ok(addr)
    }
}

/// A record read back from an image
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub addr: u32,
    pub size: u32,
    pub flags: Flags,
    pub extension: u32,
    pub payload: Option<Vec<u32>>,
}

/// Parse records from `data`, which must not include the magic
#[cfg(test)]
pub fn decode(data: &[u8]) -> Result<Vec<DecodedRecord>, &'static str> {
    use crate::encoding::{decode_header_word, decode_payload_word};

    fn word(data: &[u8], pos: &mut usize) -> Result<[u8; 4], &'static str> {
        let bytes = data
            .get(*pos..*pos + 4)
            .ok_or("unexpected end of image")?;
        *pos += 4;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    let mut records = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let addr = decode_header_word(word(data, &mut pos)?);
        let size = decode_header_word(word(data, &mut pos)?);
        let flags = Flags::from_bits_retain(decode_header_word(word(data, &mut pos)?));
        let extension = decode_header_word(word(data, &mut pos)?);

        let payload = if flags.contains(Flags::BSS) {
            None
        } else {
            let mut words = Vec::with_capacity(size as usize / 4);
            for _ in 0..size / 4 {
                words.push(decode_payload_word(word(data, &mut pos)?));
            }
            Some(words)
        };

        records.push(DecodedRecord {
            addr,
            size,
            flags,
            extension,
            payload,
        });
    }

    Ok(records)
}

/// Rebuild the memory contents described by `records` as big-endian bytes,
/// starting at the lowest record address
#[cfg(test)]
pub fn flatten(records: &[DecodedRecord]) -> Vec<u8> {
    let Some(base) = records.iter().map(|r| r.addr).min() else {
        return Vec::new();
    };
    let end = records.iter().map(|r| r.addr + r.size).max().unwrap_or(base);
    let mut memory = vec![0u8; (end - base) as usize];

    for r in records {
        if let Some(words) = &r.payload {
            let offset = (r.addr - base) as usize;
            for (i, w) in words.iter().enumerate() {
                memory[offset + 4 * i..offset + 4 * i + 4].copy_from_slice(&w.to_be_bytes());
            }
        }
    }
    memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literal_record_bytes() {
        let mut w = RecordWriter::new(Vec::new());
        let next = w
            .write_literal(0x12345678, Flags::READ | Flags::EXECUTE, &[0x12345678, 1])
            .unwrap();
        assert_eq!(next, 0x12345680);
        assert_eq!(w.bytes_written(), 24);
        assert_eq!(
            w.into_inner(),
            vec![
                0x56, 0x78, 0x12, 0x34, // addr
                0x00, 0x08, 0x00, 0x00, // size
                0x00, 0x05, 0x00, 0x00, // flags
                0x00, 0x00, 0x00, 0x00, // extension
                0x34, 0x12, 0x78, 0x56, // payload
                0x00, 0x00, 0x01, 0x00,
            ]
        );
    }

    #[test]
    fn test_zero_run_has_no_payload() {
        let mut w = RecordWriter::new(Vec::new());
        let next = w.write_zero_run(0x1000, 0x200, Flags::RWX).unwrap();
        assert_eq!(next, 0x1200);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), HEADER_SIZE as usize);
        assert_eq!(&bytes[8..12], &[0x00, 0x0f, 0x00, 0x00]);
    }

    #[test]
    fn test_literal_clears_bss() {
        let mut w = RecordWriter::new(Vec::new());
        w.write_literal(0, Flags::RWX | Flags::BSS, &[1, 2]).unwrap();
        let records = decode(&w.into_inner()).unwrap();
        assert_eq!(records[0].flags, Flags::RWX);
        assert_eq!(records[0].payload, Some(vec![1, 2]));
    }

    #[test]
    fn test_segment_is_contiguous() {
        let words = [9, 9, 0, 0, 0, 0];
        let segment = Segment {
            start: 0,
            literal: 2,
            zeros: 4,
        };
        let mut w = RecordWriter::new(Vec::new());
        let next = w.write_segment(0x2000, Flags::READ, &words, &segment).unwrap();
        assert_eq!(next, 0x2018);

        let records = decode(&w.into_inner()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].addr, 0x2000);
        assert_eq!(records[0].size, 8);
        assert_eq!(records[1].addr, 0x2008);
        assert_eq!(records[1].size, 16);
        assert_eq!(records[1].flags, Flags::READ | Flags::BSS);
        assert_eq!(records[1].payload, None);
        assert_eq!(records[1].extension, 0);
    }

    #[test]
    fn test_empty_segment_parts_are_skipped() {
        let segment = Segment {
            start: 0,
            literal: 0,
            zeros: 2,
        };
        let mut w = RecordWriter::new(Vec::new());
        w.write_segment(0, Flags::READ, &[0, 0], &segment).unwrap();
        let records = decode(&w.into_inner()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].flags.contains(Flags::BSS));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(decode(&[0x00, 0x01]).is_err());
    }
}
