//! Image assembly
//!
//! Sources are emitted in a fixed order: the magic, raw files placed before
//! the ELF, the ELF segments, raw files placed after. A fatal error stops the
//! job, but records already written stay valid, since every record describes
//! its own address range.

use std::io::Write;

use crate::error::VriError;
use crate::flags::Flags;
use crate::record::RecordWriter;
use crate::rle::plan_runs;
use crate::source::{HexTuple, RawSource, SegmentHeader, SegmentSource};
use crate::words::{WordStream, round_up_to_word, words_from_bytes};

/// Marker at the start of a complete image
pub const MAGIC: &[u8; 4] = b"VRI1";

/// Everything the assembler needs besides the ELF segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    /// Write [`MAGIC`] first; off when appending to an existing image
    pub emit_magic: bool,
    /// Initial cursor for raw files without an address
    pub start_address: u32,
    /// Added to every ELF segment address on output
    pub offset: u32,
    pub before: Vec<RawSource>,
    pub after: Vec<RawSource>,
}

impl Default for ImageJob {
    fn default() -> Self {
        Self {
            emit_magic: true,
            start_address: 0,
            offset: 0,
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

/// Size accounting for one emitted source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub label: String,
    pub address: u32,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl SourceStats {
    /// Space saved relative to the input, in percent
    pub fn compression_percent(&self) -> f64 {
        compression_percent(self.input_bytes, self.output_bytes)
    }
}

fn compression_percent(input: u64, output: u64) -> f64 {
    if input == 0 {
        0.0
    } else {
        100.0 * (input as f64 - output as f64) / input as f64
    }
}

/// Outcome of a finished job
#[derive(Debug, Default)]
pub struct ImageSummary {
    pub sources: Vec<SourceStats>,
    /// Non-fatal conditions, in the order they were found
    pub warnings: Vec<VriError>,
    pub bytes_written: u64,
    /// Cursor after the last source
    pub cursor: u32,
}

impl ImageSummary {
    pub fn input_bytes(&self) -> u64 {
        self.sources.iter().map(|s| s.input_bytes).sum()
    }

    pub fn compression_percent(&self) -> f64 {
        compression_percent(self.input_bytes(), self.bytes_written)
    }
}

/// Writes sources to an image while tracking the load address cursor
pub struct ImageAssembler<W: Write> {
    writer: RecordWriter<W>,
    cursor: u32,
    offset: u32,
    summary: ImageSummary,
}

impl<W: Write> ImageAssembler<W> {
    pub fn new(out: W, start_address: u32, offset: u32) -> Self {
        Self {
            writer: RecordWriter::new(out),
            cursor: start_address,
            offset,
            summary: ImageSummary::default(),
        }
    }

    /// Address where the next unplaced raw source will go
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn write_magic(&mut self) -> Result<(), VriError> {
        self.writer.write_bytes(MAGIC)?;
        Ok(())
    }

    fn warn(&mut self, warning: VriError) {
        debug_assert!(!warning.is_fatal(), "{} is not a warning", warning);
        log::warn!("{}", warning);
        self.summary.warnings.push(warning);
    }

    /// Compress and write `words` at `addr`. Returns the address after the
    /// last record and the number of bytes the records cover.
    fn emit_words(
        &mut self,
        addr: u32,
        flags: Flags,
        words: &[u32],
    ) -> Result<(u32, u32), VriError> {
        let plan = plan_runs(words);
        let mut addr = addr;
        for segment in &plan.segments {
            addr = self.writer.write_segment(addr, flags, words, segment)?;
        }
        if plan.dropped_words > 0 {
            log::debug!(
                "    trailing zero run of {} words not emitted",
                plan.dropped_words
            );
        }
        Ok((addr, 4 * plan.emitted_words() as u32))
    }

    /// Read a raw file and write it at its address or at the cursor
    pub fn add_raw(&mut self, raw: &RawSource) -> Result<(), VriError> {
        let label = raw.path.display().to_string();
        log::info!(
            "RAW file at {:08x}, {}",
            raw.address.unwrap_or(self.cursor),
            label
        );

        let bytes = std::fs::read(&raw.path).map_err(|source| VriError::SourceUnavailable {
            path: raw.path.clone(),
            source,
        })?;
        self.add_raw_bytes(&label, &bytes, raw.address, raw.flags)
    }

    /// Write an in-memory blob as a raw source
    pub fn add_raw_bytes(
        &mut self,
        label: &str,
        bytes: &[u8],
        address: Option<u32>,
        flags: Flags,
    ) -> Result<(), VriError> {
        let addr = address.unwrap_or(self.cursor);
        let before = self.writer.bytes_written();

        let words = words_from_bytes(bytes);
        let (end, emitted) = self.emit_words(addr, Flags::from_user(flags.bits()), &words)?;
        self.cursor = end;

        let expected = 4 * words.len() as u32;
        if emitted != expected {
            self.warn(VriError::SizeMismatch {
                label: label.to_string(),
                expected,
                actual: emitted,
            });
        }

        let stats = SourceStats {
            label: label.to_string(),
            address: addr,
            input_bytes: bytes.len() as u64,
            output_bytes: self.writer.bytes_written() - before,
        };
        log::info!(
            "RAW compressed {} bytes to {} ({:.1}% compression)",
            stats.input_bytes,
            stats.output_bytes,
            stats.compression_percent()
        );
        self.summary.sources.push(stats);
        Ok(())
    }

    /// Write one ELF segment from its hex-dump tuples.
    ///
    /// Tuples are matched against the segment's own address; the output is
    /// moved by the assembler's offset. Memory past the file data becomes a
    /// single BSS record.
    pub fn add_segment(
        &mut self,
        header: &SegmentHeader,
        tuples: &[HexTuple],
    ) -> Result<(), VriError> {
        let label = header.label();
        let file_size = round_up_to_word(header.file_size);
        let bss_size = header.mem_size.saturating_sub(file_size);
        if header.mem_size < file_size {
            log::warn!(
                "{}: memory size 0x{:x} is below file size 0x{:x}, no BSS emitted",
                label,
                header.mem_size,
                file_size
            );
        }
        log::debug!(
            "  sect[{}].fileSize = 0x{:x}, bssSize = 0x{:x}",
            header.index,
            file_size,
            bss_size
        );

        let mut stream = WordStream::new(label.as_str(), header.addr, file_size);
        for tuple in tuples {
            stream.push(tuple)?;
        }
        log::debug!("  Section {:x} data {:7x} bytes", header.index, stream.produced());
        let (words, short_stream) = stream.finish();

        let before = self.writer.bytes_written();
        let addr = header.addr.wrapping_add(self.offset);
        let (mut end, emitted) = self.emit_words(addr, header.flags, &words)?;

        if let Some(warning) = short_stream {
            self.warn(warning);
        } else if emitted != file_size {
            self.warn(VriError::SizeMismatch {
                label: label.clone(),
                expected: file_size,
                actual: emitted,
            });
        }

        if bss_size > 0 {
            log::debug!("  Section {:x} bss  {:7x} bytes", header.index, bss_size);
            let bss_addr = header.addr.wrapping_add(file_size).wrapping_add(self.offset);
            end = self.writer.write_zero_run(bss_addr, bss_size, header.flags)?;
        }
        self.cursor = end;

        self.summary.sources.push(SourceStats {
            label,
            address: addr,
            input_bytes: header.mem_size.max(file_size) as u64,
            output_bytes: self.writer.bytes_written() - before,
        });
        Ok(())
    }

    /// Write every segment of `source` that occupies memory
    pub fn add_segments(&mut self, source: &mut dyn SegmentSource) -> Result<(), VriError> {
        let headers = source.segments()?;
        log::info!("ELF has {} program headers", headers.len());
        for h in &headers {
            log::debug!(
                "  Sect {}, addr {:08x}, file {:7x}, mem {:7x}, fl {:01x}: {}",
                h.index,
                h.addr.wrapping_add(self.offset),
                h.file_size,
                h.mem_size,
                h.flags.bits(),
                h.sections.join(" ")
            );
        }

        let before = self.writer.bytes_written();
        let first = self.summary.sources.len();
        for header in headers.iter().filter(|h| h.mem_size != 0) {
            let tuples = source.hex_dump(header)?;
            self.add_segment(header, &tuples)?;
        }

        let input: u64 = self.summary.sources[first..]
            .iter()
            .map(|s| s.input_bytes)
            .sum();
        let output = self.writer.bytes_written() - before;
        log::info!(
            "RLE/BSS/strip compressed {} bytes to {} ({:.1}% compression)",
            input,
            output,
            compression_percent(input, output)
        );
        Ok(())
    }

    /// Flush the output and hand it back with the job summary
    pub fn finish(mut self) -> Result<(W, ImageSummary), VriError> {
        self.writer.get_mut().flush()?;
        self.summary.bytes_written = self.writer.bytes_written();
        self.summary.cursor = self.cursor;
        Ok((self.writer.into_inner(), self.summary))
    }
}

/// Run a whole job, writing the image to `out`.
///
/// On error, whatever was written before the failing source remains in
/// `out` as a valid partial image.
pub fn assemble<W: Write>(
    job: &ImageJob,
    segments: Option<&mut dyn SegmentSource>,
    out: W,
) -> Result<ImageSummary, VriError> {
    let mut image = ImageAssembler::new(out, job.start_address, job.offset);

    if job.emit_magic {
        image.write_magic()?;
    }
    for raw in &job.before {
        image.add_raw(raw)?;
    }
    if let Some(source) = segments {
        image.add_segments(source)?;
    }
    for raw in &job.after {
        image.add_raw(raw)?;
    }

    let (_, summary) = image.finish()?;
    Ok(summary)
}
