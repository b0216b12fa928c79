//! elf2vri - build VRI boot images from ELF executables and raw binaries
//!
//! Raw files given with `-b` are written before the ELF segments, files given
//! with `-B` after them. Each `-a` and `-f` applies to the raw files that
//! follow it on the command line.
//!
//! The image goes to stdout unless an output file is named; logs always go
//! to stderr.

mod options;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use log::{LevelFilter, info, warn};
use vri_image::{ElfSegments, ImageJob, ImageSummary, ReadelfSegments, assemble};

use options::{Event, Placement, parse_number, parse_shift, resolve_raw_sources};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Reader {
    /// Parse the ELF file directly (default)
    #[default]
    Native,
    /// Run readelf and parse its reports
    Readelf,
}

#[derive(Parser, Debug)]
#[command(name = "elf2vri", version)]
#[command(
    about = "Convert ELF executables and binary files into VRI boot images",
    long_about = None
)]
struct Cli {
    /// ELF file to convert, "-" for none
    #[arg(value_name = "ELF_FILE")]
    elf_file: Option<PathBuf>,

    /// Output VRI file, "-" or omitted for stdout
    #[arg(value_name = "VRI_FILE")]
    vri_file: Option<PathBuf>,

    /// Address of the following binary files, "auto" to place them after the
    /// previous source (after an ELF segment, that is past its BSS as well)
    #[arg(
        short,
        long,
        value_name = "ADDR",
        value_parser = Placement::parse,
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    address: Vec<Placement>,

    /// Flags of the following binary files (1 read, 2 write, 4 execute)
    #[arg(
        short,
        long,
        value_name = "FLAGS",
        value_parser = parse_number,
        action = ArgAction::Append
    )]
    flags: Vec<u32>,

    /// Binary file to put before the ELF segments
    #[arg(short = 'b', long, value_name = "FILE", action = ArgAction::Append)]
    before: Vec<PathBuf>,

    /// Binary file to put after the ELF segments
    #[arg(short = 'B', long, value_name = "FILE", action = ArgAction::Append)]
    after: Vec<PathBuf>,

    /// Add OFFS to all ELF addresses, or move the ELF from address A to B
    #[arg(
        short,
        long,
        value_name = "OFFS|A:B",
        value_parser = parse_shift,
        default_value = "0",
        allow_hyphen_values = true
    )]
    shift: u32,

    /// Leave out the magic so the output can be appended to another image
    #[arg(short, long)]
    raw: bool,

    /// How ELF segments are read
    #[arg(long, value_enum, default_value_t = Reader::Native)]
    reader: Reader,

    /// readelf executable for --reader readelf
    #[arg(long, value_name = "PROGRAM", default_value = "readelf")]
    readelf: String,

    /// More output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    init_logging(cli.verbose);

    let job = build_job(&cli, &matches)?;
    let elf_path = not_dash(cli.elf_file.as_deref());
    if elf_path.is_none() && job.before.is_empty() && job.after.is_empty() {
        bail!("Nothing to do!");
    }

    let mut out = open_output(not_dash(cli.vri_file.as_deref()))?;
    let result = run(&cli, &job, elf_path, &mut out);
    out.flush().context("Failed to flush output")?;
    let summary = result?;

    if !summary.warnings.is_empty() {
        warn!(
            "{} warning(s). The image may still work, but this is highly suspicious!",
            summary.warnings.len()
        );
    }
    info!(
        "Total {} bytes in, {} bytes out ({:.1}% compression), next address {:08x}",
        summary.input_bytes(),
        summary.bytes_written,
        summary.compression_percent(),
        summary.cursor
    );
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn not_dash(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| *p != Path::new("-"))
}

fn open_output(path: Option<&Path>) -> Result<BufWriter<Box<dyn Write>>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Couldn't open {} for writing", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    Ok(BufWriter::new(out))
}

fn run(
    cli: &Cli,
    job: &ImageJob,
    elf_path: Option<&Path>,
    out: &mut impl Write,
) -> Result<ImageSummary> {
    let Some(path) = elf_path else {
        return assemble(job, None, out).context("Failed to build VRI image");
    };

    info!("Reading {} with the {:?} reader", path.display(), cli.reader);
    let summary = match cli.reader {
        Reader::Native => ElfSegments::open(path)
            .and_then(|mut segments| assemble(job, Some(&mut segments), out)),
        Reader::Readelf => ReadelfSegments::open(path, cli.readelf.as_str())
            .and_then(|mut segments| assemble(job, Some(&mut segments), out)),
    };
    summary.with_context(|| format!("Failed to build VRI image from {}", path.display()))
}

/// Turn the parsed options into a job, applying `-a` and `-f` in
/// command-line order
fn build_job(cli: &Cli, matches: &ArgMatches) -> Result<ImageJob> {
    let mut events = Vec::new();
    events.extend(
        indices(matches, "address").zip(cli.address.iter().map(|&a| Event::Placement(a))),
    );
    events.extend(indices(matches, "flags").zip(cli.flags.iter().map(|&f| Event::Flags(f))));
    events.extend(indices(matches, "before").zip(cli.before.iter().cloned().map(Event::Before)));
    events.extend(indices(matches, "after").zip(cli.after.iter().cloned().map(Event::After)));

    let plan = resolve_raw_sources(events)?;
    Ok(ImageJob {
        emit_magic: !cli.raw,
        start_address: plan.start_address,
        offset: cli.shift,
        before: plan.before,
        after: plan.after,
    })
}

fn indices<'a>(
    matches: &'a ArgMatches,
    id: &'static str,
) -> impl Iterator<Item = usize> + 'a {
    matches.indices_of(id).into_iter().flatten()
}
