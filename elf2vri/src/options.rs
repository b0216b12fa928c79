//! Command-line values and their resolution into raw sources
//!
//! `-a` and `-f` are positional in effect: each applies to the `-b` and `-B`
//! files that come after it, until the next one.

use std::path::PathBuf;

use anyhow::{Result, bail};
use vri_image::{Flags, RawSource};

/// Most raw files accepted per group (`-b` or `-B`)
pub const MAX_RAW_FILES: usize = 256;

/// Where the following raw files go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// At this address
    Fixed(u32),
    /// Right after the previous source
    Auto,
}

impl Placement {
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(Placement::Auto)
        } else {
            parse_number(s).map(Placement::Fixed)
        }
    }

    fn address(self) -> Option<u32> {
        match self {
            Placement::Fixed(addr) => Some(addr),
            Placement::Auto => None,
        }
    }
}

/// Parse `0x` hex, `0` octal or decimal, with an optional leading `-`
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        u32::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse()
    };

    let value = parsed.map_err(|e| format!("invalid number \"{}\": {}", s, e))?;
    Ok(if negative { value.wrapping_neg() } else { value })
}

/// `OFFS` or `A:B`, the latter meaning "move from A to B"
pub fn parse_shift(s: &str) -> Result<u32, String> {
    match s.split_once(':') {
        Some((from, to)) => Ok(parse_number(to)?.wrapping_sub(parse_number(from)?)),
        None => parse_number(s),
    }
}

/// One order-sensitive command-line option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Placement(Placement),
    Flags(u32),
    Before(PathBuf),
    After(PathBuf),
}

/// Raw files with their resolved addresses and flags
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RawPlan {
    pub before: Vec<RawSource>,
    pub after: Vec<RawSource>,
    /// Last explicit address given, the cursor's starting value
    pub start_address: u32,
}

/// Replay `events` in command-line order, where each carries its argument
/// index
pub fn resolve_raw_sources(mut events: Vec<(usize, Event)>) -> Result<RawPlan> {
    events.sort_by_key(|(index, _)| *index);

    let mut plan = RawPlan::default();
    let mut placement = Placement::Auto;
    let mut flags = Flags::default();

    for (_, event) in events {
        match event {
            Event::Placement(p) => {
                if let Placement::Fixed(addr) = p {
                    plan.start_address = addr;
                }
                placement = p;
            }
            Event::Flags(bits) => flags = Flags::from_user(bits),
            Event::Before(path) => plan.before.push(RawSource {
                path,
                address: placement.address(),
                flags,
            }),
            Event::After(path) => plan.after.push(RawSource {
                path,
                address: placement.address(),
                flags,
            }),
        }
    }

    if plan.before.len() > MAX_RAW_FILES || plan.after.len() > MAX_RAW_FILES {
        bail!("only {} files allowed for each of -b and -B", MAX_RAW_FILES);
    }

    Ok(plan)
}
