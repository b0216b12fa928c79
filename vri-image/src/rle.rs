//! Zero-run compression
//!
//! A word stream is cut into literal stretches and runs of zero words. Only
//! runs of at least [`RLE_RUN_LIMIT_WORDS`] are split out: each record costs
//! 16 header bytes, so shorter runs stay inside the literal payload. Split
//! points keep both parts a whole number of 8-byte units, which is the
//! loader's transfer granularity.

/// Shortest zero run, in words, worth its own BSS record.
///
/// Measured on a 38 MB Linux boot image at 12.288 MHz: limits from 0x40 to
/// 0x400 load equally fast, 0x80 gave the best load time.
pub const RLE_RUN_LIMIT_WORDS: usize = 0x80;

/// A literal stretch followed by a zero run, both possibly empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Index of the first literal word
    pub start: usize,
    /// Literal words, starting at `start`
    pub literal: usize,
    /// Zero words following the literal stretch
    pub zeros: usize,
}

impl Segment {
    pub fn literal_words<'a>(&self, words: &'a [u32]) -> &'a [u32] {
        &words[self.start..self.start + self.literal]
    }

    pub fn is_empty(&self) -> bool {
        self.literal == 0 && self.zeros == 0
    }
}

/// Where a mid-stream flush cuts the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub segment: Segment,
    /// First word of the next literal stretch
    pub next_base: usize,
}

/// Cut before the nonzero word at `index`, which ends a run of `rle_run`
/// zeros. The pending literal stretch started at `base`.
///
/// An odd literal stretch borrows one zero from the run. If the run is then
/// odd, its last zero is handed to the next literal stretch, so `next_base`
/// may be `index - 1`.
pub fn split_run(base: usize, index: usize, rle_run: usize) -> Boundary {
    let mut literal = index - base - rle_run;
    let mut zeros = rle_run;
    let mut next_base = index;

    if literal & 1 == 1 && zeros > 0 {
        zeros -= 1;
        literal += 1;
    }
    if zeros & 1 == 1 {
        zeros -= 1;
        next_base -= 1;
    }

    Boundary {
        segment: Segment {
            start: base,
            literal,
            zeros,
        },
        next_base,
    }
}

/// Cut at the end of a stream of `len` words. Returns the final segment and
/// the number of trailing zero words left out of it.
///
/// A trailing zero run shorter than the limit is neither compressed nor
/// appended to the literal stretch: those words are not emitted at all.
pub fn split_tail(base: usize, len: usize, rle_run: usize) -> (Segment, usize) {
    let mut literal = len - base - rle_run;
    let mut zeros = rle_run;

    if literal & 1 == 1 && zeros > 0 {
        zeros -= 1;
        literal += 1;
    }

    let dropped = if zeros < RLE_RUN_LIMIT_WORDS {
        std::mem::take(&mut zeros)
    } else {
        0
    };

    (
        Segment {
            start: base,
            literal,
            zeros,
        },
        dropped,
    )
}

/// Segments of one word stream, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub segments: Vec<Segment>,
    /// Trailing zero words not covered by any segment
    pub dropped_words: usize,
}

impl RunPlan {
    /// Words covered by the emitted records
    pub fn emitted_words(&self) -> usize {
        self.segments.iter().map(|s| s.literal + s.zeros).sum()
    }
}

/// Scan `words` once and plan its literal and zero-run records
pub fn plan_runs(words: &[u32]) -> RunPlan {
    let mut plan = RunPlan::default();
    let mut base = 0;
    let mut rle_run = 0;

    for (i, &word) in words.iter().enumerate() {
        if word == 0 {
            rle_run += 1;
            continue;
        }
        if rle_run >= RLE_RUN_LIMIT_WORDS {
            let boundary = split_run(base, i, rle_run);
            if !boundary.segment.is_empty() {
                plan.segments.push(boundary.segment);
            }
            base = boundary.next_base;
        }
        rle_run = 0;
    }

    let (tail, dropped) = split_tail(base, words.len(), rle_run);
    if !tail.is_empty() {
        plan.segments.push(tail);
    }
    plan.dropped_words = dropped;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seg(start: usize, literal: usize, zeros: usize) -> Segment {
        Segment {
            start,
            literal,
            zeros,
        }
    }

    fn stream(parts: &[(u32, usize)]) -> Vec<u32> {
        parts
            .iter()
            .flat_map(|&(w, n)| std::iter::repeat_n(w, n))
            .collect()
    }

    #[test]
    fn test_split_even_parts() {
        let b = split_run(0, 130, 128);
        assert_eq!(b.segment, seg(0, 2, 128));
        assert_eq!(b.next_base, 130);
    }

    #[test]
    fn test_split_odd_literal_borrows_zero() {
        // 3 literal words, 129 zeros: literal takes one zero, run stays even
        let b = split_run(0, 132, 129);
        assert_eq!(b.segment, seg(0, 4, 128));
        assert_eq!(b.next_base, 132);
    }

    #[test]
    fn test_split_odd_run_rewinds() {
        // 2 literal words, 129 zeros: last zero moves to the next stretch
        let b = split_run(10, 141, 129);
        assert_eq!(b.segment, seg(10, 2, 128));
        assert_eq!(b.next_base, 140);
    }

    #[test]
    fn test_split_both_adjustments() {
        // 1 literal word, 128 zeros: borrow makes the run 127, rewind makes it 126
        let b = split_run(0, 129, 128);
        assert_eq!(b.segment, seg(0, 2, 126));
        assert_eq!(b.next_base, 128);
    }

    #[test]
    fn test_tail_keeps_long_run() {
        let (s, dropped) = split_tail(4, 4 + 2 + 200, 200);
        assert_eq!(s, seg(4, 2, 200));
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_tail_odd_literal_absorbs_one_zero() {
        let (s, dropped) = split_tail(0, 4, 1);
        assert_eq!(s, seg(0, 4, 0));
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_empty_input() {
        let plan = plan_runs(&[]);
        assert!(plan.segments.is_empty());
        assert_eq!(plan.dropped_words, 0);
    }

    #[test]
    fn test_no_zeros() {
        let plan = plan_runs(&[1, 2, 3, 4]);
        assert_eq!(plan.segments, vec![seg(0, 4, 0)]);
    }

    #[test]
    fn test_flanked_long_run() {
        let words = stream(&[(1, 1), (0, 200), (1, 1)]);
        let plan = plan_runs(&words);
        assert_eq!(plan.segments, vec![seg(0, 2, 198), seg(200, 2, 0)]);
        assert_eq!(plan.emitted_words(), words.len());
        assert_eq!(plan.dropped_words, 0);
        for s in &plan.segments {
            assert_eq!(s.literal % 2, 0);
            assert_eq!(s.zeros % 2, 0);
        }
    }

    #[test]
    fn test_short_runs_stay_literal() {
        let words = stream(&[(5, 2), (0, 127), (5, 1), (0, 64), (5, 2)]);
        let plan = plan_runs(&words);
        assert_eq!(plan.segments, vec![seg(0, words.len(), 0)]);
    }

    #[test]
    fn test_several_runs() {
        let words = stream(&[(7, 4), (0, 300), (7, 3), (0, 130), (7, 2)]);
        let plan = plan_runs(&words);
        assert_eq!(plan.emitted_words(), words.len());
        assert_eq!(plan.segments.len(), 3);
        assert!(plan.segments[..2].iter().all(|s| s.zeros >= 128));
        // mid-stream segments are 8-byte aligned
        for s in &plan.segments[..2] {
            assert_eq!(s.literal % 2, 0);
            assert_eq!(s.zeros % 2, 0);
        }
        // segments tile the stream without gaps
        let mut next = 0;
        for s in &plan.segments {
            assert_eq!(s.start, next);
            next = s.start + s.literal + s.zeros;
        }
        assert_eq!(next, words.len());
    }

    #[test]
    fn test_leading_run() {
        let words = stream(&[(0, 130), (1, 1)]);
        let plan = plan_runs(&words);
        assert_eq!(plan.segments, vec![seg(0, 0, 130), seg(130, 1, 0)]);
    }

    #[test]
    fn test_short_trailing_zero_run_is_dropped() {
        let words = stream(&[(1, 2), (0, 2)]);
        let plan = plan_runs(&words);
        assert_eq!(plan.segments, vec![seg(0, 2, 0)]);
        assert_eq!(plan.dropped_words, 2);
        assert_eq!(plan.emitted_words() + plan.dropped_words, words.len());
    }

    #[test]
    fn test_long_trailing_zero_run_is_compressed() {
        let words = stream(&[(1, 2), (0, 200)]);
        let plan = plan_runs(&words);
        assert_eq!(plan.segments, vec![seg(0, 2, 200)]);
        assert_eq!(plan.dropped_words, 0);
    }

    #[test]
    fn test_all_zero() {
        let words = vec![0; 256];
        let plan = plan_runs(&words);
        assert_eq!(plan.segments, vec![seg(0, 0, 256)]);
    }
}
