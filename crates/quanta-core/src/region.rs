//! Sky regions as pixel-range sets
//!
//! A [`Region`] is a normalized set of half-open index ranges in a single
//! hierarchical pixelization. Each pixel at level `L` has four children at
//! level `L + 1`, so a pixel at a coarse level expands to a contiguous range
//! at the finest level. All regions are expressed at [`Pixelization::MAX_LEVEL`].

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Range;

/// Hierarchical 4-ary pixelization (HTM / nested HEALPix style)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pixelization {
    level: u8,
}

impl Pixelization {
    /// Finest level; all region ranges are expressed at this level.
    pub const MAX_LEVEL: u8 = 20;

    /// Create a pixelization at `level`, clamped to [`Self::MAX_LEVEL`].
    #[inline]
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self {
            level: level.min(Self::MAX_LEVEL),
        }
    }

    #[inline]
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    /// Number of pixels at this level: eight root pixels, each split into
    /// four per level.
    #[inline]
    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        8 << (2 * self.level as u32)
    }

    const fn shift(&self) -> u32 {
        2 * (Self::MAX_LEVEL - self.level) as u32
    }

    /// Region covered by one pixel of this pixelization; `None` when
    /// `index` is not a pixel of this level.
    #[must_use]
    pub fn pixel(&self, index: u64) -> Option<Region> {
        self.pixels(index, index)
    }

    /// Region covered by a contiguous run of pixels `[first, last]`; empty
    /// when `last < first`, `None` when `last` is not a pixel of this level.
    #[must_use]
    pub fn pixels(&self, first: u64, last: u64) -> Option<Region> {
        if last < first {
            return Some(Region::empty());
        }
        if last >= self.pixel_count() {
            return None;
        }
        let shift = self.shift();
        Some(Region::from_ranges([(first << shift)..((last + 1) << shift)]))
    }
}

/// Normalized set of disjoint, sorted, non-adjacent pixel ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    ranges: Vec<(u64, u64)>,
}

impl Region {
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a region from arbitrary (possibly overlapping) ranges.
    #[must_use]
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = Range<u64>>,
    {
        let mut raw: Vec<(u64, u64)> = ranges
            .into_iter()
            .filter(|r| r.start < r.end)
            .map(|r| (r.start, r.end))
            .collect();
        raw.sort_unstable();

        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(raw.len());
        for (start, end) in raw {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate the normalized ranges.
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.ranges.iter().map(|&(s, e)| s..e)
    }

    /// Number of finest-level pixels covered.
    #[must_use]
    pub fn area(&self) -> u64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    #[must_use]
    pub fn contains(&self, index: u64) -> bool {
        self.ranges
            .binary_search_by(|&(s, e)| {
                if index < s {
                    std::cmp::Ordering::Greater
                } else if index >= e {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    #[must_use]
    pub fn union(&self, other: &Region) -> Region {
        Region::from_ranges(self.ranges().chain(other.ranges()))
    }

    #[must_use]
    pub fn intersection(&self, other: &Region) -> Region {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a_start, a_end) = self.ranges[i];
            let (b_start, b_end) = other.ranges[j];
            let start = a_start.max(b_start);
            let end = a_end.min(b_end);
            if start < end {
                out.push((start, end));
            }
            if a_end < b_end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Region { ranges: out }
    }

    #[must_use]
    pub fn intersects(&self, other: &Region) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a_start, a_end) = self.ranges[i];
            let (b_start, b_end) = other.ranges[j];
            if a_start.max(b_start) < a_end.min(b_end) {
                return true;
            }
            if a_end < b_end {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }

    /// Union of many regions.
    #[must_use]
    pub fn union_all<'a, I>(regions: I) -> Region
    where
        I: IntoIterator<Item = &'a Region>,
    {
        Region::from_ranges(regions.into_iter().flat_map(Region::ranges))
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (s, e)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{s}, {e})")?;
        }
        write!(f, "}}")
    }
}
