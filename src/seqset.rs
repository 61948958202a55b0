//! A sparse, ordered set of UIDs
//!
//! Stands in for the original's `struct seqset`: a compact run-length
//! representation (`"1:5,7,9:12"`) used both for the session's
//! accumulated seen set and for the persisted per-mailbox seen-db value.

use std::fmt;

/// A sparse set of `u32` UIDs, stored as sorted, non-overlapping,
/// non-adjacent closed ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeqSet {
    ranges: Vec<(u32, u32)>,
}

impl SeqSet {
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.ranges
            .iter()
            .map(|(lo, hi)| u64::from(*hi) - u64::from(*lo) + 1)
            .sum()
    }

    pub fn add(&mut self, uid: u32) {
        // Find insertion point and merge with adjacent/overlapping ranges.
        let mut i = 0;
        while i < self.ranges.len() && self.ranges[i].1 + 1 < uid {
            i += 1;
        }
        if i < self.ranges.len() && self.ranges[i].0 <= uid.saturating_add(1) {
            let (lo, hi) = self.ranges[i];
            self.ranges[i] = (lo.min(uid), hi.max(uid));
        } else {
            self.ranges.insert(i, (uid, uid));
        }
        self.normalize();
    }

    #[must_use]
    pub fn contains(&self, uid: u32) -> bool {
        self.ranges.iter().any(|(lo, hi)| *lo <= uid && uid <= *hi)
    }

    /// Every UID currently held in `other` is added to `self` (a plain
    /// set-theoretic OR; duplicates are benign).
    pub fn union_with(&mut self, other: &Self) {
        for &(lo, hi) in &other.ranges {
            for uid in lo..=hi {
                self.add(uid);
            }
        }
    }

    /// Merge adjacent/overlapping ranges created out of insertion order.
    fn normalize(&mut self) {
        self.ranges.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(self.ranges.len());
        for &(lo, hi) in &self.ranges {
            if let Some(last) = merged.last_mut() {
                if lo <= last.1.saturating_add(1) {
                    last.1 = last.1.max(hi);
                    continue;
                }
            }
            merged.push((lo, hi));
        }
        self.ranges = merged;
    }

    /// Parse a `"1:5,7,9:12"`-style string. `max_uid` bounds a trailing
    /// open range, mirroring the original's use of `mailbox.last_uid` as
    /// the ceiling for a "potentially-sparse sequence";
    /// unparseable or empty input yields an empty set.
    #[must_use]
    pub fn parse(s: &str, max_uid: u32) -> Self {
        let mut set = Self::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some((lo, hi)) = token.split_once(':') {
                let lo: Option<u32> = lo.parse().ok();
                let hi: Option<u32> = if hi == "*" { Some(max_uid) } else { hi.parse().ok() };
                if let (Some(lo), Some(hi)) = (lo, hi) {
                    for uid in lo..=hi.min(max_uid.max(hi)) {
                        set.add(uid);
                    }
                }
            } else if let Ok(uid) = token.parse::<u32>() {
                set.add(uid);
            }
        }
        set
    }
}

impl fmt::Display for SeqSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|(lo, hi)| {
                if lo == hi {
                    lo.to_string()
                } else {
                    format!("{lo}:{hi}")
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_merges_adjacent_and_overlapping() {
        let mut s = SeqSet::new();
        s.add(1);
        s.add(2);
        s.add(3);
        s.add(7);
        assert_eq!(s.to_string(), "1:3,7");
    }

    #[test]
    fn parse_round_trips() {
        let s = SeqSet::parse("1:5,7,9:12", 100);
        assert_eq!(s.to_string(), "1:5,7,9:12");
        assert!(s.contains(3));
        assert!(s.contains(7));
        assert!(!s.contains(6));
    }

    #[test]
    fn union_is_set_theoretic_or() {
        let mut a = SeqSet::parse("1:3", 100);
        let b = SeqSet::parse("5,6", 100);
        a.union_with(&b);
        assert_eq!(a.to_string(), "1:3,5:6");

        // Duplicates are benign.
        let mut c = SeqSet::parse("1:3", 100);
        c.union_with(&SeqSet::parse("1:3", 100));
        assert_eq!(c.to_string(), "1:3");
    }

    #[test]
    fn empty_input_is_empty_set() {
        assert!(SeqSet::parse("", 100).is_empty());
    }
}
