//! Reaction kinds and the per-post reaction choice.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::consts::{MAX_LIKE_COUNT, MIN_REACTIONS};

/// The reactions a post can receive, in reaction-picker order.
/// Index 0 is always `Like`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Care,
    Haha,
    Wow,
    Sad,
    Angry,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 7] = [
        ReactionKind::Like,
        ReactionKind::Love,
        ReactionKind::Care,
        ReactionKind::Haha,
        ReactionKind::Wow,
        ReactionKind::Sad,
        ReactionKind::Angry,
    ];

    /// Position in the reaction picker.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Love => "love",
            ReactionKind::Care => "care",
            ReactionKind::Haha => "haha",
            ReactionKind::Wow => "wow",
            ReactionKind::Sad => "sad",
            ReactionKind::Angry => "angry",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::ALL.iter().find(|k| k.as_str() == s) {
            Some(kind) => Ok(*kind),
            None => bail!("unknown reaction: {s}"),
        }
    }
}

/// Reaction tallies for one post, parallel to [`ReactionKind::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionCounts(pub [u32; 7]);

impl ReactionCounts {
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn get(&self, kind: ReactionKind) -> u32 {
        self.0[kind.index()]
    }

    /// Index of the largest count within `range`. Ties go to the lowest index.
    fn argmax(&self, range: std::ops::Range<usize>) -> usize {
        let mut best = range.start;
        for i in range {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        best
    }
}

impl From<[u32; 7]> for ReactionCounts {
    fn from(counts: [u32; 7]) -> Self {
        Self(counts)
    }
}

impl TryFrom<Vec<u32>> for ReactionCounts {
    type Error = anyhow::Error;

    fn try_from(counts: Vec<u32>) -> Result<Self, Self::Error> {
        let len = counts.len();
        match <[u32; 7]>::try_from(counts) {
            Ok(array) => Ok(Self(array)),
            Err(_) => bail!("expected 7 reaction counts, got {len}"),
        }
    }
}

/// Pick the reaction to mirror for a post, or `None` to leave it alone.
///
/// The most common reaction wins. When that is a heavily used like, the most
/// common other reaction is taken instead, but only if it is popular in its
/// own right; otherwise like stays.
pub fn choose_reaction(counts: &ReactionCounts) -> Option<ReactionKind> {
    if counts.total() < u64::from(MIN_REACTIONS) {
        return None;
    }

    let best = counts.argmax(0..7);

    if best == ReactionKind::Like.index() && counts.0[best] > MAX_LIKE_COUNT {
        let runner_up = counts.argmax(1..7);
        if counts.0[runner_up] > MAX_LIKE_COUNT {
            return ReactionKind::from_index(runner_up);
        }
    }

    ReactionKind::from_index(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choose(counts: [u32; 7]) -> Option<ReactionKind> {
        choose_reaction(&ReactionCounts(counts))
    }

    #[test]
    fn too_few_reactions_skips() {
        assert_eq!(choose([3, 0, 0, 0, 0, 0, 0]), None);
        assert_eq!(choose([1, 1, 1, 1, 1, 1, 3]), None);
    }

    #[test]
    fn exactly_min_reactions_is_considered() {
        assert_eq!(choose([0, 10, 0, 0, 0, 0, 0]), Some(ReactionKind::Love));
    }

    #[test]
    fn popular_like_without_alternative_stays_like() {
        assert_eq!(choose([20, 1, 1, 1, 1, 1, 1]), Some(ReactionKind::Like));
    }

    #[test]
    fn popular_like_switches_to_popular_alternative() {
        assert_eq!(choose([20, 0, 15, 0, 0, 0, 0]), Some(ReactionKind::Care));
    }

    #[test]
    fn runner_up_ties_go_to_first() {
        assert_eq!(choose([20, 0, 8, 0, 8, 0, 0]), Some(ReactionKind::Care));
    }

    #[test]
    fn alternative_at_threshold_is_not_enough() {
        assert_eq!(choose([20, 5, 0, 0, 0, 0, 0]), Some(ReactionKind::Like));
    }

    #[test]
    fn small_like_winner_is_kept() {
        assert_eq!(choose([5, 4, 0, 0, 1, 0, 0]), Some(ReactionKind::Like));
    }

    #[test]
    fn ties_go_to_first_index() {
        assert_eq!(choose([2, 2, 2, 2, 2, 2, 2]), Some(ReactionKind::Like));
        assert_eq!(choose([0, 0, 0, 6, 0, 6, 0]), Some(ReactionKind::Haha));
    }

    #[test]
    fn non_like_winner_returned_unchanged() {
        assert_eq!(choose([3, 1, 0, 0, 0, 0, 30]), Some(ReactionKind::Angry));
    }

    #[test]
    fn index_roundtrip_and_names() {
        for (i, kind) in ReactionKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(ReactionKind::from_index(i), Some(*kind));
            assert_eq!(kind.as_str().parse::<ReactionKind>().unwrap(), *kind);
        }
        assert_eq!(ReactionKind::from_index(7), None);
        assert!("thumbs".parse::<ReactionKind>().is_err());
    }

    #[test]
    fn huge_counts_do_not_overflow() {
        let counts = ReactionCounts([u32::MAX, 1, 0, 0, 0, 0, 0]);
        assert_eq!(counts.total(), u64::from(u32::MAX) + 1);
        assert_eq!(choose_reaction(&counts), Some(ReactionKind::Like));
        assert_eq!(choose([u32::MAX; 7]), Some(ReactionKind::Like));
    }

    #[test]
    fn counts_from_vec_requires_seven() {
        assert!(ReactionCounts::try_from(vec![1, 2, 3]).is_err());
        let counts = ReactionCounts::try_from(vec![1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(counts.total(), 28);
        assert_eq!(counts.get(ReactionKind::Angry), 7);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ReactionKind::Haha).unwrap();
        assert_eq!(json, "\"haha\"");
        let counts: ReactionCounts = serde_json::from_str("[1,0,0,0,0,0,9]").unwrap();
        assert_eq!(counts.get(ReactionKind::Angry), 9);
    }
}
