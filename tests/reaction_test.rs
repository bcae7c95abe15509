use std::time::Duration;

use proptest::prelude::*;

use autoreact::consts::{JITTER_MAX, JITTER_MIN, MAX_LIKE_COUNT, MIN_REACTIONS};
use autoreact::reaction::{ReactionCounts, ReactionKind, choose_reaction};
use autoreact::safety::jittered;

proptest! {
    #[test]
    fn quiet_posts_are_left_alone(counts in prop::array::uniform7(0u32..2)) {
        let counts = ReactionCounts(counts);
        prop_assume!(counts.total() < u64::from(MIN_REACTIONS));
        prop_assert_eq!(choose_reaction(&counts), None);
    }

    #[test]
    fn busy_posts_always_get_a_reaction(counts in prop::array::uniform7(0u32..1_000)) {
        let counts = ReactionCounts(counts);
        prop_assume!(counts.total() >= u64::from(MIN_REACTIONS));
        prop_assert!(choose_reaction(&counts).is_some());
    }

    #[test]
    fn choice_is_a_most_common_reaction(counts in prop::array::uniform7(0u32..50)) {
        let counts = ReactionCounts(counts);
        prop_assume!(counts.total() >= u64::from(MIN_REACTIONS));
        let chosen = choose_reaction(&counts).unwrap();

        let overall = *counts.0.iter().max().unwrap();
        let others = *counts.0[1..].iter().max().unwrap();

        if chosen == ReactionKind::Like {
            prop_assert_eq!(counts.get(chosen), overall);
            prop_assert!(counts.0[0] <= MAX_LIKE_COUNT || others <= MAX_LIKE_COUNT);
        } else {
            prop_assert_eq!(counts.get(chosen), others);
            if counts.get(chosen) < overall {
                // like won outright but was overridden
                prop_assert!(counts.0[0] > MAX_LIKE_COUNT);
                prop_assert!(counts.get(chosen) > MAX_LIKE_COUNT);
            }
        }
    }

    #[test]
    fn earliest_reaction_wins_ties(count in 6u32..100, a in 1usize..7, b in 1usize..7) {
        prop_assume!(a < b);
        let mut raw = [0u32; 7];
        raw[a] = count;
        raw[b] = count;
        let chosen = choose_reaction(&ReactionCounts(raw));
        prop_assert_eq!(chosen, ReactionKind::from_index(a));
    }

    #[test]
    fn jitter_stays_within_bounds(millis in 0u64..600_000) {
        let base = Duration::from_millis(millis);
        let delay = jittered(base, &mut rand::rng()).as_secs_f64();
        let base = base.as_secs_f64();
        prop_assert!(delay >= base * JITTER_MIN - 1e-6);
        prop_assert!(delay <= base * JITTER_MAX + 1e-6);
    }
}
