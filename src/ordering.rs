//! Deterministic question ordering.
//!
//! Each respondent sees the competencies in a shuffled order that stays stable
//! across renders. The participant id is the seed for the participant's own
//! form and for every evaluator form about that participant.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::model::Competency;

/// Permutation of `competencies` determined by `seed` and the competency set.
///
/// The input is sorted by id first, so the result does not depend on the
/// order the store returned the rows in. Not cryptographic.
pub fn presentation_order(seed: u64, competencies: &[Competency]) -> Vec<Competency> {
    let mut ordered = competencies.to_vec();
    ordered.sort_by_key(|c| c.id);
    let mut rng = StdRng::seed_from_u64(seed);
    ordered.shuffle(&mut rng);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn competency(id: i64) -> Competency {
        Competency {
            id,
            category_id: 1,
            category_name: "Communication".into(),
            self_text: format!("I do thing {id}"),
            feedback_text: format!("Does thing {id}"),
            position: id,
        }
    }

    #[test]
    fn empty_input_yields_empty_order() {
        assert!(presentation_order(7, &[]).is_empty());
    }

    #[test]
    fn different_seeds_usually_differ() {
        let comps: Vec<_> = (1..=20).map(competency).collect();
        let a: Vec<_> = presentation_order(1, &comps).iter().map(|c| c.id).collect();
        let b: Vec<_> = presentation_order(2, &comps).iter().map(|c| c.id).collect();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn order_is_a_stable_permutation(
            seed in any::<u64>(),
            ids in proptest::collection::btree_set(1i64..10_000, 0..40),
        ) {
            let comps: Vec<_> = ids.iter().copied().map(competency).collect();
            let first = presentation_order(seed, &comps);
            let second = presentation_order(seed, &comps);
            prop_assert_eq!(&first, &second);

            let mut got: Vec<_> = first.iter().map(|c| c.id).collect();
            got.sort_unstable();
            let want: Vec<_> = ids.iter().copied().collect();
            prop_assert_eq!(got, want);
        }

        #[test]
        fn order_ignores_input_order(
            seed in any::<u64>(),
            ids in proptest::collection::btree_set(1i64..10_000, 1..40),
        ) {
            let comps: Vec<_> = ids.iter().copied().map(competency).collect();
            let mut reversed = comps.clone();
            reversed.reverse();
            prop_assert_eq!(presentation_order(seed, &comps), presentation_order(seed, &reversed));
        }
    }
}
