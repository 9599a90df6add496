//! Training oracles for the arc-eager system.
//!
//! The static oracle produces the canonical derivation for projective gold
//! trees. The dynamic oracle (Goldberg & Nivre 2012) assigns every
//! transition a cost from any reachable configuration, so training can
//! continue after exploration steps or on non-projective input.

use crate::system::{ParserState, Transition};
use crate::vocab::TransitionSet;

fn buffer_ids(state: &ParserState) -> impl Iterator<Item = usize> {
    let front = state.buffer(0).unwrap_or(state.n_tokens() + 1);
    front..=state.n_tokens()
}

/// The canonical next transition for a projective gold tree, or `None` when
/// the configuration cannot reach the gold tree (non-projective input).
///
/// `gold_heads` and `gold_labels` are indexed by token id; index 0 is
/// unused.
pub fn static_oracle(
    state: &ParserState,
    gold_heads: &[usize],
    gold_labels: &[String],
) -> Option<Transition> {
    let s0 = state.stack_top();
    let b0 = state.buffer(0);

    if let Some(b0) = b0 {
        if s0 > 0 && gold_heads[s0] == b0 {
            return Some(Transition::LeftArc(gold_labels[s0].clone()));
        }
        if gold_heads[b0] == s0 {
            return Some(Transition::RightArc(gold_labels[b0].clone()));
        }
    }

    if s0 > 0
        && state.head(s0).is_some()
        && !buffer_ids(state).any(|j| gold_heads[j] == s0)
    {
        return Some(Transition::Reduce);
    }

    if b0.is_some() {
        return Some(Transition::Shift);
    }

    if s0 > 0 && state.head(s0).is_some() {
        return Some(Transition::Reduce);
    }

    None
}

/// Dynamic-oracle cost of a transition: the number of gold arcs it makes
/// unreachable. `None` when the transition is not applicable at all.
pub fn transition_cost(
    state: &ParserState,
    transition: &Transition,
    gold_heads: &[usize],
    gold_labels: &[String],
) -> Option<u32> {
    let s0 = state.stack_top();
    let b0 = state.buffer(0);

    match transition {
        Transition::Shift => {
            let b0 = b0?;
            // Shifting b0 loses the left arc s0 <- b0 and any right arcs
            // from s0 into the buffer whose dependents are still headless.
            let mut cost = 0;
            if s0 > 0 && gold_heads[s0] == b0 {
                cost += 1;
            }
            cost += buffer_ids(state)
                .filter(|&j| gold_heads[j] == s0 && state.head(j).is_none())
                .count() as u32;
            Some(cost)
        }
        Transition::Reduce => {
            Some(buffer_ids(state).filter(|&j| gold_heads[j] == s0).count() as u32)
        }
        Transition::LeftArc(label) => {
            if s0 == 0 {
                return None;
            }
            let b0 = b0?;
            if gold_heads[s0] == b0 {
                Some(if &gold_labels[s0] == label { 0 } else { 1 })
            } else {
                Some(1)
            }
        }
        Transition::RightArc(label) => {
            let b0 = b0?;
            if gold_heads[b0] == s0 {
                Some(if &gold_labels[b0] == label { 0 } else { 1 })
            } else {
                Some(1)
            }
        }
    }
}

/// Minimum-cost transition among `valid` (indices into `transitions`).
///
/// Ties break toward the earlier index; since `valid` preserves transition
/// set order, this is the deterministic tie-break of the training contract.
pub fn dynamic_oracle(
    state: &ParserState,
    transitions: &TransitionSet,
    valid: &[usize],
    gold_heads: &[usize],
    gold_labels: &[String],
) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;

    for &idx in valid {
        let cost = match transition_cost(state, transitions.get(idx), gold_heads, gold_labels) {
            Some(cost) => cost,
            None => continue,
        };
        match best {
            Some((_, best_cost)) if best_cost <= cost => (),
            _ => best = Some((idx, cost)),
        }
    }

    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::{dynamic_oracle, static_oracle, transition_cost};
    use crate::system::{ParserState, Transition};
    use crate::vocab::TransitionSet;

    // Gold tree for "The cat sat the mat" style 5-token sentence:
    // heads [2, 0, 2, 5, 3], labels [det, root, nsubj, det, obl].
    lazy_static! {
        static ref GOLD_HEADS: Vec<usize> = vec![0, 2, 0, 2, 5, 3];
        static ref GOLD_LABELS: Vec<String> = vec!["", "det", "root", "nsubj", "det", "obl"]
            .into_iter()
            .map(str::to_owned)
            .collect();
    }

    fn labels() -> Vec<String> {
        let mut labels: Vec<String> = vec!["det", "root", "nsubj", "obl"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        labels.sort();
        labels
    }

    #[test]
    fn static_oracle_replays_projective_tree() {
        let mut state = ParserState::new(5);

        while !state.is_terminal() {
            let transition = match static_oracle(&state, &GOLD_HEADS, &GOLD_LABELS) {
                Some(transition) => transition,
                None => break,
            };
            state.apply(&transition);
        }

        state.attach_remaining_to_root();
        assert_eq!(state.heads_vec(), GOLD_HEADS[1..].to_vec());
        assert_eq!(state.labels_vec(), GOLD_LABELS[1..].to_vec());
    }

    #[test]
    fn static_oracle_transitions_have_zero_cost() {
        let tset = TransitionSet::from_labels(&labels());
        let mut state = ParserState::new(5);

        while !state.is_terminal() {
            let transition = match static_oracle(&state, &GOLD_HEADS, &GOLD_LABELS) {
                Some(transition) => transition,
                None => break,
            };

            assert_eq!(
                transition_cost(&state, &transition, &GOLD_HEADS, &GOLD_LABELS),
                Some(0),
                "static oracle proposed {} with nonzero cost",
                transition
            );

            // A contradictory arc must cost at least 1.
            let wrong = Transition::LeftArc("obl".to_owned());
            if state.is_valid(&wrong) {
                let cost = transition_cost(&state, &wrong, &GOLD_HEADS, &GOLD_LABELS).unwrap();
                if wrong != transition {
                    assert!(cost >= 1);
                }
            }

            // The dynamic oracle agrees with some zero-cost valid choice.
            let valid = state.valid_indices(&tset);
            let picked = dynamic_oracle(&state, &tset, &valid, &GOLD_HEADS, &GOLD_LABELS).unwrap();
            assert_eq!(
                transition_cost(&state, tset.get(picked), &GOLD_HEADS, &GOLD_LABELS),
                Some(0)
            );

            state.apply(&transition);
        }
    }

    #[test]
    fn reduce_cost_counts_lost_dependents() {
        // After SHIFT SHIFT, s0 = 2 still has gold dependents 3 (nsubj) in
        // the buffer, so REDUCE would cost 1; but REDUCE is invalid (no
        // head), so check the raw cost only.
        let mut state = ParserState::new(5);
        state.apply(&Transition::Shift);
        state.apply(&Transition::Shift);

        assert_eq!(
            transition_cost(&state, &Transition::Reduce, &GOLD_HEADS, &GOLD_LABELS),
            Some(1)
        );
    }

    #[test]
    fn shift_cost_includes_both_lost_arc_kinds() {
        // Configuration: stack [0, 2], buffer [3, 4, 5] after SHIFT,
        // LEFT-det (1 <- 2), SHIFT. Now s0 = 2 with gold dependent 3 in the
        // buffer; shifting loses that right arc.
        let mut state = ParserState::new(5);
        state.apply(&Transition::Shift);
        state.apply(&Transition::LeftArc("det".to_owned()));
        state.apply(&Transition::Shift);

        assert_eq!(
            transition_cost(&state, &Transition::Shift, &GOLD_HEADS, &GOLD_LABELS),
            Some(1)
        );

        // Wrong label on a gold arc costs exactly 1.
        assert_eq!(
            transition_cost(
                &state,
                &Transition::RightArc("obl".to_owned()),
                &GOLD_HEADS,
                &GOLD_LABELS
            ),
            Some(1)
        );
        // The gold arc with the gold label is free.
        assert_eq!(
            transition_cost(
                &state,
                &Transition::RightArc("nsubj".to_owned()),
                &GOLD_HEADS,
                &GOLD_LABELS
            ),
            Some(0)
        );
    }
}
