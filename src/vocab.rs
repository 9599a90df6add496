//! Class inventories and the tag dictionary.
//!
//! Class and label sets are fixed once at the start of a training run and
//! sorted, so every consumer (prediction tie-breaks, artifact layout,
//! transition indices) iterates them in the same order.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Result};
use fnv::FnvHashMap;

use crate::conllu::Sentence;
use crate::system::Transition;

/// Minimum number of training occurrences before a form is considered for
/// the tag dictionary.
pub const TAGDICT_MIN_COUNT: usize = 5;

/// Fraction of occurrences the dominant tag must reach for a form to be
/// treated as unambiguous.
pub const TAGDICT_AMBIGUITY_THRESHOLD: f64 = 0.97;

/// Sorted union of the XPOS tags in the given splits.
pub fn collect_classes(splits: &[&[Sentence]]) -> Vec<String> {
    let mut classes = BTreeSet::new();
    for split in splits {
        for sentence in *split {
            for token in sentence {
                classes.insert(token.xpos.clone());
            }
        }
    }
    classes.into_iter().collect()
}

/// Sorted union of the DEPREL values in the given splits.
pub fn collect_labels(splits: &[&[Sentence]]) -> Vec<String> {
    let mut labels = BTreeSet::new();
    for split in splits {
        for sentence in *split {
            for token in sentence {
                labels.insert(token.deprel.clone());
            }
        }
    }
    labels.into_iter().collect()
}

/// The fixed transition inventory of a training run.
///
/// Order is part of the contract: `SHIFT`, `REDUCE`, `LEFT-<label>` over
/// the sorted labels excluding `root`, then `RIGHT-<label>` over the sorted
/// labels. Prediction ties and dynamic-oracle ties break toward the
/// earliest index.
pub struct TransitionSet {
    transitions: Vec<Transition>,
    index: FnvHashMap<Transition, usize>,
}

impl TransitionSet {
    pub fn from_labels(labels: &[String]) -> Self {
        let mut transitions = vec![Transition::Shift, Transition::Reduce];
        for label in labels {
            if label != "root" {
                transitions.push(Transition::LeftArc(label.clone()));
            }
        }
        for label in labels {
            transitions.push(Transition::RightArc(label.clone()));
        }

        let index = transitions
            .iter()
            .cloned()
            .enumerate()
            .map(|(idx, transition)| (transition, idx))
            .collect();

        TransitionSet { transitions, index }
    }

    /// Rebuild an inventory from the `transitions` array of a stored
    /// artifact, preserving its order.
    pub fn from_names(names: &[String]) -> Result<Self> {
        let transitions = names
            .iter()
            .map(|name| {
                Transition::from_name(name)
                    .ok_or_else(|| anyhow!("unknown transition name: {}", name))
            })
            .collect::<Result<Vec<_>>>()?;

        let index = transitions
            .iter()
            .cloned()
            .enumerate()
            .map(|(idx, transition)| (transition, idx))
            .collect();

        Ok(TransitionSet { transitions, index })
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Transition {
        &self.transitions[idx]
    }

    pub fn index_of(&self, transition: &Transition) -> Option<usize> {
        self.index.get(transition).copied()
    }

    /// Transition names in inventory order, as stored in artifacts.
    pub fn names(&self) -> Vec<String> {
        self.transitions.iter().map(|t| t.to_string()).collect()
    }
}

/// Unambiguous form-to-tag mapping used as an inference shortcut.
///
/// The tagger still trains on dictionary words so their context weights
/// exist; the dictionary only short-circuits evaluation and runtime
/// tagging.
#[derive(Clone, Debug, Default)]
pub struct TagDict {
    map: BTreeMap<String, String>,
}

impl TagDict {
    /// Build the dictionary from the training split: a form is included
    /// when it occurs at least `TAGDICT_MIN_COUNT` times and one tag
    /// accounts for at least `TAGDICT_AMBIGUITY_THRESHOLD` of its
    /// occurrences.
    pub fn build(sentences: &[Sentence]) -> Self {
        let mut counts: FnvHashMap<&str, BTreeMap<&str, usize>> = FnvHashMap::default();
        for sentence in sentences {
            for token in sentence {
                *counts
                    .entry(token.form.as_str())
                    .or_insert_with(BTreeMap::new)
                    .entry(token.xpos.as_str())
                    .or_insert(0) += 1;
            }
        }

        let mut map = BTreeMap::new();
        for (form, tags) in counts {
            let total: usize = tags.values().sum();
            if total < TAGDICT_MIN_COUNT {
                continue;
            }
            // BTreeMap iteration makes the winner deterministic on ties.
            let (tag, count) = tags
                .iter()
                .max_by_key(|(_, &count)| count)
                .map(|(tag, &count)| (*tag, count))
                .unwrap();
            if count as f64 / total as f64 >= TAGDICT_AMBIGUITY_THRESHOLD {
                map.insert(form.to_owned(), tag.to_owned());
            }
        }

        TagDict { map }
    }

    pub fn get(&self, form: &str) -> Option<&str> {
        self.map.get(form).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.map
    }
}
