//! Feature hashing for the parser model.
//!
//! Feature keys are hashed with FNV-1a (32 bit) into a fixed number of
//! buckets; weights whose keys collide are summed. Both the hash and the
//! additive collision semantics are a wire contract shared with the
//! downstream runtime, which is why the 32-bit variant is written out here
//! instead of reusing a hasher crate.

use std::collections::BTreeMap;

use crate::perceptron::{FrozenWeights, Scorer};
use crate::util::round_to;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a over the UTF-16 code units of `key`.
///
/// For keys within the Basic Multilingual Plane this is identical to a
/// Unicode-scalar scan; iterating code units also matches `charCodeAt`
/// style runtimes on astral input.
pub fn fnv1a_32(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for unit in key.encode_utf16() {
        hash ^= u32::from(unit);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Bucket of a feature key under `num_buckets`.
pub fn bucket(key: &str, num_buckets: u32) -> u32 {
    fnv1a_32(key) % num_buckets
}

/// The hashed parser model: `bucket -> class -> weight`.
#[derive(Clone, Debug)]
pub struct HashedModel {
    buckets: BTreeMap<u32, BTreeMap<u16, f64>>,
    num_buckets: u32,
    n_classes: usize,
}

impl HashedModel {
    /// Hash frozen weights into `num_buckets` buckets, summing collisions.
    pub fn from_frozen(frozen: &FrozenWeights, num_buckets: u32) -> Self {
        let mut buckets: BTreeMap<u32, BTreeMap<u16, f64>> = BTreeMap::new();
        for (feature, row) in &frozen.weights {
            let bucket_id = bucket(feature, num_buckets);
            let target = buckets.entry(bucket_id).or_insert_with(BTreeMap::new);
            for (&class, &weight) in row {
                *target.entry(class as u16).or_insert(0.0) += weight;
            }
        }

        HashedModel {
            buckets,
            num_buckets,
            n_classes: frozen.n_classes(),
        }
    }

    /// Round every weight to `places` decimal places.
    pub fn round_weights(&mut self, places: i32) {
        for row in self.buckets.values_mut() {
            for weight in row.values_mut() {
                *weight = round_to(*weight, places);
            }
        }
    }

    /// Drop entries below `threshold` in magnitude, then empty buckets.
    pub fn prune(&mut self, threshold: f64) {
        for row in self.buckets.values_mut() {
            row.retain(|_, weight| weight.abs() >= threshold);
        }
        self.buckets.retain(|_, row| !row.is_empty());
    }

    pub fn buckets(&self) -> &BTreeMap<u32, BTreeMap<u16, f64>> {
        &self.buckets
    }

    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    pub fn n_buckets_used(&self) -> usize {
        self.buckets.len()
    }

    pub fn n_nonzero_entries(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }
}

impl Scorer for HashedModel {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn scores(&self, features: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.n_classes];
        for feature in features {
            if let Some(row) = self.buckets.get(&bucket(feature, self.num_buckets)) {
                for (&class, &weight) in row {
                    scores[class as usize] += weight;
                }
            }
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{bucket, fnv1a_32, HashedModel};
    use crate::perceptron::{FrozenWeights, Scorer};

    #[test]
    fn fnv_matches_reference_values() {
        // Reference values from an independent implementation of the
        // documented algorithm.
        assert_eq!(fnv1a_32(""), 0x811c_9dc5);
        assert_eq!(fnv1a_32("a"), 0xe40c_292c);
        assert_eq!(fnv1a_32("bias"), 0xba46_7ec4);
        assert_eq!(fnv1a_32("word=The"), 0x3f04_9e5b);
        assert_eq!(fnv1a_32("is_first"), 0x5574_ddbc);
        assert_eq!(fnv1a_32("s0.t=_NULL_"), 0x2a22_a0f2);
    }

    #[test]
    fn bucket_assignment_is_modular() {
        assert_eq!(bucket("bias", 1 << 18), 163_524);
        assert_eq!(bucket("suffix3=The", 1 << 18), 135_883);
    }

    fn frozen(entries: &[(&str, usize, f64)], n_classes: usize) -> FrozenWeights {
        let mut weights: BTreeMap<String, BTreeMap<usize, f64>> = BTreeMap::new();
        for (feature, class, weight) in entries {
            weights
                .entry((*feature).to_owned())
                .or_insert_with(BTreeMap::new)
                .insert(*class, *weight);
        }
        FrozenWeights::new(weights, n_classes)
    }

    #[test]
    fn colliding_keys_sum_their_weights() {
        // "bias" and "a" both land in bucket 0 under two buckets.
        assert_eq!(bucket("bias", 2), 0);
        assert_eq!(bucket("a", 2), 0);

        let mut hashed =
            HashedModel::from_frozen(&frozen(&[("bias", 0, 1.204), ("a", 0, 2.304)], 1), 2);
        hashed.round_weights(2);

        let row = &hashed.buckets()[&0];
        assert!((row[&0] - 3.51).abs() < 1e-9);
        assert_eq!(hashed.n_buckets_used(), 1);
    }

    #[test]
    fn pruning_drops_entries_and_empty_buckets() {
        let mut hashed = HashedModel::from_frozen(
            &frozen(&[("bias", 0, 0.02), ("bias", 1, -4.0), ("word=The", 0, 0.01)], 2),
            1 << 18,
        );
        hashed.round_weights(2);
        hashed.prune(0.1);

        assert_eq!(hashed.n_nonzero_entries(), 1);
        assert_eq!(hashed.n_buckets_used(), 1);
        let row = &hashed.buckets()[&super::bucket("bias", 1 << 18)];
        assert!((row[&1] + 4.0).abs() < 1e-9);
    }

    #[test]
    fn hashed_scores_match_frozen_scores_without_collisions() {
        let frozen = frozen(&[("bias", 0, 1.5), ("word=The", 1, -2.0)], 2);
        let hashed = HashedModel::from_frozen(&frozen, 1 << 18);

        let features = vec!["bias".to_owned(), "word=The".to_owned()];
        assert_eq!(frozen.scores(&features), hashed.scores(&features));
    }
}
