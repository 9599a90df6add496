//! Averaged perceptron with lazy averaging.
//!
//! One learner serves both models: classes are the XPOS tags for the POS
//! tagger and the transitions for the parser. The deployed weights are the
//! average of every weight vector visited during training, computed lazily
//! from per-cell totals and timestamps (Collins 2002, Honnibal 2013).

use std::collections::BTreeMap;

use fnv::FnvHashMap;

/// Live weight cell: current weight, the accumulated weight-steps product
/// and the step at which the accumulator was last brought up to date.
#[derive(Clone, Copy, Debug, Default)]
struct Cell {
    weight: f64,
    total: f64,
    timestamp: u64,
}

/// Anything that can score a feature bag over a fixed class set.
///
/// Implemented by the live perceptron, the frozen averaged weights and the
/// bucket-hashed model, so evaluation runs identically over all three.
pub trait Scorer {
    fn n_classes(&self) -> usize;

    fn scores(&self, features: &[String]) -> Vec<f64>;
}

/// Argmax over `valid` class indices, plus the margin between the two best
/// candidates (0.0 when there are fewer than two).
///
/// Ties break toward the earlier entry of `valid`, which callers keep in
/// the fixed sorted class order.
pub fn argmax_margin(scores: &[f64], valid: &[usize]) -> (usize, f64) {
    assert!(!valid.is_empty(), "prediction over an empty candidate set");

    let mut best = valid[0];
    let mut best_score = scores[best];
    let mut second_score = f64::NEG_INFINITY;

    for &class in &valid[1..] {
        let score = scores[class];
        if score > best_score {
            second_score = best_score;
            best = class;
            best_score = score;
        } else if score > second_score {
            second_score = score;
        }
    }

    let margin = if valid.len() < 2 {
        0.0
    } else {
        best_score - second_score
    };

    (best, margin)
}

pub struct AveragedPerceptron {
    weights: FnvHashMap<String, FnvHashMap<u32, Cell>>,
    n_classes: usize,
    steps: u64,
}

impl AveragedPerceptron {
    pub fn new(n_classes: usize) -> Self {
        AveragedPerceptron {
            weights: FnvHashMap::default(),
            n_classes,
            steps: 0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn predict(&self, features: &[String], valid: &[usize]) -> (usize, f64) {
        argmax_margin(&self.scores(features), valid)
    }

    /// One perceptron update. The step counter advances even when the
    /// guess was correct; averaging depends on that.
    pub fn update(&mut self, truth: usize, guess: usize, features: &[String]) {
        self.steps += 1;
        if truth == guess {
            return;
        }

        let steps = self.steps;
        for feature in features {
            let row = self
                .weights
                .entry(feature.clone())
                .or_insert_with(FnvHashMap::default);
            for &(class, delta) in &[(truth, 1.0), (guess, -1.0)] {
                let cell = row.entry(class as u32).or_insert_with(Cell::default);
                cell.total += (steps - cell.timestamp) as f64 * cell.weight;
                cell.timestamp = steps;
                cell.weight += delta;
            }
        }
    }

    /// Freeze the learner into its averaged weights. Weights that average
    /// to exactly zero are dropped, as are features left without classes.
    pub fn average_weights(mut self) -> FrozenWeights {
        self.steps += 1;
        let steps = self.steps;

        let mut averaged = BTreeMap::new();
        for (feature, row) in self.weights {
            let mut classes = BTreeMap::new();
            for (class, cell) in row {
                let total = cell.total + (steps - cell.timestamp) as f64 * cell.weight;
                let mean = total / steps as f64;
                if mean != 0.0 {
                    classes.insert(class as usize, mean);
                }
            }
            if !classes.is_empty() {
                averaged.insert(feature, classes);
            }
        }

        FrozenWeights {
            weights: averaged,
            n_classes: self.n_classes,
        }
    }
}

impl Scorer for AveragedPerceptron {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn scores(&self, features: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.n_classes];
        for feature in features {
            if let Some(row) = self.weights.get(feature) {
                for (&class, cell) in row {
                    scores[class as usize] += cell.weight;
                }
            }
        }
        scores
    }
}

/// Averaged weights frozen after training: `feature -> class -> weight`.
///
/// Kept as ordered maps so JSON exports and hashing iterate
/// deterministically.
#[derive(Clone, Debug)]
pub struct FrozenWeights {
    pub weights: BTreeMap<String, BTreeMap<usize, f64>>,
    n_classes: usize,
}

impl FrozenWeights {
    pub fn new(weights: BTreeMap<String, BTreeMap<usize, f64>>, n_classes: usize) -> Self {
        FrozenWeights { weights, n_classes }
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    /// Copy with every weight below `threshold` in magnitude removed.
    pub fn pruned(&self, threshold: f64) -> FrozenWeights {
        let mut weights = BTreeMap::new();
        for (feature, row) in &self.weights {
            let kept: BTreeMap<usize, f64> = row
                .iter()
                .filter(|(_, &weight)| weight.abs() >= threshold)
                .map(|(&class, &weight)| (class, weight))
                .collect();
            if !kept.is_empty() {
                weights.insert(feature.clone(), kept);
            }
        }
        FrozenWeights {
            weights,
            n_classes: self.n_classes,
        }
    }
}

impl Scorer for FrozenWeights {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn scores(&self, features: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.n_classes];
        for feature in features {
            if let Some(row) = self.weights.get(feature) {
                for (&class, &weight) in row {
                    scores[class] += weight;
                }
            }
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::{argmax_margin, AveragedPerceptron, Scorer};

    fn feats(names: &[&str]) -> Vec<String> {
        names.iter().map(|f| (*f).to_owned()).collect()
    }

    #[test]
    fn steps_advance_on_every_update() {
        let mut model = AveragedPerceptron::new(3);
        let features = feats(&["bias"]);

        model.update(0, 0, &features);
        model.update(1, 0, &features);
        model.update(2, 2, &features);
        assert_eq!(model.steps(), 3);
    }

    #[test]
    fn ties_break_by_candidate_order() {
        let model = AveragedPerceptron::new(3);
        let (class, margin) = model.predict(&feats(&["bias"]), &[0, 1, 2]);
        assert_eq!(class, 0);
        assert_eq!(margin, 0.0);

        let (class, _) = model.predict(&feats(&["bias"]), &[2, 1]);
        assert_eq!(class, 2);
    }

    #[test]
    fn margin_is_zero_for_single_candidate() {
        let mut model = AveragedPerceptron::new(2);
        model.update(1, 0, &feats(&["bias"]));
        let (class, margin) = model.predict(&feats(&["bias"]), &[1]);
        assert_eq!(class, 1);
        assert_eq!(margin, 0.0);
    }

    #[test]
    fn margin_is_top_minus_second() {
        let mut model = AveragedPerceptron::new(2);
        let features = feats(&["bias", "word=x"]);
        model.update(1, 0, &features);

        // Class 1 scores +2, class 0 scores -2 over the two features.
        let (class, margin) = model.predict(&features, &[0, 1]);
        assert_eq!(class, 1);
        assert!((margin - 4.0).abs() < 1e-12);
    }

    #[test]
    fn lazy_averaging_matches_hand_computation() {
        let mut model = AveragedPerceptron::new(2);
        let features = feats(&["bias"]);

        // Step 1: wrong guess, weight[bias][1] becomes +1.
        model.update(1, 0, &features);
        // Steps 2-3: correct, weights untouched.
        model.update(1, 1, &features);
        model.update(1, 1, &features);

        // Freezing advances to step 4. Class 1 carried weight 1.0 from
        // step 1 on: total = (4 - 1) * 1 = 3, mean = 3/4.
        let frozen = model.average_weights();
        let row = &frozen.weights["bias"];
        assert!((row[&1] - 0.75).abs() < 1e-12);
        assert!((row[&0] + 0.75).abs() < 1e-12);
    }

    #[test]
    fn zero_averages_are_dropped() {
        let mut model = AveragedPerceptron::new(2);
        let features = feats(&["bias"]);

        // +1 then -1 on the same cell, then freeze immediately: the
        // up-then-down trajectory still leaves a nonzero mean, but a cell
        // never touched stays absent.
        model.update(1, 0, &features);
        model.update(0, 1, &features);
        let frozen = model.average_weights();

        assert!(frozen.weights.get("unseen").is_none());
        for row in frozen.weights.values() {
            for weight in row.values() {
                assert_ne!(*weight, 0.0);
            }
        }
    }

    #[test]
    fn pruning_drops_small_weights_and_empty_features() {
        use std::collections::BTreeMap;

        let mut weights = BTreeMap::new();
        weights.insert(
            "big".to_owned(),
            vec![(0usize, 2.5), (1usize, -0.2)].into_iter().collect(),
        );
        weights.insert(
            "small".to_owned(),
            vec![(0usize, 0.4)].into_iter().collect::<BTreeMap<_, _>>(),
        );
        let frozen = super::FrozenWeights::new(weights, 2);

        let pruned = frozen.pruned(1.0);
        assert_eq!(pruned.n_features(), 1);
        assert_eq!(pruned.weights["big"].len(), 1);
        assert!((pruned.weights["big"][&0] - 2.5).abs() < 1e-12);
    }
}
