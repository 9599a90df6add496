//! Confidence calibration for the parser.
//!
//! Every committed arc is paired with the margin of the transition that
//! created it and with whether its head was correct. The pairs are binned
//! by margin and the bin accuracies are made monotone with a
//! pool-adjacent-violators sweep, yielding a margin-to-probability table
//! the runtime can interpolate.

use serde::Serialize;

/// Number of equal-count bins aimed for; small dev sets produce fewer.
pub const TARGET_BINS: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub margin: f64,
    pub probability: f64,
    pub count: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CalibrationTable {
    pub bins: Vec<CalibrationBin>,
}

impl CalibrationTable {
    /// Bin `(margin, head_correct)` samples into at most `target_bins`
    /// equal-count bins sorted by margin, then enforce monotone
    /// non-decreasing probabilities.
    pub fn from_samples(mut samples: Vec<(f64, bool)>, target_bins: usize) -> Self {
        if samples.is_empty() {
            return CalibrationTable::default();
        }

        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let n_bins = target_bins.min(samples.len());
        let mut bins = Vec::with_capacity(n_bins);
        for k in 0..n_bins {
            let start = k * samples.len() / n_bins;
            let end = (k + 1) * samples.len() / n_bins;
            if start == end {
                continue;
            }
            let chunk = &samples[start..end];
            let correct = chunk.iter().filter(|(_, ok)| *ok).count();
            bins.push(CalibrationBin {
                margin: chunk[0].0,
                probability: correct as f64 / chunk.len() as f64,
                count: chunk.len(),
            });
        }

        pool_adjacent_violators(&mut bins);

        CalibrationTable { bins }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Repeatedly average adjacent probability violations until the sequence
/// is non-decreasing.
fn pool_adjacent_violators(bins: &mut [CalibrationBin]) {
    loop {
        let mut changed = false;
        for i in 1..bins.len() {
            if bins[i].probability < bins[i - 1].probability {
                let pooled = (bins[i].probability + bins[i - 1].probability) / 2.0;
                bins[i - 1].probability = pooled;
                bins[i].probability = pooled;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{pool_adjacent_violators, CalibrationBin, CalibrationTable};

    fn bins(probabilities: &[f64]) -> Vec<CalibrationBin> {
        probabilities
            .iter()
            .enumerate()
            .map(|(i, &probability)| CalibrationBin {
                margin: i as f64,
                probability,
                count: 10,
            })
            .collect()
    }

    #[test]
    fn pav_pools_violations() {
        let mut pooled = bins(&[0.5, 0.6, 0.4, 0.7, 0.8]);
        pool_adjacent_violators(&mut pooled);

        let probabilities: Vec<f64> = pooled.iter().map(|b| b.probability).collect();
        assert_eq!(probabilities, vec![0.5, 0.5, 0.5, 0.7, 0.8]);
    }

    #[test]
    fn table_is_sorted_and_monotone() {
        let samples: Vec<(f64, bool)> = vec![
            (3.0, true),
            (0.1, false),
            (5.0, true),
            (0.2, false),
            (1.0, true),
            (2.0, false),
            (4.0, true),
            (6.0, true),
        ];
        let table = CalibrationTable::from_samples(samples, 4);

        assert_eq!(table.len(), 4);
        for window in table.bins.windows(2) {
            assert!(window[0].margin <= window[1].margin);
            assert!(window[0].probability <= window[1].probability);
        }
        assert_eq!(table.bins.iter().map(|b| b.count).sum::<usize>(), 8);
    }

    #[test]
    fn empty_samples_yield_empty_table() {
        assert!(CalibrationTable::from_samples(Vec::new(), 20).is_empty());
    }

    #[test]
    fn serializes_to_the_documented_shape() {
        let table = CalibrationTable {
            bins: vec![CalibrationBin {
                margin: 0.5,
                probability: 0.75,
                count: 4,
            }],
        };
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(
            json,
            r#"{"bins":[{"margin":0.5,"probability":0.75,"count":4}]}"#
        );
    }
}
