use serde::Serialize;

/// Maximum UAS/LAS loss tolerated after feature hashing.
pub const MAX_ACCURACY_DROP: f64 = 0.003;

/// Size cap for the pruned JSON artifacts.
pub const MAX_PRUNED_JSON_BYTES: u64 = 5 * 1024 * 1024;

/// Minimum number of calibration bins for an accepted model.
pub const MIN_CALIBRATION_BINS: usize = 5;

/// Dev-accuracy acceptance threshold for the POS tagger.
pub const ACCEPT_POS_DEV_ACCURACY: f64 = 0.95;

/// Test-UAS acceptance threshold for the parser.
pub const ACCEPT_UAS: f64 = 0.85;

/// Test-LAS acceptance threshold for the parser.
pub const ACCEPT_LAS: f64 = 0.82;

/// Split caps applied in quick mode.
pub const QUICK_TRAIN_SENTENCES: usize = 1000;
pub const QUICK_EVAL_SENTENCES: usize = 200;
pub const QUICK_EPOCHS: u32 = 2;

/// License of the UD_English-EWT treebank, recorded in provenance.
pub const CORPUS_LICENSE: &str = "CC BY-SA 4.0";

/// Hyperparameters shared by both trainers.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CommonConfig {
    /// The number of training epochs.
    pub epochs: u32,

    /// Seed of the shuffle RNG; the exploration RNG is derived from it.
    pub seed: u64,

    /// Train on capped splits with `QUICK_EPOCHS` epochs.
    pub quick: bool,
}

impl CommonConfig {
    pub fn effective_epochs(&self) -> u32 {
        if self.quick {
            QUICK_EPOCHS
        } else {
            self.epochs
        }
    }
}

/// Hyperparameters of the POS tagger.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct PosConfig {
    /// Absolute-weight threshold of the pruned export.
    pub prune_threshold: f64,
}

impl Default for PosConfig {
    fn default() -> Self {
        PosConfig {
            prune_threshold: 1.0,
        }
    }
}

/// Hyperparameters of the dependency parser.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct DepsConfig {
    /// Probability of following the model's own prediction during
    /// training instead of the oracle transition.
    pub explore_rate: f64,

    /// Bucket exponent. The hashed model uses 2^buckets_exp buckets.
    pub buckets_exp: u32,

    /// Absolute-weight threshold applied after hashing and rounding.
    pub prune_threshold: f64,
}

impl DepsConfig {
    pub fn num_buckets(&self) -> u32 {
        1 << self.buckets_exp
    }
}

impl Default for DepsConfig {
    fn default() -> Self {
        DepsConfig {
            explore_rate: 0.1,
            buckets_exp: 18,
            prune_threshold: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CommonConfig, DepsConfig, QUICK_EPOCHS};

    #[test]
    fn quick_mode_overrides_epochs() {
        let config = CommonConfig {
            epochs: 10,
            seed: 1,
            quick: true,
        };
        assert_eq!(config.effective_epochs(), QUICK_EPOCHS);
    }

    #[test]
    fn bucket_exponent_is_a_power_of_two() {
        assert_eq!(DepsConfig::default().num_buckets(), 262_144);
    }
}
