//! Training driver for the arc-eager dependency parser, including the
//! post-processing pipeline (hashing, pruning, calibration, binary
//! export).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

use anyhow::{anyhow, Result};
use fnv::FnvHashMap;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::app::{epoch_bar, DepsApp};
use crate::calibration::{CalibrationTable, TARGET_BINS};
use crate::config::{
    ACCEPT_LAS, ACCEPT_UAS, CORPUS_LICENSE, DepsConfig, MAX_ACCURACY_DROP, MAX_PRUNED_JSON_BYTES,
    MIN_CALIBRATION_BINS, QUICK_EVAL_SENTENCES, QUICK_TRAIN_SENTENCES,
};
use crate::conllu::{read_split, Sentence};
use crate::eval::{
    attachment_scores, gold_heads, gold_labels, greedy_parse, non_projectivity, sentence_forms,
    sentence_tags,
};
use crate::features::parse_features;
use crate::hashing::HashedModel;
use crate::io::{
    bucket_weights, named_weights, read_model_binary_file, read_parser_model_full, write_json,
    BinaryMetadata, ParserModelFull, ParserModelPruned, ParserProvenance, WriteModelBinary,
    DEP_CALIBRATION_FILE, DEP_WEIGHTS_BINARY_FILE, DEP_WEIGHTS_FILE, DEP_WEIGHTS_PRUNED_FILE,
};
use crate::oracle::{dynamic_oracle, static_oracle};
use crate::perceptron::{AveragedPerceptron, FrozenWeights};
use crate::system::ParserState;
use crate::util;
use crate::vocab::{collect_labels, TransitionSet};

/// Train the parser (or re-hash an existing full model with
/// `--postprocess`) and write all parser artifacts.
///
/// Returns whether the run met the acceptance thresholds.
pub fn run(app: &DepsApp) -> Result<bool> {
    if app.postprocess() {
        return postprocess(app);
    }

    let common = app.common_config();
    let deps_config = app.deps_config();
    let (train, dev, test) = load_splits(app)?;

    let labels = collect_labels(&[&train, &dev]);
    let transitions = TransitionSet::from_labels(&labels);
    let (np_sentence_rate, np_arc_rate) = non_projectivity(&train);

    info!(
        "{} train / {} dev / {} test sentences, {} labels, {} transitions",
        train.len(),
        dev.len(),
        test.len(),
        labels.len(),
        transitions.len()
    );
    info!(
        "non-projective: {:.4} of sentences, {:.4} of arcs",
        np_sentence_rate, np_arc_rate
    );

    let epochs = common.effective_epochs();
    let mut model = AveragedPerceptron::new(transitions.len());
    let mut shuffle = util::shuffle_rng(common.seed);
    let mut explore = util::explore_rng(common.seed);
    let mut order: Vec<usize> = (0..train.len()).collect();

    for epoch in 1..=epochs {
        order.shuffle(&mut shuffle);
        let bar = epoch_bar(train.len() as u64, epoch, epochs);

        for &idx in &order {
            train_sentence(
                &mut model,
                &train[idx],
                &transitions,
                deps_config.explore_rate,
                &mut explore,
            );
            bar.inc(1);
        }
        bar.finish();

        let (dev_uas, dev_las) = attachment_scores(&model, &dev, &transitions);
        info!(
            "epoch {}/{}: dev UAS {:.4} LAS {:.4}",
            epoch, epochs, dev_uas, dev_las
        );
    }

    let frozen = model.average_weights();
    let (dev_uas, dev_las) = attachment_scores(&frozen, &dev, &transitions);
    let (uas, las) = attachment_scores(&frozen, &test, &transitions);
    info!(
        "averaged weights: test UAS {:.4} LAS {:.4} (dev {:.4}/{:.4}), {} features",
        uas,
        las,
        dev_uas,
        dev_las,
        frozen.n_features()
    );

    let corpus = corpus_name(&app.treebank_dir());
    let provenance = ParserProvenance {
        script_version: env!("CARGO_PKG_VERSION").to_owned(),
        git_commit: util::git_short_hash(),
        corpus_version: corpus.clone(),
        trained_date: util::utc_date(),
        license: CORPUS_LICENSE.to_owned(),
        seed: common.seed,
        iterations: epochs,
        uas,
        las,
        dev_uas,
        dev_las,
        non_projective_sentence_rate: np_sentence_rate,
        non_projective_arc_rate: np_arc_rate,
        post_hash_uas: None,
        post_hash_las: None,
        prune_threshold: None,
    };

    let output = app.output_dir();
    fs::create_dir_all(&output)?;

    let full = ParserModelFull {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        trained_on: corpus,
        provenance: provenance.clone(),
        labels: labels.clone(),
        transitions: transitions.names(),
        weights: named_weights(&frozen, &transitions.names(), 3),
    };
    let full_size = write_json(&output.join(DEP_WEIGHTS_FILE), &full)?;
    info!("wrote {} ({} bytes)", DEP_WEIGHTS_FILE, full_size);

    hash_and_export(
        &frozen,
        &transitions,
        &labels,
        &dev,
        &test,
        &deps_config,
        provenance,
        &output,
    )
}

/// One training sentence: follow the oracle, update against the model's
/// prediction, and occasionally follow the prediction instead.
fn train_sentence<R: Rng>(
    model: &mut AveragedPerceptron,
    sentence: &Sentence,
    transitions: &TransitionSet,
    explore_rate: f64,
    explore: &mut R,
) {
    if sentence.is_empty() {
        return;
    }

    let forms = sentence_forms(sentence);
    let tags = sentence_tags(sentence);
    let heads = gold_heads(sentence);
    let labels = gold_labels(sentence);

    let mut state = ParserState::new(sentence.len());
    while !state.is_terminal() {
        let valid = state.valid_indices(transitions);
        if valid.is_empty() {
            break;
        }

        let features = parse_features(&state, &forms, &tags);
        let (guess, _) = model.predict(&features, &valid);

        // The static oracle may propose nothing, an invalid transition, or
        // a label outside the inventory on non-projective input; the
        // dynamic oracle then picks a minimum-cost valid transition.
        let truth = static_oracle(&state, &heads, &labels)
            .and_then(|transition| transitions.index_of(&transition))
            .filter(|idx| valid.contains(idx))
            .or_else(|| dynamic_oracle(&state, transitions, &valid, &heads, &labels));
        let truth = match truth {
            Some(truth) => truth,
            None => break,
        };

        model.update(truth, guess, &features);

        let follow = if explore.gen::<f64>() < explore_rate {
            guess
        } else {
            truth
        };
        state.apply(transitions.get(follow));
    }
}

/// Hash, prune, calibrate, export and check acceptance. Shared by the
/// training path and `--postprocess`.
#[allow(clippy::too_many_arguments)]
fn hash_and_export(
    frozen: &FrozenWeights,
    transitions: &TransitionSet,
    labels: &[String],
    dev: &[Sentence],
    test: &[Sentence],
    deps_config: &DepsConfig,
    mut provenance: ParserProvenance,
    output: &Path,
) -> Result<bool> {
    let num_buckets = deps_config.num_buckets();
    let mut hashed = HashedModel::from_frozen(frozen, num_buckets);
    hashed.round_weights(2);
    hashed.prune(deps_config.prune_threshold);
    info!(
        "hashed into {} buckets: {} used, {} nonzero entries",
        num_buckets,
        hashed.n_buckets_used(),
        hashed.n_nonzero_entries()
    );

    let (post_hash_uas, post_hash_las) = attachment_scores(&hashed, test, transitions);
    let uas_drop = provenance.uas - post_hash_uas;
    let las_drop = provenance.las - post_hash_las;
    info!(
        "post-hash test UAS {:.4} LAS {:.4} (drop {:.4}/{:.4})",
        post_hash_uas, post_hash_las, uas_drop, las_drop
    );

    let calibration = calibrate(&hashed, dev, transitions);
    info!("calibration table with {} bins", calibration.len());

    provenance.post_hash_uas = Some(post_hash_uas);
    provenance.post_hash_las = Some(post_hash_las);
    provenance.prune_threshold = Some(deps_config.prune_threshold);

    let pruned = ParserModelPruned {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        trained_on: provenance.corpus_version.clone(),
        provenance: provenance.clone(),
        labels: labels.to_vec(),
        transitions: transitions.names(),
        num_buckets,
        weights: bucket_weights(&hashed, &transitions.names()),
    };
    let pruned_size = write_json(&output.join(DEP_WEIGHTS_PRUNED_FILE), &pruned)?;
    info!("wrote {} ({} bytes)", DEP_WEIGHTS_PRUNED_FILE, pruned_size);

    let metadata = BinaryMetadata {
        version: pruned.version.clone(),
        trained_on: pruned.trained_on.clone(),
        provenance: provenance.clone(),
        labels: labels.to_vec(),
        transitions: transitions.names(),
        num_buckets,
    };
    let metadata_bytes = serde_json::to_vec(&metadata)?;

    let binary_path = output.join(DEP_WEIGHTS_BINARY_FILE);
    let mut binary_file = File::create(&binary_path)?;
    hashed.write_model_binary(&mut binary_file, &metadata_bytes)?;
    verify_binary(&binary_path, &hashed)?;
    info!("wrote and verified {}", DEP_WEIGHTS_BINARY_FILE);

    let calibration_size = write_json(&output.join(DEP_CALIBRATION_FILE), &calibration)?;
    info!("wrote {} ({} bytes)", DEP_CALIBRATION_FILE, calibration_size);

    let mut accepted = true;
    if provenance.uas < ACCEPT_UAS {
        warn!("test UAS {:.4} below threshold {:.4}", provenance.uas, ACCEPT_UAS);
        accepted = false;
    }
    if provenance.las < ACCEPT_LAS {
        warn!("test LAS {:.4} below threshold {:.4}", provenance.las, ACCEPT_LAS);
        accepted = false;
    }
    if uas_drop >= MAX_ACCURACY_DROP || las_drop >= MAX_ACCURACY_DROP {
        warn!(
            "hashing drop {:.4}/{:.4} reaches the {:.4} cap",
            uas_drop, las_drop, MAX_ACCURACY_DROP
        );
        accepted = false;
    }
    if pruned_size > MAX_PRUNED_JSON_BYTES {
        warn!(
            "{} is {} bytes, above the {} byte cap",
            DEP_WEIGHTS_PRUNED_FILE, pruned_size, MAX_PRUNED_JSON_BYTES
        );
        accepted = false;
    }
    if calibration.len() < MIN_CALIBRATION_BINS {
        warn!(
            "only {} calibration bins, need at least {}",
            calibration.len(),
            MIN_CALIBRATION_BINS
        );
        accepted = false;
    }

    Ok(accepted)
}

/// Pair every committed dev arc with the margin of the transition that
/// created it and whether its head is correct; tokens swept to ROOT at
/// termination carry margin 0.
fn calibrate(
    hashed: &HashedModel,
    dev: &[Sentence],
    transitions: &TransitionSet,
) -> CalibrationTable {
    let mut samples = Vec::new();
    for sentence in dev {
        if sentence.is_empty() {
            continue;
        }
        let forms = sentence_forms(sentence);
        let tags = sentence_tags(sentence);
        let parse = greedy_parse(hashed, &forms, &tags, transitions);

        for (i, token) in sentence.iter().enumerate() {
            samples.push((parse.margins[i], parse.heads[i] == token.head));
        }
    }

    CalibrationTable::from_samples(samples, TARGET_BINS)
}

/// Re-read the binary artifact and check it rebuilds the hashed model.
fn verify_binary(path: &Path, hashed: &HashedModel) -> Result<()> {
    let read = read_model_binary_file(path)?;

    if read.weights.len() != hashed.n_buckets_used() {
        return Err(anyhow!(
            "binary model has {} buckets, expected {}",
            read.weights.len(),
            hashed.n_buckets_used()
        ));
    }
    for (bucket, row) in hashed.buckets() {
        let read_row = read
            .weights
            .get(bucket)
            .ok_or_else(|| anyhow!("bucket {} missing from binary model", bucket))?;
        for (&class, &weight) in row {
            let read_weight = read_row
                .get(&class)
                .ok_or_else(|| anyhow!("entry {}/{} missing from binary model", bucket, class))?;
            if (f64::from(*read_weight) - weight).abs() > 1e-4 {
                return Err(anyhow!("weight mismatch in bucket {}", bucket));
            }
        }
    }

    Ok(())
}

/// `--postprocess`: re-hash an existing full model without retraining.
fn postprocess(app: &DepsApp) -> Result<bool> {
    let output = app.output_dir();
    let full = read_parser_model_full(&output.join(DEP_WEIGHTS_FILE))?;
    let transitions = TransitionSet::from_names(&full.transitions)?;

    let name_index: FnvHashMap<&str, usize> = full
        .transitions
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut weights = BTreeMap::new();
    for (feature, row) in &full.weights {
        let mut classes = BTreeMap::new();
        for (name, &weight) in row {
            let class = *name_index
                .get(name.as_str())
                .ok_or_else(|| anyhow!("weight for unknown transition: {}", name))?;
            classes.insert(class, weight);
        }
        weights.insert(feature.clone(), classes);
    }
    let frozen = FrozenWeights::new(weights, transitions.len());

    let (_, dev, test) = load_splits(app)?;
    info!(
        "post-processing {} features against {} dev / {} test sentences",
        frozen.n_features(),
        dev.len(),
        test.len()
    );

    hash_and_export(
        &frozen,
        &transitions,
        &full.labels,
        &dev,
        &test,
        &app.deps_config(),
        full.provenance,
        &output,
    )
}

fn load_splits(app: &DepsApp) -> Result<(Vec<Sentence>, Vec<Sentence>, Vec<Sentence>)> {
    let treebank = app.treebank_dir();
    let mut train = read_split(&treebank, "train")?;
    let mut dev = read_split(&treebank, "dev")?;
    let mut test = read_split(&treebank, "test")?;

    if app.common_config().quick {
        train.truncate(QUICK_TRAIN_SENTENCES);
        dev.truncate(QUICK_EVAL_SENTENCES);
        test.truncate(QUICK_EVAL_SENTENCES);
    }

    Ok((train, dev, test))
}

fn corpus_name(treebank_dir: &Path) -> String {
    treebank_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "UD_English-EWT".to_owned())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::train_sentence;
    use crate::conllu::{Sentence, Token};
    use crate::eval::attachment_scores;
    use crate::perceptron::AveragedPerceptron;
    use crate::vocab::{collect_labels, TransitionSet};

    fn sentence(entries: &[(&str, &str, usize, &str)]) -> Sentence {
        entries
            .iter()
            .map(|(form, xpos, head, deprel)| Token {
                form: (*form).to_owned(),
                xpos: (*xpos).to_owned(),
                head: *head,
                deprel: (*deprel).to_owned(),
            })
            .collect()
    }

    #[test]
    fn training_fits_a_tiny_treebank() {
        let train = vec![
            sentence(&[
                ("The", "DT", 2, "det"),
                ("cat", "NN", 3, "nsubj"),
                ("sleeps", "VBZ", 0, "root"),
            ]),
            sentence(&[
                ("A", "DT", 2, "det"),
                ("dog", "NN", 3, "nsubj"),
                ("barks", "VBZ", 0, "root"),
            ]),
        ];

        let labels = collect_labels(&[&train]);
        let transitions = TransitionSet::from_labels(&labels);
        let mut model = AveragedPerceptron::new(transitions.len());
        let mut explore = XorShiftRng::seed_from_u64(7);

        for _ in 0..30 {
            for sentence in &train {
                // No exploration: follow the oracle exactly.
                train_sentence(&mut model, sentence, &transitions, 0.0, &mut explore);
            }
        }

        let (uas, las) = attachment_scores(&model, &train, &transitions);
        assert_eq!(uas, 1.0);
        assert_eq!(las, 1.0);
    }
}
