//! Training driver for the averaged-perceptron POS tagger.

use std::fs;

use anyhow::Result;
use fnv::FnvHashMap;
use log::{info, warn};
use rand::seq::SliceRandom;

use crate::app::{epoch_bar, PosApp};
use crate::config::{
    ACCEPT_POS_DEV_ACCURACY, CORPUS_LICENSE, MAX_PRUNED_JSON_BYTES, QUICK_EVAL_SENTENCES,
    QUICK_TRAIN_SENTENCES,
};
use crate::conllu::{read_split, Sentence};
use crate::eval::{sentence_forms, tag_accuracy};
use crate::features::{pos_features, START, START2};
use crate::io::{named_weights, write_json, PosModel, PosProvenance};
use crate::io::{POS_WEIGHTS_FILE, POS_WEIGHTS_PRUNED_FILE};
use crate::perceptron::AveragedPerceptron;
use crate::util;
use crate::vocab::{collect_classes, TagDict};

/// Train the tagger and write both POS artifacts.
///
/// Returns whether the run met the acceptance thresholds; artifacts are
/// written either way.
pub fn run(app: &PosApp) -> Result<bool> {
    let common = app.common_config();
    let treebank = app.treebank_dir();

    let mut train = read_split(&treebank, "train")?;
    let mut dev = read_split(&treebank, "dev")?;
    let mut test = read_split(&treebank, "test")?;
    if common.quick {
        train.truncate(QUICK_TRAIN_SENTENCES);
        dev.truncate(QUICK_EVAL_SENTENCES);
        test.truncate(QUICK_EVAL_SENTENCES);
    }

    let classes = collect_classes(&[&train, &dev, &test]);
    let class_index: FnvHashMap<String, usize> = classes
        .iter()
        .cloned()
        .enumerate()
        .map(|(idx, class)| (class, idx))
        .collect();
    let tagdict = TagDict::build(&train);

    info!(
        "{} train / {} dev / {} test sentences, {} classes, {} dictionary words",
        train.len(),
        dev.len(),
        test.len(),
        classes.len(),
        tagdict.len()
    );

    let epochs = common.effective_epochs();
    let mut model = AveragedPerceptron::new(classes.len());
    let all_classes: Vec<usize> = (0..classes.len()).collect();
    let mut rng = util::shuffle_rng(common.seed);
    let mut order: Vec<usize> = (0..train.len()).collect();

    for epoch in 1..=epochs {
        order.shuffle(&mut rng);
        let bar = epoch_bar(train.len() as u64, epoch, epochs);
        let mut correct = 0usize;
        let mut total = 0usize;

        for &idx in &order {
            let sentence: &Sentence = &train[idx];
            let forms = sentence_forms(sentence);
            let mut prev = START.to_owned();
            let mut prev2 = START2.to_owned();

            for (i, token) in sentence.iter().enumerate() {
                let features = pos_features(i, &forms, &prev, &prev2);
                let (guess, _) = model.predict(&features, &all_classes);
                let truth = class_index[&token.xpos];
                model.update(truth, guess, &features);

                if guess == truth {
                    correct += 1;
                }
                total += 1;

                // Teacher forcing: the tag history fed to the next token
                // is gold, not the prediction.
                prev2 = prev;
                prev = token.xpos.clone();
            }

            bar.inc(1);
        }

        bar.set_message(&format!(
            "train acc: {:.4}",
            correct as f64 / total.max(1) as f64
        ));
        bar.finish();

        let dev_accuracy = tag_accuracy(&model, &dev, &classes, &class_index, &tagdict);
        info!("epoch {}/{}: dev accuracy {:.4}", epoch, epochs, dev_accuracy);
    }

    let frozen = model.average_weights();
    let dev_accuracy = tag_accuracy(&frozen, &dev, &classes, &class_index, &tagdict);
    let test_accuracy = tag_accuracy(&frozen, &test, &classes, &class_index, &tagdict);
    info!(
        "averaged weights: dev accuracy {:.4}, test accuracy {:.4}, {} features",
        dev_accuracy,
        test_accuracy,
        frozen.n_features()
    );

    let corpus = treebank
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "UD_English-EWT".to_owned());

    let provenance = PosProvenance {
        script_version: env!("CARGO_PKG_VERSION").to_owned(),
        git_commit: util::git_short_hash(),
        corpus_version: corpus.clone(),
        trained_date: util::utc_date(),
        license: CORPUS_LICENSE.to_owned(),
        seed: common.seed,
        iterations: epochs,
        dev_accuracy,
        prune_threshold: None,
        post_prune_dev_accuracy: None,
    };

    let output = app.output_dir();
    fs::create_dir_all(&output)?;

    let full = PosModel {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        tagset: "PTB-XPOS".to_owned(),
        trained_on: corpus.clone(),
        provenance: provenance.clone(),
        classes: classes.clone(),
        tagdict: tagdict.as_map().clone(),
        weights: named_weights(&frozen, &classes, 3),
    };
    let full_size = write_json(&output.join(POS_WEIGHTS_FILE), &full)?;
    info!("wrote {} ({} bytes)", POS_WEIGHTS_FILE, full_size);

    let threshold = app.pos_config().prune_threshold;
    let pruned = frozen.pruned(threshold);
    let post_prune_dev_accuracy = tag_accuracy(&pruned, &dev, &classes, &class_index, &tagdict);
    info!(
        "pruned at |w| < {}: {} features, dev accuracy {:.4} (drop {:.4})",
        threshold,
        pruned.n_features(),
        post_prune_dev_accuracy,
        dev_accuracy - post_prune_dev_accuracy
    );

    let pruned_model = PosModel {
        provenance: PosProvenance {
            prune_threshold: Some(threshold),
            post_prune_dev_accuracy: Some(post_prune_dev_accuracy),
            ..provenance
        },
        weights: named_weights(&pruned, &classes, 3),
        ..full
    };
    let pruned_size = write_json(&output.join(POS_WEIGHTS_PRUNED_FILE), &pruned_model)?;
    info!("wrote {} ({} bytes)", POS_WEIGHTS_PRUNED_FILE, pruned_size);

    let mut accepted = true;
    if dev_accuracy < ACCEPT_POS_DEV_ACCURACY {
        warn!(
            "dev accuracy {:.4} below acceptance threshold {:.4}",
            dev_accuracy, ACCEPT_POS_DEV_ACCURACY
        );
        accepted = false;
    }
    if pruned_size > MAX_PRUNED_JSON_BYTES {
        warn!(
            "{} is {} bytes, above the {} byte cap",
            POS_WEIGHTS_PRUNED_FILE, pruned_size, MAX_PRUNED_JSON_BYTES
        );
        accepted = false;
    }

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use fnv::FnvHashMap;

    use crate::eval::{sentence_forms, tag_sentence};
    use crate::features::{pos_features, START, START2};
    use crate::perceptron::AveragedPerceptron;
    use crate::vocab::{collect_classes, TagDict};

    use crate::conllu::{Sentence, Token};

    fn sentence(pairs: &[(&str, &str)]) -> Sentence {
        pairs
            .iter()
            .map(|(form, xpos)| Token {
                form: (*form).to_owned(),
                xpos: (*xpos).to_owned(),
                head: 0,
                deprel: "root".to_owned(),
            })
            .collect()
    }

    #[test]
    fn one_iteration_fits_a_tiny_sentence() {
        let train = vec![sentence(&[
            ("The", "DT"),
            ("cat", "NN"),
            ("sat", "VBD"),
            (".", "."),
        ])];
        let classes = collect_classes(&[&train]);
        let class_index: FnvHashMap<String, usize> = classes
            .iter()
            .cloned()
            .enumerate()
            .map(|(idx, class)| (class, idx))
            .collect();
        let all_classes: Vec<usize> = (0..classes.len()).collect();

        let mut model = AveragedPerceptron::new(classes.len());
        let forms = sentence_forms(&train[0]);
        let mut prev = START.to_owned();
        let mut prev2 = START2.to_owned();
        for (i, token) in train[0].iter().enumerate() {
            let features = pos_features(i, &forms, &prev, &prev2);
            let (guess, _) = model.predict(&features, &all_classes);
            model.update(class_index[&token.xpos], guess, &features);
            prev2 = prev;
            prev = token.xpos.clone();
        }

        // No word reaches the dictionary thresholds here.
        let tagdict = TagDict::build(&train);
        assert!(tagdict.is_empty());

        let predicted = tag_sentence(&model, &forms, &classes, &class_index, &tagdict);
        assert_eq!(predicted, vec!["DT", "NN", "VBD", "."]);
    }
}
