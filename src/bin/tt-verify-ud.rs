//! Validates presence and integrity of the UD treebank before training.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;

use clap::{App, AppSettings, Arg};

use tagtrain::read_split;

static TREEBANK: &str = "TREEBANK";

/// Split name, minimum sentence count, minimum token count.
static REQUIRED_SPLITS: &[(&str, usize, usize)] = &[
    ("train", 12_000, 200_000),
    ("dev", 2_000, 25_000),
    ("test", 2_000, 25_000),
];

/// Core Penn-Treebank tags every usable treebank must exhibit.
static REQUIRED_XPOS: &[&str] = &[
    "NN", "NNS", "NNP", "NNPS", "VB", "VBD", "VBG", "VBN", "VBP", "VBZ", "DT", "IN", "JJ", "RB",
    "CC", "PRP", "MD", "TO", "CD", "WDT", "WP",
];

fn main() {
    let matches = App::new("tt-verify-ud")
        .settings(&[AppSettings::DontCollapseArgsInUsage])
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name(TREEBANK)
                .help("Treebank directory")
                .index(1)
                .default_value("training/data/UD_English-EWT"),
        )
        .get_matches();

    let treebank = PathBuf::from(matches.value_of(TREEBANK).unwrap());
    println!("Treebank directory: {}", treebank.display());
    println!();

    let mut errors = Vec::new();
    let mut all_xpos = BTreeSet::new();

    for &(split, min_sentences, min_tokens) in REQUIRED_SPLITS {
        // A missing split is reported with the rest, not fatal on its own:
        // the remaining splits and the tag coverage are still checked.
        let sentences = match read_split(&treebank, split) {
            Ok(sentences) => sentences,
            Err(err) => {
                errors.push(format!("{}: {}", split, err));
                continue;
            }
        };

        let n_sentences = sentences.len();
        let n_tokens: usize = sentences.iter().map(Vec::len).sum();
        for sentence in &sentences {
            for token in sentence {
                all_xpos.insert(token.xpos.clone());
            }
        }

        let mut status = "OK";
        if n_sentences < min_sentences {
            errors.push(format!(
                "{}: only {} sentences (expected >= {})",
                split, n_sentences, min_sentences
            ));
            status = "FAIL";
        }
        if n_tokens < min_tokens {
            errors.push(format!(
                "{}: only {} tokens (expected >= {})",
                split, n_tokens, min_tokens
            ));
            status = "FAIL";
        }

        println!("  {}: {} split", status, split);
        println!("        Sentences: {}", n_sentences);
        println!("        Tokens:    {}", n_tokens);
        println!();
    }

    let missing: Vec<&str> = REQUIRED_XPOS
        .iter()
        .copied()
        .filter(|tag| !all_xpos.contains(*tag))
        .collect();
    if missing.is_empty() {
        println!(
            "  OK: all {} required XPOS tags present ({} unique tags in total)",
            REQUIRED_XPOS.len(),
            all_xpos.len()
        );
    } else {
        errors.push(format!("missing required XPOS tags: {:?}", missing));
    }

    if errors.is_empty() {
        println!();
        println!("All checks passed. The treebank is ready for training.");
    } else {
        eprintln!();
        eprintln!("ERRORS:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        process::exit(1);
    }
}
