//! Evaluation: tagging accuracy, attachment scores, greedy decoding and
//! the non-projectivity diagnostic.

use fnv::FnvHashMap;

use crate::conllu::Sentence;
use crate::features::{parse_features, pos_features, START, START2};
use crate::perceptron::{argmax_margin, Scorer};
use crate::system::{ParserState, Transition};
use crate::vocab::{TagDict, TransitionSet};

pub fn sentence_forms(sentence: &Sentence) -> Vec<String> {
    sentence.iter().map(|t| t.form.clone()).collect()
}

pub fn sentence_tags(sentence: &Sentence) -> Vec<String> {
    sentence.iter().map(|t| t.xpos.clone()).collect()
}

/// Gold heads indexed by token id; index 0 is an unused slot for ROOT.
pub fn gold_heads(sentence: &Sentence) -> Vec<usize> {
    let mut heads = Vec::with_capacity(sentence.len() + 1);
    heads.push(0);
    heads.extend(sentence.iter().map(|t| t.head));
    heads
}

/// Gold labels indexed by token id; index 0 is an unused slot for ROOT.
pub fn gold_labels(sentence: &Sentence) -> Vec<String> {
    let mut labels = Vec::with_capacity(sentence.len() + 1);
    labels.push(String::new());
    labels.extend(sentence.iter().map(|t| t.deprel.clone()));
    labels
}

/// Tag one sentence greedily left to right with the *predicted* tag
/// history, consulting the tag dictionary first.
pub fn tag_sentence<S: Scorer>(
    scorer: &S,
    forms: &[String],
    classes: &[String],
    class_index: &FnvHashMap<String, usize>,
    tagdict: &TagDict,
) -> Vec<String> {
    let all_classes: Vec<usize> = (0..classes.len()).collect();
    let mut prev = START.to_owned();
    let mut prev2 = START2.to_owned();
    let mut tags = Vec::with_capacity(forms.len());

    for i in 0..forms.len() {
        let tag = match tagdict.get(&forms[i]) {
            Some(tag) => tag.to_owned(),
            None => {
                let features = pos_features(i, forms, &prev, &prev2);
                let (class, _) = argmax_margin(&scorer.scores(&features), &all_classes);
                classes[class].clone()
            }
        };
        prev2 = prev;
        prev = tag.clone();
        tags.push(tag);
    }

    // Touch the index so dictionary tags outside the class set would
    // surface as a bug in debug builds.
    debug_assert!(tags.iter().all(|t| class_index.contains_key(t)));

    tags
}

/// Tagging accuracy over a split.
pub fn tag_accuracy<S: Scorer>(
    scorer: &S,
    sentences: &[Sentence],
    classes: &[String],
    class_index: &FnvHashMap<String, usize>,
    tagdict: &TagDict,
) -> f64 {
    let mut correct = 0usize;
    let mut total = 0usize;

    for sentence in sentences {
        let forms = sentence_forms(sentence);
        let predicted = tag_sentence(scorer, &forms, classes, class_index, tagdict);
        for (token, tag) in sentence.iter().zip(&predicted) {
            total += 1;
            if &token.xpos == tag {
                correct += 1;
            }
        }
    }

    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// A greedy parse: predicted heads and labels for tokens `1..=n` plus the
/// margin of the transition that attached each token (0.0 for tokens swept
/// to ROOT at the end).
pub struct Parse {
    pub heads: Vec<usize>,
    pub labels: Vec<String>,
    pub margins: Vec<f64>,
}

/// Greedily decode one sentence with whatever model scores transitions.
pub fn greedy_parse<S: Scorer>(
    scorer: &S,
    forms: &[String],
    tags: &[String],
    transitions: &TransitionSet,
) -> Parse {
    let n = forms.len();
    let mut state = ParserState::new(n);
    let mut margins = vec![0.0; n];

    while !state.is_terminal() {
        let valid = state.valid_indices(transitions);
        if valid.is_empty() {
            break;
        }

        let features = parse_features(&state, forms, tags);
        let (best, margin) = argmax_margin(&scorer.scores(&features), &valid);
        let transition = transitions.get(best).clone();

        match &transition {
            Transition::LeftArc(_) => margins[state.stack_top() - 1] = margin,
            Transition::RightArc(_) => margins[state.buffer(0).unwrap() - 1] = margin,
            _ => (),
        }

        state.apply(&transition);
    }

    state.attach_remaining_to_root();

    Parse {
        heads: state.heads_vec(),
        labels: state.labels_vec(),
        margins,
    }
}

/// Unlabeled and labeled attachment scores of a model over a split.
pub fn attachment_scores<S: Scorer>(
    scorer: &S,
    sentences: &[Sentence],
    transitions: &TransitionSet,
) -> (f64, f64) {
    let mut total = 0usize;
    let mut head_correct = 0usize;
    let mut label_correct = 0usize;

    for sentence in sentences {
        let forms = sentence_forms(sentence);
        let tags = sentence_tags(sentence);
        let parse = greedy_parse(scorer, &forms, &tags, transitions);

        for (i, token) in sentence.iter().enumerate() {
            total += 1;
            if parse.heads[i] == token.head {
                head_correct += 1;
                if parse.labels[i] == token.deprel {
                    label_correct += 1;
                }
            }
        }
    }

    if total == 0 {
        (0.0, 0.0)
    } else {
        (
            head_correct as f64 / total as f64,
            label_correct as f64 / total as f64,
        )
    }
}

/// Whether the arc for token `i` crosses any other arc of the sentence.
fn arc_crosses(i: usize, heads: &[usize]) -> bool {
    let (lo, hi) = span(i, heads[i]);
    for j in 1..heads.len() {
        if j == i {
            continue;
        }
        let (dep, head) = (j, heads[j]);
        if (strictly_inside(dep, lo, hi) && outside(head, lo, hi))
            || (strictly_inside(head, lo, hi) && outside(dep, lo, hi))
        {
            return true;
        }
    }
    false
}

fn span(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn strictly_inside(x: usize, lo: usize, hi: usize) -> bool {
    x > lo && x < hi
}

fn outside(x: usize, lo: usize, hi: usize) -> bool {
    x < lo || x > hi
}

/// Sentence-level and arc-level non-projectivity rates of gold trees.
pub fn non_projectivity(sentences: &[Sentence]) -> (f64, f64) {
    let mut n_sentences = 0usize;
    let mut crossing_sentences = 0usize;
    let mut n_arcs = 0usize;
    let mut crossing_arcs = 0usize;

    for sentence in sentences {
        if sentence.is_empty() {
            continue;
        }
        n_sentences += 1;
        let heads = gold_heads(sentence);

        let mut sentence_crosses = false;
        for i in 1..heads.len() {
            n_arcs += 1;
            if arc_crosses(i, &heads) {
                crossing_arcs += 1;
                sentence_crosses = true;
            }
        }
        if sentence_crosses {
            crossing_sentences += 1;
        }
    }

    let sentence_rate = if n_sentences == 0 {
        0.0
    } else {
        crossing_sentences as f64 / n_sentences as f64
    };
    let arc_rate = if n_arcs == 0 {
        0.0
    } else {
        crossing_arcs as f64 / n_arcs as f64
    };

    (sentence_rate, arc_rate)
}

#[cfg(test)]
mod tests {
    use fnv::FnvHashMap;

    use super::{non_projectivity, tag_sentence};
    use crate::conllu::{Sentence, Token};
    use crate::perceptron::Scorer;
    use crate::vocab::TagDict;

    struct ZeroScorer(usize);

    impl Scorer for ZeroScorer {
        fn n_classes(&self) -> usize {
            self.0
        }

        fn scores(&self, _features: &[String]) -> Vec<f64> {
            vec![0.0; self.0]
        }
    }

    fn deps(heads: &[usize]) -> Sentence {
        heads
            .iter()
            .map(|&head| Token {
                form: "w".to_owned(),
                xpos: "NN".to_owned(),
                head,
                deprel: "dep".to_owned(),
            })
            .collect()
    }

    #[test]
    fn projective_tree_has_no_crossings() {
        let sentences = vec![deps(&[2, 0, 2, 5, 3])];
        assert_eq!(non_projectivity(&sentences), (0.0, 0.0));
    }

    #[test]
    fn crossing_arcs_are_counted() {
        // 1 -> 3 and 2 -> 4 cross.
        let sentences = vec![deps(&[3, 4, 0, 3]), deps(&[2, 0])];
        let (sentence_rate, arc_rate) = non_projectivity(&sentences);
        assert_eq!(sentence_rate, 0.5);
        assert!(arc_rate > 0.0);
    }

    #[test]
    fn tag_dictionary_short_circuits_prediction() {
        let mut sentences = Vec::new();
        for _ in 0..5 {
            sentences.push(deps(&[0]));
        }
        let dict = TagDict::build(&sentences);
        assert_eq!(dict.get("w"), Some("NN"));

        let classes = vec!["DT".to_owned(), "NN".to_owned()];
        let class_index: FnvHashMap<String, usize> = classes
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, c)| (c, i))
            .collect();

        // The zero scorer would pick "DT" (first class); the dictionary
        // overrides it.
        let tags = tag_sentence(
            &ZeroScorer(2),
            &["w".to_owned()],
            &classes,
            &class_index,
            &dict,
        );
        assert_eq!(tags, vec!["NN".to_owned()]);
    }
}
