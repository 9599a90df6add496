//! Feature templates for the POS tagger and the dependency parser.
//!
//! The exact spelling of every key is a wire contract: the downstream
//! runtime extracts the same strings and hashes them with the same
//! function, so any change here invalidates every shipped model.

use crate::system::ParserState;

/// Previous-tag sentinel at sentence start.
pub const START: &str = "-START-";
/// Previous-previous-tag sentinel at sentence start.
pub const START2: &str = "-START2-";
/// Next-word sentinel at sentence end.
pub const END: &str = "-END-";
/// Sentinel for an absent word or tag position.
pub const NULL: &str = "_NULL_";
/// Sentinel for an absent dependency label.
pub const NONE_LABEL: &str = "_NONE_";

/// Collapse a word into a character-shape abstraction: uppercase to `X`,
/// lowercase to `x`, digits to `d`, anything else kept literally, with
/// consecutive runs of the same output character collapsed.
pub fn word_shape(word: &str) -> String {
    let mut shape = String::new();
    let mut last = None;

    for ch in word.chars() {
        let mapped = if ch.is_ascii_uppercase() {
            'X'
        } else if ch.is_ascii_lowercase() {
            'x'
        } else if ch.is_ascii_digit() {
            'd'
        } else {
            ch
        };

        if last != Some(mapped) {
            shape.push(mapped);
            last = Some(mapped);
        }
    }

    shape
}

fn suffix(word: &str, n: usize) -> String {
    let chars: Vec<char> = word.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

fn prefix(word: &str, n: usize) -> String {
    word.chars().take(n).collect()
}

fn is_upper(word: &str) -> bool {
    let mut saw_letter = false;
    for ch in word.chars() {
        if ch.is_alphabetic() {
            saw_letter = true;
            if !ch.is_uppercase() {
                return false;
            }
        }
    }
    saw_letter
}

fn is_title(word: &str) -> bool {
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) => first.is_uppercase() && second.is_lowercase(),
        _ => false,
    }
}

fn is_digit(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

fn has_digit(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_digit()) && !is_digit(word)
}

/// The POS template for the token at `i`, with the (gold or predicted) tags
/// of the two preceding tokens.
pub fn pos_features(i: usize, words: &[String], prev: &str, prev2: &str) -> Vec<String> {
    let word = words[i].as_str();
    let lower = word.to_lowercase();
    let prev_word = if i >= 1 { words[i - 1].as_str() } else { START };
    let next_word = words.get(i + 1).map(|w| w.as_str()).unwrap_or(END);

    let mut features = vec![
        "bias".to_owned(),
        format!("word={}", word),
        format!("word.lower={}", lower),
        format!("suffix1={}", suffix(word, 1)),
        format!("suffix2={}", suffix(word, 2)),
        format!("suffix3={}", suffix(word, 3)),
        format!("prefix1={}", prefix(word, 1)),
        format!("shape={}", word_shape(word)),
        format!("prev.word={}", prev_word),
        format!("prev.word.lower={}", prev_word.to_lowercase()),
        format!("prev.tag={}", prev),
        format!("prev2.tag={}", prev2),
        format!("prev.word+prev.tag={}|{}", prev_word, prev),
        format!("prev.tag+word={}|{}", prev, word),
        format!("prev2.tag+prev.tag={}|{}", prev2, prev),
        format!("next.word={}", next_word),
        format!("next.word.lower={}", next_word.to_lowercase()),
        format!("next.suffix3={}", suffix(next_word, 3)),
    ];

    if is_upper(word) {
        features.push("is_upper".to_owned());
    }
    if is_title(word) {
        features.push("is_title".to_owned());
    }
    if is_digit(word) {
        features.push("is_digit".to_owned());
    }
    if has_digit(word) {
        features.push("has_digit".to_owned());
    }
    if word.contains('-') {
        features.push("is_hyphen".to_owned());
    }
    if i == 0 {
        features.push("is_first".to_owned());
    }

    features
}

/// Word of a position: `_NULL_` when absent, `_ROOT_` for the artificial
/// ROOT node, the surface form otherwise.
fn word_at(id: Option<usize>, forms: &[String]) -> String {
    match id {
        None => NULL.to_owned(),
        Some(0) => "_ROOT_".to_owned(),
        Some(id) => forms[id - 1].clone(),
    }
}

fn tag_at(id: Option<usize>, tags: &[String]) -> String {
    match id {
        None => NULL.to_owned(),
        Some(0) => "_ROOT_".to_owned(),
        Some(id) => tags[id - 1].clone(),
    }
}

fn child_label(state: &ParserState, id: Option<usize>, left: bool) -> String {
    id.and_then(|id| {
        if left {
            state.left_child_label(id)
        } else {
            state.right_child_label(id)
        }
    })
    .unwrap_or(NONE_LABEL)
    .to_owned()
}

/// The parser template for a configuration.
///
/// `forms` and `tags` hold the surface forms and XPOS tags of tokens
/// `1..=n` at indices `0..n`.
pub fn parse_features(state: &ParserState, forms: &[String], tags: &[String]) -> Vec<String> {
    let s0 = Some(state.stack_top());
    let s1 = state.stack_second();
    let b0 = state.buffer(0);
    let b1 = state.buffer(1);
    let b2 = state.buffer(2);

    let s0_id = state.stack_top();

    let s0_w = word_at(s0, forms);
    let s0_wl = s0_w.to_lowercase();
    let s0_t = tag_at(s0, tags);
    let s1_w = word_at(s1, forms);
    let s1_t = tag_at(s1, tags);
    let b0_w = word_at(b0, forms);
    let b0_wl = b0_w.to_lowercase();
    let b0_t = tag_at(b0, tags);
    let b1_w = word_at(b1, forms);
    let b1_t = tag_at(b1, tags);
    let b2_w = word_at(b2, forms);
    let b2_t = tag_at(b2, tags);

    let s0_ll = child_label(state, s0, true);
    let s0_rl = child_label(state, s0, false);
    let s1_ll = child_label(state, s1, true);
    let s1_rl = child_label(state, s1, false);
    let b0_ll = child_label(state, b0, true);
    let s0_dep = if s0_id > 0 {
        state.label(s0_id).unwrap_or(NONE_LABEL).to_owned()
    } else {
        NONE_LABEL.to_owned()
    };

    let mut features = vec![
        "bias".to_owned(),
        format!("s0.w={}", s0_w),
        format!("s0.wl={}", s0_wl),
        format!("s0.t={}", s0_t),
        format!("s1.w={}", s1_w),
        format!("s1.wl={}", s1_w.to_lowercase()),
        format!("s1.t={}", s1_t),
        format!("b0.w={}", b0_w),
        format!("b0.wl={}", b0_wl),
        format!("b0.t={}", b0_t),
        format!("b1.w={}", b1_w),
        format!("b1.wl={}", b1_w.to_lowercase()),
        format!("b1.t={}", b1_t),
        format!("b2.w={}", b2_w),
        format!("b2.wl={}", b2_w.to_lowercase()),
        format!("b2.t={}", b2_t),
        format!("s0.ll={}", s0_ll),
        format!("s0.rl={}", s0_rl),
        format!("s0.dep={}", s0_dep),
        format!("s1.ll={}", s1_ll),
        format!("s1.rl={}", s1_rl),
        format!("b0.ll={}", b0_ll),
        // Tag-tag, tag-word and tag-tag-word conjunctions.
        format!("s0.t+b0.t={}|{}", s0_t, b0_t),
        format!("s1.t+s0.t={}|{}", s1_t, s0_t),
        format!("b0.t+b1.t={}|{}", b0_t, b1_t),
        format!("b1.t+b2.t={}|{}", b1_t, b2_t),
        format!("s0.t+b0.wl={}|{}", s0_t, b0_wl),
        format!("s0.wl+b0.t={}|{}", s0_wl, b0_t),
        format!("s1.t+s0.wl={}|{}", s1_t, s0_wl),
        format!("s0.t+b0.t+b0.wl={}|{}|{}", s0_t, b0_t, b0_wl),
        format!("s0.t+b0.t+s0.wl={}|{}|{}", s0_t, b0_t, s0_wl),
        format!("s1.t+s0.t+b0.wl={}|{}|{}", s1_t, s0_t, b0_wl),
    ];

    let s0_has_head = s0_id > 0 && state.head(s0_id).is_some();
    let b_empty = b0.is_none();
    if s0_has_head {
        features.push("s0_has_head".to_owned());
    }
    if b_empty {
        features.push("b_empty".to_owned());
    }
    if s0_has_head && b_empty {
        features.push("s0_has_head+b_empty".to_owned());
    }

    features.push(format!("s0.suf2={}", suffix(&s0_wl, 2)));
    features.push(format!("s0.suf3={}", suffix(&s0_wl, 3)));
    features.push(format!("b0.suf2={}", suffix(&b0_wl, 2)));
    features.push(format!("b0.suf3={}", suffix(&b0_wl, 3)));

    if let Some(b0_id) = b0 {
        let dist = (b0_id - s0_id).min(10);
        features.push(format!("dist={}", dist));
        features.push(format!("s0.t+dist={}|{}", s0_t, dist));
        features.push(format!("b0.t+dist={}|{}", b0_t, dist));
        features.push(format!("s0.t+b0.t+dist={}|{}|{}", s0_t, b0_t, dist));
        features.push(format!(
            "s0.nr+dist={}|{}",
            state.right_dep_count(s0_id).min(3),
            dist
        ));
    }

    features.push(format!("s0.nl={}", state.left_dep_count(s0_id).min(3)));
    features.push(format!("s0.nr={}", state.right_dep_count(s0_id).min(3)));
    if let Some(b0_id) = b0 {
        features.push(format!("b0.nl={}", state.left_dep_count(b0_id).min(3)));
    }

    let s0_head = if s0_id > 0 { state.head(s0_id) } else { None };
    let s0h_t = tag_at(s0_head, tags);
    let s0h_wl = word_at(s0_head, forms).to_lowercase();
    features.push(format!("s0h.t={}", s0h_t));
    features.push(format!("s0h.wl={}", s0h_wl));
    features.push(format!("s0h.t+b0.t={}|{}", s0h_t, b0_t));

    features.push(format!("stack_depth={}", state.stack_len().min(5)));
    features.push(format!("buffer_len={}", state.buffer_len().min(5)));

    let s0_shape = word_shape(&s0_w);
    let b0_shape = word_shape(&b0_w);
    features.push(format!("s0.shape={}", s0_shape));
    features.push(format!("b0.shape={}", b0_shape));
    features.push(format!("s0.shape+b0.shape={}|{}", s0_shape, b0_shape));

    features.push(format!("s0.pre3={}", prefix(&s0_wl, 3)));
    features.push(format!("b0.pre3={}", prefix(&b0_wl, 3)));

    features.push(format!("s0.ll+s0.rl={}|{}", s0_ll, s0_rl));
    features.push(format!("s0.dep+b0.ll={}|{}", s0_dep, b0_ll));

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{ParserState, Transition};

    fn words(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_owned()).collect()
    }

    #[test]
    fn shapes_collapse_runs() {
        assert_eq!(word_shape("McDonald"), "XxXx");
        assert_eq!(word_shape("1984"), "d");
        assert_eq!(word_shape("U.S.A."), "X.X.X.");
        assert_eq!(word_shape("well-known"), "x-x");
        assert_eq!(word_shape(""), "");
    }

    #[test]
    fn pos_template_emits_sentinels_at_start() {
        let sentence = words(&["The", "cat"]);
        let features = pos_features(0, &sentence, START, START2);

        assert!(features.contains(&"bias".to_owned()));
        assert!(features.contains(&"word=The".to_owned()));
        assert!(features.contains(&"word.lower=the".to_owned()));
        assert!(features.contains(&"prev.word=-START-".to_owned()));
        assert!(features.contains(&"prev.tag=-START-".to_owned()));
        assert!(features.contains(&"prev2.tag+prev.tag=-START2-|-START-".to_owned()));
        assert!(features.contains(&"next.word=cat".to_owned()));
        assert!(features.contains(&"is_title".to_owned()));
        assert!(features.contains(&"is_first".to_owned()));
        assert!(!features.contains(&"is_digit".to_owned()));
    }

    #[test]
    fn pos_flags_are_sparse() {
        let sentence = words(&["He", "bought", "12", "X-37B", "UFOs"]);

        let twelve = pos_features(2, &sentence, "VBD", "PRP");
        assert!(twelve.contains(&"is_digit".to_owned()));
        assert!(!twelve.contains(&"has_digit".to_owned()));
        assert!(!twelve.contains(&"is_first".to_owned()));

        let plane = pos_features(3, &sentence, "CD", "VBD");
        assert!(plane.contains(&"has_digit".to_owned()));
        assert!(plane.contains(&"is_hyphen".to_owned()));

        let ufos = pos_features(4, &sentence, "NN", "CD");
        assert!(!ufos.contains(&"is_upper".to_owned()));
        assert!(ufos.contains(&"next.word=-END-".to_owned()));
    }

    #[test]
    fn parse_template_uses_null_sentinels() {
        let forms = words(&["Dogs", "bark"]);
        let tags = words(&["NNS", "VBP"]);
        let state = ParserState::new(2);

        let features = parse_features(&state, &forms, &tags);
        assert!(features.contains(&"s0.w=_ROOT_".to_owned()));
        assert!(features.contains(&"s1.t=_NULL_".to_owned()));
        assert!(features.contains(&"b0.w=Dogs".to_owned()));
        assert!(features.contains(&"b2.t=_NULL_".to_owned()));
        assert!(features.contains(&"s0.ll=_NONE_".to_owned()));
        assert!(features.contains(&"dist=1".to_owned()));
        assert!(!features.contains(&"b_empty".to_owned()));
    }

    #[test]
    fn parse_template_tracks_arc_state() {
        let forms = words(&["Dogs", "bark"]);
        let tags = words(&["NNS", "VBP"]);
        let mut state = ParserState::new(2);
        state.apply(&Transition::Shift);
        state.apply(&Transition::LeftArc("nsubj".to_owned()));
        state.apply(&Transition::RightArc("root".to_owned()));

        let features = parse_features(&state, &forms, &tags);
        assert!(features.contains(&"s0.w=bark".to_owned()));
        assert!(features.contains(&"s0.ll=nsubj".to_owned()));
        assert!(features.contains(&"s0.dep=root".to_owned()));
        assert!(features.contains(&"s0.nl=1".to_owned()));
        assert!(features.contains(&"s0_has_head".to_owned()));
        assert!(features.contains(&"b_empty".to_owned()));
        assert!(features.contains(&"s0_has_head+b_empty".to_owned()));
        assert!(features.contains(&"s0h.t=_ROOT_".to_owned()));
    }
}
