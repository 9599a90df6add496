use std::fmt;

use crate::vocab::TransitionSet;

/// An arc-eager transition.
///
/// `LeftArc` and `RightArc` carry the dependency label of the arc they
/// create. The textual form (`SHIFT`, `REDUCE`, `LEFT-<label>`,
/// `RIGHT-<label>`) is what model artifacts store.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Transition {
    Shift,
    Reduce,
    LeftArc(String),
    RightArc(String),
}

impl Transition {
    pub fn from_name(name: &str) -> Option<Transition> {
        match name {
            "SHIFT" => Some(Transition::Shift),
            "REDUCE" => Some(Transition::Reduce),
            _ => {
                if let Some(label) = name.strip_prefix("LEFT-") {
                    Some(Transition::LeftArc(label.to_owned()))
                } else if let Some(label) = name.strip_prefix("RIGHT-") {
                    Some(Transition::RightArc(label.to_owned()))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transition::Shift => f.write_str("SHIFT"),
            Transition::Reduce => f.write_str("REDUCE"),
            Transition::LeftArc(label) => write!(f, "LEFT-{}", label),
            Transition::RightArc(label) => write!(f, "RIGHT-{}", label),
        }
    }
}

/// An arc-eager parser configuration.
///
/// The stack holds token identifiers with ROOT (0) at the bottom. The buffer
/// is the contiguous range of identifiers that have not been touched yet;
/// arc-eager only ever consumes it from the front, so it is kept as a
/// cursor. Per-node child state records the label of the *last* attached
/// left/right dependent and the dependent counts, which feed the parser
/// feature template.
#[derive(Clone, Debug)]
pub struct ParserState {
    stack: Vec<usize>,
    next: usize,
    n_tokens: usize,
    heads: Vec<Option<usize>>,
    labels: Vec<Option<String>>,
    left_child_label: Vec<Option<String>>,
    right_child_label: Vec<Option<String>>,
    left_dep_count: Vec<usize>,
    right_dep_count: Vec<usize>,
}

impl ParserState {
    /// Initial configuration for a sentence of `n_tokens` tokens: the stack
    /// holds ROOT and the buffer holds `1..=n_tokens`.
    pub fn new(n_tokens: usize) -> Self {
        ParserState {
            stack: vec![0],
            next: 1,
            n_tokens,
            heads: vec![None; n_tokens + 1],
            labels: vec![None; n_tokens + 1],
            left_child_label: vec![None; n_tokens + 1],
            right_child_label: vec![None; n_tokens + 1],
            left_dep_count: vec![0; n_tokens + 1],
            right_dep_count: vec![0; n_tokens + 1],
        }
    }

    pub fn n_tokens(&self) -> usize {
        self.n_tokens
    }

    /// Top of the stack. The stack is never empty: ROOT cannot be popped.
    pub fn stack_top(&self) -> usize {
        *self.stack.last().unwrap()
    }

    /// Second stack element, if any.
    pub fn stack_second(&self) -> Option<usize> {
        if self.stack.len() >= 2 {
            Some(self.stack[self.stack.len() - 2])
        } else {
            None
        }
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Buffer element at `offset` from the front.
    pub fn buffer(&self, offset: usize) -> Option<usize> {
        let id = self.next + offset;
        if id <= self.n_tokens {
            Some(id)
        } else {
            None
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.n_tokens + 1 - self.next
    }

    pub fn head(&self, id: usize) -> Option<usize> {
        self.heads[id]
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels[id].as_deref()
    }

    pub fn left_child_label(&self, id: usize) -> Option<&str> {
        self.left_child_label[id].as_deref()
    }

    pub fn right_child_label(&self, id: usize) -> Option<&str> {
        self.right_child_label[id].as_deref()
    }

    pub fn left_dep_count(&self, id: usize) -> usize {
        self.left_dep_count[id]
    }

    pub fn right_dep_count(&self, id: usize) -> usize {
        self.right_dep_count[id]
    }

    /// Terminal iff the buffer is exhausted and only ROOT remains on the
    /// stack.
    pub fn is_terminal(&self) -> bool {
        self.buffer_len() == 0 && self.stack.len() == 1
    }

    /// Whether `transition` may be applied in this configuration.
    pub fn is_valid(&self, transition: &Transition) -> bool {
        let s0 = self.stack_top();
        let has_buffer = self.buffer_len() > 0;

        match transition {
            Transition::Shift => has_buffer,
            Transition::Reduce => s0 > 0 && self.heads[s0].is_some(),
            Transition::LeftArc(_) => has_buffer && s0 > 0 && self.heads[s0].is_none(),
            Transition::RightArc(_) => has_buffer,
        }
    }

    /// Indices of the transitions that may be applied, in transition set
    /// order. That order is the tie-break order for prediction and for the
    /// dynamic oracle.
    pub fn valid_indices(&self, transitions: &TransitionSet) -> Vec<usize> {
        transitions
            .transitions()
            .iter()
            .enumerate()
            .filter(|(_, transition)| self.is_valid(transition))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Apply `transition`, which must be valid. Applying an invalid
    /// transition is a caller bug and panics.
    pub fn apply(&mut self, transition: &Transition) {
        assert!(
            self.is_valid(transition),
            "invalid transition {} in configuration {:?}",
            transition,
            self.stack
        );

        match transition {
            Transition::Shift => {
                self.stack.push(self.next);
                self.next += 1;
            }
            Transition::Reduce => {
                self.stack.pop();
            }
            Transition::LeftArc(label) => {
                let s0 = self.stack.pop().unwrap();
                let b0 = self.next;
                self.heads[s0] = Some(b0);
                self.labels[s0] = Some(label.clone());
                self.left_child_label[b0] = Some(label.clone());
                self.left_dep_count[b0] += 1;
            }
            Transition::RightArc(label) => {
                let s0 = self.stack_top();
                let b0 = self.next;
                self.heads[b0] = Some(s0);
                self.labels[b0] = Some(label.clone());
                self.right_child_label[s0] = Some(label.clone());
                self.right_dep_count[s0] += 1;
                self.stack.push(b0);
                self.next += 1;
            }
        }
    }

    /// Attach every still-headless token to ROOT with the label `root`.
    ///
    /// This is the parser termination policy once no valid transition
    /// remains. Returns the identifiers that were swept.
    pub fn attach_remaining_to_root(&mut self) -> Vec<usize> {
        let mut swept = Vec::new();
        for id in 1..=self.n_tokens {
            if self.heads[id].is_none() {
                self.heads[id] = Some(0);
                self.labels[id] = Some("root".to_owned());
                swept.push(id);
            }
        }
        swept
    }

    /// Heads for tokens `1..=n`, to be called after the ROOT sweep.
    pub fn heads_vec(&self) -> Vec<usize> {
        (1..=self.n_tokens).map(|id| self.heads[id].unwrap()).collect()
    }

    /// Labels for tokens `1..=n`, to be called after the ROOT sweep.
    pub fn labels_vec(&self) -> Vec<String> {
        (1..=self.n_tokens)
            .map(|id| self.labels[id].clone().unwrap())
            .collect()
    }
}
