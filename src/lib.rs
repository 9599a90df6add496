#[cfg(test)]
#[macro_use]
extern crate maplit;

mod app;
pub use crate::app::{epoch_bar, DepsApp, PosApp, TrainInfo};

mod calibration;
pub use crate::calibration::{CalibrationBin, CalibrationTable};

pub mod config;

mod conllu;
pub use crate::conllu::{read_split, split_path, Sentence, SentenceIterator, Token};

pub mod deps_trainer;

mod eval;
pub use crate::eval::{
    attachment_scores, greedy_parse, non_projectivity, tag_accuracy, tag_sentence, Parse,
};

pub mod features;

mod hashing;
pub use crate::hashing::{bucket, fnv1a_32, HashedModel};

pub mod io;

mod oracle;
pub use crate::oracle::{dynamic_oracle, static_oracle, transition_cost};

mod perceptron;
pub use crate::perceptron::{argmax_margin, AveragedPerceptron, FrozenWeights, Scorer};

pub mod pos_trainer;

mod system;
pub use crate::system::{ParserState, Transition};

pub(crate) mod util;

mod vocab;
pub use crate::vocab::{collect_classes, collect_labels, TagDict, TransitionSet};
