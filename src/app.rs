use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::{App, AppSettings, Arg, ArgMatches};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use stdinout::OrExit;

use crate::config::{CommonConfig, DepsConfig, PosConfig};

static DEFAULT_CLAP_SETTINGS: &[AppSettings] = &[
    AppSettings::DontCollapseArgsInUsage,
    AppSettings::UnifiedHelpMessage,
];

// Option constants
static BUCKETS: &str = "buckets";
static EPOCHS: &str = "epochs";
static EXPLORE: &str = "explore";
static POSTPROCESS: &str = "postprocess";
static PRUNE: &str = "prune";
static QUICK: &str = "quick";
static SEED: &str = "seed";

// Argument constants
static TREEBANK: &str = "TREEBANK";
static OUTPUT: &str = "OUTPUT";

/// Meta information about training.
///
/// Holds the treebank and output locations and the wall-clock bounds of
/// the run.
#[derive(Clone, Serialize)]
pub struct TrainInfo {
    treebank: String,
    output: String,
    start_datetime: String,
    end_datetime: Option<String>,
}

impl TrainInfo {
    /// Construct new TrainInfo.
    ///
    /// Constructs TrainInfo with `start_datetime` set to the current
    /// datetime. `end_datetime` is set to `None` and can be set through
    /// `TrainInfo::set_end`.
    pub fn new(treebank: String, output: String) -> Self {
        let start_datetime: DateTime<Local> = Local::now();
        TrainInfo {
            treebank,
            output,
            start_datetime: start_datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_datetime: None,
        }
    }

    /// Get the treebank directory.
    pub fn treebank(&self) -> &str {
        &self.treebank
    }

    /// Get the output directory.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Get the start datetime.
    pub fn start_datetime(&self) -> &str {
        &self.start_datetime
    }

    /// Get the end datetime.
    pub fn end_datetime(&self) -> Option<&str> {
        self.end_datetime.as_deref()
    }

    /// Set the end datetime to current datetime.
    pub fn set_end(&mut self) {
        let end_datetime: DateTime<Local> = Local::now();
        self.end_datetime = Some(end_datetime.format("%Y-%m-%d %H:%M:%S").to_string());
    }
}

/// PosApp.
pub struct PosApp {
    train_info: TrainInfo,
    common_config: CommonConfig,
    pos_config: PosConfig,
}

impl Default for PosApp {
    fn default() -> Self {
        Self::new()
    }
}

impl PosApp {
    /// Construct new `PosApp`.
    pub fn new() -> Self {
        let matches = build_with_common_opts("tt-train-pos", "5")
            .arg(
                Arg::with_name(PRUNE)
                    .long(PRUNE)
                    .value_name("THRESHOLD")
                    .help("Absolute-weight pruning threshold")
                    .takes_value(true)
                    .default_value("1.0"),
            )
            .get_matches();

        let prune_threshold = matches
            .value_of(PRUNE)
            .map(|v| v.parse().or_exit("Cannot parse pruning threshold", 1))
            .unwrap();

        PosApp {
            train_info: train_info_from_matches(&matches),
            common_config: common_config_from_matches(&matches),
            pos_config: PosConfig { prune_threshold },
        }
    }

    /// Get the common config.
    pub fn common_config(&self) -> CommonConfig {
        self.common_config
    }

    /// Get the POS config.
    pub fn pos_config(&self) -> PosConfig {
        self.pos_config
    }

    /// Get the train information.
    pub fn train_info(&self) -> &TrainInfo {
        &self.train_info
    }

    pub fn treebank_dir(&self) -> PathBuf {
        PathBuf::from(self.train_info.treebank())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(self.train_info.output())
    }
}

/// DepsApp.
pub struct DepsApp {
    train_info: TrainInfo,
    common_config: CommonConfig,
    deps_config: DepsConfig,
    postprocess: bool,
}

impl Default for DepsApp {
    fn default() -> Self {
        Self::new()
    }
}

impl DepsApp {
    /// Construct a new `DepsApp`.
    pub fn new() -> Self {
        let matches = Self::add_deps_opts(build_with_common_opts("tt-train-deps", "10"))
            .get_matches();

        DepsApp {
            train_info: train_info_from_matches(&matches),
            common_config: common_config_from_matches(&matches),
            deps_config: Self::deps_config_from_matches(&matches),
            postprocess: matches.is_present(POSTPROCESS),
        }
    }

    /// Get the common config.
    pub fn common_config(&self) -> CommonConfig {
        self.common_config
    }

    /// Get the parser config.
    pub fn deps_config(&self) -> DepsConfig {
        self.deps_config
    }

    /// Whether to re-hash an existing full model instead of training.
    pub fn postprocess(&self) -> bool {
        self.postprocess
    }

    /// Get the train information.
    pub fn train_info(&self) -> &TrainInfo {
        &self.train_info
    }

    pub fn treebank_dir(&self) -> PathBuf {
        PathBuf::from(self.train_info.treebank())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(self.train_info.output())
    }

    fn add_deps_opts<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name(BUCKETS)
                .long(BUCKETS)
                .value_name("EXP")
                .help("Number of hash buckets: 2^EXP")
                .takes_value(true)
                .default_value("18"),
        )
        .arg(
            Arg::with_name(EXPLORE)
                .long(EXPLORE)
                .value_name("RATE")
                .help("Exploration rate during training")
                .takes_value(true)
                .default_value("0.1"),
        )
        .arg(
            Arg::with_name(PRUNE)
                .long(PRUNE)
                .value_name("THRESHOLD")
                .help("Absolute-weight pruning threshold after hashing")
                .takes_value(true)
                .default_value("0.1"),
        )
        .arg(
            Arg::with_name(POSTPROCESS)
                .long(POSTPROCESS)
                .help("Re-hash an already trained full model without retraining"),
        )
    }

    fn deps_config_from_matches(matches: &ArgMatches) -> DepsConfig {
        let explore_rate = matches
            .value_of(EXPLORE)
            .map(|v| v.parse().or_exit("Cannot parse exploration rate", 1))
            .unwrap();
        let buckets_exp = matches
            .value_of(BUCKETS)
            .map(|v| v.parse().or_exit("Cannot parse bucket exponent", 1))
            .unwrap();
        let prune_threshold = matches
            .value_of(PRUNE)
            .map(|v| v.parse().or_exit("Cannot parse pruning threshold", 1))
            .unwrap();

        DepsConfig {
            explore_rate,
            buckets_exp,
            prune_threshold,
        }
    }
}

fn build_with_common_opts<'a, 'b>(name: &str, default_epochs: &'a str) -> App<'a, 'b> {
    let version = if let Some(git_desc) = option_env!("MAYBE_TAGTRAIN_GIT_DESC") {
        git_desc
    } else {
        env!("CARGO_PKG_VERSION")
    };
    App::new(name)
        .settings(DEFAULT_CLAP_SETTINGS)
        .version(version)
        .arg(
            Arg::with_name(EPOCHS)
                .long(EPOCHS)
                .value_name("N")
                .help("Number of epochs")
                .takes_value(true)
                .default_value(default_epochs),
        )
        .arg(
            Arg::with_name(SEED)
                .long(SEED)
                .value_name("SEED")
                .help("Seed of the shuffle RNG")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            Arg::with_name(QUICK)
                .long(QUICK)
                .help("Train on small subsets with fewer epochs"),
        )
        .arg(
            Arg::with_name(TREEBANK)
                .help("Treebank directory")
                .index(1)
                .default_value("training/data/UD_English-EWT"),
        )
        .arg(
            Arg::with_name(OUTPUT)
                .help("Model output directory")
                .index(2)
                .default_value("training/models"),
        )
}

fn train_info_from_matches(matches: &ArgMatches) -> TrainInfo {
    let treebank = matches.value_of(TREEBANK).unwrap().into();
    let output = matches.value_of(OUTPUT).unwrap().into();
    TrainInfo::new(treebank, output)
}

/// Construct `CommonConfig` from `matches`.
fn common_config_from_matches(matches: &ArgMatches) -> CommonConfig {
    let epochs = matches
        .value_of(EPOCHS)
        .map(|v| v.parse().or_exit("Cannot parse number of epochs", 1))
        .unwrap();
    let seed = matches
        .value_of(SEED)
        .map(|v| v.parse().or_exit("Cannot parse seed", 1))
        .unwrap();

    CommonConfig {
        epochs,
        seed,
        quick: matches.is_present(QUICK),
    }
}

/// Progress bar for one training epoch.
pub fn epoch_bar(n_sentences: u64, epoch: u32, n_epochs: u32) -> ProgressBar {
    let bar = ProgressBar::new(n_sentences);
    bar.set_style(
        ProgressStyle::default_bar().template("{bar:30} {percent}% {msg} ETA: {eta_precise}"),
    );
    bar.set_message(&format!("epoch {}/{}", epoch, n_epochs));
    bar
}
